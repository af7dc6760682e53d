//! Message handlers: send and list.

use std::time::Instant;

use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chatserver_types::chat::{MessageView, NewMessage};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for POST /api/v1/messages.
///
/// `timestamp` defaults to the time the request is handled.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub from: String,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SentMessage {
    pub sent: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    10
}

/// POST /api/v1/messages - Send a message to the sender's most recent chat.
pub async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<ApiResponse<SentMessage>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let message = NewMessage::new(
        body.from,
        body.text,
        body.timestamp.unwrap_or_else(Utc::now),
    );
    let ctx = state.call_context();
    state.chat_service.send_message(&message, &ctx).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    Ok(Json(ApiResponse::success(
        SentMessage { sent: true },
        request_id,
        elapsed,
    )))
}

/// GET /api/v1/messages?limit=N - Most recent messages across all chats.
pub async fn list_recent(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<ApiResponse<Vec<MessageView>>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let ctx = state.call_context();
    let messages = state.chat_service.recent_messages(query.limit, &ctx).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let resp = ApiResponse::success(messages, request_id, elapsed)
        .with_link("self", &format!("/api/v1/messages?limit={}", query.limit));

    Ok(Json(resp))
}
