//! Chat resource handlers.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};

use chatserver_types::chat::{Chat, ChatId, User};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Request body for POST /api/v1/chats.
#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub usernames: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedChat {
    pub id: ChatId,
}

#[derive(Debug, Serialize)]
pub struct DeletedChat {
    pub deleted: bool,
}

fn parse_chat_id(raw: &str) -> Result<ChatId, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid chat id: {raw}")))
}

/// POST /api/v1/chats - Create a chat for a list of usernames.
pub async fn create_chat(
    State(state): State<AppState>,
    Json(body): Json<CreateChatRequest>,
) -> Result<Json<ApiResponse<CreatedChat>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let ctx = state.call_context();
    let id = state.chat_service.create_chat(&body.usernames, &ctx).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let resp = ApiResponse::success(CreatedChat { id }, request_id, elapsed)
        .with_link("self", &format!("/api/v1/chats/{id}"))
        .with_link("members", &format!("/api/v1/chats/{id}/members"));

    Ok(Json(resp))
}

/// GET /api/v1/chats/{id} - Get a chat by id.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<Chat>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let chat_id = parse_chat_id(&raw_id)?;
    let ctx = state.call_context();
    let chat = state.chat_service.get_chat(chat_id, &ctx).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let resp = ApiResponse::success(chat, request_id, elapsed)
        .with_link("self", &format!("/api/v1/chats/{chat_id}"))
        .with_link("members", &format!("/api/v1/chats/{chat_id}/members"));

    Ok(Json(resp))
}

/// GET /api/v1/chats/{id}/members - List the users of a chat.
pub async fn get_members(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<User>>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let chat_id = parse_chat_id(&raw_id)?;
    let ctx = state.call_context();
    let members = state.chat_service.chat_members(chat_id, &ctx).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    let resp = ApiResponse::success(members, request_id, elapsed)
        .with_link("chat", &format!("/api/v1/chats/{chat_id}"));

    Ok(Json(resp))
}

/// DELETE /api/v1/chats/{id} - Delete a chat with its memberships and messages.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<DeletedChat>>, AppError> {
    let start = Instant::now();
    let request_id = uuid::Uuid::now_v7().to_string();

    let chat_id = parse_chat_id(&raw_id)?;
    let ctx = state.call_context();
    state.chat_service.delete_chat(chat_id, &ctx).await?;
    let elapsed = start.elapsed().as_millis() as u64;

    Ok(Json(ApiResponse::success(
        DeletedChat { deleted: true },
        request_id,
        elapsed,
    )))
}
