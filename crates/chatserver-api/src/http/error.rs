//! Application error type mapping to HTTP status codes and envelope format.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use chatserver_types::error::ChatError;

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Chat engine errors.
    Chat(ChatError),
    /// Malformed request parameters.
    Validation(String),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        AppError::Chat(e)
    }
}

impl AppError {
    /// HTTP status and machine-readable code.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            AppError::Chat(e) => match e {
                ChatError::EmptyParticipants | ChatError::InvalidUsername(_) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
                }
                ChatError::SenderNotFound(_) => (StatusCode::NOT_FOUND, "SENDER_NOT_FOUND"),
                ChatError::NoChatForSender(_) => (StatusCode::NOT_FOUND, "NO_CHAT_FOR_SENDER"),
                ChatError::ChatNotFound(_) => (StatusCode::NOT_FOUND, "CHAT_NOT_FOUND"),
                ChatError::DeadlineExceeded { .. } => {
                    (StatusCode::GATEWAY_TIMEOUT, "DEADLINE_EXCEEDED")
                }
                ChatError::Cancelled { .. } => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED"),
                ChatError::StatementBuild(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "STATEMENT_ERROR")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR"),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = match &self {
            AppError::Chat(e) => e.to_string(),
            AppError::Validation(msg) => msg.clone(),
        };

        let request_id = uuid::Uuid::now_v7().to_string();
        let body = ApiResponse::error(code, &message, request_id);
        (status, Json(body)).into_response()
    }
}
