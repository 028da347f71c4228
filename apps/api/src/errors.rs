use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::chat_client::ChatError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
/// Every variant is recovered at the handler boundary: no error propagates past
/// the single user-triggered action that caused it, and none discards session state.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing placeholder: {0}")]
    MissingPlaceholder(&'static str),

    #[error("Session has no resume yet")]
    SessionNotReady,

    #[error("A generation is already in flight for this session")]
    SessionBusy,

    #[error("Could not read PDF: {0}")]
    UnreadablePdf(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ChatError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::MissingPlaceholder(name) => (
                StatusCode::BAD_REQUEST,
                "MISSING_PLACEHOLDER",
                format!("Required field '{name}' is missing or empty"),
            ),
            AppError::SessionNotReady => (
                StatusCode::CONFLICT,
                "SESSION_NOT_READY",
                "Upload a resume before using this tool".to_string(),
            ),
            AppError::SessionBusy => (
                StatusCode::CONFLICT,
                "SESSION_BUSY",
                "A generation is already running for this session".to_string(),
            ),
            AppError::UnreadablePdf(msg) => {
                tracing::warn!("Unreadable PDF: {msg}");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNREADABLE_PDF",
                    format!("No readable text could be extracted: {msg}"),
                )
            }
            // Provider failures surface the raw cause to the user, unaltered.
            AppError::Provider(ChatError::Timeout) => {
                tracing::error!("Provider call timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "PROVIDER_TIMEOUT",
                    "The model did not respond within the time limit".to_string(),
                )
            }
            AppError::Provider(e) => {
                tracing::error!("Provider error: {e}");
                (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", e.to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
