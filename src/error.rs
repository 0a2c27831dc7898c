use axum::{Json,
    http::StatusCode,
    response::IntoResponse
};
use serde_json::json;
use thiserror::Error;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("frame extraction is unavailable: {0}")]
    ToolUnavailable(String),

    #[error("frame extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("multipart error: {0}")]
    Multipart(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("internal server error: {0}")]
    Internal(String),
}

/// Convert `AppError` into an HTTP response.
///
/// Every error renders as the standard `{success, message}` envelope so
/// clients never have to special-case error bodies.
impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Multipart(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::ToolUnavailable(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!(
                    "Frame extraction tool is not installed or not on PATH: {}. \
                     Install ffmpeg or disable frame extraction.",
                    msg
                ),
            ),
            AppError::ExtractionFailed(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Frame extraction failed: {}", msg),
            ),
            AppError::Storage(err) => {
                tracing::error!("Storage error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({"success": false, "message": message}));
        (status, body).into_response()
    }
}
