//! API error types with HTTP status code mapping.
//!
//! [`ApiError`] is the single error type of every handler. It renders as
//! `{"success": false, "error": {"code", "message"}}` with the matching status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::runs::RunError;

/// Structured error detail in API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ApiErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "BAD_REQUEST").
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// 400.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 409.
    #[error("conflict: {0}")]
    Conflict(String),

    /// 500.
    #[error("internal error: {0}")]
    InternalError(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::InternalError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let detail = ApiErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        };

        let body = serde_json::json!({
            "success": false,
            "error": detail,
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<RunError> for ApiError {
    fn from(err: RunError) -> Self {
        match &err {
            RunError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RunError::AlreadyFinished { .. } => ApiError::Conflict(err.to_string()),
            RunError::Io { .. } | RunError::Serialization(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}
