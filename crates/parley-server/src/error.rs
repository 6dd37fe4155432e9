//! JSON error responses for route handlers.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error returned by JSON handlers as `{"error": message}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", resource))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Short variant name for streamed `{"error": {"message", "type"}}` payloads.
    pub fn kind(&self) -> &'static str {
        match self.status {
            StatusCode::BAD_REQUEST => "InvalidRequest",
            StatusCode::NOT_FOUND => "NotFound",
            _ => "InternalError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!(error = %rejection, "Rejected request body");
        Self::bad_request(format!("Invalid request: {}", rejection.body_text()))
    }
}

impl From<parley_core::Error> for ApiError {
    fn from(err: parley_core::Error) -> Self {
        tracing::error!(error = %err, "API error");
        match err {
            parley_core::Error::NotFound(msg) => Self::new(StatusCode::NOT_FOUND, msg),
            parley_core::Error::InvalidRequest(msg) => Self::bad_request(msg),
            other => Self::internal(other.to_string()),
        }
    }
}
