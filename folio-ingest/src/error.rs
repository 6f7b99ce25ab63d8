//! Error types for the HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Path segment is not a valid UUID (400)
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// Resource not found (404)
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Pipeline or store error surfaced through a handler
    #[error("common error: {0}")]
    Common(#[from] folio_common::Error),

    /// Anything else (500)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::InvalidUuid(segment) => (
                StatusCode::BAD_REQUEST,
                "InvalidUUID",
                format!("not a valid UUID: {}", segment),
            ),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, "NotFound", what),
            // Internal detail stays in the log; the response body carries
            // no specifics.
            ApiError::Common(ref err) => {
                tracing::error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "internal server error".to_string(),
                )
            }
            ApiError::Other(ref err) => {
                tracing::error!(error = %err, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "InternalError",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
