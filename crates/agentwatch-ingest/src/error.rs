//! HTTP error mapping
//!
//! ValidationError → 400, NotFound → 404, StorageError → 500. Every error
//! body is JSON with a single `error` string field. Delivery errors (push
//! channel, HITL callback) never reach this type: they are logged and
//! swallowed at their call sites.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use agentwatch_core::Error as CoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(CoreError),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingFields => ApiError::MissingFields,
            CoreError::EventNotFound(id) => ApiError::NotFound(format!("Event not found: {}", id)),
            CoreError::SessionNotFound(id) => {
                ApiError::NotFound(format!("Session not found: {}", id))
            }
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingFields => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
