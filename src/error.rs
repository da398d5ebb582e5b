//! Error taxonomy for controller actions and the HTTP surface.
//!
//! Transient connectivity failures are kept apart from everything else so
//! the gateway can degrade reads to the local cache; validation failures
//! carry the offending field so the view can highlight it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Remote store unreachable (connect error, timeout, HTTP 5xx).
    #[error("Remote store unreachable: {0}")]
    Connectivity(String),

    #[error("{message}")]
    Validation { field: &'static str, message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Too many failed attempts. Try again in {0} minute(s).")]
    LockedOut(i64),

    /// Remote store answered with a non-transient failure.
    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Local storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Connectivity(_))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::LockedOut(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Remote(_)
            | AppError::Storage(_)
            | AppError::Serialization(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AppError::Validation { field, message } => serde_json::json!({
                "error": message,
                "field": field,
            }),
            // Unclassified failures get a generic notice; details go to the log.
            AppError::Remote(_)
            | AppError::Storage(_)
            | AppError::Serialization(_)
            | AppError::Unexpected(_) => {
                tracing::error!(error = %self, "operation failed");
                serde_json::json!({ "error": "Operation failed" })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_is_transient() {
        assert!(AppError::Connectivity("timeout".into()).is_transient());
        assert!(!AppError::Remote("syntax error".into()).is_transient());
        assert!(!AppError::validation("price", "bad").is_transient());
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            AppError::validation("plate", "x").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Connectivity("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Unexpected("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
