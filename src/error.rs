//! Domain error taxonomy
//! Mission: Surface only what the caller can act upon

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors that cross a service boundary.
///
/// Dependency failures (predictors, cache, weather, push) never appear here:
/// those paths recover locally with a deterministic fallback and log a warning.
#[derive(Debug)]
pub enum FleetError {
    /// Caller-supplied values out of domain. Never retried.
    Validation(String),
    /// Caller is not the owner/acceptor of the resource. Never retried.
    Authorization(String),
    /// State changed between read and write (e.g. a swap lost the race).
    Conflict(String),
    /// Store I/O, transaction aborts beyond retry, corrupt data.
    Internal(anyhow::Error),
}

impl FleetError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl std::fmt::Display for FleetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::Authorization(msg) => write!(f, "authorization error: {msg}"),
            Self::Conflict(msg) => write!(f, "conflict: {msg}"),
            Self::Internal(e) => write!(f, "internal error: {e}"),
        }
    }
}

impl std::error::Error for FleetError {}

impl From<anyhow::Error> for FleetError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl From<rusqlite::Error> for FleetError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Internal(anyhow::Error::new(e))
    }
}

impl IntoResponse for FleetError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Authorization(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            // No internals leak to the caller.
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal error surfaced to handler");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
