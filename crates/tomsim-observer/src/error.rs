//! Error types for the Observer API server.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! can be converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors that can occur in the Observer API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An invalid query parameter or request body was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The server runs without a scheduler attached, so commands are
    /// unavailable.
    #[error("scheduler not available")]
    SchedulerUnavailable,

    /// A scheduler command failed.
    #[error("scheduler error: {0}")]
    Scheduler(#[from] tomsim_core::SchedulerError),
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::SchedulerUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Serialization(_) | Self::Scheduler(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
