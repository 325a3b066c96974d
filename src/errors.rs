//! Typed error hierarchy for the issue assistant.
//!
//! Two enums cover the two layers that can fail:
//! - `AgentError`: session creation, polling and collaborator failures
//! - `ApiError`: HTTP-facing failures rendered as JSON responses
//!
//! Degraded-but-valid outcomes (timeouts, unparseable output, agent-reported
//! failures after recovery) are not errors; they are tagged with a
//! [`FallbackReason`](crate::agent::models::FallbackReason) on the result.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors from the agent subsystem (orchestrator and poller).
#[derive(Debug, Error)]
pub enum AgentError {
    /// The create-session response had none of the known identifier fields.
    #[error("Agent did not return a session ID: {response}")]
    SessionIdMissing { response: serde_json::Value },

    /// The remote agent reported a failed, errored or cancelled session.
    #[error("Agent session {session_id} failed with status '{status}'")]
    AgentSessionFailed {
        session_id: String,
        status: String,
        payload: serde_json::Value,
    },

    /// The caller abandoned the request while the session was being polled.
    #[error("Polling of session {session_id} was cancelled")]
    Cancelled { session_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors surfaced by the HTTP API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", err))
    }
}
