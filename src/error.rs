//! Error types for the voice cache
//!
//! Provides unified error handling using thiserror. Every request ends up at
//! the `IntoResponse` impl below, which is the single place a failure is
//! rendered for the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Voice Cache Error Enum ==
/// Unified error type for the cache, the pipeline and the HTTP facade.
#[derive(Error, Debug)]
pub enum VoiceCacheError {
    /// Payload or metadata entry absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// The model server answered with a non-200 status; carries its decoded message
    #[error("{0}")]
    ExternalInvocationFailure(String),

    /// The model server reported success but never produced its output entry
    #[error("Payload was sent, but output file was not produced: {0}")]
    PostconditionFailure(String),

    /// Metadata references a hash that has no backing payload
    #[error("Store inconsistency: {0}")]
    StoreInconsistency(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The request was cancelled before it finished
    #[error("Request cancelled")]
    Cancelled,

    /// The model server did not answer within the configured deadline
    #[error("Model server timed out after {0} seconds")]
    Timeout(u64),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload could not be encoded or decoded
    #[error("Audio codec error: {0}")]
    Codec(#[from] hound::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VoiceCacheError {
    /// Short class name shown next to the detail in diagnostics.
    pub fn class(&self) -> &'static str {
        match self {
            VoiceCacheError::NotFound(_) => "NotFound",
            VoiceCacheError::ExternalInvocationFailure(_) => "ExternalInvocationFailure",
            VoiceCacheError::PostconditionFailure(_) => "PostconditionFailure",
            VoiceCacheError::StoreInconsistency(_) => "StoreInconsistency",
            VoiceCacheError::InvalidRequest(_) => "InvalidRequest",
            VoiceCacheError::Cancelled => "Cancelled",
            VoiceCacheError::Timeout(_) => "Timeout",
            VoiceCacheError::Io(_) => "Io",
            VoiceCacheError::Serialization(_) => "Serialization",
            VoiceCacheError::Codec(_) => "Codec",
            VoiceCacheError::Internal(_) => "Internal",
        }
    }

    /// True for the "nothing at that key" condition callers routinely expect.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VoiceCacheError::NotFound(_))
    }

    fn status(&self) -> StatusCode {
        match self {
            VoiceCacheError::NotFound(_) => StatusCode::NOT_FOUND,
            VoiceCacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            VoiceCacheError::ExternalInvocationFailure(_)
            | VoiceCacheError::PostconditionFailure(_) => StatusCode::BAD_GATEWAY,
            VoiceCacheError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            VoiceCacheError::StoreInconsistency(_) => StatusCode::CONFLICT,
            // 499 is the de-facto "client closed request" code
            VoiceCacheError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            VoiceCacheError::Io(_)
            | VoiceCacheError::Serialization(_)
            | VoiceCacheError::Codec(_)
            | VoiceCacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for VoiceCacheError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse::new(self.class(), self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the voice cache.
pub type Result<T> = std::result::Result<T, VoiceCacheError>;
