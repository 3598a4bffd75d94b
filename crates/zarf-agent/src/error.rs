//! Agent error types

use thiserror::Error;

/// Result type for admission operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised while mutating admission requests
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgentError {
    /// The review envelope itself is malformed
    #[error("malformed admission review: {0}")]
    MalformedReview(String),

    /// The embedded object cannot be interpreted for its claimed kind
    #[error("malformed {kind} object: {message}")]
    MalformedObject { kind: String, message: String },

    /// The request operation is not one the agent mutates
    #[error("unsupported admission operation {0:?}")]
    UnsupportedOperation(String),

    /// An image or git URL in the object failed to parse
    #[error(transparent)]
    Transform(#[from] zarf_core::CoreError),

    /// State could not be loaded for the request
    #[error(transparent)]
    State(#[from] zarf_kube::KubeError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
