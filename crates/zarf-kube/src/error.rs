//! Cluster error types

use thiserror::Error;

/// Result type for cluster operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors raised while talking to the cluster
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// The singleton state secret could not be read or written
    #[error("state error: {0}")]
    State(String),

    /// A deployed-package record is missing
    #[error("package {name:?} is not deployed in this cluster")]
    PackageNotFound { name: String },

    /// A manifest resource kind the cluster does not serve
    #[error("unknown resource kind {kind} ({group}/{version})")]
    UnknownKind {
        group: String,
        version: String,
        kind: String,
    },

    /// A chart operation delegated to helm failed
    #[error("helm {operation} of release {release:?} failed: {message}")]
    Helm {
        operation: String,
        release: String,
        message: String,
    },

    /// A wait predicate did not come true in time
    #[error("timed out waiting for {0}")]
    WaitTimeout(String),

    /// A webhook observing a component did not finish in time
    #[error("timed out waiting for webhook {webhook:?} on component {component:?}")]
    WebhookTimeout { webhook: String, component: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for KubeError {
    fn from(e: serde_yaml::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Whether retrying the operation could plausibly succeed.
    ///
    /// Timeouts and connection resets are transient; Forbidden and
    /// Conflict mean retrying the same request cannot help.
    pub fn is_transient(&self) -> bool {
        match self {
            KubeError::Api(kube::Error::Api(resp)) => {
                matches!(resp.code, 408 | 429 | 500 | 502 | 503 | 504)
            }
            KubeError::Api(kube::Error::HyperError(_))
            | KubeError::Api(kube::Error::Service(_)) => true,
            _ => false,
        }
    }

    /// Whether this is a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 404)
    }

    /// Whether this is a Kubernetes 409 conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, KubeError::Api(kube::Error::Api(resp)) if resp.code == 409)
    }
}
