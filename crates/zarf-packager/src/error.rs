//! Packager error types
//!
//! The orchestrator's error type unifies the lower layers and adds the
//! action and cancellation kinds. At each component step the deployer
//! decides retry vs. fail vs. `onFailure` based on these variants.

use thiserror::Error;

/// Result type for packager operations
pub type Result<T> = std::result::Result<T, PackagerError>;

/// Errors raised while assembling, deploying or removing packages
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PackagerError {
    #[error(transparent)]
    Core(#[from] zarf_core::CoreError),

    #[error(transparent)]
    Fetch(#[from] zarf_fetch::FetchError),

    #[error(transparent)]
    Cluster(#[from] zarf_kube::KubeError),

    /// A shell action exited non-zero or a wait action timed out
    #[error("action failed: {description}: {message}")]
    Action {
        description: String,
        message: String,
    },

    /// The operation was cancelled by the user or a deadline
    #[error("operation cancelled during {0}")]
    Cancelled(String),

    /// A component the user selected does not exist in the package
    #[error("component {0:?} was requested but is not in the package")]
    UnknownComponent(String),

    /// Deploying a component failed after its onFailure actions ran
    #[error("component {component:?} failed to deploy: {source}")]
    ComponentFailed {
        component: String,
        #[source]
        source: Box<PackagerError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackagerError {
    /// Shorthand for an action failure
    pub fn action(description: impl Into<String>, message: impl Into<String>) -> Self {
        PackagerError::Action {
            description: description.into(),
            message: message.into(),
        }
    }
}
