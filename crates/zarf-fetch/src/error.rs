//! Fetch error types

use thiserror::Error;

/// Result type for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

/// Errors raised while pulling external artifacts or package archives
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FetchError {
    /// Network or auth failure while pulling an artifact
    #[error("failed to fetch {resource}: {message}")]
    Fetch { resource: String, message: String },

    /// Checksum mismatch after materialization
    #[error("integrity check failed for {resource}: expected {expected}, got {actual}")]
    ShasumMismatch {
        resource: String,
        expected: String,
        actual: String,
    },

    /// The requested entry is absent from a registry or index
    #[error("{resource} not found: {message}")]
    NotFound { resource: String, message: String },

    /// The remote rejected the manifest format (drives the image-manifest fallback)
    #[error("registry rejected manifest for {reference}: {message}")]
    ManifestRejected { reference: String, message: String },

    /// A package source location could not be identified
    #[error("could not identify source type for {0:?}")]
    UnknownSource(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("registry error: {0}")]
    Registry(#[from] oci_distribution::errors::OciDistributionError),

    #[error("invalid reference: {0}")]
    RefParse(#[from] oci_distribution::ParseError),

    #[error(transparent)]
    Core(#[from] zarf_core::CoreError),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Shorthand for a fetch failure on a named resource
    pub fn fetch(resource: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Fetch {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a not-found failure on a named resource
    pub fn not_found(resource: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::NotFound {
            resource: resource.into(),
            message: message.into(),
        }
    }
}
