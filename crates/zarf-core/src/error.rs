//! Core error types

use std::path::PathBuf;

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while loading, composing, laying out or verifying packages
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// Schema or invariant violation, raised before any I/O
    #[error("validation failed at {field}: {message}")]
    Validation { field: String, message: String },

    /// Checksum or signature mismatch; names the first offending path
    #[error("integrity check failed for {path}: {message}")]
    Integrity { path: String, message: String },

    /// A referenced package file could not be found
    #[error("package not found: {}", path.display())]
    PackageNotFound { path: PathBuf },

    /// Import chain errors (cycles, malformed remote imports, missing components)
    #[error("invalid import chain: {0}")]
    ImportChain(String),

    /// An image or git reference could not be parsed
    #[error("unable to parse reference {reference:?}: {message}")]
    InvalidRef { reference: String, message: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Shorthand for a validation error on a named field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an integrity error on a named path
    pub fn integrity(path: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::Integrity {
            path: path.into(),
            message: message.into(),
        }
    }
}
