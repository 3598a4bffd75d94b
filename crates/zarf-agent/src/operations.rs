//! JSON-Patch operations
//!
//! The admission response carries a base64-encoded JSON-Patch document;
//! hooks build it from these operations.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One RFC 6902 patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: PatchOp,
    pub path: String,
    pub value: serde_json::Value,
}

/// Operation verbs the agent emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
}

impl PatchOperation {
    /// `replace` at a path
    pub fn replace(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: path.into(),
            value: value.into(),
        }
    }

    /// `add` at a path
    pub fn add(path: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            op: PatchOp::Add,
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Serialize patch operations to the base64 form the admission response
/// carries. An empty patch list encodes to `None`.
pub fn encode_patch(operations: &[PatchOperation]) -> serde_json::Result<Option<String>> {
    if operations.is_empty() {
        return Ok(None);
    }
    let json = serde_json::to_vec(operations)?;
    Ok(Some(STANDARD.encode(json)))
}
