//! Per-kind mutation hooks

pub mod argo;
pub mod flux;
pub mod pods;

/// Label that opts a resource out of agent mutation
pub const IGNORE_LABEL: &str = "zarf.dev/agent";

/// Label value that opts out
pub const IGNORE_VALUE: &str = "ignore";

/// Whether the object carries the opt-out label
pub fn is_ignored(object: &serde_json::Value) -> bool {
    object
        .pointer("/metadata/labels")
        .and_then(|labels| labels.get(IGNORE_LABEL))
        .and_then(|v| v.as_str())
        == Some(IGNORE_VALUE)
}
