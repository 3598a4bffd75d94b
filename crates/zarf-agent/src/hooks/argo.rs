//! Argo CD Application mutation
//!
//! Rewrites the git repo URL of `spec.source` and every entry of
//! `spec.sources` to the in-cluster git server.

use zarf_core::state::PackageState;
use zarf_core::transform;

use crate::error::{AgentError, Result};
use crate::operations::PatchOperation;

use super::is_ignored;

/// Mutate an Argo Application
pub fn mutate_application(
    state: &PackageState,
    object: &serde_json::Value,
) -> Result<Vec<PatchOperation>> {
    if is_ignored(object) {
        return Ok(Vec::new());
    }

    let server = &state.git_server;
    let mut operations = Vec::new();

    if let Some(url) = object.pointer("/spec/source/repoURL").and_then(|u| u.as_str()) {
        if let Some(rewritten) = rewrite(server, url, "spec.source.repoURL")? {
            operations.push(PatchOperation::replace("/spec/source/repoURL", rewritten));
        }
    }

    if let Some(sources) = object.pointer("/spec/sources").and_then(|s| s.as_array()) {
        for (index, source) in sources.iter().enumerate() {
            let Some(url) = source.get("repoURL").and_then(|u| u.as_str()) else {
                return Err(AgentError::MalformedObject {
                    kind: "Application".to_string(),
                    message: format!("spec.sources[{index}] has no repoURL"),
                });
            };
            if let Some(rewritten) = rewrite(server, url, "spec.sources.repoURL")? {
                operations.push(PatchOperation::replace(
                    format!("/spec/sources/{index}/repoURL"),
                    rewritten,
                ));
            }
        }
    }

    Ok(operations)
}

fn rewrite(
    server: &zarf_core::state::GitServerInfo,
    url: &str,
    field: &str,
) -> Result<Option<String>> {
    if url.starts_with(&server.address) {
        return Ok(None);
    }
    let rewritten = transform::git_transform_url(&server.address, url, &server.push_username)
        .map_err(|e| {
            tracing::warn!(%field, %url, "failed to parse application repo url");
            e
        })?;
    Ok(Some(rewritten))
}
