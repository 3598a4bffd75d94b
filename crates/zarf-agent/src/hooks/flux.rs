//! Flux source mutation
//!
//! GitRepositories are re-pointed at the in-cluster git server with a
//! credentials secret reference; OCI HelmRepositories are re-pointed at the
//! in-cluster registry.

use zarf_core::state::{PackageState, GIT_SERVER_SECRET_NAME, REGISTRY_PULL_SECRET_NAME};
use zarf_core::transform;

use crate::error::{AgentError, Result};
use crate::operations::PatchOperation;

use super::is_ignored;

/// Mutate a Flux GitRepository
pub fn mutate_git_repository(
    state: &PackageState,
    object: &serde_json::Value,
) -> Result<Vec<PatchOperation>> {
    if is_ignored(object) {
        return Ok(Vec::new());
    }

    let url = object
        .pointer("/spec/url")
        .and_then(|u| u.as_str())
        .ok_or_else(|| AgentError::MalformedObject {
            kind: "GitRepository".to_string(),
            message: "spec.url is missing".to_string(),
        })?;

    let server = &state.git_server;

    // Idempotence: a repository already pointing at the in-cluster server
    // needs no patch.
    if url.starts_with(&server.address) {
        return Ok(Vec::new());
    }

    let rewritten = transform::git_transform_url(&server.address, url, &server.push_username)?;

    let mut operations = vec![PatchOperation::replace("/spec/url", rewritten)];

    if object.pointer("/spec/secretRef").is_none() {
        operations.push(PatchOperation::add(
            "/spec/secretRef",
            serde_json::json!({ "name": GIT_SERVER_SECRET_NAME }),
        ));
    }

    Ok(operations)
}

/// Mutate a Flux HelmRepository; only OCI-typed repositories are rewritten
pub fn mutate_helm_repository(
    state: &PackageState,
    object: &serde_json::Value,
) -> Result<Vec<PatchOperation>> {
    if is_ignored(object) {
        return Ok(Vec::new());
    }

    let is_oci = object
        .pointer("/spec/type")
        .and_then(|t| t.as_str())
        .is_some_and(|t| t.eq_ignore_ascii_case("oci"));
    if !is_oci {
        return Ok(Vec::new());
    }

    let url = object
        .pointer("/spec/url")
        .and_then(|u| u.as_str())
        .ok_or_else(|| AgentError::MalformedObject {
            kind: "HelmRepository".to_string(),
            message: "spec.url is missing".to_string(),
        })?;

    let registry = &state.registry_info.address;
    let target = format!("oci://{registry}");
    if url.starts_with(&target) {
        return Ok(Vec::new());
    }

    let Some(path) = url.strip_prefix("oci://") else {
        return Err(AgentError::MalformedObject {
            kind: "HelmRepository".to_string(),
            message: format!("OCI repository url {url:?} has no oci:// scheme"),
        });
    };

    // Keep the repository path, swap the registry host.
    let repo_path = path.split_once('/').map(|(_, rest)| rest).unwrap_or("");
    let rewritten = if repo_path.is_empty() {
        target.clone()
    } else {
        format!("{target}/{repo_path}")
    };

    let mut operations = vec![PatchOperation::replace("/spec/url", rewritten)];
    if object.pointer("/spec/secretRef").is_none() {
        operations.push(PatchOperation::add(
            "/spec/secretRef",
            serde_json::json!({ "name": REGISTRY_PULL_SECRET_NAME }),
        ));
    }

    Ok(operations)
}
