//! Admission review wire format and hook dispatch
//!
//! Standard Kubernetes `admission.k8s.io/v1` envelopes. Each resource kind
//! the agent mutates registers one hook with a uniform signature; dispatch
//! is a table lookup on the request's group/kind. Unknown kinds are allowed
//! through untouched; broken objects fail the request.

use serde::{Deserialize, Serialize};

use zarf_core::state::PackageState;

use crate::error::{AgentError, Result};
use crate::hooks;
use crate::operations::{encode_patch, PatchOperation};

/// One mutation hook: state plus raw object in, patch operations out
pub type MutationHook = fn(&PackageState, &serde_json::Value) -> Result<Vec<PatchOperation>>;

/// The v1 admission review envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    pub api_version: String,
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

/// The request half of an admission review
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub operation: String,

    #[serde(default)]
    pub kind: RequestKind,

    #[serde(default)]
    pub object: serde_json::Value,
}

/// Group/version/kind of the object under review
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestKind {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
}

/// The response half of an admission review
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_type: Option<String>,
}

/// Resolve the hook for a group/kind pair; `None` means pass through
pub fn hook_for(group: &str, kind: &str) -> Option<MutationHook> {
    match (group, kind) {
        ("", "Pod") => Some(hooks::pods::mutate as MutationHook),
        ("source.toolkit.fluxcd.io", "GitRepository") => {
            Some(hooks::flux::mutate_git_repository as MutationHook)
        }
        ("source.toolkit.fluxcd.io", "HelmRepository") => {
            Some(hooks::flux::mutate_helm_repository as MutationHook)
        }
        ("argoproj.io", "Application") => Some(hooks::argo::mutate_application as MutationHook),
        _ => None,
    }
}

/// Mutate one admission request against the current state.
///
/// Returns the response to embed in the review. Objects of kinds without a
/// registered hook are allowed unchanged; mutation errors propagate so the
/// server can answer 500.
pub fn mutate(state: &PackageState, request: &AdmissionRequest) -> Result<AdmissionResponse> {
    match request.operation.as_str() {
        "CREATE" | "UPDATE" => {}
        other => return Err(AgentError::UnsupportedOperation(other.to_string())),
    }

    let operations = match hook_for(&request.kind.group, &request.kind.kind) {
        Some(hook) => hook(state, &request.object)?,
        None => Vec::new(),
    };

    let patch = encode_patch(&operations)?;
    Ok(AdmissionResponse {
        uid: request.uid.clone(),
        allowed: true,
        patch_type: patch.as_ref().map(|_| "JSONPatch".to_string()),
        patch,
    })
}

/// Process a full review envelope
pub fn review(state: &PackageState, review: AdmissionReview) -> Result<AdmissionReview> {
    let request = review
        .request
        .ok_or_else(|| AgentError::MalformedReview("review carries no request".to_string()))?;

    let response = mutate(state, &request)?;

    Ok(AdmissionReview {
        api_version: "admission.k8s.io/v1".to_string(),
        kind: "AdmissionReview".to_string(),
        request: None,
        response: Some(response),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pod_request(object: serde_json::Value) -> AdmissionRequest {
        AdmissionRequest {
            uid: "test-uid".to_string(),
            operation: "CREATE".to_string(),
            kind: RequestKind {
                group: String::new(),
                version: "v1".to_string(),
                kind: "Pod".to_string(),
            },
            object,
        }
    }

    #[test]
    fn unknown_kind_passes_through() {
        let request = AdmissionRequest {
            uid: "u".to_string(),
            operation: "CREATE".to_string(),
            kind: RequestKind {
                group: "example.com".to_string(),
                version: "v1".to_string(),
                kind: "Widget".to_string(),
            },
            object: serde_json::json!({}),
        };

        let response = mutate(&PackageState::default(), &request).unwrap();
        assert!(response.allowed);
        assert!(response.patch.is_none());
    }

    #[test]
    fn unknown_operation_is_rejected() {
        let mut request = pod_request(serde_json::json!({}));
        request.operation = "DELETE".to_string();

        assert!(matches!(
            mutate(&PackageState::default(), &request),
            Err(AgentError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn response_echoes_request_uid() {
        let request = AdmissionRequest {
            uid: "echo-me".to_string(),
            operation: "UPDATE".to_string(),
            ..Default::default()
        };
        let response = mutate(&PackageState::default(), &request).unwrap();
        assert_eq!(response.uid, "echo-me");
    }
}
