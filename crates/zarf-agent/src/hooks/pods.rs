//! Pod mutation
//!
//! Rewrites every container image to the in-cluster registry and attaches
//! the registry pull secret. Images already pointing at the in-cluster
//! registry are left alone, so re-admitting a mutated pod is a no-op.

use zarf_core::state::{PackageState, REGISTRY_PULL_SECRET_NAME};
use zarf_core::transform;

use crate::error::{AgentError, Result};
use crate::operations::PatchOperation;

use super::is_ignored;

/// Mutate a Pod admission object
pub fn mutate(state: &PackageState, object: &serde_json::Value) -> Result<Vec<PatchOperation>> {
    if is_ignored(object) {
        return Ok(Vec::new());
    }

    let registry = &state.registry_info.address;
    let mut operations = Vec::new();

    for list in ["initContainers", "containers", "ephemeralContainers"] {
        let Some(containers) = object
            .pointer(&format!("/spec/{list}"))
            .and_then(|c| c.as_array())
        else {
            continue;
        };

        for (index, container) in containers.iter().enumerate() {
            let image = container
                .get("image")
                .and_then(|i| i.as_str())
                .ok_or_else(|| AgentError::MalformedObject {
                    kind: "Pod".to_string(),
                    message: format!("container {index} in {list} has no image"),
                })?;

            if image.starts_with(&format!("{registry}/")) {
                continue;
            }

            let rewritten = transform::image_transform_host(registry, image)?;
            operations.push(PatchOperation::replace(
                format!("/spec/{list}/{index}/image"),
                rewritten,
            ));
        }
    }

    if needs_pull_secret(object) {
        operations.push(PatchOperation::add(
            "/spec/imagePullSecrets",
            serde_json::json!([{ "name": REGISTRY_PULL_SECRET_NAME }]),
        ));
    }

    Ok(operations)
}

fn needs_pull_secret(object: &serde_json::Value) -> bool {
    let existing = object.pointer("/spec/imagePullSecrets");
    match existing.and_then(|s| s.as_array()) {
        Some(secrets) => !secrets
            .iter()
            .any(|s| s.get("name").and_then(|n| n.as_str()) == Some(REGISTRY_PULL_SECRET_NAME)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zarf_core::state::RegistryInfo;

    fn test_state() -> PackageState {
        PackageState {
            registry_info: RegistryInfo {
                address: "127.0.0.1:31999".to_string(),
                pull_username: "zarf-pull".to_string(),
                pull_password: "p".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn rewrites_container_images_and_attaches_pull_secret() {
        let pod = serde_json::json!({
            "metadata": { "name": "web" },
            "spec": {
                "containers": [ { "name": "nginx", "image": "nginx:1.25" } ]
            }
        });

        let ops = mutate(&test_state(), &pod).unwrap();
        assert_eq!(ops.len(), 2);

        // crc32("nginx:1.25") == 3454826247
        assert_eq!(ops[0].path, "/spec/containers/0/image");
        assert_eq!(
            ops[0].value,
            serde_json::json!("127.0.0.1:31999/library/nginx:1.25-zarf-3454826247")
        );

        assert_eq!(ops[1].path, "/spec/imagePullSecrets");
        assert_eq!(ops[1].value, serde_json::json!([{ "name": "private-registry" }]));
    }

    #[test]
    fn init_containers_are_rewritten_too() {
        let pod = serde_json::json!({
            "spec": {
                "initContainers": [ { "name": "setup", "image": "busybox:1.36" } ],
                "containers": [ { "name": "app", "image": "nginx:1.25" } ]
            }
        });

        let ops = mutate(&test_state(), &pod).unwrap();
        assert_eq!(ops[0].path, "/spec/initContainers/0/image");
        assert_eq!(ops[1].path, "/spec/containers/0/image");
    }

    #[test]
    fn already_mutated_pod_is_left_alone() {
        let pod = serde_json::json!({
            "spec": {
                "imagePullSecrets": [ { "name": "private-registry" } ],
                "containers": [ {
                    "name": "nginx",
                    "image": "127.0.0.1:31999/library/nginx:1.25-zarf-3454826247"
                } ]
            }
        });

        let ops = mutate(&test_state(), &pod).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn ignore_label_skips_mutation() {
        let pod = serde_json::json!({
            "metadata": { "labels": { "zarf.dev/agent": "ignore" } },
            "spec": { "containers": [ { "name": "nginx", "image": "nginx:1.25" } ] }
        });

        let ops = mutate(&test_state(), &pod).unwrap();
        assert!(ops.is_empty());
    }

    #[test]
    fn containerless_pod_is_malformed() {
        let pod = serde_json::json!({
            "spec": { "containers": [ { "name": "no-image" } ] }
        });
        assert!(mutate(&test_state(), &pod).is_err());
    }
}
