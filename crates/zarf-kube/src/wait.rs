//! Generic wait-for facility
//!
//! Backs `wait` actions and internal readiness checks: poll a cluster
//! resource until a condition is met, or poll an HTTP/TCP endpoint until it
//! answers. Both honor a hard deadline and surface a timeout error naming
//! what was being waited on.

use std::time::Duration;

use kube::api::{Api, DynamicObject, ListParams};
use kube::core::GroupVersionKind;
use kube::discovery::Scope;
use kube::Client;

use zarf_core::schema::{WaitCluster, WaitNetwork};

use crate::error::{KubeError, Result};

/// Interval between poll attempts
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll a cluster resource until its condition is met
pub async fn wait_for_cluster(
    client: &Client,
    wait: &WaitCluster,
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let description = format!(
        "{} {} in {:?} to reach {:?}",
        wait.kind, wait.name, wait.namespace, wait.condition
    );

    let gvk = gvk_for_kind(&wait.kind);

    loop {
        if check_cluster_once(client, wait, &gvk).await.unwrap_or(false) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(KubeError::WaitTimeout(description));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn check_cluster_once(
    client: &Client,
    wait: &WaitCluster,
    gvk: &GroupVersionKind,
) -> Result<bool> {
    let discovery = kube::discovery::Discovery::new(client.clone())
        .filter(&[gvk.group.as_str()])
        .run()
        .await?;
    let (resource, capabilities) =
        discovery
            .resolve_gvk(gvk)
            .ok_or_else(|| KubeError::UnknownKind {
                group: gvk.group.clone(),
                version: gvk.version.clone(),
                kind: gvk.kind.clone(),
            })?;

    let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced {
        let namespace = if wait.namespace.is_empty() {
            "default"
        } else {
            &wait.namespace
        };
        Api::namespaced_with(client.clone(), namespace, &resource)
    } else {
        Api::all_with(client.clone(), &resource)
    };

    // `name` may be a label selector (key=value) instead of a literal name.
    let objects: Vec<DynamicObject> = if wait.name.contains('=') {
        api.list(&ListParams::default().labels(&wait.name))
            .await?
            .items
    } else {
        match api.get(&wait.name).await {
            Ok(o) => vec![o],
            Err(kube::Error::Api(e)) if e.code == 404 => vec![],
            Err(e) => return Err(e.into()),
        }
    };

    if objects.is_empty() {
        return Ok(false);
    }

    // With no condition, existence is enough.
    if wait.condition.is_empty() || wait.condition.eq_ignore_ascii_case("exists") {
        return Ok(true);
    }

    Ok(objects.iter().all(|o| object_meets_condition(o, &wait.condition)))
}

/// Check a status condition of the form `Ready`, `Available`, etc. against
/// the object's `status.conditions` list, or a `{.jsonpath}=value` pair
/// against an arbitrary status field.
fn object_meets_condition(object: &DynamicObject, condition: &str) -> bool {
    let status = object.data.get("status");

    if let Some((path, expected)) = condition.split_once('=') {
        let found = lookup_path(object, path.trim_matches(|c| c == '{' || c == '}'));
        return found.as_deref() == Some(expected);
    }

    let Some(conditions) = status
        .and_then(|s| s.get("conditions"))
        .and_then(|c| c.as_array())
    else {
        return false;
    };

    conditions.iter().any(|c| {
        c.get("type").and_then(|t| t.as_str()) == Some(condition)
            && c.get("status").and_then(|s| s.as_str()) == Some("True")
    })
}

fn lookup_path(object: &DynamicObject, path: &str) -> Option<String> {
    let mut current = serde_json::to_value(object).ok()?;
    for segment in path.trim_start_matches('.').split('.') {
        current = current.get(segment)?.clone();
    }
    match current {
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// Map short kinds to their canonical group/version
fn gvk_for_kind(kind: &str) -> GroupVersionKind {
    match kind.to_ascii_lowercase().as_str() {
        "pod" | "pods" => GroupVersionKind::gvk("", "v1", "Pod"),
        "service" | "svc" => GroupVersionKind::gvk("", "v1", "Service"),
        "secret" | "secrets" => GroupVersionKind::gvk("", "v1", "Secret"),
        "configmap" | "configmaps" => GroupVersionKind::gvk("", "v1", "ConfigMap"),
        "namespace" | "namespaces" => GroupVersionKind::gvk("", "v1", "Namespace"),
        "deployment" | "deployments" => GroupVersionKind::gvk("apps", "v1", "Deployment"),
        "statefulset" | "statefulsets" => GroupVersionKind::gvk("apps", "v1", "StatefulSet"),
        "daemonset" | "daemonsets" => GroupVersionKind::gvk("apps", "v1", "DaemonSet"),
        "job" | "jobs" => GroupVersionKind::gvk("batch", "v1", "Job"),
        // CRDs arrive as `plural.group` (e.g. gitrepositories.source.toolkit.fluxcd.io)
        other => match other.split_once('.') {
            Some((kind_part, group)) => GroupVersionKind::gvk(group, "v1", kind_part),
            None => GroupVersionKind::gvk("", "v1", kind),
        },
    }
}

/// Poll a network endpoint until it answers as expected
pub async fn wait_for_network(wait: &WaitNetwork, timeout: Duration) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let description = format!("{}://{}", wait.protocol, wait.address);

    loop {
        if check_network_once(wait).await {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(KubeError::WaitTimeout(description));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn check_network_once(wait: &WaitNetwork) -> bool {
    match wait.protocol.as_str() {
        "tcp" => tokio::net::TcpStream::connect(&wait.address).await.is_ok(),
        "http" | "https" => {
            let url = if wait.address.contains("://") {
                wait.address.clone()
            } else {
                format!("{}://{}", wait.protocol, wait.address)
            };
            match reqwest::get(&url).await {
                Ok(response) => match wait.code {
                    Some(code) => response.status().as_u16() == code,
                    None => response.status().is_success(),
                },
                Err(_) => false,
            }
        }
        _ => false,
    }
}
