//! Data injection into running pods
//!
//! Streams a component's staged data tar into the target container once its
//! pod is Ready, then drops a completion marker so in-pod init logic can
//! detect the hand-off. One injection maps to one task; the deployer joins
//! all of a component's injections before moving on.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio::io::AsyncWriteExt;
use kube::api::{Api, AttachParams, ListParams};

use zarf_core::schema::{DataInjection, WaitCluster};

use crate::cluster::Cluster;
use crate::error::{KubeError, Result};
use crate::wait;

/// Marker file written into the target path after a successful injection
pub const INJECTION_MARKER: &str = zarf_core::template::DATA_INJECTION_MARKER_FILE;

/// Run one data injection to completion
pub async fn inject(
    cluster: &Cluster,
    injection: &DataInjection,
    tar_path: &Path,
    timeout: Duration,
) -> Result<()> {
    let target = &injection.target;
    tracing::info!(
        namespace = %target.namespace,
        selector = %target.selector,
        path = %target.path,
        "running data injection"
    );

    // The injection only starts once the target pod reports Ready.
    wait::wait_for_cluster(
        cluster.client(),
        &WaitCluster {
            kind: "pod".to_string(),
            name: target.selector.clone(),
            namespace: target.namespace.clone(),
            condition: "Ready".to_string(),
        },
        timeout,
    )
    .await?;

    let pods: Api<Pod> = Api::namespaced(cluster.client().clone(), &target.namespace);
    let matching = pods
        .list(&ListParams::default().labels(&target.selector))
        .await?;

    if matching.items.is_empty() {
        return Err(KubeError::WaitTimeout(format!(
            "pods matching {:?} in {:?}",
            target.selector, target.namespace
        )));
    }

    let data = std::fs::read(tar_path)?;

    for pod in &matching.items {
        let Some(pod_name) = pod.metadata.name.as_deref() else {
            continue;
        };
        stream_tar_into_pod(&pods, pod_name, injection, &data).await?;
        touch_marker(&pods, pod_name, injection).await?;
    }

    Ok(())
}

async fn stream_tar_into_pod(
    pods: &Api<Pod>,
    pod_name: &str,
    injection: &DataInjection,
    data: &[u8],
) -> Result<()> {
    let target = &injection.target;
    tracing::debug!(pod = pod_name, bytes = data.len(), "streaming data into pod");

    let mut params = AttachParams::default().stdin(true).stderr(true);
    if !target.container.is_empty() {
        params = params.container(&target.container);
    }

    let mut command = vec!["tar", "-xf", "-", "-C", &target.path];
    if injection.compress {
        command = vec!["tar", "-xzf", "-", "-C", &target.path];
    }

    let mut process = pods.exec(pod_name, command, &params).await?;

    let mut stdin = process
        .stdin()
        .ok_or_else(|| KubeError::Manifest("exec stream has no stdin".to_string()))?;
    stdin.write_all(data).await.map_err(KubeError::Io)?;
    stdin.flush().await.map_err(KubeError::Io)?;
    drop(stdin);

    process
        .join()
        .await
        .map_err(|e| KubeError::Manifest(format!("tar stream into {pod_name} failed: {e}")))?;
    Ok(())
}

async fn touch_marker(pods: &Api<Pod>, pod_name: &str, injection: &DataInjection) -> Result<()> {
    let target = &injection.target;
    let marker = format!("{}/{INJECTION_MARKER}", target.path.trim_end_matches('/'));

    let mut params = AttachParams::default().stderr(true);
    if !target.container.is_empty() {
        params = params.container(&target.container);
    }

    let mut process = pods
        .exec(pod_name, vec!["touch", marker.as_str()], &params)
        .await?;
    process
        .join()
        .await
        .map_err(|e| KubeError::Manifest(format!("marker write in {pod_name} failed: {e}")))?;
    Ok(())
}
