//! Command implementations

pub mod agent;
pub mod create;
pub mod deploy;
pub mod destroy;
pub mod init;
pub mod inspect;
pub mod list;
pub mod publish;
pub mod pull;
pub mod remove;

use miette::{miette, Result};

use zarf_kube::{helm::HelmCli, Cluster, SecretStore};

/// Connect to the ambient cluster, or explain why that is required
pub(crate) async fn require_cluster() -> Result<Cluster> {
    Cluster::connect()
        .await
        .map_err(|e| miette!("unable to reach a Kubernetes cluster: {e}"))
}

/// Best-effort cluster connection for operations that may not need one
pub(crate) async fn try_cluster() -> Option<Cluster> {
    match Cluster::connect().await {
        Ok(cluster) => Some(cluster),
        Err(e) => {
            tracing::debug!(error = %e, "no cluster connection available");
            None
        }
    }
}

/// The secret-backed store for a connected cluster
pub(crate) fn store_for(cluster: &Cluster) -> SecretStore {
    SecretStore::new(cluster.clone())
}

/// The bundled (or PATH) helm driver
pub(crate) fn helm() -> HelmCli {
    HelmCli::new(zarf_kube::helm::find_helm_executable())
}
