//! Cluster-side state records
//!
//! Two secret families live in the `zarf` namespace: the singleton
//! `zarf-state` carrying credentials and topology of the in-cluster
//! services, and one `zarf-package-<name>` record per deployed package.
//! Both serialize as JSON inside their secret's data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::{ConnectString, Package};

/// Namespace all engine-owned secrets live in
pub const ZARF_NAMESPACE: &str = "zarf";

/// Name of the singleton state secret
pub const STATE_SECRET_NAME: &str = "zarf-state";

/// Key inside the state secret's data holding the JSON state
pub const STATE_DATA_KEY: &str = "state";

/// Label applied to every engine-owned secret
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label
pub const MANAGED_BY_VALUE: &str = "zarf";

/// Name of the docker-config pull secret distributed to namespaces
pub const REGISTRY_PULL_SECRET_NAME: &str = "private-registry";

/// Name of the git credentials secret referenced by mutated repositories
pub const GIT_SERVER_SECRET_NAME: &str = "private-git-server";

/// Secret name for a deployed package record
pub fn package_secret_name(package_name: &str) -> String {
    format!("zarf-package-{package_name}")
}

/// The singleton cluster state record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageState {
    /// Set when the tool also installed the cluster it deployed to
    #[serde(default)]
    pub zarf_appliance: bool,

    /// Detected distribution (k3s, k3d, kind, docker-desktop, microk8s, ...)
    #[serde(default)]
    pub distro: String,

    /// Node architecture of the cluster
    #[serde(default)]
    pub architecture: String,

    /// Default storage class used for variable templating
    #[serde(default)]
    pub storage_class: String,

    /// Cluster-wide generated secret material
    #[serde(default)]
    pub secret: String,

    #[serde(default)]
    pub registry_info: RegistryInfo,

    #[serde(default)]
    pub git_server: GitServerInfo,

    #[serde(default)]
    pub artifact_server: ArtifactServerInfo,

    /// TLS material for the admission webhook
    #[serde(default)]
    pub agent_tls: GeneratedPki,
}

/// In-cluster (or external) registry descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInfo {
    #[serde(default)]
    pub push_username: String,

    #[serde(default)]
    pub push_password: String,

    #[serde(default)]
    pub pull_username: String,

    #[serde(default)]
    pub pull_password: String,

    /// host:port the registry is reachable at from inside the cluster
    #[serde(default)]
    pub address: String,

    /// NodePort the internal registry is exposed on
    #[serde(default)]
    pub node_port: u16,

    /// False when the user supplied an external registry at init time
    #[serde(default)]
    pub internal_registry: bool,

    /// Seed secret for the internal registry's htpasswd file
    #[serde(default)]
    pub secret: String,
}

/// In-cluster (or external) git server descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitServerInfo {
    #[serde(default)]
    pub push_username: String,

    #[serde(default)]
    pub push_password: String,

    #[serde(default)]
    pub pull_username: String,

    #[serde(default)]
    pub pull_password: String,

    /// Base URL of the git server
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub internal_server: bool,
}

/// In-cluster (or external) artifact server descriptor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactServerInfo {
    #[serde(default)]
    pub push_username: String,

    #[serde(default)]
    pub push_token: String,

    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub internal_server: bool,
}

/// PKI material generated for the agent webhook
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPki {
    #[serde(default)]
    pub ca: String,

    #[serde(default)]
    pub cert: String,

    #[serde(default)]
    pub key: String,
}

/// One record per deployed package, stored as `zarf-package-<name>`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedPackage {
    pub name: String,

    /// Full package manifest as deployed
    pub data: Package,

    #[serde(default)]
    pub cli_version: String,

    #[serde(default)]
    pub deployed_components: Vec<DeployedComponent>,

    /// Named port-forward shortcuts contributed by charts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connect_strings: BTreeMap<String, ConnectString>,

    /// Monotonically non-decreasing; a redeploy bumps it
    #[serde(default)]
    pub generation: u64,

    /// Webhook progress keyed by component name, then webhook name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub component_webhooks: BTreeMap<String, BTreeMap<String, Webhook>>,
}

impl DeployedPackage {
    /// Find a deployed component by name
    pub fn component(&self, name: &str) -> Option<&DeployedComponent> {
        self.deployed_components.iter().find(|c| c.name == name)
    }
}

/// Deploy record for one component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedComponent {
    pub name: String,

    #[serde(default)]
    pub installed_charts: Vec<InstalledChart>,

    #[serde(default)]
    pub status: ComponentStatus,

    /// Generation of the package deploy that produced this record
    #[serde(default)]
    pub observed_generation: u64,
}

/// A chart installed by a component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledChart {
    pub namespace: String,
    pub chart_name: String,
}

/// Lifecycle status persisted per component
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentStatus {
    #[default]
    Deploying,
    Succeeded,
    Failed,
    Removing,
}

/// An external webhook observing component deployments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub name: String,

    #[serde(default)]
    pub status: WebhookStatus,

    /// How long the deployer should wait for this webhook
    #[serde(default)]
    pub wait_duration_seconds: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<u64>,
}

/// Webhook execution state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookStatus {
    #[default]
    Running,
    Succeeded,
    Failed,
    Removing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_secret_name_format() {
        assert_eq!(package_secret_name("big-bang"), "zarf-package-big-bang");
    }

    #[test]
    fn state_json_roundtrip() {
        let state = PackageState {
            distro: "k3s".to_string(),
            registry_info: RegistryInfo {
                address: "127.0.0.1:31999".to_string(),
                pull_username: "zarf-pull".to_string(),
                pull_password: "p".to_string(),
                internal_registry: true,
                node_port: 31999,
                ..Default::default()
            },
            ..Default::default()
        };

        let json = serde_json::to_string(&state).unwrap();
        let back: PackageState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.registry_info.address, "127.0.0.1:31999");
        assert!(back.registry_info.internal_registry);
    }

    #[test]
    fn webhook_status_serializes_as_pascal_case() {
        let json = serde_json::to_string(&WebhookStatus::Running).unwrap();
        assert_eq!(json, "\"Running\"");
    }
}
