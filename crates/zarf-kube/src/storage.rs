//! Cluster-side state storage
//!
//! Two secret families in the engine namespace: the singleton `zarf-state`
//! and one `zarf-package-<name>` record per deployed package. Both are
//! JSON-in-secret. The storage trait keeps the deployer and remover
//! testable without a live cluster; the in-memory driver mirrors the
//! secret driver's semantics.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams};

use zarf_core::state::{
    package_secret_name, DeployedPackage, PackageState, WebhookStatus, MANAGED_BY_LABEL,
    MANAGED_BY_VALUE, STATE_DATA_KEY, STATE_SECRET_NAME, ZARF_NAMESPACE,
};

use crate::cluster::{with_retries, Cluster};
use crate::error::{KubeError, Result};

/// Key inside a package secret's data holding the JSON record
const PACKAGE_DATA_KEY: &str = "data";

/// Label carrying the package name on package secrets
const PACKAGE_LABEL: &str = "zarf.dev/package";

/// Access to the engine's cluster-side records
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Read the singleton state record
    async fn load_state(&self) -> Result<PackageState>;

    /// Write the singleton state record
    async fn save_state(&self, state: &PackageState) -> Result<()>;

    /// Read one deployed-package record
    async fn get_package(&self, name: &str) -> Result<DeployedPackage>;

    /// List every deployed-package record
    async fn list_packages(&self) -> Result<Vec<DeployedPackage>>;

    /// Create or update a deployed-package record
    async fn save_package(&self, package: &DeployedPackage) -> Result<()>;

    /// Delete a deployed-package record
    async fn delete_package(&self, name: &str) -> Result<()>;
}

/// Secret-backed store against a live cluster
pub struct SecretStore {
    cluster: Cluster,
}

impl SecretStore {
    pub fn new(cluster: Cluster) -> Self {
        Self { cluster }
    }

    fn secrets(&self) -> Api<Secret> {
        Api::namespaced(self.cluster.client().clone(), ZARF_NAMESPACE)
    }

    fn labels(package_name: Option<&str>) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());
        if let Some(name) = package_name {
            labels.insert(PACKAGE_LABEL.to_string(), name.to_string());
        }
        labels
    }

    fn build_secret(name: &str, key: &str, payload: Vec<u8>, package: Option<&str>) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), ByteString(payload));

        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(ZARF_NAMESPACE.to_string()),
                labels: Some(Self::labels(package)),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    fn parse_secret<T: serde::de::DeserializeOwned>(secret: &Secret, key: &str) -> Result<T> {
        let data = secret
            .data
            .as_ref()
            .and_then(|d| d.get(key))
            .ok_or_else(|| {
                KubeError::State(format!(
                    "secret {:?} is missing its {key:?} entry",
                    secret.metadata.name.as_deref().unwrap_or_default()
                ))
            })?;
        Ok(serde_json::from_slice(&data.0)?)
    }

    async fn upsert(&self, secret: Secret) -> Result<()> {
        let api = self.secrets();
        let name = secret.metadata.name.clone().unwrap_or_default();

        with_retries("save secret", || {
            let api = api.clone();
            let secret = secret.clone();
            let name = name.clone();
            async move {
                match api.get(&name).await {
                    Ok(_) => {
                        api.replace(&name, &PostParams::default(), &secret).await?;
                    }
                    Err(kube::Error::Api(e)) if e.code == 404 => {
                        api.create(&PostParams::default(), &secret).await?;
                    }
                    Err(e) => return Err(e.into()),
                }
                Ok(())
            }
        })
        .await
    }
}

#[async_trait]
impl PackageStore for SecretStore {
    async fn load_state(&self) -> Result<PackageState> {
        let api = self.secrets();
        let secret = api
            .get(STATE_SECRET_NAME)
            .await
            .map_err(|e| match e {
                kube::Error::Api(ref resp) if resp.code == 404 => KubeError::State(
                    "cluster has no state secret; run `zarf init` first".to_string(),
                ),
                other => other.into(),
            })?;
        Self::parse_secret(&secret, STATE_DATA_KEY)
    }

    async fn save_state(&self, state: &PackageState) -> Result<()> {
        let payload = serde_json::to_vec(state)?;
        let secret = Self::build_secret(STATE_SECRET_NAME, STATE_DATA_KEY, payload, None);
        self.upsert(secret).await
    }

    async fn get_package(&self, name: &str) -> Result<DeployedPackage> {
        let api = self.secrets();
        match api.get(&package_secret_name(name)).await {
            Ok(secret) => Self::parse_secret(&secret, PACKAGE_DATA_KEY),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(KubeError::PackageNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_packages(&self) -> Result<Vec<DeployedPackage>> {
        let selector = format!("{MANAGED_BY_LABEL}={MANAGED_BY_VALUE},{PACKAGE_LABEL}");
        let params = ListParams::default().labels(&selector);
        let secrets = self.secrets().list(&params).await?;

        let mut packages: Vec<DeployedPackage> = secrets
            .items
            .iter()
            .filter_map(|s| Self::parse_secret(s, PACKAGE_DATA_KEY).ok())
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }

    async fn save_package(&self, package: &DeployedPackage) -> Result<()> {
        let payload = serde_json::to_vec(package)?;
        let secret = Self::build_secret(
            &package_secret_name(&package.name),
            PACKAGE_DATA_KEY,
            payload,
            Some(&package.name),
        );
        self.upsert(secret).await
    }

    async fn delete_package(&self, name: &str) -> Result<()> {
        let api = self.secrets();
        match api
            .delete(&package_secret_name(name), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store for tests
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<Option<PackageState>>>,
    packages: Arc<RwLock<HashMap<String, DeployedPackage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the state record
    pub fn with_state(state: PackageState) -> Self {
        let store = Self::new();
        *store.state.write().unwrap() = Some(state);
        store
    }

    /// Number of stored package records
    pub fn package_count(&self) -> usize {
        self.packages.read().unwrap().len()
    }
}

#[async_trait]
impl PackageStore for MemoryStore {
    async fn load_state(&self) -> Result<PackageState> {
        self.state
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| KubeError::State("cluster has no state secret".to_string()))
    }

    async fn save_state(&self, state: &PackageState) -> Result<()> {
        *self.state.write().unwrap() = Some(state.clone());
        Ok(())
    }

    async fn get_package(&self, name: &str) -> Result<DeployedPackage> {
        self.packages
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| KubeError::PackageNotFound {
                name: name.to_string(),
            })
    }

    async fn list_packages(&self) -> Result<Vec<DeployedPackage>> {
        let mut packages: Vec<DeployedPackage> =
            self.packages.read().unwrap().values().cloned().collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(packages)
    }

    async fn save_package(&self, package: &DeployedPackage) -> Result<()> {
        self.packages
            .write()
            .unwrap()
            .insert(package.name.clone(), package.clone());
        Ok(())
    }

    async fn delete_package(&self, name: &str) -> Result<()> {
        self.packages.write().unwrap().remove(name);
        Ok(())
    }
}

/// Poll the deployed-package record until no webhook for the component is
/// still `Running`, up to `cap`.
pub async fn wait_for_webhooks(
    store: &dyn PackageStore,
    package_name: &str,
    component_name: &str,
    cap: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + cap;
    let poll = Duration::from_secs(1);

    loop {
        let package = store.get_package(package_name).await?;

        let running: Vec<String> = package
            .component_webhooks
            .get(component_name)
            .map(|hooks| {
                hooks
                    .values()
                    .filter(|w| w.status == WebhookStatus::Running)
                    .map(|w| w.name.clone())
                    .collect()
            })
            .unwrap_or_default();

        if running.is_empty() {
            return Ok(());
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(KubeError::WebhookTimeout {
                webhook: running.join(", "),
                component: component_name.to_string(),
            });
        }

        tracing::debug!(
            component = component_name,
            webhooks = ?running,
            "waiting for component webhooks"
        );
        tokio::time::sleep(poll).await;
    }
}

/// Apply a docker-config pull secret for the in-cluster registry to a
/// namespace, shaped exactly like `kubectl create secret docker-registry`.
pub fn registry_pull_secret(state: &PackageState, namespace: &str) -> Result<Secret> {
    use base64::Engine;

    let auth = base64::engine::general_purpose::STANDARD.encode(format!(
        "{}:{}",
        state.registry_info.pull_username, state.registry_info.pull_password
    ));

    let mut auths = serde_json::Map::new();
    auths.insert(
        state.registry_info.address.clone(),
        serde_json::json!({ "auth": auth }),
    );
    let docker_config = serde_json::json!({ "auths": auths });

    let mut data = BTreeMap::new();
    data.insert(
        ".dockerconfigjson".to_string(),
        ByteString(serde_json::to_vec(&docker_config)?),
    );

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(zarf_core::state::REGISTRY_PULL_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(SecretStore::labels(None)),
            ..Default::default()
        },
        type_: Some("kubernetes.io/dockerconfigjson".to_string()),
        data: Some(data),
        ..Default::default()
    })
}

/// Push the registry pull secret into a namespace
pub async fn apply_registry_pull_secret(
    cluster: &Cluster,
    state: &PackageState,
    namespace: &str,
) -> Result<()> {
    let secret = registry_pull_secret(state, namespace)?;
    let api: Api<Secret> = Api::namespaced(cluster.client().clone(), namespace);
    api.patch(
        zarf_core::state::REGISTRY_PULL_SECRET_NAME,
        &PatchParams::apply("zarf").force(),
        &Patch::Apply(&secret),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zarf_core::state::{RegistryInfo, Webhook};

    #[tokio::test]
    async fn memory_store_roundtrip() {
        let store = MemoryStore::new();

        assert!(store.load_state().await.is_err());
        store.save_state(&PackageState::default()).await.unwrap();
        store.load_state().await.unwrap();

        let package = DeployedPackage {
            name: "demo".to_string(),
            generation: 1,
            ..Default::default()
        };
        store.save_package(&package).await.unwrap();
        assert_eq!(store.get_package("demo").await.unwrap().generation, 1);
        assert_eq!(store.list_packages().await.unwrap().len(), 1);

        store.delete_package("demo").await.unwrap();
        assert!(matches!(
            store.get_package("demo").await,
            Err(KubeError::PackageNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn webhook_wait_returns_once_finished() {
        let store = MemoryStore::new();
        let mut package = DeployedPackage {
            name: "demo".to_string(),
            ..Default::default()
        };
        package.component_webhooks.insert(
            "baseline".to_string(),
            BTreeMap::from([(
                "test-webhook".to_string(),
                Webhook {
                    name: "test-webhook".to_string(),
                    status: WebhookStatus::Succeeded,
                    ..Default::default()
                },
            )]),
        );
        store.save_package(&package).await.unwrap();

        wait_for_webhooks(&store, "demo", "baseline", Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn webhook_wait_times_out_while_running() {
        let store = MemoryStore::new();
        let mut package = DeployedPackage {
            name: "demo".to_string(),
            ..Default::default()
        };
        package.component_webhooks.insert(
            "baseline".to_string(),
            BTreeMap::from([(
                "slow-webhook".to_string(),
                Webhook {
                    name: "slow-webhook".to_string(),
                    status: WebhookStatus::Running,
                    ..Default::default()
                },
            )]),
        );
        store.save_package(&package).await.unwrap();

        let err = wait_for_webhooks(&store, "demo", "baseline", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::WebhookTimeout { .. }));
    }

    #[test]
    fn pull_secret_shape() {
        let state = PackageState {
            registry_info: RegistryInfo {
                address: "127.0.0.1:31999".to_string(),
                pull_username: "zarf-pull".to_string(),
                pull_password: "p".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        let secret = registry_pull_secret(&state, "default").unwrap();
        assert_eq!(
            secret.type_.as_deref(),
            Some("kubernetes.io/dockerconfigjson")
        );

        let data = secret.data.unwrap();
        let config: serde_json::Value =
            serde_json::from_slice(&data[".dockerconfigjson"].0).unwrap();
        // base64("zarf-pull:p")
        assert_eq!(
            config["auths"]["127.0.0.1:31999"]["auth"],
            "emFyZi1wdWxsOnA="
        );
    }
}
