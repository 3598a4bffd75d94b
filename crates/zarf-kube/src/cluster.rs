//! Cluster connection wrapper
//!
//! Owns the kube client, the engine namespace, and the transient-error
//! retry policy every cluster call goes through.

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, PostParams};
use kube::Client;

use zarf_core::state::ZARF_NAMESPACE;

use crate::error::{KubeError, Result};

/// Attempts made for transient API failures
const TRANSIENT_RETRIES: u32 = 3;

/// Pause between transient retries
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// A connected cluster
#[derive(Clone)]
pub struct Cluster {
    client: Client,
}

impl Cluster {
    /// Connect using the ambient kubeconfig
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Wrap an existing client (tests, custom configs)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Ensure the engine namespace exists
    pub async fn ensure_namespace(&self) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());

        match api.get(ZARF_NAMESPACE).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                let namespace = Namespace {
                    metadata: kube::core::ObjectMeta {
                        name: Some(ZARF_NAMESPACE.to_string()),
                        labels: Some(
                            [(
                                zarf_core::state::MANAGED_BY_LABEL.to_string(),
                                zarf_core::state::MANAGED_BY_VALUE.to_string(),
                            )]
                            .into(),
                        ),
                        ..Default::default()
                    },
                    ..Default::default()
                };
                api.create(&PostParams::default(), &namespace).await?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Run a cluster operation, retrying transient failures a bounded number
/// of times. Forbidden and post-retry Conflict surface immediately.
pub async fn with_retries<T, F, Fut>(description: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < TRANSIENT_RETRIES => {
                attempt += 1;
                tracing::warn!(
                    %description,
                    attempt,
                    error = %e,
                    "transient cluster error, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient_error() -> KubeError {
        KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "service unavailable".to_string(),
            reason: "ServiceUnavailable".to_string(),
            code: 503,
        }))
    }

    fn forbidden_error() -> KubeError {
        KubeError::Api(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        }))
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(transient_error())
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn forbidden_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(forbidden_error()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_classification() {
        assert!(transient_error().is_transient());
        assert!(!forbidden_error().is_transient());
    }
}
