//! Chart lifecycle driver
//!
//! Chart installs and uninstalls delegate to the bundled `helm` executable;
//! the engine only owns release naming, values wiring and upgrade-vs-install
//! selection. The trait seam keeps the component state machine testable
//! without a cluster or a helm binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{KubeError, Result};

/// One chart operation's inputs
#[derive(Debug, Clone)]
pub struct ChartInstall {
    /// Path to the `.tgz` chart tarball inside the extracted component
    pub chart_tarball: PathBuf,
    pub release_name: String,
    pub namespace: String,
    /// Templated values files, in declaration order
    pub values_files: Vec<PathBuf>,
    /// Wait for the release's resources to become ready
    pub wait: bool,
    pub timeout: Duration,
}

/// Drives chart installs and uninstalls
#[async_trait]
pub trait HelmClient: Send + Sync {
    /// Install the release, or upgrade it when it already exists
    async fn install_or_upgrade(&self, install: &ChartInstall) -> Result<()>;

    /// Uninstall a release. "release not found" is not an error here; the
    /// caller logs it and moves on.
    async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<bool>;
}

/// Shells out to the bundled `helm` executable
pub struct HelmCli {
    executable: PathBuf,
}

impl HelmCli {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    async fn run(&self, args: &[String]) -> Result<(bool, String)> {
        tracing::debug!(helm = %self.executable.display(), ?args, "invoking helm");

        let output = tokio::process::Command::new(&self.executable)
            .args(args)
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Ok((output.status.success(), stderr))
    }
}

#[async_trait]
impl HelmClient for HelmCli {
    async fn install_or_upgrade(&self, install: &ChartInstall) -> Result<()> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            install.release_name.clone(),
            install.chart_tarball.to_string_lossy().to_string(),
            "--namespace".to_string(),
            install.namespace.clone(),
            "--create-namespace".to_string(),
            "--timeout".to_string(),
            format!("{}s", install.timeout.as_secs()),
        ];
        if install.wait {
            args.push("--wait".to_string());
        }
        for values in &install.values_files {
            args.push("--values".to_string());
            args.push(values.to_string_lossy().to_string());
        }

        let (ok, stderr) = self.run(&args).await?;
        if !ok {
            return Err(KubeError::Helm {
                operation: "upgrade".to_string(),
                release: install.release_name.clone(),
                message: stderr,
            });
        }
        Ok(())
    }

    async fn uninstall(&self, release_name: &str, namespace: &str) -> Result<bool> {
        let args = vec![
            "uninstall".to_string(),
            release_name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];

        let (ok, stderr) = self.run(&args).await?;
        if ok {
            return Ok(true);
        }
        if stderr.contains("release: not found") || stderr.contains("not found") {
            tracing::warn!(release = release_name, "release not found, nothing to uninstall");
            return Ok(false);
        }
        Err(KubeError::Helm {
            operation: "uninstall".to_string(),
            release: release_name.to_string(),
            message: stderr,
        })
    }
}

/// Records operations instead of performing them; used by state-machine
/// tests.
#[derive(Default)]
pub struct MockHelm {
    pub operations: std::sync::Mutex<Vec<String>>,
    /// Release names whose install should fail
    pub fail_installs: Vec<String>,
}

impl MockHelm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<String> {
        self.operations.lock().unwrap().clone()
    }
}

#[async_trait]
impl HelmClient for MockHelm {
    async fn install_or_upgrade(&self, install: &ChartInstall) -> Result<()> {
        self.operations
            .lock()
            .unwrap()
            .push(format!("install {}", install.release_name));
        if self.fail_installs.contains(&install.release_name) {
            return Err(KubeError::Helm {
                operation: "upgrade".to_string(),
                release: install.release_name.clone(),
                message: "mock failure".to_string(),
            });
        }
        Ok(())
    }

    async fn uninstall(&self, release_name: &str, _namespace: &str) -> Result<bool> {
        self.operations
            .lock()
            .unwrap()
            .push(format!("uninstall {release_name}"));
        Ok(true)
    }
}

/// Locate the bundled helm executable next to the engine binary, falling
/// back to whatever `helm` is on PATH.
pub fn find_helm_executable() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let bundled = dir.join("helm");
            if bundled.is_file() {
                return bundled;
            }
        }
    }
    Path::new("helm").to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_records_operations_in_order() {
        let helm = MockHelm::new();
        helm.install_or_upgrade(&ChartInstall {
            chart_tarball: PathBuf::from("chart.tgz"),
            release_name: "podinfo".to_string(),
            namespace: "default".to_string(),
            values_files: vec![],
            wait: true,
            timeout: Duration::from_secs(300),
        })
        .await
        .unwrap();
        helm.uninstall("podinfo", "default").await.unwrap();

        assert_eq!(helm.recorded(), vec!["install podinfo", "uninstall podinfo"]);
    }

    #[tokio::test]
    async fn mock_failure_propagates() {
        let helm = MockHelm {
            fail_installs: vec!["broken".to_string()],
            ..Default::default()
        };

        let err = helm
            .install_or_upgrade(&ChartInstall {
                chart_tarball: PathBuf::from("chart.tgz"),
                release_name: "broken".to_string(),
                namespace: "default".to_string(),
                values_files: vec![],
                wait: false,
                timeout: Duration::from_secs(300),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KubeError::Helm { .. }));
    }
}
