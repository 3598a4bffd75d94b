//! `zarf init`
//!
//! Locates the init package for this architecture and version, offers to
//! download it when absent, and deploys it to bootstrap the in-cluster
//! registry, git server and state secret.

use std::path::PathBuf;

use console::style;
use miette::{miette, IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use zarf_core::layout::PackagePaths;
use zarf_packager::{DeployOptions, Deployer};

use crate::config::Config;
use crate::prompts;

use super::{helm, require_cluster, store_for};

/// Upstream location init packages are released to
const INIT_RELEASE_BASE: &str =
    "https://github.com/airgap-packaging/zarf-rs/releases/download";

fn init_package_name(arch: &str) -> String {
    format!(
        "zarf-init-{arch}-v{}.tar.zst",
        env!("CARGO_PKG_VERSION")
    )
}

/// Search order: working directory, executable directory, cache
fn find_init_package(name: &str) -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from(name)];

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(name));
        }
    }
    candidates.push(zarf_packager::create::cache_dir().join(name));

    candidates.into_iter().find(|p| p.is_file())
}

pub async fn run(
    config: &Config,
    confirm: bool,
    components: Vec<String>,
    insecure: bool,
) -> Result<()> {
    let arch = config.get("architecture").unwrap_or_else(|| {
        match std::env::consts::ARCH {
            "x86_64" => "amd64".to_string(),
            "aarch64" => "arm64".to_string(),
            other => other.to_string(),
        }
    });

    let name = init_package_name(&arch);
    let package_path = match find_init_package(&name) {
        Some(path) => path,
        None => {
            let url = format!(
                "{INIT_RELEASE_BASE}/v{}/{name}",
                env!("CARGO_PKG_VERSION")
            );
            if !prompts::confirm(
                &format!("Init package not found locally. Download {url}?"),
                confirm,
            ) {
                return Err(miette!(
                    "no init package; place {name} next to the binary or rerun with download confirmation"
                ));
            }

            let dest = zarf_packager::create::cache_dir().join(&name);
            let client = reqwest::Client::new();
            zarf_fetch::http::download_file(&client, &url, &dest, None)
                .await
                .into_diagnostic()?;
            dest
        }
    };

    println!(
        "{} Initializing cluster with {}",
        style("→").blue().bold(),
        style(package_path.display()).cyan()
    );

    let cluster = require_cluster().await?;
    cluster.ensure_namespace().await.into_diagnostic()?;
    let store = store_for(&cluster);
    let helm = helm();

    let staging = tempfile::Builder::new()
        .prefix("zarf-init-")
        .tempdir()
        .into_diagnostic()?;
    let paths = PackagePaths::new(staging.path());

    let mut source = zarf_fetch::new_source(
        package_path.to_str().ok_or_else(|| miette!("non-utf8 package path"))?,
        None,
        insecure,
    )
    .into_diagnostic()?;
    let pkg = source.load_package(&paths, &components).await.into_diagnostic()?;

    if !pkg.is_init_config() {
        return Err(miette!("{} is not an init package", package_path.display()));
    }

    let mut opts = DeployOptions::new(package_path.to_string_lossy().to_string());
    opts.confirm = confirm;
    opts.components = components;
    opts.insecure = insecure;

    let deployer = Deployer {
        store: &store,
        helm: &helm,
        cluster: Some(cluster.clone()),
        cancel: CancellationToken::new(),
        opts,
    };

    deployer
        .deploy_loaded(pkg, &paths, &mut |v| {
            prompts::variable(v).map_err(|e| {
                zarf_packager::PackagerError::action("variable prompt", e.to_string())
            })
        })
        .await
        .into_diagnostic()?;

    println!("{} Cluster initialized", style("✓").green().bold());
    Ok(())
}
