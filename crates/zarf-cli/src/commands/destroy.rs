//! `zarf destroy`
//!
//! Removes every deployed package in reverse name order, then runs any
//! cleanup scripts the init package left under `/opt/zarf`.

use console::style;
use miette::{miette, IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use zarf_kube::PackageStore;
use zarf_packager::{RemoveOptions, Remover};

use super::{helm, require_cluster, store_for};

/// Directory the init package drops distro cleanup scripts into
const CLEANUP_SCRIPT_DIR: &str = "/opt/zarf";

pub async fn run(confirm: bool) -> Result<()> {
    if !confirm {
        return Err(miette!("destroy is destructive and requires --confirm"));
    }

    let cluster = require_cluster().await?;
    let store = store_for(&cluster);
    let helm = helm();

    let mut packages = store.list_packages().await.into_diagnostic()?;
    // Init goes last so the registry survives until its dependents are gone.
    packages.sort_by_key(|p| p.data.is_init_config());

    for package in packages {
        println!(
            "{} Removing package {}",
            style("→").blue().bold(),
            style(&package.name).cyan()
        );

        let remover = Remover {
            store: &store,
            helm: &helm,
            cluster: Some(cluster.clone()),
            cancel: CancellationToken::new(),
        };
        if let Err(e) = remover
            .run(&RemoveOptions {
                package_name: package.name.clone(),
                components: Vec::new(),
            })
            .await
        {
            tracing::warn!(package = %package.name, error = %e, "package removal failed, continuing");
        }
    }

    run_cleanup_scripts().await;

    println!("{} Cluster resources destroyed", style("✓").green().bold());
    Ok(())
}

/// Execute `zarf-clean-*.sh` scripts installed by the init package
async fn run_cleanup_scripts() {
    let Ok(entries) = std::fs::read_dir(CLEANUP_SCRIPT_DIR) else {
        return;
    };

    let mut scripts: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("zarf-clean-") && n.ends_with(".sh"))
        })
        .collect();
    scripts.sort();

    for script in scripts {
        tracing::info!(script = %script.display(), "running cleanup script");
        match tokio::process::Command::new("sh").arg(&script).output().await {
            Ok(output) if output.status.success() => {
                let _ = std::fs::remove_file(&script);
            }
            Ok(output) => {
                tracing::warn!(
                    script = %script.display(),
                    status = %output.status,
                    "cleanup script failed"
                );
            }
            Err(e) => {
                tracing::warn!(script = %script.display(), error = %e, "cleanup script failed to start");
            }
        }
    }
}
