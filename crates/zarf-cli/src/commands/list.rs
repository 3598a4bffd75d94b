//! `zarf package list`

use console::style;
use miette::{IntoDiagnostic, Result};

use zarf_kube::PackageStore;

use super::{require_cluster, store_for};

pub async fn run() -> Result<()> {
    let cluster = require_cluster().await?;
    let store = store_for(&cluster);

    let packages = store.list_packages().await.into_diagnostic()?;
    if packages.is_empty() {
        println!("No packages are deployed in this cluster");
        return Ok(());
    }

    println!(
        "{:<30} {:<12} {:<12} COMPONENTS",
        style("PACKAGE").bold(),
        style("VERSION").bold(),
        style("GENERATION").bold(),
    );
    for package in packages {
        let components: Vec<&str> = package
            .deployed_components
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        println!(
            "{:<30} {:<12} {:<12} {}",
            package.name,
            package
                .data
                .metadata
                .version
                .as_deref()
                .unwrap_or("-"),
            package.generation,
            components.join(", ")
        );
    }

    Ok(())
}
