//! `zarf package remove`

use console::style;
use miette::{miette, IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use zarf_packager::{RemoveOptions, Remover};

use crate::prompts;

use super::{helm, require_cluster, store_for};

pub async fn run(package: String, confirm: bool, components: Vec<String>) -> Result<()> {
    // The argument may be a deployed package name or an archive naming it.
    let package_name = if zarf_core::archive::is_archive_path(&package) {
        name_from_archive(&package).await?
    } else {
        package
    };

    if !prompts::confirm(
        &format!("Remove package {package_name:?} from the cluster?"),
        confirm,
    ) {
        return Err(miette!("remove declined"));
    }

    let cluster = require_cluster().await?;
    let store = store_for(&cluster);
    let helm = helm();

    let remover = Remover {
        store: &store,
        helm: &helm,
        cluster: Some(cluster.clone()),
        cancel: CancellationToken::new(),
    };

    remover
        .run(&RemoveOptions {
            package_name: package_name.clone(),
            components,
        })
        .await
        .into_diagnostic()?;

    println!(
        "{} Removed {}",
        style("✓").green().bold(),
        style(package_name).cyan()
    );
    Ok(())
}

async fn name_from_archive(path: &str) -> Result<String> {
    let staging = tempfile::Builder::new()
        .prefix("zarf-remove-")
        .tempdir()
        .into_diagnostic()?;
    let paths = zarf_core::layout::PackagePaths::new(staging.path());

    let mut source = zarf_fetch::new_source(path, None, false).into_diagnostic()?;
    let pkg = source
        .load_package_metadata(&paths, false)
        .await
        .into_diagnostic()?;
    Ok(pkg.metadata.name)
}
