//! `zarf package pull`

use std::path::PathBuf;

use console::style;
use miette::{miette, IntoDiagnostic, Result};

use zarf_core::layout::PackagePaths;

pub async fn run(reference: String, output: PathBuf, insecure: bool) -> Result<()> {
    if !reference.starts_with("oci://") {
        return Err(miette!("pull requires an oci:// reference"));
    }

    let staging = tempfile::Builder::new()
        .prefix("zarf-pull-")
        .tempdir()
        .into_diagnostic()?;
    let paths = PackagePaths::new(staging.path());

    let mut source = zarf_fetch::new_source(&reference, None, insecure).into_diagnostic()?;
    let pkg = source.load_package(&paths, &[]).await.into_diagnostic()?;

    let arch = pkg
        .metadata
        .architecture
        .clone()
        .unwrap_or_else(|| "amd64".to_string());
    let archive_name = zarf_packager::create::archive_name(&pkg, &arch);

    std::fs::create_dir_all(&output).into_diagnostic()?;
    let archive_path = output.join(archive_name);
    if pkg.metadata.uncompressed {
        zarf_core::archive::tar_directory(paths.base(), &archive_path).into_diagnostic()?;
    } else {
        zarf_core::archive::tar_zst_directory(paths.base(), &archive_path).into_diagnostic()?;
    }

    println!(
        "{} Pulled {} to {}",
        style("✓").green().bold(),
        style(&reference).cyan(),
        style(archive_path.display()).cyan()
    );
    Ok(())
}
