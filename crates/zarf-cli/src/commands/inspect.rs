//! `zarf package inspect`

use std::path::PathBuf;

use console::style;
use miette::{IntoDiagnostic, Result};

use zarf_core::layout::PackagePaths;

pub async fn run(package: String, sbom_out: Option<PathBuf>, insecure: bool) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix("zarf-inspect-")
        .tempdir()
        .into_diagnostic()?;
    let paths = PackagePaths::new(staging.path());

    let want_sbom = sbom_out.is_some();
    let mut source = zarf_fetch::new_source(&package, None, insecure).into_diagnostic()?;
    let pkg = source
        .load_package_metadata(&paths, want_sbom)
        .await
        .into_diagnostic()?;

    // The definition prints exactly as stored.
    let definition = std::fs::read_to_string(paths.zarf_yaml()).into_diagnostic()?;
    println!("{definition}");

    if let Some(out) = sbom_out {
        let sboms = paths.sboms_tar();
        if sboms.is_file() {
            let dest = out.join(&pkg.metadata.name);
            zarf_core::archive::extract(&sboms, &dest).into_diagnostic()?;
            println!(
                "{} SBOMs extracted to {}",
                style("✓").green().bold(),
                style(dest.display()).cyan()
            );
        } else {
            println!("{} Package carries no SBOMs", style("!").yellow().bold());
        }
    }

    Ok(())
}
