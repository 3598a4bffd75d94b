//! `zarf package publish`

use std::path::PathBuf;

use console::style;
use miette::{miette, IntoDiagnostic, Result};

use zarf_core::layout::PackagePaths;
use zarf_fetch::OciRemote;

pub async fn run(package: PathBuf, registry: String, insecure: bool) -> Result<()> {
    let staging = tempfile::Builder::new()
        .prefix("zarf-publish-")
        .tempdir()
        .into_diagnostic()?;
    let paths = PackagePaths::new(staging.path());

    let location = package
        .to_str()
        .ok_or_else(|| miette!("non-utf8 package path"))?;
    let mut source = zarf_fetch::new_source(location, None, insecure).into_diagnostic()?;
    let pkg = source.load_package(&paths, &[]).await.into_diagnostic()?;

    let reference = format!(
        "{}/{}:{}",
        registry.trim_end_matches('/'),
        pkg.metadata.name,
        pkg.metadata.version.as_deref().unwrap_or("latest"),
    );
    let reference = if reference.starts_with("oci://") {
        reference
    } else {
        format!("oci://{reference}")
    };

    println!(
        "{} Publishing {} to {}",
        style("→").blue().bold(),
        style(&pkg.metadata.name).cyan(),
        style(&reference).cyan()
    );

    let mut remote = OciRemote::new(&reference, insecure).into_diagnostic()?;
    remote.publish(&paths, &pkg).await.into_diagnostic()?;

    println!("{} Published {}", style("✓").green().bold(), reference);
    Ok(())
}
