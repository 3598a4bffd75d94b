//! `zarf package create`

use std::collections::BTreeMap;
use std::path::PathBuf;

use console::style;
use miette::{IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use zarf_packager::CreateOptions;

use crate::config::Config;
use crate::prompts;

/// Resolve flags and config-layer defaults into create options
#[allow(clippy::too_many_arguments)]
pub fn options(
    config: &Config,
    base_dir: PathBuf,
    output: Option<PathBuf>,
    confirm: bool,
    set: BTreeMap<String, String>,
    architecture: Option<String>,
    signing_key: Option<PathBuf>,
    signing_key_pass: Option<String>,
    differential: Option<String>,
    max_package_size: u64,
    skip_sbom: bool,
    insecure: bool,
) -> CreateOptions {
    let mut opts = CreateOptions::new(base_dir);
    opts.output_dir = output
        .or_else(|| config.get("package.create.output").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    opts.confirm = confirm;
    opts.set_variables = set;
    opts.architecture = architecture.or_else(|| config.get("architecture"));
    opts.signing_key = signing_key;
    opts.signing_key_password = signing_key_pass;
    opts.differential_base = differential;
    opts.max_package_size_mb = max_package_size;
    opts.skip_sbom = skip_sbom;
    opts.insecure = insecure;
    opts
}

pub async fn run(opts: CreateOptions) -> Result<()> {
    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let confirm_flag = opts.confirm;
    let archive = zarf_packager::create(
        &opts,
        cancel,
        &mut |key| {
            prompts::package_template(key)
                .map_err(|e| zarf_packager::PackagerError::action("template prompt", e.to_string()))
        },
        &mut |pkg, warnings| {
            for warning in warnings {
                println!("{} {warning}", style("!").yellow().bold());
            }
            println!(
                "{} Creating package {} with {} component(s)",
                style("→").blue().bold(),
                style(&pkg.metadata.name).cyan(),
                pkg.components.len()
            );
            prompts::confirm("Create this package?", confirm_flag)
        },
    )
    .await
    .into_diagnostic()?;

    println!(
        "{} Package created at {}",
        style("✓").green().bold(),
        style(archive.display()).cyan()
    );
    Ok(())
}

/// Flip the cancellation token on ctrl-c so in-flight work can run its
/// onFailure actions before the process exits.
pub(crate) fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}
