//! `zarf package deploy`

use std::collections::BTreeMap;
use std::path::PathBuf;

use console::style;
use miette::{IntoDiagnostic, Result};
use tokio_util::sync::CancellationToken;

use zarf_core::layout::PackagePaths;
use zarf_kube::MemoryStore;
use zarf_packager::{DeployOptions, Deployer};

use crate::prompts;

use super::{helm, store_for, try_cluster};

pub async fn run(
    package: String,
    confirm: bool,
    components: Vec<String>,
    set: BTreeMap<String, String>,
    shasum: Option<String>,
    key: Option<PathBuf>,
    insecure: bool,
) -> Result<()> {
    let cancel = CancellationToken::new();
    super::create::spawn_interrupt_handler(cancel.clone());

    let mut opts = DeployOptions::new(&package);
    opts.confirm = confirm;
    opts.components = components;
    opts.set_variables = set;
    opts.shasum = shasum;
    opts.insecure = insecure;

    // Load first so signature verification and the confirmation can see the
    // definition before anything touches the cluster.
    let staging = tempfile::Builder::new()
        .prefix("zarf-deploy-")
        .tempdir()
        .into_diagnostic()?;
    let paths = PackagePaths::new(staging.path());

    let mut source = zarf_fetch::new_source(&package, opts.shasum.clone(), insecure)
        .into_diagnostic()?;
    let pkg = source
        .load_package(&paths, &opts.components)
        .await
        .into_diagnostic()?;

    if let Some(key_path) = &key {
        zarf_core::sign::verify_package(&paths, key_path).into_diagnostic()?;
        println!("{} Package signature verified", style("✓").green().bold());
    }

    println!(
        "{} Deploying package {} ({} component(s))",
        style("→").blue().bold(),
        style(&pkg.metadata.name).cyan(),
        pkg.components.len()
    );
    if !prompts::confirm("Deploy this package?", confirm) {
        return Err(miette::miette!("deploy declined"));
    }

    let cluster = try_cluster().await;
    let helm = helm();

    let record = match &cluster {
        Some(cluster) => {
            let store = store_for(cluster);
            let deployer = Deployer {
                store: &store,
                helm: &helm,
                cluster: Some(cluster.clone()),
                cancel,
                opts,
            };
            deployer
                .deploy_loaded(pkg, &paths, &mut |v| {
                    prompts::variable(v).map_err(|e| {
                        zarf_packager::PackagerError::action("variable prompt", e.to_string())
                    })
                })
                .await
                .into_diagnostic()?
        }
        None => {
            // Pure-file and pure-action packages deploy without a cluster;
            // the record only lives for this invocation.
            let store = MemoryStore::new();
            let deployer = Deployer {
                store: &store,
                helm: &helm,
                cluster: None,
                cancel,
                opts,
            };
            deployer
                .deploy_loaded(pkg, &paths, &mut |v| {
                    prompts::variable(v).map_err(|e| {
                        zarf_packager::PackagerError::action("variable prompt", e.to_string())
                    })
                })
                .await
                .into_diagnostic()?
        }
    };

    println!(
        "{} Deployed {} (generation {})",
        style("✓").green().bold(),
        style(&record.name).cyan(),
        record.generation
    );

    for (name, connect) in &record.connect_strings {
        println!(
            "  {} zarf connect {} {} {}",
            style("→").blue(),
            style(name).cyan(),
            style("—").dim(),
            connect.description
        );
    }

    Ok(())
}
