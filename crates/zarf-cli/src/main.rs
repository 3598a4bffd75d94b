//! zarf - declarative air-gap packaging for Kubernetes

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod exit_codes;
mod prompts;

use config::Config;

#[derive(Parser)]
#[command(name = "zarf")]
#[command(version)]
#[command(about = "Deploy declarative packages into air-gapped Kubernetes clusters", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (warn, info, debug, trace)
    #[arg(short = 'l', long, global = true, env = config::LOG_LEVEL_ENV)]
    log_level: Option<String>,

    /// Allow insecure registry and server connections
    #[arg(long, global = true)]
    insecure: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare this cluster: registry, git server and state secret
    Init {
        /// Skip all confirmation prompts
        #[arg(long)]
        confirm: bool,

        /// Deploy only these init components (comma separated)
        #[arg(long, value_delimiter = ',')]
        components: Vec<String>,
    },

    /// Package operations
    #[command(subcommand)]
    Package(PackageCommands),

    /// Remove every deployed package and engine resource from the cluster
    Destroy {
        /// Required acknowledgement that this is destructive
        #[arg(long)]
        confirm: bool,
    },

    /// Internal plumbing, not part of the supported surface
    #[command(subcommand, hide = true)]
    Internal(InternalCommands),
}

#[derive(Subcommand)]
enum PackageCommands {
    /// Assemble a package from a directory holding zarf.yaml
    Create {
        /// Package base directory
        #[arg(default_value = ".")]
        base_dir: PathBuf,

        /// Where the archive is written
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip all confirmation prompts
        #[arg(long)]
        confirm: bool,

        /// Values for ###ZARF_PKG_TMPL_*### tokens (KEY=VALUE)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Target architecture (amd64, arm64)
        #[arg(short, long)]
        architecture: Option<String>,

        /// minisign secret key to sign the package definition with
        #[arg(long)]
        signing_key: Option<PathBuf>,

        /// Password for an encrypted signing key
        #[arg(long)]
        signing_key_pass: Option<String>,

        /// Create a differential package against this base package
        #[arg(long)]
        differential: Option<String>,

        /// Split the archive into parts of at most this many megabytes
        #[arg(long, default_value_t = 0)]
        max_package_size: u64,

        /// Skip SBOM generation
        #[arg(long)]
        skip_sbom: bool,
    },

    /// Deploy a package from a path, URL or oci:// reference
    Deploy {
        /// Package location
        package: String,

        /// Skip all confirmation prompts
        #[arg(long)]
        confirm: bool,

        /// Deploy only these optional components (comma separated)
        #[arg(long, value_delimiter = ',')]
        components: Vec<String>,

        /// Values for deploy-time variables (KEY=VALUE)
        #[arg(long = "set")]
        set: Vec<String>,

        /// Expected archive sha256 for http(s) sources
        #[arg(long)]
        shasum: Option<String>,

        /// Public key to verify a signed package with
        #[arg(long)]
        key: Option<PathBuf>,
    },

    /// Print a package's definition without deploying it
    Inspect {
        /// Package location
        package: String,

        /// Also extract SBOMs to this directory
        #[arg(long)]
        sbom_out: Option<PathBuf>,
    },

    /// List packages deployed in the connected cluster
    List,

    /// Remove a deployed package
    Remove {
        /// Deployed package name, or a package archive naming it
        package: String,

        /// Required acknowledgement
        #[arg(long)]
        confirm: bool,

        /// Remove only these components (comma separated)
        #[arg(long, value_delimiter = ',')]
        components: Vec<String>,
    },

    /// Publish a package archive to an OCI registry
    Publish {
        /// Package archive path
        package: PathBuf,

        /// Destination registry and repository (oci://host/repo)
        registry: String,
    },

    /// Pull a published package down to a local archive
    Pull {
        /// Package reference (oci://host/repo:tag)
        reference: String,

        /// Where the archive is written
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum InternalCommands {
    /// Serve the admission webhook that mutates cluster resources
    Agent {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8443")]
        listen: String,
    },
}

fn init_tracing(cli_level: Option<&str>) {
    let level = cli_level.unwrap_or("warn");
    let filter = EnvFilter::try_new(format!(
        "zarf_cli={level},zarf_core={level},zarf_fetch={level},zarf_kube={level},zarf_agent={level},zarf_packager={level}"
    ))
    .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Split repeated KEY=VALUE flags into a map
fn parse_set_values(values: &[String]) -> BTreeMap<String, String> {
    values
        .iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    if config::is_ci() {
        console::set_colors_enabled(false);
    }

    let config = Config::load();
    let insecure = cli.insecure || config.get_bool("insecure").unwrap_or(false);

    let result: miette::Result<()> = match cli.command {
        Commands::Init {
            confirm,
            components,
        } => commands::init::run(&config, confirm, components, insecure).await,

        Commands::Package(package) => match package {
            PackageCommands::Create {
                base_dir,
                output,
                confirm,
                set,
                architecture,
                signing_key,
                signing_key_pass,
                differential,
                max_package_size,
                skip_sbom,
            } => {
                let opts = commands::create::options(
                    &config,
                    base_dir,
                    output,
                    confirm,
                    parse_set_values(&set),
                    architecture,
                    signing_key,
                    signing_key_pass,
                    differential,
                    max_package_size,
                    skip_sbom,
                    insecure,
                );
                commands::create::run(opts).await
            }

            PackageCommands::Deploy {
                package,
                confirm,
                components,
                set,
                shasum,
                key,
            } => {
                commands::deploy::run(
                    package,
                    confirm,
                    components,
                    parse_set_values(&set),
                    shasum,
                    key,
                    insecure,
                )
                .await
            }

            PackageCommands::Inspect { package, sbom_out } => {
                commands::inspect::run(package, sbom_out, insecure).await
            }

            PackageCommands::List => commands::list::run().await,

            PackageCommands::Remove {
                package,
                confirm,
                components,
            } => commands::remove::run(package, confirm, components).await,

            PackageCommands::Publish { package, registry } => {
                commands::publish::run(package, registry, insecure).await
            }

            PackageCommands::Pull { reference, output } => {
                commands::pull::run(reference, output, insecure).await
            }
        },

        Commands::Destroy { confirm } => commands::destroy::run(confirm).await,

        Commands::Internal(InternalCommands::Agent { listen }) => {
            commands::agent::run(&listen).await
        }
    };

    match result {
        Ok(()) => ExitCode::from(exit_codes::OK as u8),
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}
