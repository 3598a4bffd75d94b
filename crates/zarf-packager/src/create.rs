//! Package assembler
//!
//! Drives create end to end: resolve imports, migrate, template, validate,
//! fetch every artifact into the layout, checksum, optionally sign, and
//! archive. Differential creation filters out images and repos the
//! referenced base package already carries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use zarf_core::archive;
use zarf_core::checksums;
use zarf_core::compose::{ImportChain, SkeletonFetcher};
use zarf_core::layout::{self, PackagePaths};
use zarf_core::schema::{migrations, validate, BuildData, Component, Package};
use zarf_core::sign;
use zarf_core::template::{self, TemplateMap};
use zarf_core::{CoreError, VariableConfig};
use zarf_fetch::charts::ChartFetcher;
use zarf_fetch::images::{ImageFetcher, ImagePullConfig};
use zarf_fetch::{files as file_fetch, repos, OciRemote};

use crate::actions::ActionRunner;
use crate::error::{PackagerError, Result};

/// Inputs to one package create
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// Directory holding `zarf.yaml`; paths in the package resolve here
    pub base_dir: PathBuf,

    /// Where the finished archive lands
    pub output_dir: PathBuf,

    /// Target architecture; falls back to the package, then the host
    pub architecture: Option<String>,

    /// Skip interactive prompting and confirmation
    pub confirm: bool,

    /// `--set` values for `###ZARF_PKG_TMPL_<K>###` tokens
    pub set_variables: BTreeMap<String, String>,

    /// minisign secret key for `zarf.yaml.sig`
    pub signing_key: Option<PathBuf>,

    pub signing_key_password: Option<String>,

    /// Location of a base package for differential creation
    pub differential_base: Option<String>,

    /// Split the archive into parts of at most this many megabytes; 0 keeps
    /// one archive
    pub max_package_size_mb: u64,

    pub skip_sbom: bool,

    /// Allow plain-http / invalid-TLS registries
    pub insecure: bool,

    /// Registry overrides recorded in build data
    pub registry_overrides: BTreeMap<String, String>,
}

impl CreateOptions {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            output_dir: PathBuf::from("."),
            architecture: None,
            confirm: false,
            set_variables: BTreeMap::new(),
            signing_key: None,
            signing_key_password: None,
            differential_base: None,
            max_package_size_mb: 0,
            skip_sbom: false,
            insecure: false,
            registry_overrides: BTreeMap::new(),
        }
    }
}

/// Prompt callback for a missing package template value
pub type TemplatePrompt<'a> = dyn FnMut(&str) -> Result<String> + 'a;

/// Confirmation callback before assembly starts
pub type ConfirmPrompt<'a> = dyn FnMut(&Package, &[String]) -> bool + 'a;

/// Fetches `oci://` skeleton imports through the package OCI transport
struct OciSkeletonFetcher {
    insecure: bool,
    cache_dir: PathBuf,
}

impl SkeletonFetcher for OciSkeletonFetcher {
    fn fetch_skeleton(&mut self, url: &str, component_name: &str) -> zarf_core::Result<PathBuf> {
        let insecure = self.insecure;
        let cache_dir = self.cache_dir.clone();
        let url = url.to_string();
        let component = component_name.to_string();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let mut remote = OciRemote::new(&url, insecure)
                    .map_err(|e| CoreError::ImportChain(e.to_string()))?;
                remote
                    .fetch_component_skeleton(&component, &cache_dir)
                    .await
                    .map_err(|e| CoreError::ImportChain(e.to_string()))
            })
        })
    }
}

/// The shared artifact cache root (`~/.cache/zarf`)
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("zarf")
}

/// Assemble one package
pub async fn create(
    opts: &CreateOptions,
    cancel: CancellationToken,
    prompt: &mut TemplatePrompt<'_>,
    confirm: &mut ConfirmPrompt<'_>,
) -> Result<PathBuf> {
    let original_cwd = std::env::current_dir()?;
    let base_dir = opts.base_dir.canonicalize()?;

    let raw = std::fs::read_to_string(base_dir.join(layout::ZARF_YAML)).map_err(|_| {
        CoreError::PackageNotFound {
            path: base_dir.join(layout::ZARF_YAML),
        }
    })?;
    let mut pkg: Package = serde_yaml::from_str(&raw).map_err(CoreError::from)?;

    let arch = resolve_architecture(opts, &pkg);
    pkg.metadata.architecture = Some(arch.clone());

    // Resolve the import chain of every component and fold it flat.
    let mut warnings = Vec::new();
    let mut fetcher = OciSkeletonFetcher {
        insecure: opts.insecure,
        cache_dir: cache_dir().join("oci"),
    };
    let mut composed_components = Vec::new();
    let mut variables = pkg.variables.clone();
    let mut constants = pkg.constants.clone();

    for component in pkg.components.clone() {
        let mut chain = ImportChain::build(component, &arch, &base_dir, &mut fetcher)?;
        warnings.extend(chain.migrate());
        tracing::debug!(chain = %chain.describe(), "resolved import chain");

        variables = chain.merge_variables(&variables);
        constants = chain.merge_constants(&constants);
        composed_components.push(chain.compose()?);
    }
    pkg.components = composed_components;
    pkg.variables = variables;
    pkg.constants = constants;

    // Resolve create-time template tokens across the whole package tree.
    let template_map = resolve_package_templates(&pkg, &opts.set_variables, opts.confirm, prompt)?;
    pkg = apply_templates_to_package(&pkg, &template_map)?;

    validate::package(&pkg).map_err(PackagerError::Core)?;

    // Constants with a pattern are checked after templating.
    for constant in &pkg.constants {
        if !constant.pattern.is_empty() && !constant.value.contains(&constant.pattern) {
            // Patterns match as required substrings.
            return Err(PackagerError::Core(CoreError::validation(
                format!("constants.{}", constant.name),
                format!("value {:?} does not match pattern {:?}", constant.value, constant.pattern),
            )));
        }
    }

    if let Some(base) = &opts.differential_base {
        apply_differential(&mut pkg, base, &original_cwd, opts.insecure).await?;
    }

    if !confirm(&pkg, &warnings) {
        return Err(PackagerError::Cancelled("create confirmation".to_string()));
    }

    // Materialize the layout in a scratch directory, then archive it. The
    // per-component staging trees live outside the layout so they never
    // leak into the archive.
    let build_dir = tempfile::Builder::new().prefix("zarf-create-").tempdir()?;
    let staging_root = tempfile::Builder::new().prefix("zarf-staging-").tempdir()?;
    let paths = PackagePaths::new(build_dir.path());
    std::fs::create_dir_all(paths.components_dir())?;

    let mut all_images: BTreeSet<String> = BTreeSet::new();
    let chart_fetcher = ChartFetcher::new();
    let http_client = reqwest::Client::new();
    let mut variable_config = VariableConfig::new();
    variable_config.set_constants(&pkg.constants);

    for component in &pkg.components {
        if cancel.is_cancelled() {
            return Err(PackagerError::Cancelled(format!(
                "assembling component {:?}",
                component.name
            )));
        }

        tracing::info!(component = %component.name, "assembling component");
        let staging = staging_root.path().join(&component.name);
        std::fs::create_dir_all(&staging)?;

        let mut runner = ActionRunner::new(&mut variable_config, None, &base_dir, cancel.clone());
        runner.run_before(&component.actions.on_create).await?;

        let result = assemble_component(
            &base_dir,
            component,
            &staging,
            &chart_fetcher,
            &http_client,
            &template_map,
        )
        .await;

        let mut runner = ActionRunner::new(&mut variable_config, None, &base_dir, cancel.clone());
        match result {
            Ok(()) => {
                runner.run_after(&component.actions.on_create).await?;
                runner.run_on_success(&component.actions.on_create).await;
            }
            Err(e) => {
                runner.run_on_failure(&component.actions.on_create).await;
                return Err(e);
            }
        }

        all_images.extend(component.images.iter().cloned());

        archive::tar_directory(&staging, &paths.component_tar(&component.name))?;
        std::fs::remove_dir_all(&staging)?;
    }

    if !all_images.is_empty() {
        let image_fetcher = ImageFetcher::new(ImagePullConfig {
            architecture: arch.clone(),
            insecure: opts.insecure,
        })?;
        let references: Vec<String> = all_images.into_iter().collect();
        image_fetcher
            .pull_all(&references, &paths.images_dir())
            .await?;
    }

    if !opts.skip_sbom {
        catalog_sbom(&paths);
    }

    // Build record, checksums, definition, optional signature. The
    // differential fields were recorded earlier and must survive.
    let mut build = build_data(opts, &arch, &warnings);
    if let Some(existing) = pkg.build.take() {
        build.differential = existing.differential;
        build.differential_missing = existing.differential_missing;
        build.differential_package_version = existing.differential_package_version;
    }
    pkg.build = Some(build);
    write_definition(&paths, &pkg)?;
    let aggregate = checksums::generate(build_dir.path())?;
    pkg.metadata.aggregate_checksum = aggregate;
    write_definition(&paths, &pkg)?;

    if let Some(key_path) = &opts.signing_key {
        let key = sign::load_secret_key(key_path, opts.signing_key_password.clone())?;
        sign::sign_package(&paths, &key)?;
    }

    // Archive the layout.
    std::fs::create_dir_all(&opts.output_dir)?;
    let archive_path = opts.output_dir.join(archive_name(&pkg, &arch));
    if pkg.metadata.uncompressed {
        archive::tar_directory(build_dir.path(), &archive_path)?;
    } else {
        archive::tar_zst_directory(build_dir.path(), &archive_path)?;
    }

    if opts.max_package_size_mb > 0 {
        let chunk = (opts.max_package_size_mb as usize) * 1024 * 1024;
        if archive_path.metadata()?.len() as usize > chunk {
            let parts = archive::split(&archive_path, chunk)?;
            tracing::info!(parts = parts.len() - 1, "package split into parts");
            return Ok(parts[0].clone());
        }
    }

    tracing::info!(archive = %archive_path.display(), "package created");
    Ok(archive_path)
}

/// Materialize one component's payload into its staging directory
async fn assemble_component(
    base_dir: &Path,
    component: &Component,
    staging: &Path,
    chart_fetcher: &ChartFetcher,
    http_client: &reqwest::Client,
    template_map: &TemplateMap,
) -> Result<()> {
    for chart in &component.charts {
        chart_fetcher
            .fetch(
                base_dir,
                chart,
                &staging.join(layout::component::CHARTS),
                &staging.join(layout::component::VALUES),
            )
            .await?;
    }

    // Values files carry create-time tokens; bake them before checksumming.
    let values_dir = staging.join(layout::component::VALUES);
    if values_dir.is_dir() {
        for entry in walkdir::WalkDir::new(&values_dir) {
            let entry = entry.map_err(|e| CoreError::Archive(e.to_string()))?;
            if entry.file_type().is_file() {
                template_map
                    .apply_to_file(entry.path())
                    .map_err(PackagerError::Core)?;
            }
        }
    }

    for manifest in &component.manifests {
        let manifests_dir = staging.join(layout::component::MANIFESTS);
        std::fs::create_dir_all(&manifests_dir)?;
        for (idx, file) in manifest.files.iter().enumerate() {
            let src = base_dir.join(file);
            if !src.is_file() {
                return Err(PackagerError::Fetch(zarf_fetch::FetchError::not_found(
                    file,
                    "manifest file does not exist",
                )));
            }
            let dest = manifests_dir.join(format!("{}-{idx}.yaml", manifest.name));
            std::fs::copy(&src, &dest)?;
            template_map.apply_to_file(&dest).map_err(PackagerError::Core)?;
        }
        for (idx, kustomization) in manifest.kustomizations.iter().enumerate() {
            // Kustomize rendering is delegated to the bundled tool at deploy
            // time; the directory is carried as-is.
            let src = base_dir.join(kustomization);
            if !src.exists() {
                return Err(PackagerError::Fetch(zarf_fetch::FetchError::not_found(
                    kustomization,
                    "kustomization does not exist",
                )));
            }
            let dest = manifests_dir.join(format!("kustomization-{}-{idx}", manifest.name));
            copy_tree(&src, &dest)?;
        }
    }

    for (idx, file) in component.files.iter().enumerate() {
        file_fetch::fetch_file(
            http_client,
            base_dir,
            &staging.join(layout::component::FILES),
            idx,
            file,
        )
        .await?;
    }

    for repo in &component.repos {
        repos::mirror(repo, &staging.join(layout::component::REPOS))?;
    }

    for (idx, injection) in component.data_injections.iter().enumerate() {
        file_fetch::stage_data_injection(
            base_dir,
            &staging.join(layout::component::DATA),
            idx,
            injection,
        )?;
    }

    Ok(())
}

/// Collect every `###ZARF_PKG_TMPL_<K>###` token and resolve its value
fn resolve_package_templates(
    pkg: &Package,
    set_values: &BTreeMap<String, String>,
    confirm: bool,
    prompt: &mut TemplatePrompt<'_>,
) -> Result<TemplateMap> {
    let rendered = serde_yaml::to_string(pkg).map_err(CoreError::from)?;
    let keys = template::find_package_templates(&rendered);

    let mut map = TemplateMap::new();
    for key in keys {
        let value = match set_values.get(&key) {
            Some(v) => v.clone(),
            None if confirm => {
                return Err(PackagerError::Core(CoreError::validation(
                    format!("set.{key}"),
                    "package template has no value and prompting is disabled by --confirm",
                )))
            }
            None => prompt(&key)?,
        };
        map.insert_package_template(&key, value);
    }
    Ok(map)
}

/// Run the template map over the serialized package tree
fn apply_templates_to_package(pkg: &Package, map: &TemplateMap) -> Result<Package> {
    let mut tree: serde_yaml::Value =
        serde_yaml::to_value(pkg).map_err(CoreError::from)?;
    map.apply_yaml(&mut tree);
    Ok(serde_yaml::from_value(tree).map_err(CoreError::from)?)
}

/// Filter out images and repos the differential base already carries
async fn apply_differential(
    pkg: &mut Package,
    base_location: &str,
    original_cwd: &Path,
    insecure: bool,
) -> Result<()> {
    let location = if base_location.contains("://") || Path::new(base_location).is_absolute() {
        base_location.to_string()
    } else {
        original_cwd.join(base_location).to_string_lossy().to_string()
    };

    let mut source = zarf_fetch::new_source(&location, None, insecure)?;
    let temp = tempfile::Builder::new().prefix("zarf-diff-").tempdir()?;
    let base_pkg = source
        .load_package_metadata(&PackagePaths::new(temp.path()), false)
        .await?;

    let base_images: BTreeSet<String> = base_pkg
        .components
        .iter()
        .flat_map(|c| c.images.iter().cloned())
        .collect();
    let base_repos: BTreeSet<String> = base_pkg
        .components
        .iter()
        .flat_map(|c| c.repos.iter().cloned())
        .collect();

    let mut missing = Vec::new();
    for component in &mut pkg.components {
        component.images.retain(|image| {
            let keep = !base_images.contains(image);
            if !keep {
                missing.push(image.clone());
            }
            keep
        });
        component.repos.retain(|repo| {
            let keep = !base_repos.contains(repo);
            if !keep {
                missing.push(repo.clone());
            }
            keep
        });
    }

    let build = pkg.build.get_or_insert_with(BuildData::default);
    build.differential = true;
    build.differential_missing = missing;
    build.differential_package_version =
        base_pkg.metadata.version.clone().unwrap_or_default();

    Ok(())
}

/// Delegate SBOM cataloging to the external `syft` tool; absent tool skips
/// with a warning.
fn catalog_sbom(paths: &PackagePaths) {
    let images_dir = paths.images_dir();
    if !images_dir.is_dir() {
        return;
    }

    let output = std::process::Command::new("syft")
        .arg("scan")
        .arg(format!("oci-dir:{}", images_dir.display()))
        .arg("-o")
        .arg("spdx-json")
        .output();

    match output {
        Ok(out) if out.status.success() => {
            let sbom_dir = paths.base().join("sboms");
            if std::fs::create_dir_all(&sbom_dir).is_ok()
                && std::fs::write(sbom_dir.join("images.json"), &out.stdout).is_ok()
                && archive::tar_directory(&sbom_dir, &paths.sboms_tar()).is_ok()
            {
                let _ = std::fs::remove_dir_all(&sbom_dir);
            }
        }
        Ok(out) => {
            tracing::warn!(
                status = %out.status,
                "syft failed, continuing without an SBOM"
            );
        }
        Err(_) => {
            tracing::warn!("syft not found, continuing without an SBOM");
        }
    }
}

fn resolve_architecture(opts: &CreateOptions, pkg: &Package) -> String {
    opts.architecture
        .clone()
        .or_else(|| pkg.metadata.architecture.clone())
        .unwrap_or_else(|| match std::env::consts::ARCH {
            "x86_64" => "amd64".to_string(),
            "aarch64" => "arm64".to_string(),
            other => other.to_string(),
        })
}

fn build_data(opts: &CreateOptions, arch: &str, warnings: &[String]) -> BuildData {
    let applied: Vec<String> = if warnings.is_empty() {
        Vec::new()
    } else {
        migrations::all_migration_names()
    };

    BuildData {
        terminal: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        user: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
        architecture: arch.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        migrations: applied,
        registry_overrides: opts.registry_overrides.clone(),
        ..Default::default()
    }
}

fn write_definition(paths: &PackagePaths, pkg: &Package) -> Result<()> {
    std::fs::write(
        paths.zarf_yaml(),
        serde_yaml::to_string(pkg).map_err(CoreError::from)?,
    )?;
    Ok(())
}

/// `zarf-init-<arch>-<version>.tar.zst` for init packages,
/// `zarf-package-<name>-<arch>[-<version>].tar[.zst]` otherwise
pub fn archive_name(pkg: &Package, arch: &str) -> String {
    let extension = if pkg.metadata.uncompressed {
        "tar"
    } else {
        "tar.zst"
    };

    if pkg.is_init_config() {
        let version = pkg.metadata.version.clone().unwrap_or_default();
        return format!("zarf-init-{arch}-{version}.{extension}");
    }

    match &pkg.metadata.version {
        Some(version) if !version.is_empty() => format!(
            "zarf-package-{}-{arch}-{version}.{extension}",
            pkg.metadata.name
        ),
        _ => format!("zarf-package-{}-{arch}.{extension}", pkg.metadata.name),
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    if src.is_file() {
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(src, dest)?;
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| CoreError::Archive(e.to_string()))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| CoreError::Archive(e.to_string()))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zarf_core::schema::PackageKind;

    fn no_prompt(key: &str) -> Result<String> {
        Err(PackagerError::Core(CoreError::validation(
            format!("set.{key}"),
            "prompting disabled in tests",
        )))
    }

    fn write_simple_package(dir: &Path) {
        std::fs::write(dir.join("hello.txt"), "hi\n").unwrap();
        std::fs::write(
            dir.join("zarf.yaml"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: hello-world
components:
  - name: baseline
    required: true
    files:
      - source: hello.txt
        target: /tmp/hello.txt
"#,
        )
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_and_extract_roundtrip() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        write_simple_package(&pkg_dir);

        let mut opts = CreateOptions::new(&pkg_dir);
        opts.output_dir = temp.path().join("out");
        opts.confirm = true;
        opts.skip_sbom = true;
        opts.architecture = Some("amd64".to_string());

        let archive_path = create(
            &opts,
            CancellationToken::new(),
            &mut no_prompt,
            &mut |_, _| true,
        )
        .await
        .unwrap();

        assert_eq!(
            archive_path.file_name().unwrap().to_string_lossy(),
            "zarf-package-hello-world-amd64.tar.zst"
        );

        // Extract and verify the full integrity contract.
        let extracted = temp.path().join("extracted");
        archive::extract(&archive_path, &extracted).unwrap();

        let pkg: Package = serde_yaml::from_str(
            &std::fs::read_to_string(extracted.join("zarf.yaml")).unwrap(),
        )
        .unwrap();
        assert_eq!(pkg.kind, PackageKind::ZarfPackageConfig);
        assert!(!pkg.metadata.aggregate_checksum.is_empty());
        checksums::verify(&extracted, &pkg.metadata.aggregate_checksum, &[]).unwrap();

        // The component tar holds the staged file under files/<idx>, whose
        // content hash matches the source.
        let tar_path = extracted.join("components/baseline.tar");
        assert!(tar_path.is_file());
        let staged = temp.path().join("component");
        archive::extract(&tar_path, &staged).unwrap();
        assert_eq!(
            checksums::sha256_of_file(&staged.join("files/0")).unwrap(),
            // sha256("hi\n")
            "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4"
        );

        // The listing covers the component tar.
        let listing = std::fs::read_to_string(extracted.join("checksums.txt")).unwrap();
        assert!(listing.contains("components/baseline.tar"));
        assert_eq!(
            pkg.metadata.aggregate_checksum,
            checksums::sha256_of_file(&extracted.join("checksums.txt")).unwrap()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn package_templates_are_baked_at_create() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("payload.txt"), "data\n").unwrap();
        std::fs::write(
            pkg_dir.join("zarf.yaml"),
            r####"
kind: ZarfPackageConfig
metadata:
  name: templated
  description: "###ZARF_PKG_TMPL_DESCRIPTION###"
components:
  - name: baseline
    required: true
    files:
      - source: payload.txt
        target: /tmp/payload.txt
"####,
        )
        .unwrap();

        let mut opts = CreateOptions::new(&pkg_dir);
        opts.output_dir = temp.path().join("out");
        opts.confirm = true;
        opts.skip_sbom = true;
        opts.architecture = Some("amd64".to_string());
        opts.set_variables
            .insert("DESCRIPTION".to_string(), "rendered at create".to_string());

        let archive_path = create(
            &opts,
            CancellationToken::new(),
            &mut no_prompt,
            &mut |pkg, _| {
                assert_eq!(pkg.metadata.description.as_deref(), Some("rendered at create"));
                true
            },
        )
        .await
        .unwrap();

        let extracted = temp.path().join("extracted");
        archive::extract(&archive_path, &extracted).unwrap();
        let rendered = std::fs::read_to_string(extracted.join("zarf.yaml")).unwrap();
        assert!(rendered.contains("rendered at create"));
        assert!(!rendered.contains("###ZARF_PKG_TMPL_"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_template_value_with_confirm_is_fatal() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("zarf.yaml"),
            r####"
kind: ZarfPackageConfig
metadata:
  name: templated
  description: "###ZARF_PKG_TMPL_MISSING###"
components:
  - name: baseline
    required: true
"####,
        )
        .unwrap();

        let mut opts = CreateOptions::new(&pkg_dir);
        opts.output_dir = temp.path().join("out");
        opts.confirm = true;
        opts.skip_sbom = true;

        let err = create(
            &opts,
            CancellationToken::new(),
            &mut no_prompt,
            &mut |_, _| true,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PackagerError::Core(CoreError::Validation { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn declined_confirmation_cancels() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        write_simple_package(&pkg_dir);

        let mut opts = CreateOptions::new(&pkg_dir);
        opts.output_dir = temp.path().join("out");
        opts.skip_sbom = true;

        let err = create(
            &opts,
            CancellationToken::new(),
            &mut no_prompt,
            &mut |_, _| false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PackagerError::Cancelled(_)));
    }

    #[test]
    fn archive_naming() {
        let mut pkg = Package::default();
        pkg.metadata.name = "demo".to_string();
        assert_eq!(archive_name(&pkg, "amd64"), "zarf-package-demo-amd64.tar.zst");

        pkg.metadata.version = Some("1.2.3".to_string());
        assert_eq!(
            archive_name(&pkg, "amd64"),
            "zarf-package-demo-amd64-1.2.3.tar.zst"
        );

        pkg.metadata.uncompressed = true;
        assert_eq!(archive_name(&pkg, "amd64"), "zarf-package-demo-amd64-1.2.3.tar");

        pkg.kind = PackageKind::ZarfInitConfig;
        pkg.metadata.uncompressed = false;
        assert_eq!(archive_name(&pkg, "arm64"), "zarf-init-arm64-1.2.3.tar.zst");
    }
}
