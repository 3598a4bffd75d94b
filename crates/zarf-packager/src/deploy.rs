//! Package deployer
//!
//! Runs the per-component state machine in declaration order: actions,
//! files, images, repos, data injections, charts and manifests, then the
//! closing actions. Progress is recorded in the deployed-package secret
//! after every component so a crash leaves consistent partial state, and
//! component webhooks are given their window after each record.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use zarf_core::layout::{self, PackagePaths};
use zarf_core::schema::{validate, Component, Package, Variable};
use zarf_core::state::{
    ComponentStatus, DeployedComponent, DeployedPackage, InstalledChart, PackageState,
};
use zarf_core::template::TemplateMap;
use zarf_core::{archive, VariableConfig};
use zarf_fetch::charts::{chart_tarball_name, values_file_name};
use zarf_fetch::{files as file_fetch, push, repos};
use zarf_kube::helm::ChartInstall;
use zarf_kube::{storage, Cluster, HelmClient, PackageStore};

use crate::actions::ActionRunner;
use crate::error::{PackagerError, Result};

/// Attempts for image and repo pushes
const PUSH_RETRIES: u32 = 3;

/// Back-off between push attempts
const PUSH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Process-wide cap on any single webhook wait
const WEBHOOK_WAIT_CAP: Duration = Duration::from_secs(300);

/// Inputs to one package deploy
#[derive(Debug, Clone)]
pub struct DeployOptions {
    /// Package location: path, URL or `oci://` reference
    pub source: String,

    /// Expected archive sha256 for URL sources
    pub shasum: Option<String>,

    pub insecure: bool,

    /// Optional components requested by name; empty keeps the defaults
    pub components: Vec<String>,

    /// `--set` values for deploy-time variables
    pub set_variables: BTreeMap<String, String>,

    pub confirm: bool,

    /// Wait budget handed to chart installs
    pub timeout: Duration,

    /// Root prepended to file targets; `None` places at the absolute path
    pub files_root: Option<PathBuf>,
}

impl DeployOptions {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            shasum: None,
            insecure: false,
            components: Vec::new(),
            set_variables: BTreeMap::new(),
            confirm: false,
            timeout: Duration::from_secs(300),
            files_root: None,
        }
    }
}

/// Step names the state machine moves through, per component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Before,
    FilesPlaced,
    ImagesPushed,
    ReposPushed,
    Injected,
    ChartsInstalled,
    After,
}

/// Deploys one loaded package against a cluster and store
pub struct Deployer<'a> {
    pub store: &'a dyn PackageStore,
    pub helm: &'a dyn HelmClient,
    pub cluster: Option<Cluster>,
    pub cancel: CancellationToken,
    pub opts: DeployOptions,
}

impl<'a> Deployer<'a> {
    /// Load the package from its source and deploy it
    pub async fn run(
        &self,
        prompt: &mut (dyn FnMut(&Variable) -> Result<String> + '_),
        confirm: &mut (dyn FnMut(&Package) -> bool + '_),
    ) -> Result<DeployedPackage> {
        let staging = tempfile::Builder::new().prefix("zarf-deploy-").tempdir()?;
        let paths = PackagePaths::new(staging.path());

        let mut source =
            zarf_fetch::new_source(&self.opts.source, self.opts.shasum.clone(), self.opts.insecure)?;
        let pkg = source
            .load_package(&paths, &self.opts.components)
            .await?;

        if !confirm(&pkg) {
            return Err(PackagerError::Cancelled("deploy confirmation".to_string()));
        }

        self.deploy_loaded(pkg, &paths, prompt).await
    }

    /// Deploy an already-extracted package layout
    pub async fn deploy_loaded(
        &self,
        pkg: Package,
        paths: &PackagePaths,
        prompt: &mut (dyn FnMut(&Variable) -> Result<String> + '_),
    ) -> Result<DeployedPackage> {
        validate::package(&pkg).map_err(PackagerError::Core)?;

        let selected = select_components(&pkg, &self.opts.components)?;
        tracing::info!(
            package = %pkg.metadata.name,
            components = selected.len(),
            "deploying package"
        );

        let needs_cluster = selected.iter().any(|c| c.requires_cluster());
        let state = if needs_cluster && !pkg.metadata.yolo {
            match self.store.load_state().await {
                Ok(state) => state,
                // The init package is what creates the state in the first
                // place; a fresh cluster legitimately has none yet.
                Err(_) if pkg.is_init_config() => PackageState::default(),
                Err(e) => return Err(e.into()),
            }
        } else {
            PackageState::default()
        };

        let mut variables = VariableConfig::new();
        variables.set_constants(&pkg.constants);
        variables
            .populate_variables(&pkg.variables, &self.opts.set_variables, |v| {
                if self.opts.confirm {
                    Err(zarf_core::CoreError::validation(
                        format!("variables.{}", v.name),
                        "variable has no value and prompting is disabled by --confirm",
                    ))
                } else {
                    prompt(v).map_err(|e| {
                        zarf_core::CoreError::validation(
                            format!("variables.{}", v.name),
                            e.to_string(),
                        )
                    })
                }
            })
            .map_err(PackagerError::Core)?;

        // Start the new deployment record with a bumped generation.
        let mut record = match self.store.get_package(&pkg.metadata.name).await {
            Ok(mut existing) => {
                existing.generation += 1;
                existing.data = pkg.clone();
                existing.cli_version = env!("CARGO_PKG_VERSION").to_string();
                existing
            }
            Err(zarf_kube::KubeError::PackageNotFound { .. }) => DeployedPackage {
                name: pkg.metadata.name.clone(),
                data: pkg.clone(),
                cli_version: env!("CARGO_PKG_VERSION").to_string(),
                generation: 1,
                ..Default::default()
            },
            Err(e) => return Err(e.into()),
        };

        for component in &selected {
            if self.cancel.is_cancelled() {
                return Err(PackagerError::Cancelled(format!(
                    "deploying component {:?}",
                    component.name
                )));
            }

            // The init package's injector only matters when the internal
            // registry has to be bootstrapped; external registry
            // credentials make it a no-op.
            if pkg.is_init_config()
                && component.name == "zarf-injector"
                && !state.registry_info.internal_registry
                && !state.registry_info.address.is_empty()
            {
                tracing::info!("skipping injector, external registry is configured");
                continue;
            }

            let mut variables_for_component = variables.clone();

            self.record_component(&mut record, component, ComponentStatus::Deploying)
                .await?;
            storage::wait_for_webhooks(
                self.store,
                &record.name,
                &component.name,
                WEBHOOK_WAIT_CAP,
            )
            .await?;

            let result = self
                .deploy_component(
                    &pkg,
                    component,
                    paths,
                    &state,
                    &mut variables_for_component,
                    &mut record,
                )
                .await;

            match result {
                Ok(()) => {
                    variables = variables_for_component;
                    self.record_component(&mut record, component, ComponentStatus::Succeeded)
                        .await?;
                }
                Err(e) => {
                    self.record_component(&mut record, component, ComponentStatus::Failed)
                        .await?;
                    return Err(PackagerError::ComponentFailed {
                        component: component.name.clone(),
                        source: Box::new(e),
                    });
                }
            }
        }

        Ok(record)
    }

    /// Run the state machine for one component
    async fn deploy_component(
        &self,
        pkg: &Package,
        component: &Component,
        paths: &PackagePaths,
        state: &PackageState,
        variables: &mut VariableConfig,
        record: &mut DeployedPackage,
    ) -> Result<()> {
        tracing::info!(component = %component.name, "deploying component");

        let component_dir = paths.components_dir().join(&component.name);
        let tar = paths.component_tar(&component.name);
        if tar.is_file() && !component_dir.is_dir() {
            archive::extract(&tar, &component_dir)?;
        }

        let on_deploy = &component.actions.on_deploy;
        let mut runner = ActionRunner::new(
            variables,
            self.cluster.as_ref(),
            &component_dir,
            self.cancel.clone(),
        );
        runner.run_before(on_deploy).await?;

        // Templates snapshot after the before actions so their captured
        // variables are visible to this component's values files.
        let templates = variables.deploy_templates(state);

        let result = self
            .run_component_steps(pkg, component, &component_dir, state, &templates, record)
            .await;

        let mut runner = ActionRunner::new(
            variables,
            self.cluster.as_ref(),
            &component_dir,
            self.cancel.clone(),
        );
        match result {
            Ok(()) => {
                runner.run_after(on_deploy).await?;
                runner.run_on_success(on_deploy).await;
                Ok(())
            }
            Err(e) => {
                runner.run_on_failure(on_deploy).await;
                Err(e)
            }
        }
    }

    async fn run_component_steps(
        &self,
        pkg: &Package,
        component: &Component,
        component_dir: &std::path::Path,
        state: &PackageState,
        templates: &TemplateMap,
        record: &mut DeployedPackage,
    ) -> Result<()> {
        let done = |step: Step| {
            tracing::debug!(component = %component.name, ?step, "step complete");
        };
        done(Step::Before);

        // Files
        for (idx, file) in component.files.iter().enumerate() {
            let staged = component_dir
                .join(layout::component::FILES)
                .join(idx.to_string());
            if !staged.is_file() {
                return Err(PackagerError::Fetch(zarf_fetch::FetchError::not_found(
                    &file.source,
                    "staged file is missing from the package",
                )));
            }

            // Text payloads carry deploy-time tokens.
            if let Ok(content) = std::fs::read_to_string(&staged) {
                let rendered = templates.apply_lines(&content);
                if rendered != content {
                    std::fs::write(&staged, rendered)?;
                }
            }

            file_fetch::place_file(&staged, file, self.opts.files_root.as_deref())?;
        }
        done(Step::FilesPlaced);

        // Images
        if !component.images.is_empty() && !pkg.metadata.yolo {
            let layout_dir = self
                .images_layout(component_dir)
                .ok_or_else(|| {
                    PackagerError::Fetch(zarf_fetch::FetchError::not_found(
                        layout::IMAGES_DIR,
                        "package carries no image layout",
                    ))
                })?;

            for image in &component.images {
                self.with_push_retries(&format!("image {image}"), || {
                    push::push_image_from_layout(
                        &layout_dir,
                        image,
                        &state.registry_info,
                        self.opts.insecure || state.registry_info.internal_registry,
                    )
                })
                .await?;
            }
        }
        done(Step::ImagesPushed);

        // Repos
        if !component.repos.is_empty() && !pkg.metadata.yolo {
            for repo in &component.repos {
                let folder = zarf_core::transform::repo_folder_name(repo)
                    .map_err(PackagerError::Core)?;
                let repo_dir = component_dir.join(layout::component::REPOS).join(&folder);

                self.with_push_retries(&format!("repo {repo}"), || {
                    let repo_dir = repo_dir.clone();
                    let server = state.git_server.clone();
                    let repo = repo.clone();
                    async move {
                        repos::push(&repo_dir, &repo, &server)?;
                        Ok(())
                    }
                })
                .await?;
            }
        }
        done(Step::ReposPushed);

        // Data injections run as one task each, joined before charts.
        if !component.data_injections.is_empty() {
            let cluster = self.require_cluster()?;
            let handles: Vec<_> = component
                .data_injections
                .iter()
                .enumerate()
                .map(|(idx, injection)| {
                    let tar = component_dir
                        .join(layout::component::DATA)
                        .join(format!("{idx}.tar"));
                    let cluster = cluster.clone();
                    let injection = injection.clone();
                    let timeout = self.opts.timeout;
                    tokio::spawn(async move {
                        zarf_kube::inject::inject(&cluster, &injection, &tar, timeout).await
                    })
                })
                .collect();

            for handle in handles {
                handle
                    .await
                    .map_err(|e| PackagerError::action("data injection", e.to_string()))??;
            }
        }
        done(Step::Injected);

        // Charts and manifests
        self.install_charts(component, component_dir, templates, record)
            .await?;
        self.apply_manifests(component, component_dir, templates)
            .await?;
        done(Step::ChartsInstalled);

        done(Step::After);
        Ok(())
    }

    async fn install_charts(
        &self,
        component: &Component,
        component_dir: &std::path::Path,
        templates: &TemplateMap,
        record: &mut DeployedPackage,
    ) -> Result<()> {
        for chart in &component.charts {
            let tarball = component_dir
                .join(layout::component::CHARTS)
                .join(chart_tarball_name(chart));

            let mut values_files = Vec::new();
            for (idx, _) in chart.values_files.iter().enumerate() {
                let values = component_dir
                    .join(layout::component::VALUES)
                    .join(values_file_name(chart, idx));
                templates.apply_to_file(&values).map_err(PackagerError::Core)?;
                values_files.push(values);
            }

            let namespace = if chart.namespace.is_empty() {
                "default".to_string()
            } else {
                chart.namespace.clone()
            };

            self.helm
                .install_or_upgrade(&ChartInstall {
                    chart_tarball: tarball,
                    release_name: chart.release_name().to_string(),
                    namespace: namespace.clone(),
                    values_files,
                    wait: true,
                    timeout: self.opts.timeout,
                })
                .await?;

            // Record the install and its connect strings immediately so a
            // later failure still knows what landed.
            if let Some(deployed) = record
                .deployed_components
                .iter_mut()
                .find(|c| c.name == component.name)
            {
                deployed.installed_charts.push(InstalledChart {
                    namespace,
                    chart_name: chart.release_name().to_string(),
                });
            }
            for (name, connect) in &chart.connect {
                record.connect_strings.insert(name.clone(), connect.clone());
            }
            self.store.save_package(record).await?;
        }

        Ok(())
    }

    async fn apply_manifests(
        &self,
        component: &Component,
        component_dir: &std::path::Path,
        templates: &TemplateMap,
    ) -> Result<()> {
        if component.manifests.is_empty() {
            return Ok(());
        }

        let cluster = self.require_cluster()?;
        let manager = zarf_kube::resources::ResourceManager::new(cluster.client().clone()).await?;

        let manifests_dir = component_dir.join(layout::component::MANIFESTS);
        for manifest in &component.manifests {
            let namespace = if manifest.namespace.is_empty() {
                "default"
            } else {
                &manifest.namespace
            };

            for (idx, _) in manifest.files.iter().enumerate() {
                let path = manifests_dir.join(format!("{}-{idx}.yaml", manifest.name));
                let content = std::fs::read_to_string(&path)?;
                let rendered = templates.apply_lines(&content);
                manager.apply_manifest(namespace, &rendered).await?;
            }
        }

        Ok(())
    }

    async fn with_push_retries<F, Fut>(&self, description: &str, mut operation: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<(), zarf_fetch::FetchError>>,
    {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(PackagerError::Cancelled(description.to_string()));
            }
            match operation().await {
                Ok(()) => return Ok(()),
                Err(e) if attempt + 1 < PUSH_RETRIES => {
                    attempt += 1;
                    tracing::warn!(%description, attempt, error = %e, "push failed, retrying");
                    tokio::time::sleep(PUSH_RETRY_DELAY).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn require_cluster(&self) -> Result<&Cluster> {
        self.cluster.as_ref().ok_or_else(|| {
            PackagerError::Cluster(zarf_kube::KubeError::State(
                "this component requires a cluster connection".to_string(),
            ))
        })
    }

    fn images_layout(&self, component_dir: &std::path::Path) -> Option<PathBuf> {
        // The shared layout sits at the package root, two levels above the
        // extracted component directory.
        let base = component_dir.parent()?.parent()?;
        let layout_dir = base.join(layout::IMAGES_DIR);
        layout_dir.is_dir().then_some(layout_dir)
    }

    async fn record_component(
        &self,
        record: &mut DeployedPackage,
        component: &Component,
        status: ComponentStatus,
    ) -> Result<()> {
        match record
            .deployed_components
            .iter_mut()
            .find(|c| c.name == component.name)
        {
            Some(existing) => {
                existing.status = status;
                existing.observed_generation = record.generation;
                if status == ComponentStatus::Deploying {
                    existing.installed_charts.clear();
                }
            }
            None => record.deployed_components.push(DeployedComponent {
                name: component.name.clone(),
                status,
                observed_generation: record.generation,
                installed_charts: Vec::new(),
            }),
        }

        self.store.save_package(record).await?;
        Ok(())
    }
}

/// Pick the components this deploy includes, honoring platform constraints,
/// required/default flags, groups and the explicit selection list.
pub fn select_components(pkg: &Package, requested: &[String]) -> Result<Vec<Component>> {
    let host_os = match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    };
    let arch = pkg
        .metadata
        .architecture
        .clone()
        .unwrap_or_default();

    for name in requested {
        if !pkg.components.iter().any(|c| &c.name == name) {
            return Err(PackagerError::UnknownComponent(name.clone()));
        }
    }

    let mut selected = Vec::new();
    let mut chosen_groups: BTreeMap<String, String> = BTreeMap::new();

    for component in &pkg.components {
        if !component.only.local_o_s.is_empty() && component.only.local_o_s != host_os {
            tracing::debug!(component = %component.name, "skipped by localOS constraint");
            continue;
        }
        if !arch.is_empty() && !component.satisfies_arch(&arch) {
            tracing::debug!(component = %component.name, "skipped by architecture constraint");
            continue;
        }

        let explicitly_requested = requested.iter().any(|n| n == &component.name);

        if !component.group.is_empty() {
            // One component per group: an explicit request wins, otherwise
            // the group's default deploys.
            if chosen_groups.contains_key(&component.group) {
                continue;
            }
            let group_requested = pkg
                .components
                .iter()
                .filter(|c| c.group == component.group)
                .any(|c| requested.iter().any(|n| n == &c.name));
            if explicitly_requested || (!group_requested && component.default) {
                chosen_groups.insert(component.group.clone(), component.name.clone());
                selected.push(component.clone());
            }
            continue;
        }

        if component.required || component.default || explicitly_requested {
            selected.push(component.clone());
        }
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zarf_core::schema::{Chart, File, Metadata};
    use zarf_kube::helm::MockHelm;
    use zarf_kube::MemoryStore;

    fn no_prompt(v: &Variable) -> Result<String> {
        Err(PackagerError::Core(zarf_core::CoreError::validation(
            format!("variables.{}", v.name),
            "prompting disabled in tests",
        )))
    }

    fn base_package(components: Vec<Component>) -> Package {
        Package {
            metadata: Metadata {
                name: "demo".to_string(),
                architecture: Some("amd64".to_string()),
                ..Default::default()
            },
            components,
            ..Default::default()
        }
    }

    /// Stage a package layout with one file-bearing component on disk
    fn stage_file_component(temp: &TempDir, name: &str, content: &str) -> PackagePaths {
        let base = temp.path().join("pkg");
        let paths = PackagePaths::new(&base);
        std::fs::create_dir_all(paths.components_dir()).unwrap();

        let staging = temp.path().join("staging");
        std::fs::create_dir_all(staging.join("files")).unwrap();
        std::fs::write(staging.join("files/0"), content).unwrap();
        zarf_core::archive::tar_directory(&staging, &paths.component_tar(name)).unwrap();
        std::fs::remove_dir_all(&staging).unwrap();

        paths
    }

    fn file_component(name: &str, target: &str) -> Component {
        Component {
            name: name.to_string(),
            required: true,
            files: vec![File {
                source: "payload.txt".to_string(),
                target: target.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn file_component_deploys_and_records() {
        let temp = TempDir::new().unwrap();
        let paths = stage_file_component(&temp, "baseline", "deployed-content");

        let store = MemoryStore::new();
        let helm = MockHelm::new();
        let mut opts = DeployOptions::new("unused");
        opts.files_root = Some(temp.path().join("root"));

        let deployer = Deployer {
            store: &store,
            helm: &helm,
            cluster: None,
            cancel: CancellationToken::new(),
            opts,
        };

        let pkg = base_package(vec![file_component("baseline", "/opt/payload.txt")]);
        let record = deployer
            .deploy_loaded(pkg, &paths, &mut no_prompt)
            .await
            .unwrap();

        assert_eq!(record.generation, 1);
        assert_eq!(record.deployed_components.len(), 1);
        assert_eq!(record.deployed_components[0].status, ComponentStatus::Succeeded);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("root/opt/payload.txt")).unwrap(),
            "deployed-content"
        );

        // The record also landed in the store.
        assert_eq!(store.get_package("demo").await.unwrap().generation, 1);
    }

    #[tokio::test]
    async fn redeploy_bumps_generation() {
        let temp = TempDir::new().unwrap();
        let paths = stage_file_component(&temp, "baseline", "content");

        let store = MemoryStore::new();
        let helm = MockHelm::new();
        let mut opts = DeployOptions::new("unused");
        opts.files_root = Some(temp.path().join("root"));

        let deployer = Deployer {
            store: &store,
            helm: &helm,
            cluster: None,
            cancel: CancellationToken::new(),
            opts,
        };

        let pkg = base_package(vec![file_component("baseline", "/opt/a.txt")]);
        deployer
            .deploy_loaded(pkg.clone(), &paths, &mut no_prompt)
            .await
            .unwrap();
        let second = deployer
            .deploy_loaded(pkg, &paths, &mut no_prompt)
            .await
            .unwrap();

        assert_eq!(second.generation, 2);
    }

    #[tokio::test]
    async fn deploy_time_tokens_render_into_placed_files() {
        let temp = TempDir::new().unwrap();
        let paths = stage_file_component(&temp, "baseline", "value=###ZARF_VAR_SETTING###\n");

        let store = MemoryStore::new();
        let helm = MockHelm::new();
        let mut opts = DeployOptions::new("unused");
        opts.files_root = Some(temp.path().join("root"));
        opts.set_variables
            .insert("SETTING".to_string(), "rendered".to_string());

        let deployer = Deployer {
            store: &store,
            helm: &helm,
            cluster: None,
            cancel: CancellationToken::new(),
            opts,
        };

        let mut pkg = base_package(vec![file_component("baseline", "/opt/config.txt")]);
        pkg.variables = vec![Variable {
            name: "SETTING".to_string(),
            ..Default::default()
        }];

        deployer
            .deploy_loaded(pkg, &paths, &mut no_prompt)
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("root/opt/config.txt")).unwrap(),
            "value=rendered\n"
        );
    }

    #[tokio::test]
    async fn failing_component_runs_on_failure_and_aborts() {
        let temp = TempDir::new().unwrap();
        let paths = stage_file_component(&temp, "first", "content");

        // Second component's staged file is deliberately missing.
        let store = MemoryStore::new();
        let helm = MockHelm::new();
        let mut opts = DeployOptions::new("unused");
        opts.files_root = Some(temp.path().join("root"));

        let deployer = Deployer {
            store: &store,
            helm: &helm,
            cluster: None,
            cancel: CancellationToken::new(),
            opts,
        };

        let marker = temp.path().join("on-failure-ran");
        let mut broken = file_component("broken", "/opt/b.txt");
        broken.actions.on_deploy.on_failure = vec![zarf_core::schema::Action {
            cmd: Some(format!("touch {}", marker.display())),
            mute: Some(true),
            ..Default::default()
        }];

        let pkg = base_package(vec![
            file_component("first", "/opt/a.txt"),
            broken,
        ]);

        let err = deployer
            .deploy_loaded(pkg, &paths, &mut no_prompt)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PackagerError::ComponentFailed { ref component, .. } if component == "broken"
        ));
        assert!(marker.is_file());

        // The partial record survived: first Succeeded, broken Failed.
        let record = store.get_package("demo").await.unwrap();
        assert_eq!(record.component("first").unwrap().status, ComponentStatus::Succeeded);
        assert_eq!(record.component("broken").unwrap().status, ComponentStatus::Failed);
    }

    #[tokio::test]
    async fn set_variables_flow_between_components() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("pkg");
        let paths = PackagePaths::new(&base);
        std::fs::create_dir_all(paths.components_dir()).unwrap();

        let mut producer = Component {
            name: "producer".to_string(),
            required: true,
            ..Default::default()
        };
        producer.actions.on_deploy.after = vec![zarf_core::schema::Action {
            cmd: Some("echo produced-value".to_string()),
            mute: Some(true),
            set_variables: vec![zarf_core::schema::SetVariable {
                name: "PRODUCED".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }];

        let marker = temp.path().join("consumed");
        let mut consumer = Component {
            name: "consumer".to_string(),
            required: true,
            ..Default::default()
        };
        consumer.actions.on_deploy.before = vec![zarf_core::schema::Action {
            cmd: Some(format!(
                "test \"$ZARF_VAR_PRODUCED\" = produced-value && touch {}",
                marker.display()
            )),
            mute: Some(true),
            ..Default::default()
        }];

        let store = MemoryStore::new();
        let helm = MockHelm::new();
        let deployer = Deployer {
            store: &store,
            helm: &helm,
            cluster: None,
            cancel: CancellationToken::new(),
            opts: DeployOptions::new("unused"),
        };

        deployer
            .deploy_loaded(
                base_package(vec![producer, consumer]),
                &paths,
                &mut no_prompt,
            )
            .await
            .unwrap();
        assert!(marker.is_file());
    }

    #[test]
    fn selection_honors_required_default_and_groups() {
        let mk = |name: &str| Component {
            name: name.to_string(),
            ..Default::default()
        };

        let mut required = mk("required");
        required.required = true;
        let mut optional = mk("optional");
        optional.default = false;
        let mut defaulted = mk("defaulted");
        defaulted.default = true;
        let mut group_a = mk("group-a");
        group_a.group = "choice".to_string();
        group_a.default = true;
        let mut group_b = mk("group-b");
        group_b.group = "choice".to_string();

        let pkg = base_package(vec![required, optional, defaulted, group_a, group_b]);

        let selected = select_components(&pkg, &[]).unwrap();
        let names: Vec<_> = selected.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["required", "defaulted", "group-a"]);

        // Explicit selection swaps the group member and adds the optional.
        let selected = select_components(
            &pkg,
            &["optional".to_string(), "group-b".to_string()],
        )
        .unwrap();
        let names: Vec<_> = selected.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"optional"));
        assert!(names.contains(&"group-b"));
        assert!(!names.contains(&"group-a"));

        assert!(matches!(
            select_components(&pkg, &["missing".to_string()]),
            Err(PackagerError::UnknownComponent(_))
        ));
    }

    #[test]
    fn arch_constrained_components_are_filtered() {
        let mut arm_only = Component {
            name: "arm-only".to_string(),
            required: true,
            ..Default::default()
        };
        arm_only.only.cluster.architecture = "arm64".to_string();

        let pkg = base_package(vec![arm_only]);
        let selected = select_components(&pkg, &[]).unwrap();
        assert!(selected.is_empty());
    }

    #[tokio::test]
    async fn chart_component_records_installed_charts() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("pkg");
        let paths = PackagePaths::new(&base);
        std::fs::create_dir_all(paths.components_dir()).unwrap();

        // Stage a component with a chart tarball.
        let staging = temp.path().join("staging");
        std::fs::create_dir_all(staging.join("charts")).unwrap();
        std::fs::write(staging.join("charts/podinfo-6.4.0.tgz"), b"tgz").unwrap();
        zarf_core::archive::tar_directory(&staging, &paths.component_tar("app")).unwrap();

        let component = Component {
            name: "app".to_string(),
            required: true,
            charts: vec![Chart {
                name: "podinfo".to_string(),
                version: "6.4.0".to_string(),
                url: "https://stefanprodan.github.io/podinfo".to_string(),
                namespace: "apps".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        let store = MemoryStore::with_state(PackageState::default());
        let helm = MockHelm::new();
        let deployer = Deployer {
            store: &store,
            helm: &helm,
            cluster: None,
            cancel: CancellationToken::new(),
            opts: DeployOptions::new("unused"),
        };

        let record = deployer
            .deploy_loaded(base_package(vec![component]), &paths, &mut no_prompt)
            .await
            .unwrap();

        assert_eq!(helm.recorded(), vec!["install podinfo"]);
        assert_eq!(
            record.component("app").unwrap().installed_charts,
            vec![InstalledChart {
                namespace: "apps".to_string(),
                chart_name: "podinfo".to_string(),
            }]
        );
    }
}
