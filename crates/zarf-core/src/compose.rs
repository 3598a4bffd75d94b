//! Import chain resolution and component composition
//!
//! Each top-level component may import another component definition, which
//! may import another in turn. The chain is held in an arena of nodes
//! indexed by position, with prev/next as optional indices, so it can be
//! walked in either direction and inspected in tests without cyclic
//! ownership.
//!
//! Composition starts at the tail (the deepest import) and folds back to
//! the head: scalars from nodes closer to the head win, resource lists
//! union by identity, and every path is rewritten relative to the head's
//! directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::layout::ZARF_YAML;
use crate::schema::{
    migrations, validate, ActionSet, Chart, Component, Constant, Manifest, Package, Variable,
};

/// Resolves an `oci://` skeleton import to a local directory.
///
/// The engine's OCI client implements this; tests stub it out.
pub trait SkeletonFetcher {
    /// Fetch the skeleton for `url` into the cache and return the directory
    /// holding the extracted component definition.
    fn fetch_skeleton(&mut self, url: &str, component_name: &str) -> Result<PathBuf>;
}

/// A fetcher for contexts where remote imports are not allowed to occur
pub struct NoRemote;

impl SkeletonFetcher for NoRemote {
    fn fetch_skeleton(&mut self, url: &str, _component_name: &str) -> Result<PathBuf> {
        Err(CoreError::ImportChain(format!(
            "remote import of {url:?} is not supported in this context"
        )))
    }
}

/// One link of the import chain
#[derive(Debug, Clone)]
pub struct ImportNode {
    pub component: Component,

    /// Directory of this node's package file, relative to the head's
    pub relative_to_head: String,

    /// Variables declared by this node's package file
    pub vars: Vec<Variable>,

    /// Constants declared by this node's package file
    pub consts: Vec<Constant>,

    pub prev: Option<usize>,
    pub next: Option<usize>,
}

/// The resolved chain for one top-level component
#[derive(Debug)]
pub struct ImportChain {
    nodes: Vec<ImportNode>,
}

impl ImportChain {
    /// Follow a component's imports down to the first component that
    /// imports nothing, loading each package file along the way.
    pub fn build(
        head: Component,
        arch: &str,
        base_dir: &Path,
        fetcher: &mut dyn SkeletonFetcher,
    ) -> Result<Self> {
        if arch.is_empty() {
            return Err(CoreError::ImportChain(
                "architecture must be provided to resolve imports".to_string(),
            ));
        }

        let mut chain = ImportChain { nodes: Vec::new() };
        chain.push(head, ".".to_string(), Vec::new(), Vec::new());

        let mut history: Vec<String> = Vec::new();
        let mut index = 0;

        loop {
            let node = &chain.nodes[index];
            let Some(import) = node.component.import.clone() else {
                return Ok(chain);
            };

            validate::import_definition(&node.component.name, &import)?;

            let is_remote = !import.url.is_empty();

            // A component that arrived via a remote import may not import
            // anything further, local or remote.
            if let Some(prev) = node.prev {
                let prev_import = chain.nodes[prev].component.import.as_ref();
                if prev_import.is_some_and(|i| !i.url.is_empty()) {
                    return Err(CoreError::ImportChain(
                        "remote components may not import other components".to_string(),
                    ));
                }
            }

            let wanted = node.component.import_name().to_string();

            let (pkg, relative_to_head) = if is_remote {
                let dir = fetcher.fetch_skeleton(&import.url, &wanted)?;
                let pkg = read_package(&dir.join(ZARF_YAML))?;
                let rel = dir
                    .strip_prefix(base_dir)
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|_| dir.to_string_lossy().to_string());
                (pkg, rel)
            } else {
                history.push(import.path.clone());
                let relative_to_head = normalize_join(&history);

                for prior in chain.nodes.iter().take(index + 1) {
                    if prior.relative_to_head == relative_to_head {
                        return Err(CoreError::ImportChain(format!(
                            "circular import detected: {}",
                            history.join(" -> ")
                        )));
                    }
                }

                let pkg_path = base_dir.join(&relative_to_head).join(ZARF_YAML);
                let pkg = read_package(&pkg_path)?;
                (pkg, relative_to_head)
            };

            let mut found: Vec<Component> = pkg
                .components
                .into_iter()
                .filter(|c| c.name == wanted && c.satisfies_arch(arch))
                .collect();

            let origin = if is_remote {
                import.url.clone()
            } else {
                relative_to_head.clone()
            };
            match found.len() {
                0 => {
                    return Err(CoreError::ImportChain(format!(
                        "component {wanted:?} not found in {origin:?}"
                    )))
                }
                1 => {}
                _ => {
                    return Err(CoreError::ImportChain(format!(
                        "multiple components named {wanted:?} in {origin:?} satisfy {arch:?}"
                    )))
                }
            }

            chain.push(
                found.remove(0),
                relative_to_head,
                pkg.variables,
                pkg.constants,
            );
            index += 1;
        }
    }

    fn push(
        &mut self,
        component: Component,
        relative_to_head: String,
        vars: Vec<Variable>,
        consts: Vec<Constant>,
    ) {
        let id = self.nodes.len();
        if let Some(last) = self.nodes.last_mut() {
            last.next = Some(id);
        }
        self.nodes.push(ImportNode {
            component,
            relative_to_head,
            vars,
            consts,
            prev: id.checked_sub(1),
            next: None,
        });
    }

    pub fn head(&self) -> &ImportNode {
        &self.nodes[0]
    }

    pub fn tail(&self) -> &ImportNode {
        self.nodes.last().expect("chain always has a head")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Run the deprecation migrations over every node, returning warnings
    pub fn migrate(&mut self) -> Vec<String> {
        let mut warnings = Vec::new();
        for node in &mut self.nodes {
            let (migrated, w) = migrations::migrate_component(node.component.clone());
            node.component = migrated;
            warnings.extend(w);
        }
        if !warnings.is_empty() {
            warnings.push(format!(
                "migrations were performed while composing {:?}",
                self.nodes[0].component.name
            ));
        }
        warnings
    }

    /// Fold the chain into a single component.
    ///
    /// A chain of one node composes to that node's component unchanged.
    pub fn compose(&self) -> Result<Component> {
        let tail = self.tail();
        if tail.prev.is_none() {
            return Ok(tail.component.clone());
        }

        let mut composed = Component::default();

        // Walk tail -> head so nodes closer to the head override.
        let mut cursor = Some(self.nodes.len() - 1);
        while let Some(id) = cursor {
            let node = &self.nodes[id];
            let mut current = node.component.clone();
            fix_paths(&mut current, &node.relative_to_head);

            override_metadata(&mut composed, &current);
            override_resources(&mut composed, current.clone());
            override_actions(&mut composed, &current);

            cursor = node.prev;
        }

        composed.import = None;
        Ok(composed)
    }

    /// Merge package variables along the chain; earlier (closer-to-head)
    /// declarations win on name collisions.
    pub fn merge_variables(&self, existing: &[Variable]) -> Vec<Variable> {
        let mut merged: Vec<Variable> = existing.to_vec();
        for node in &self.nodes {
            for var in &node.vars {
                if !merged.iter().any(|v| v.name == var.name) {
                    merged.push(var.clone());
                }
            }
        }
        merged
    }

    /// Merge package constants along the chain, head declarations winning
    pub fn merge_constants(&self, existing: &[Constant]) -> Vec<Constant> {
        let mut merged: Vec<Constant> = existing.to_vec();
        for node in &self.nodes {
            for constant in &node.consts {
                if !merged.iter().any(|c| c.name == constant.name) {
                    merged.push(constant.clone());
                }
            }
        }
        merged
    }

    /// Human-readable description of what imports what
    pub fn describe(&self) -> String {
        let head = &self.nodes[0];
        if head.next.is_none() {
            return format!("component {:?} imports nothing", head.component.name);
        }

        let mut out = String::new();
        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(import) = &node.component.import else {
                break;
            };
            let origin = if import.path.is_empty() {
                &import.url
            } else {
                &import.path
            };
            if idx == 0 {
                out.push_str(&format!(
                    "component {:?} imports {:?} in {origin}",
                    node.component.name,
                    node.component.import_name()
                ));
            } else {
                out.push_str(&format!(
                    ", which imports {:?} in {origin}",
                    node.component.import_name()
                ));
            }
        }
        out
    }
}

fn read_package(path: &Path) -> Result<Package> {
    if !path.is_file() {
        return Err(CoreError::PackageNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Join and normalize a stack of relative import paths, resolving `.` and
/// `..` segments lexically.
fn normalize_join(history: &[String]) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for part in history {
        for seg in part.split('/') {
            match seg {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        segments.push("..");
                    }
                }
                other => segments.push(other),
            }
        }
    }
    if segments.is_empty() {
        ".".to_string()
    } else {
        segments.join("/")
    }
}

fn rebase(path: &str, relative_to_head: &str) -> String {
    if path.is_empty() || path.contains("://") || relative_to_head == "." {
        return path.to_string();
    }
    normalize_join(&[relative_to_head.to_string(), path.to_string()])
}

/// Rewrite every path field of a component to be relative to the head
fn fix_paths(component: &mut Component, relative_to_head: &str) {
    for chart in &mut component.charts {
        if !chart.local_path.is_empty() {
            chart.local_path = rebase(&chart.local_path, relative_to_head);
        }
        for values in &mut chart.values_files {
            *values = rebase(values, relative_to_head);
        }
    }
    for manifest in &mut component.manifests {
        for file in &mut manifest.files {
            *file = rebase(file, relative_to_head);
        }
        for kustomization in &mut manifest.kustomizations {
            *kustomization = rebase(kustomization, relative_to_head);
        }
    }
    for file in &mut component.files {
        file.source = rebase(&file.source, relative_to_head);
    }
    for injection in &mut component.data_injections {
        injection.source = rebase(&injection.source, relative_to_head);
    }
}

fn override_metadata(composed: &mut Component, current: &Component) {
    if !current.name.is_empty() {
        composed.name = current.name.clone();
    }
    if current.description.is_some() {
        composed.description = current.description.clone();
    }
    composed.required = current.required;
    composed.default = current.default;
    if !current.group.is_empty() {
        composed.group = current.group.clone();
    }
    if !current.only.local_o_s.is_empty() {
        composed.only.local_o_s = current.only.local_o_s.clone();
    }
    if !current.only.cluster.architecture.is_empty() {
        composed.only.cluster.architecture = current.only.cluster.architecture.clone();
    }
    composed
        .only
        .cluster
        .distros
        .extend(current.only.cluster.distros.iter().cloned());
}

fn override_resources(composed: &mut Component, current: Component) {
    // Images and repos union by their raw string identity.
    let mut seen: BTreeSet<String> = composed.images.iter().cloned().collect();
    for image in current.images {
        if seen.insert(image.clone()) {
            composed.images.push(image);
        }
    }
    let mut seen: BTreeSet<String> = composed.repos.iter().cloned().collect();
    for repo in current.repos {
        if seen.insert(repo.clone()) {
            composed.repos.push(repo);
        }
    }

    composed.files.extend(current.files);
    composed.data_injections.extend(current.data_injections);

    for chart in current.charts {
        match composed.charts.iter_mut().find(|c| c.name == chart.name) {
            Some(existing) => merge_chart(existing, chart),
            None => composed.charts.push(chart),
        }
    }

    for manifest in current.manifests {
        match composed
            .manifests
            .iter_mut()
            .find(|m| m.name == manifest.name)
        {
            Some(existing) => merge_manifest(existing, manifest),
            None => composed.manifests.push(manifest),
        }
    }
}

fn merge_chart(existing: &mut Chart, later: Chart) {
    if !later.namespace.is_empty() {
        existing.namespace = later.namespace;
    }
    if !later.version.is_empty() {
        existing.version = later.version;
    }
    if !later.url.is_empty() {
        existing.url = later.url;
        existing.local_path = String::new();
    }
    if !later.local_path.is_empty() {
        existing.local_path = later.local_path;
        existing.url = String::new();
    }
    if !later.git_path.is_empty() {
        existing.git_path = later.git_path;
    }
    if !later.release_name.is_empty() {
        existing.release_name = later.release_name;
    }
    existing.values_files.extend(later.values_files);
    existing.connect.extend(later.connect);
}

fn merge_manifest(existing: &mut Manifest, later: Manifest) {
    if !later.namespace.is_empty() {
        existing.namespace = later.namespace;
    }
    existing.files.extend(later.files);
    existing.kustomizations.extend(later.kustomizations);
}

fn override_actions(composed: &mut Component, current: &Component) {
    merge_action_set(&mut composed.actions.on_create, &current.actions.on_create);
    merge_action_set(&mut composed.actions.on_deploy, &current.actions.on_deploy);
    merge_action_set(&mut composed.actions.on_remove, &current.actions.on_remove);
}

fn merge_action_set(composed: &mut ActionSet, current: &ActionSet) {
    let defaults = &current.defaults;
    if defaults.mute {
        composed.defaults.mute = true;
    }
    if defaults.max_total_seconds.is_some() {
        composed.defaults.max_total_seconds = defaults.max_total_seconds;
    }
    if defaults.max_retries != 0 {
        composed.defaults.max_retries = defaults.max_retries;
    }
    if !defaults.dir.is_empty() {
        composed.defaults.dir = defaults.dir.clone();
    }
    if !defaults.env.is_empty() {
        composed.defaults.env = defaults.env.clone();
    }

    composed.before.extend(current.before.iter().cloned());
    composed.after.extend(current.after.iter().cloned());
    composed.on_success.extend(current.on_success.iter().cloned());
    composed.on_failure.extend(current.on_failure.iter().cloned());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Import;
    use tempfile::TempDir;

    fn write_package(dir: &Path, yaml: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(ZARF_YAML), yaml).unwrap();
    }

    #[test]
    fn chain_of_one_composes_to_itself() {
        let head = Component {
            name: "solo".to_string(),
            images: vec!["alpine:3".to_string()],
            ..Default::default()
        };
        let temp = TempDir::new().unwrap();
        let chain =
            ImportChain::build(head.clone(), "amd64", temp.path(), &mut NoRemote).unwrap();

        assert_eq!(chain.len(), 1);
        let composed = chain.compose().unwrap();
        assert_eq!(composed.images, head.images);
        assert_eq!(
            serde_yaml::to_string(&composed).unwrap(),
            serde_yaml::to_string(&head).unwrap()
        );
    }

    #[test]
    fn local_import_pulls_child_resources() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("sub"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: sub
components:
  - name: demo
    images:
      - alpine:3
"#,
        );

        let head = Component {
            name: "demo".to_string(),
            import: Some(Import {
                path: "./sub".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let chain = ImportChain::build(head, "amd64", temp.path(), &mut NoRemote).unwrap();
        assert_eq!(chain.len(), 2);

        let composed = chain.compose().unwrap();
        assert_eq!(composed.images, vec!["alpine:3"]);
        assert!(composed.import.is_none());
    }

    #[test]
    fn nested_import_paths_are_rebased_to_head() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("sub"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: middle
components:
  - name: demo
    import:
      path: ./sub
"#,
        );
        write_package(
            &temp.path().join("sub/sub"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: deepest
components:
  - name: demo
    files:
      - source: payload.txt
        target: /tmp/payload.txt
"#,
        );

        let head = Component {
            name: "demo".to_string(),
            import: Some(Import {
                path: "./sub".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let chain = ImportChain::build(head, "amd64", temp.path(), &mut NoRemote).unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.tail().relative_to_head, "sub/sub");

        let composed = chain.compose().unwrap();
        assert_eq!(composed.files[0].source, "sub/sub/payload.txt");
    }

    #[test]
    fn circular_import_is_fatal() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("sub"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: sub
components:
  - name: demo
    import:
      path: ../sub
"#,
        );

        let head = Component {
            name: "demo".to_string(),
            import: Some(Import {
                path: "./sub".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = ImportChain::build(head, "amd64", temp.path(), &mut NoRemote).unwrap_err();
        assert!(matches!(err, CoreError::ImportChain(msg) if msg.contains("circular")));
    }

    #[test]
    fn import_selects_by_component_name_and_arch() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("sub"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: sub
components:
  - name: other
    only:
      cluster:
        architecture: arm64
  - name: other
    only:
      cluster:
        architecture: amd64
    images:
      - alpine:3
"#,
        );

        let head = Component {
            name: "demo".to_string(),
            import: Some(Import {
                path: "./sub".to_string(),
                component_name: "other".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let chain = ImportChain::build(head, "amd64", temp.path(), &mut NoRemote).unwrap();
        let composed = chain.compose().unwrap();
        assert_eq!(composed.images, vec!["alpine:3"]);
    }

    #[test]
    fn missing_component_is_fatal() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("sub"),
            "kind: ZarfPackageConfig\nmetadata:\n  name: sub\ncomponents:\n  - name: nope\n",
        );

        let head = Component {
            name: "demo".to_string(),
            import: Some(Import {
                path: "./sub".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(ImportChain::build(head, "amd64", temp.path(), &mut NoRemote).is_err());
    }

    #[test]
    fn head_overrides_scalars_and_appends_lists() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("sub"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: sub
variables:
  - name: CHILD_VAR
components:
  - name: demo
    description: from the child
    images:
      - alpine:3
    charts:
      - name: podinfo
        version: 6.4.0
        url: https://stefanprodan.github.io/podinfo
        valuesFiles:
          - base-values.yaml
"#,
        );

        let head = Component {
            name: "demo".to_string(),
            description: Some("from the head".to_string()),
            images: vec!["nginx:1.25".to_string(), "alpine:3".to_string()],
            charts: vec![Chart {
                name: "podinfo".to_string(),
                version: "6.5.0".to_string(),
                values_files: vec!["override-values.yaml".to_string()],
                ..Default::default()
            }],
            import: Some(Import {
                path: "./sub".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let chain = ImportChain::build(head, "amd64", temp.path(), &mut NoRemote).unwrap();
        let composed = chain.compose().unwrap();

        assert_eq!(composed.description.as_deref(), Some("from the head"));
        // alpine:3 deduplicates, nginx appends
        assert_eq!(composed.images, vec!["alpine:3", "nginx:1.25"]);

        let chart = &composed.charts[0];
        assert_eq!(chart.version, "6.5.0");
        assert_eq!(
            chart.values_files,
            vec!["sub/base-values.yaml", "override-values.yaml"]
        );

        let vars = chain.merge_variables(&[]);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].name, "CHILD_VAR");
    }

    #[test]
    fn compose_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("sub"),
            r#"
kind: ZarfPackageConfig
metadata:
  name: sub
components:
  - name: demo
    images:
      - alpine:3
"#,
        );

        let head = Component {
            name: "demo".to_string(),
            import: Some(Import {
                path: "./sub".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let chain = ImportChain::build(head, "amd64", temp.path(), &mut NoRemote).unwrap();
        let once = chain.compose().unwrap();

        // Composing the already-composed component again is a no-op.
        let rechain =
            ImportChain::build(once.clone(), "amd64", temp.path(), &mut NoRemote).unwrap();
        let twice = rechain.compose().unwrap();
        assert_eq!(
            serde_yaml::to_string(&once).unwrap(),
            serde_yaml::to_string(&twice).unwrap()
        );
    }

    #[test]
    fn normalize_join_cleans_segments() {
        assert_eq!(
            normalize_join(&["./sub".to_string(), "../other".to_string()]),
            "other"
        );
        assert_eq!(
            normalize_join(&["./sub".to_string(), "./sub".to_string()]),
            "sub/sub"
        );
        assert_eq!(normalize_join(&[".".to_string()]), ".");
    }
}
