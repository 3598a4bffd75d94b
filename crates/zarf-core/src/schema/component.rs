//! Component payload types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Actions;

/// A named, declaratively specified unit of payload within a package
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component name, a lowercase DNS-1035 label
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Deploy without asking; mutually exclusive with `default` and `group`
    #[serde(default, skip_serializing_if = "is_false")]
    pub required: bool,

    /// Pre-selected when prompting; mutually exclusive with `required`
    #[serde(default, skip_serializing_if = "is_false")]
    pub default: bool,

    /// Selection group this component belongs to
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub group: String,

    /// Platform constraints limiting where this component applies
    #[serde(default, skip_serializing_if = "Only::is_empty")]
    pub only: Only,

    /// Another component definition to compose into this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import: Option<Import>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<Chart>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manifests: Vec<Manifest>,

    /// Container image references to pull and re-push in-cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,

    /// Git repository URLs (optionally `url@ref`) to mirror in-cluster
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repos: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<File>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_injections: Vec<DataInjection>,

    #[serde(default, skip_serializing_if = "Actions::is_empty")]
    pub actions: Actions,

    /// Deprecated shell hooks, folded into `actions` by migration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<DeprecatedScripts>,
}

/// Legacy shell hook lists superseded by action sets
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedScripts {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub retry: bool,

    #[serde(default, skip_serializing_if = "is_false")]
    pub show_output: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl Component {
    /// A component requires the cluster if it carries anything that must be
    /// pushed or applied there; pure-file and pure-action components do not.
    pub fn requires_cluster(&self) -> bool {
        !self.charts.is_empty()
            || !self.images.is_empty()
            || !self.repos.is_empty()
            || !self.manifests.is_empty()
            || !self.data_injections.is_empty()
    }

    /// The component name to look for when following an import
    pub fn import_name(&self) -> &str {
        match &self.import {
            Some(import) if !import.component_name.is_empty() => &import.component_name,
            _ => &self.name,
        }
    }

    /// Whether this component is compatible with the given architecture
    pub fn satisfies_arch(&self, arch: &str) -> bool {
        self.only.cluster.architecture.is_empty() || self.only.cluster.architecture == arch
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Platform constraints for a component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Only {
    /// Restrict to a local operating system (linux, darwin, windows)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_o_s: String,

    #[serde(default, skip_serializing_if = "OnlyCluster::is_empty")]
    pub cluster: OnlyCluster,
}

impl Only {
    pub fn is_empty(&self) -> bool {
        self.local_o_s.is_empty() && self.cluster.is_empty()
    }
}

/// Cluster-side platform constraints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlyCluster {
    /// Restrict to a node architecture (amd64, arm64)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,

    /// Restrict to specific distributions (k3s, eks, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub distros: Vec<String>,
}

impl OnlyCluster {
    pub fn is_empty(&self) -> bool {
        self.architecture.is_empty() && self.distros.is_empty()
    }
}

/// Reference to another component definition to compose in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Import {
    /// Local directory containing the referenced package file
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// OCI reference to a published skeleton package
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// Name of the component to pick; defaults to the importing component's name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component_name: String,
}

/// A Helm chart carried by a component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    /// Chart name, at most 40 characters
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Chart version to fetch; required
    #[serde(default)]
    pub version: String,

    /// HTTP(S) Helm repository, OCI reference, or git URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// Path to a chart directory on disk; exactly one of url/localPath
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_path: String,

    /// Path within a git repository when `url` is a git URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub git_path: String,

    /// Helm release name; falls back to the chart name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values_files: Vec<String>,

    /// Connect-string shortcuts exposed by this chart
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub connect: BTreeMap<String, ConnectString>,
}

impl Chart {
    /// Effective Helm release name
    pub fn release_name(&self) -> &str {
        if self.release_name.is_empty() {
            &self.name
        } else {
            &self.release_name
        }
    }
}

/// A named shortcut end users can open a port-forward through
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectString {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

/// Raw Kubernetes manifests carried by a component
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest set name, at most 40 characters
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kustomizations: Vec<String>,
}

/// A file to place on the host at deploy time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// URL to download or local path to copy
    pub source: String,

    /// Absolute destination path on the deploy host
    pub target: String,

    /// Expected sha256 of the fetched file; mismatch aborts the fetch
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub shasum: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub executable: bool,

    /// Additional paths symlinked to the target after placement
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub symlinks: Vec<String>,
}

/// Data copied into a running pod once its target is Ready
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInjection {
    /// Directory or file to archive at create time
    pub source: String,

    pub target: DataInjectionTarget,

    /// Also compress the data stream during injection
    #[serde(default, skip_serializing_if = "is_false")]
    pub compress: bool,
}

/// Pod selector and in-container path for a data injection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInjectionTarget {
    pub namespace: String,

    /// Label selector matching the target pod(s)
    pub selector: String,

    /// Container to inject into; defaults to the first container
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub container: String,

    /// Destination path inside the container
    pub path: String,
}
