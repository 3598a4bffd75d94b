//! Package definition schema
//!
//! The `zarf.yaml` document model: package metadata, build record,
//! variables/constants and the component list. Field names serialize in
//! camelCase so emitted files round-trip against the published schema.

mod actions;
mod component;
pub mod migrations;
pub mod validate;

pub use actions::*;
pub use component::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The root document persisted as `zarf.yaml` inside every archive
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    /// Package kind
    #[serde(default)]
    pub kind: PackageKind,

    /// Package metadata
    #[serde(default)]
    pub metadata: Metadata,

    /// Build record, written at create time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildData>,

    /// Components to assemble and deploy, in order
    #[serde(default)]
    pub components: Vec<Component>,

    /// Fixed templating values baked in at create time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constants: Vec<Constant>,

    /// User-promptable templating values resolved at deploy time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,
}

impl Package {
    /// Whether any component in the package requires a cluster connection
    pub fn requires_cluster(&self) -> bool {
        self.components.iter().any(Component::requires_cluster)
    }

    /// Whether this is the cluster-bootstrap init package
    pub fn is_init_config(&self) -> bool {
        self.kind == PackageKind::ZarfInitConfig
    }
}

/// Discriminates init packages from ordinary packages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    /// Bootstraps the in-cluster registry, git server and state secret
    ZarfInitConfig,
    /// An ordinary deployable package
    #[default]
    ZarfPackageConfig,
}

/// Package identity and descriptive metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    /// Package name, a lowercase DNS-1035 label
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Skip archive compression when set
    #[serde(default, skip_serializing_if = "is_false")]
    pub uncompressed: bool,

    /// Target machine architecture (e.g. amd64, arm64)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,

    /// Cluster-less mode: manifests apply as-authored, no images or repos
    #[serde(default, skip_serializing_if = "is_false", rename = "yolo")]
    pub yolo: bool,

    /// sha256 of checksums.txt, set during assembly
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub aggregate_checksum: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Record of how and where a package was assembled
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildData {
    /// Hostname of the machine that ran the assembly
    #[serde(default)]
    pub terminal: String,

    /// Local user that ran the assembly
    #[serde(default)]
    pub user: String,

    /// Architecture the package was built for
    #[serde(default)]
    pub architecture: String,

    /// RFC 3339 creation timestamp
    #[serde(default)]
    pub timestamp: String,

    /// Version of the tool that produced the archive
    #[serde(default)]
    pub version: String,

    /// Names of the migrations applied during assembly
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migrations: Vec<String>,

    /// Registry override map supplied at create time
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub registry_overrides: BTreeMap<String, String>,

    /// Whether this package was created as a differential against a base
    #[serde(default, skip_serializing_if = "is_false")]
    pub differential: bool,

    /// References present in the base package but absent here
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub differential_missing: Vec<String>,

    /// Version of the base package a differential was computed against
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub differential_package_version: String,
}

/// A package-level templating value fixed at create time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Constant {
    /// Uppercase-underscore constant name
    pub name: String,

    #[serde(default)]
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional regex the value must match at create time
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pattern: String,
}

/// A package-level templating value resolved at deploy time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Uppercase-underscore variable name
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Ask the user for a value when not supplied
    #[serde(default, skip_serializing_if = "is_false")]
    pub prompt: bool,

    /// Mask the value in logs and prompts
    #[serde(default, skip_serializing_if = "is_false")]
    pub sensitive: bool,

    /// Keep the indentation of multi-line values when templating files
    #[serde(default, skip_serializing_if = "is_false")]
    pub auto_indent: bool,

    /// How the value is interpreted during templating
    #[serde(default, rename = "type")]
    pub kind: VariableType,
}

/// Interpretation of a variable value during file templating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    /// Substitute the value verbatim
    #[default]
    Raw,
    /// Treat the value as a path and substitute the file's contents
    File,
}
