//! Package and component invariant checks
//!
//! Everything here runs before any I/O; failures surface as
//! [`CoreError::Validation`] with the offending field path.

use std::collections::{HashMap, HashSet};

use crate::error::{CoreError, Result};

use super::{Chart, Component, Manifest, Package, PackageKind};

/// Maximum length for chart and manifest set names
pub const MAX_CHART_NAME_LENGTH: usize = 40;

/// Validate a fully composed package
pub fn package(pkg: &Package) -> Result<()> {
    if !is_lowercase_name(&pkg.metadata.name) {
        return Err(CoreError::validation(
            "metadata.name",
            format!(
                "package name {:?} must match ^[a-z0-9][a-z0-9-]*$",
                pkg.metadata.name
            ),
        ));
    }

    if pkg.components.is_empty() {
        return Err(CoreError::validation(
            "components",
            "package must define at least one component",
        ));
    }

    if pkg.kind == PackageKind::ZarfInitConfig && pkg.metadata.yolo {
        return Err(CoreError::validation(
            "metadata.yolo",
            "init packages cannot be created in YOLO mode",
        ));
    }

    let mut names = HashSet::new();
    let mut group_defaults: HashMap<&str, &str> = HashMap::new();
    let mut group_sizes: HashMap<&str, usize> = HashMap::new();

    for c in &pkg.components {
        if !names.insert(c.name.as_str()) {
            return Err(CoreError::validation(
                format!("components.{}", c.name),
                "component names must be unique",
            ));
        }

        component(c)?;

        if pkg.metadata.yolo {
            yolo_component(c)?;
        }

        if !c.group.is_empty() {
            *group_sizes.entry(c.group.as_str()).or_default() += 1;
            if c.default {
                if let Some(existing) = group_defaults.insert(c.group.as_str(), c.name.as_str()) {
                    return Err(CoreError::validation(
                        format!("components.{}.default", c.name),
                        format!(
                            "group {:?} already has a default component {:?}",
                            c.group, existing
                        ),
                    ));
                }
            }
        }
    }

    for (group, size) in group_sizes {
        if size < 2 {
            return Err(CoreError::validation(
                format!("components.<group:{group}>"),
                "component groups must contain at least two components",
            ));
        }
    }

    for variable in &pkg.variables {
        if !is_upper_name(&variable.name) {
            return Err(CoreError::validation(
                format!("variables.{}", variable.name),
                "variable names must be uppercase with underscores",
            ));
        }
    }

    for constant in &pkg.constants {
        if !is_upper_name(&constant.name) {
            return Err(CoreError::validation(
                format!("constants.{}", constant.name),
                "constant names must be uppercase with underscores",
            ));
        }
    }

    Ok(())
}

/// Validate a single component's own invariants
pub fn component(c: &Component) -> Result<()> {
    if !is_lowercase_name(&c.name) {
        return Err(CoreError::validation(
            format!("components.{}.name", c.name),
            "component name must be a lowercase DNS-1035 label",
        ));
    }

    if c.required && c.default {
        return Err(CoreError::validation(
            format!("components.{}", c.name),
            "component cannot be both required and default",
        ));
    }

    if c.required && !c.group.is_empty() {
        return Err(CoreError::validation(
            format!("components.{}", c.name),
            "component cannot be both required and grouped",
        ));
    }

    for chart in &c.charts {
        chart_definition(&c.name, chart)?;
    }

    for manifest in &c.manifests {
        manifest_definition(&c.name, manifest)?;
    }

    // setVariable capture only makes sense while a deploy is in flight
    for set in [&c.actions.on_create, &c.actions.on_remove] {
        if set.all().any(|a| !a.set_variables.is_empty()) {
            return Err(CoreError::validation(
                format!("components.{}.actions", c.name),
                "setVariables is only permitted in onDeploy action sets",
            ));
        }
    }

    if let Some(import) = &c.import {
        import_definition(&c.name, import)?;
    }

    Ok(())
}

/// Validate an import reference before chasing it
pub fn import_definition(component_name: &str, import: &super::Import) -> Result<()> {
    let path_set = !import.path.is_empty();
    let url_set = !import.url.is_empty();

    if path_set == url_set {
        return Err(CoreError::validation(
            format!("components.{component_name}.import"),
            "import must set exactly one of path or url",
        ));
    }

    if url_set && !import.url.starts_with("oci://") {
        return Err(CoreError::validation(
            format!("components.{component_name}.import.url"),
            "import url must be an oci:// reference",
        ));
    }

    Ok(())
}

fn chart_definition(component_name: &str, chart: &Chart) -> Result<()> {
    let field = format!("components.{component_name}.charts.{}", chart.name);

    if chart.name.is_empty() {
        return Err(CoreError::validation(field, "chart name is required"));
    }

    if chart.name.len() > MAX_CHART_NAME_LENGTH {
        return Err(CoreError::validation(
            field,
            format!("chart name exceeds {MAX_CHART_NAME_LENGTH} characters"),
        ));
    }

    if chart.version.is_empty() {
        return Err(CoreError::validation(
            format!("{field}.version"),
            "chart version is required",
        ));
    }

    let url_set = !chart.url.is_empty();
    let local_set = !chart.local_path.is_empty();
    if url_set == local_set {
        return Err(CoreError::validation(
            field,
            "chart must set exactly one of url or localPath",
        ));
    }

    if !is_dns1035(chart.release_name()) {
        return Err(CoreError::validation(
            format!("{field}.releaseName"),
            format!(
                "release name {:?} must be a DNS-1035 label",
                chart.release_name()
            ),
        ));
    }

    Ok(())
}

fn manifest_definition(component_name: &str, manifest: &Manifest) -> Result<()> {
    let field = format!("components.{component_name}.manifests.{}", manifest.name);

    if manifest.name.len() > MAX_CHART_NAME_LENGTH {
        return Err(CoreError::validation(
            field,
            format!("manifest name exceeds {MAX_CHART_NAME_LENGTH} characters"),
        ));
    }

    if manifest.files.is_empty() && manifest.kustomizations.is_empty() {
        return Err(CoreError::validation(
            field,
            "manifest must list at least one file or kustomization",
        ));
    }

    Ok(())
}

fn yolo_component(c: &Component) -> Result<()> {
    let field = format!("components.{}", c.name);

    if !c.images.is_empty() {
        return Err(CoreError::validation(
            field,
            "YOLO packages cannot contain images",
        ));
    }
    if !c.repos.is_empty() {
        return Err(CoreError::validation(
            field,
            "YOLO packages cannot contain git repos",
        ));
    }
    if !c.only.cluster.architecture.is_empty() {
        return Err(CoreError::validation(
            format!("{field}.only.cluster.architecture"),
            "YOLO packages cannot constrain cluster architecture",
        ));
    }
    if !c.only.cluster.distros.is_empty() {
        return Err(CoreError::validation(
            format!("{field}.only.cluster.distros"),
            "YOLO packages cannot constrain cluster distros",
        ));
    }

    Ok(())
}

/// `^[a-z0-9][a-z0-9-]*$` — package and component names
pub fn is_lowercase_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// DNS-1035 label: starts with a letter, ends alphanumeric, dashes inside
pub fn is_dns1035(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    if !bytes[0].is_ascii_lowercase() {
        return false;
    }
    if !bytes[bytes.len() - 1].is_ascii_lowercase() && !bytes[bytes.len() - 1].is_ascii_digit() {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
}

/// `^[A-Z0-9_]+$` — variable and constant names
pub fn is_upper_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
