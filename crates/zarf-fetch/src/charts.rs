//! Helm chart fetcher
//!
//! Three acquisition modes: an HTTP(S) Helm repository (resolved through its
//! `index.yaml`), an `oci://` registry reference, or a git repository whose
//! working tree carries the chart. Local chart directories are packaged
//! directly. Every mode lands a `<name>-<version>.tgz` in the component's
//! charts directory; values files are copied alongside, indexed by position.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};
use serde::Deserialize;

use zarf_core::schema::Chart;

use crate::credentials::DockerConfig;
use crate::error::{FetchError, Result};
use crate::http;
use crate::repos;

/// Helm chart media types in OCI registries
pub mod media_types {
    pub const HELM_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
}

/// Parsed subset of a Helm repository `index.yaml`
#[derive(Debug, Deserialize)]
struct RepoIndex {
    #[serde(default)]
    entries: BTreeMap<String, Vec<IndexEntry>>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    version: String,
    #[serde(default)]
    urls: Vec<String>,
}

/// Fetches charts into a component staging tree
pub struct ChartFetcher {
    client: reqwest::Client,
}

impl ChartFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Fetch one chart declaration plus its values files.
    ///
    /// Returns the path of the chart tarball inside `charts_dir`.
    pub async fn fetch(
        &self,
        base_dir: &Path,
        chart: &Chart,
        charts_dir: &Path,
        values_dir: &Path,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(charts_dir)?;

        let tarball = if !chart.local_path.is_empty() {
            package_chart_dir(&base_dir.join(&chart.local_path), chart, charts_dir)?
        } else if chart.url.starts_with("oci://") {
            self.fetch_oci(chart, charts_dir).await?
        } else if chart.url.contains(".git") {
            self.fetch_git(chart, charts_dir)?
        } else if chart.url.starts_with("http://") || chart.url.starts_with("https://") {
            self.fetch_helm_repo(chart, charts_dir).await?
        } else {
            return Err(FetchError::fetch(
                &chart.name,
                format!("unrecognized chart url {:?}", chart.url),
            ));
        };

        self.copy_values_files(base_dir, chart, values_dir)?;
        Ok(tarball)
    }

    /// Resolve a chart through a Helm repository index
    async fn fetch_helm_repo(&self, chart: &Chart, charts_dir: &Path) -> Result<PathBuf> {
        let repo_url = chart.url.trim_end_matches('/');
        let index_url = format!("{repo_url}/index.yaml");

        tracing::debug!(chart = %chart.name, index = %index_url, "resolving chart from helm repo");

        let index_bytes = http::get_bytes(&self.client, &index_url).await?;
        let index: RepoIndex = serde_yaml::from_slice(&index_bytes)?;

        let entry = index
            .entries
            .get(&chart.name)
            .and_then(|versions| versions.iter().find(|e| e.version == chart.version))
            .ok_or_else(|| {
                FetchError::not_found(
                    &chart.name,
                    format!("version {:?} not present in {index_url}", chart.version),
                )
            })?;

        let download_url = entry.urls.first().ok_or_else(|| {
            FetchError::not_found(&chart.name, "index entry carries no download urls")
        })?;

        let full_url = if download_url.starts_with("http://") || download_url.starts_with("https://")
        {
            download_url.clone()
        } else {
            format!("{repo_url}/{download_url}")
        };

        let dest = charts_dir.join(chart_tarball_name(chart));
        http::download_file(&self.client, &full_url, &dest, None).await?;
        Ok(dest)
    }

    /// Pull a chart published as an OCI artifact
    async fn fetch_oci(&self, chart: &Chart, charts_dir: &Path) -> Result<PathBuf> {
        let reference_str = format!(
            "{}:{}",
            chart.url.trim_start_matches("oci://").trim_end_matches('/'),
            chart.version
        );
        let reference: Reference = reference_str.parse()?;

        let docker_config = DockerConfig::load_default()?;
        let auth = docker_config
            .auth_for(reference.registry())
            .unwrap_or(RegistryAuth::Anonymous);

        let client = Client::new(ClientConfig {
            protocol: ClientProtocol::Https,
            ..Default::default()
        });

        let image = client
            .pull(
                &reference,
                &auth,
                vec![media_types::HELM_CONFIG, media_types::HELM_CONTENT],
            )
            .await?;

        let layer = image
            .layers
            .iter()
            .find(|l| l.media_type == media_types::HELM_CONTENT)
            .ok_or_else(|| {
                FetchError::not_found(&reference_str, "no chart content layer in manifest")
            })?;

        let dest = charts_dir.join(chart_tarball_name(chart));
        std::fs::write(&dest, &layer.data)?;
        Ok(dest)
    }

    /// Clone the chart's git repository and package the chart directory
    fn fetch_git(&self, chart: &Chart, charts_dir: &Path) -> Result<PathBuf> {
        let temp = tempfile::tempdir()?;
        let clone = repos::mirror(&chart.url, temp.path())?;

        let chart_dir = if chart.git_path.is_empty() {
            clone.clone()
        } else {
            clone.join(&chart.git_path)
        };

        if !chart_dir.join("Chart.yaml").is_file() {
            return Err(FetchError::not_found(
                &chart.name,
                format!("no Chart.yaml under {:?} in {}", chart.git_path, chart.url),
            ));
        }

        package_chart_dir(&chart_dir, chart, charts_dir)
    }

    fn copy_values_files(&self, base_dir: &Path, chart: &Chart, values_dir: &Path) -> Result<()> {
        if chart.values_files.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(values_dir)?;

        for (idx, values) in chart.values_files.iter().enumerate() {
            let dest = values_dir.join(values_file_name(chart, idx));
            let src = base_dir.join(values);
            if !src.is_file() {
                return Err(FetchError::not_found(
                    values,
                    "chart values file does not exist",
                ));
            }
            std::fs::copy(&src, &dest)?;
        }
        Ok(())
    }
}

impl Default for ChartFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// `<name>-<version>.tgz`, the tarball name every mode produces
pub fn chart_tarball_name(chart: &Chart) -> String {
    format!("{}-{}.tgz", chart.name, chart.version)
}

/// `<name>-<idx>`, the staged name of a chart's values file
pub fn values_file_name(chart: &Chart, index: usize) -> String {
    format!("{}-{index}", chart.name)
}

/// Package a chart directory into `<name>-<version>.tgz` with the chart
/// name as the archive's root folder, matching the layout `helm package`
/// produces.
pub fn package_chart_dir(src: &Path, chart: &Chart, charts_dir: &Path) -> Result<PathBuf> {
    if !src.join("Chart.yaml").is_file() {
        return Err(FetchError::not_found(
            &chart.name,
            format!("no Chart.yaml in {}", src.display()),
        ));
    }

    std::fs::create_dir_all(charts_dir)?;
    let dest = charts_dir.join(chart_tarball_name(chart));

    let file = std::fs::File::create(&dest)?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(&chart.name, src)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;

    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chart_decl(name: &str, version: &str) -> Chart {
        Chart {
            name: name.to_string(),
            version: version.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn tarball_and_values_names() {
        let chart = chart_decl("podinfo", "6.4.0");
        assert_eq!(chart_tarball_name(&chart), "podinfo-6.4.0.tgz");
        assert_eq!(values_file_name(&chart, 0), "podinfo-0");
        assert_eq!(values_file_name(&chart, 2), "podinfo-2");
    }

    #[test]
    fn packages_local_chart_directory() {
        let temp = TempDir::new().unwrap();
        let chart_dir = temp.path().join("mychart");
        std::fs::create_dir_all(chart_dir.join("templates")).unwrap();
        std::fs::write(
            chart_dir.join("Chart.yaml"),
            "apiVersion: v2\nname: mychart\nversion: 0.1.0\n",
        )
        .unwrap();
        std::fs::write(
            chart_dir.join("templates/cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\n",
        )
        .unwrap();

        let chart = chart_decl("mychart", "0.1.0");
        let out = package_chart_dir(&chart_dir, &chart, &temp.path().join("charts")).unwrap();
        assert!(out.to_string_lossy().ends_with("mychart-0.1.0.tgz"));

        // The tarball root folder is the chart name.
        let file = std::fs::File::open(&out).unwrap();
        let gz = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(gz);
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(paths.iter().any(|p| p == "mychart/Chart.yaml"));
    }

    #[test]
    fn missing_chart_yaml_is_fatal() {
        let temp = TempDir::new().unwrap();
        let chart_dir = temp.path().join("empty");
        std::fs::create_dir_all(&chart_dir).unwrap();

        let chart = chart_decl("empty", "0.1.0");
        assert!(package_chart_dir(&chart_dir, &chart, &temp.path().join("charts")).is_err());
    }

    #[test]
    fn index_parsing_finds_versions() {
        let yaml = r#"
apiVersion: v1
entries:
  podinfo:
    - version: 6.4.0
      urls:
        - podinfo-6.4.0.tgz
    - version: 6.3.0
      urls:
        - podinfo-6.3.0.tgz
"#;
        let index: RepoIndex = serde_yaml::from_str(yaml).unwrap();
        let entry = index.entries["podinfo"]
            .iter()
            .find(|e| e.version == "6.4.0")
            .unwrap();
        assert_eq!(entry.urls[0], "podinfo-6.4.0.tgz");
    }
}
