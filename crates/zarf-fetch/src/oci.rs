//! OCI package transport
//!
//! A package is published as an OCI artifact whose layers are the layout
//! files, media-typed by extension. Publishing prefers the artifact
//! manifest; registries that reject it (`400`, `MANIFEST_INVALID`,
//! `UNSUPPORTED`) get an image manifest with a synthesized config blob
//! instead. Pulls are selective: metadata always, component tars and image
//! blobs only for the requested component set, copied with bounded
//! concurrency.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use zarf_core::layout::{self, PackagePaths};
use zarf_core::schema::Package;

use crate::credentials::{resolve_registry_host, DockerConfig};
use crate::error::{FetchError, Result};

/// Default number of concurrent layer transfers
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Media type of the synthesized package config blob
pub const CONFIG_MEDIA_TYPE: &str = "application/vnd.zarf.config.v1+json";

/// OCI artifact manifest media type, preferred on publish
pub const ARTIFACT_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.artifact.manifest.v1+json";

/// OCI image manifest media type, the fallback
pub const IMAGE_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Annotation carrying each layer's relative path
const TITLE_ANNOTATION: &str = "org.opencontainers.image.title";

/// Layer media type derived from a file's extension
pub fn media_type_for(relative_path: &str) -> &'static str {
    if relative_path.ends_with(".tar.zst") {
        "application/vnd.zarf.layer.v1.tar+zstd"
    } else if relative_path.ends_with(".yaml") || relative_path.ends_with(".yml") {
        "application/vnd.zarf.layer.v1.yaml"
    } else if relative_path.ends_with(".json") {
        "application/vnd.zarf.layer.v1.json"
    } else if relative_path.ends_with(".txt") {
        "application/vnd.zarf.layer.v1.txt"
    } else {
        "application/vnd.zarf.layer.v1.blob"
    }
}

/// A blob or layer descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

impl Descriptor {
    fn title(&self) -> Option<&str> {
        self.annotations
            .as_ref()
            .and_then(|a| a.get(TITLE_ANNOTATION))
            .map(String::as_str)
    }
}

/// The parts of a fetched manifest the puller needs
#[derive(Debug, Clone, Deserialize)]
pub struct PackageManifest {
    #[serde(default, rename = "mediaType")]
    pub media_type: String,
    /// Image-manifest layers
    #[serde(default)]
    pub layers: Vec<Descriptor>,
    /// Artifact-manifest blobs
    #[serde(default)]
    pub blobs: Vec<Descriptor>,
}

impl PackageManifest {
    /// Layers regardless of which manifest flavor the registry stored
    pub fn all_layers(&self) -> &[Descriptor] {
        if !self.layers.is_empty() {
            &self.layers
        } else {
            &self.blobs
        }
    }

    /// Locate a layer by its title annotation
    pub fn locate(&self, relative_path: &str) -> Option<&Descriptor> {
        self.all_layers()
            .iter()
            .find(|d| d.title() == Some(relative_path))
    }

    /// Total byte count of the given descriptors, for progress reporting
    pub fn byte_sum(descriptors: &[&Descriptor]) -> u64 {
        descriptors.iter().map(|d| d.size).sum()
    }
}

/// Client for one `oci://` package reference
pub struct OciRemote {
    http: reqwest::Client,
    registry: String,
    repository: String,
    reference: String,
    scheme: &'static str,
    token: Option<String>,
    basic: Option<(String, String)>,
    pub concurrency: usize,
}

impl OciRemote {
    /// Build a client from already-split reference parts
    pub fn from_parts(
        registry: impl Into<String>,
        repository: impl Into<String>,
        reference: impl Into<String>,
        insecure: bool,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            registry: resolve_registry_host(&registry.into()).to_string(),
            repository: repository.into(),
            reference: reference.into(),
            scheme: if insecure { "http" } else { "https" },
            token: None,
            basic: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Use explicit basic credentials instead of the docker config
    pub fn set_basic_auth(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.basic = Some((username.into(), password.into()));
    }

    /// Parse an `oci://registry/repo:tag` reference into a client
    pub fn new(url: &str, insecure: bool) -> Result<Self> {
        let stripped = url
            .strip_prefix("oci://")
            .ok_or_else(|| FetchError::UnknownSource(url.to_string()))?;

        let (registry, rest) = stripped
            .split_once('/')
            .ok_or_else(|| FetchError::UnknownSource(url.to_string()))?;

        let (repository, reference) = match rest.rsplit_once(':') {
            Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), tag.to_string()),
            _ => (rest.to_string(), "latest".to_string()),
        };

        let registry = resolve_registry_host(registry).to_string();
        let basic = DockerConfig::load_default()?.basic_for(&registry)?;

        Ok(Self {
            http: reqwest::Client::new(),
            registry,
            repository,
            reference,
            scheme: if insecure { "http" } else { "https" },
            token: None,
            basic,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    fn url(&self, path: &str) -> String {
        format!("{}://{}/v2/{}/{path}", self.scheme, self.registry, self.repository)
    }

    /// Acquire a bearer token scoped `repository:<repo>:<actions>`
    pub(crate) async fn authenticate(&mut self, actions: &str) -> Result<()> {
        let probe = format!("{}://{}/v2/", self.scheme, self.registry);
        let response = self.http.get(&probe).send().await?;

        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return Ok(());
        }

        let challenge = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let realm = challenge_field(&challenge, "realm").ok_or_else(|| {
            FetchError::fetch(&self.registry, "registry challenge carries no realm")
        })?;
        let service = challenge_field(&challenge, "service").unwrap_or_default();
        let scope = format!("repository:{}:{actions}", self.repository);

        let mut request = self
            .http
            .get(&realm)
            .query(&[("service", service.as_str()), ("scope", scope.as_str())]);
        if let Some((user, pass)) = &self.basic {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(FetchError::fetch(
                &self.registry,
                format!("token exchange failed with {}", response.status()),
            ));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(default)]
            token: String,
            #[serde(default)]
            access_token: String,
        }
        let token: TokenResponse = response.json().await?;
        self.token = Some(if token.token.is_empty() {
            token.access_token
        } else {
            token.token
        });
        Ok(())
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.token, &self.basic) {
            (Some(token), _) => request.bearer_auth(token),
            (None, Some((user, pass))) => request.basic_auth(user, Some(pass)),
            _ => request,
        }
    }

    pub(crate) async fn blob_exists(&self, digest: &str) -> Result<bool> {
        let response = self
            .authorized(self.http.head(self.url(&format!("blobs/{digest}"))))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    pub(crate) async fn push_blob(&self, data: &[u8]) -> Result<Descriptor> {
        let digest = format!("sha256:{}", zarf_core::checksums::sha256_of_bytes(data));

        if !self.blob_exists(&digest).await? {
            let start = self
                .authorized(self.http.post(self.url("blobs/uploads/")))
                .send()
                .await?;
            if !start.status().is_success() {
                return Err(FetchError::fetch(
                    &self.repository,
                    format!("blob upload start failed with {}", start.status()),
                ));
            }

            let location = start
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    FetchError::fetch(&self.repository, "upload start returned no location")
                })?
                .to_string();

            let upload_url = if location.starts_with("http") {
                location
            } else {
                format!("{}://{}{location}", self.scheme, self.registry)
            };
            let separator = if upload_url.contains('?') { '&' } else { '?' };

            let finish = self
                .authorized(
                    self.http
                        .put(format!("{upload_url}{separator}digest={digest}"))
                        .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                        .body(data.to_vec()),
                )
                .send()
                .await?;
            if !finish.status().is_success() {
                return Err(FetchError::fetch(
                    &self.repository,
                    format!("blob upload failed with {}", finish.status()),
                ));
            }
        }

        Ok(Descriptor {
            media_type: String::new(),
            digest,
            size: data.len() as u64,
            annotations: None,
        })
    }

    pub(crate) async fn pull_blob(&self, digest: &str) -> Result<Vec<u8>> {
        let response = self
            .authorized(self.http.get(self.url(&format!("blobs/{digest}"))))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(FetchError::fetch(
                digest,
                format!("blob pull failed with {}", response.status()),
            ));
        }
        Ok(response.bytes().await?.to_vec())
    }

    pub(crate) async fn put_manifest(&self, body: &[u8], media_type: &str) -> Result<()> {
        let response = self
            .authorized(
                self.http
                    .put(self.url(&format!("manifests/{}", self.reference)))
                    .header(reqwest::header::CONTENT_TYPE, media_type)
                    .body(body.to_vec()),
            )
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if is_manifest_rejection(status, &text) {
            Err(FetchError::ManifestRejected {
                reference: format!("{}/{}:{}", self.registry, self.repository, self.reference),
                message: format!("{status}: {text}"),
            })
        } else {
            Err(FetchError::fetch(
                &self.repository,
                format!("manifest push failed with {status}: {text}"),
            ))
        }
    }

    /// Resolve the tag and fetch the root manifest
    pub async fn fetch_manifest(&mut self) -> Result<PackageManifest> {
        self.authenticate("pull").await?;

        let response = self
            .authorized(
                self.http
                    .get(self.url(&format!("manifests/{}", self.reference)))
                    .header(
                        reqwest::header::ACCEPT,
                        format!("{ARTIFACT_MANIFEST_MEDIA_TYPE}, {IMAGE_MANIFEST_MEDIA_TYPE}"),
                    ),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::not_found(
                format!("{}/{}:{}", self.registry, self.repository, self.reference),
                format!("manifest fetch failed with {}", response.status()),
            ));
        }

        Ok(response.json().await?)
    }

    /// Publish a package layout as an OCI artifact.
    ///
    /// Pushes every file as a blob, then the manifest: artifact flavor
    /// first, image flavor with a synthesized config on rejection.
    pub async fn publish(&mut self, paths: &PackagePaths, pkg: &Package) -> Result<()> {
        self.authenticate("pull,push").await?;

        let files = enumerate_layout(paths.base())?;
        let annotations = package_annotations(pkg);

        let mut descriptors = Vec::new();
        for relative in &files {
            let data = std::fs::read(paths.base().join(relative))?;
            tracing::debug!(layer = %relative, bytes = data.len(), "pushing layer");

            let mut descriptor = self.push_blob(&data).await?;
            descriptor.media_type = media_type_for(relative).to_string();
            descriptor.annotations = Some(BTreeMap::from([(
                TITLE_ANNOTATION.to_string(),
                relative.clone(),
            )]));
            descriptors.push(descriptor);
        }

        let artifact_manifest = json!({
            "mediaType": ARTIFACT_MANIFEST_MEDIA_TYPE,
            "artifactType": CONFIG_MEDIA_TYPE,
            "blobs": descriptors,
            "annotations": annotations,
        });

        match self
            .put_manifest(
                &serde_json::to_vec(&artifact_manifest)?,
                ARTIFACT_MANIFEST_MEDIA_TYPE,
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(FetchError::ManifestRejected { reference, message }) => {
                tracing::warn!(%reference, %message, "artifact manifest rejected, falling back to image manifest");
                self.publish_image_manifest(pkg, descriptors, annotations)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn publish_image_manifest(
        &mut self,
        pkg: &Package,
        descriptors: Vec<Descriptor>,
        annotations: BTreeMap<String, String>,
    ) -> Result<()> {
        let config = fallback_config(pkg, &annotations);
        let config_data = serde_json::to_vec(&config)?;
        let mut config_descriptor = self.push_blob(&config_data).await?;
        config_descriptor.media_type = CONFIG_MEDIA_TYPE.to_string();

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": IMAGE_MANIFEST_MEDIA_TYPE,
            "config": config_descriptor,
            "layers": descriptors,
            "annotations": annotations,
        });

        self.put_manifest(&serde_json::to_vec(&manifest)?, IMAGE_MANIFEST_MEDIA_TYPE)
            .await
    }

    /// Pull the metadata entries (`zarf.yaml`, signature, checksums, and
    /// optionally the SBOM tar) into `dest`.
    pub async fn pull_metadata(&mut self, dest: &Path, want_sbom: bool) -> Result<Vec<String>> {
        let manifest = self.fetch_manifest().await?;

        let mut wanted: Vec<&str> = PackagePaths::metadata_entries().to_vec();
        if want_sbom {
            wanted.push(layout::SBOMS_TAR);
        }

        let mut pulled = Vec::new();
        for entry in wanted {
            if let Some(descriptor) = manifest.locate(entry) {
                let data = self.pull_blob(&descriptor.digest).await?;
                let target = dest.join(entry);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, data)?;
                pulled.push(entry.to_string());
            }
        }

        if !pulled.iter().any(|p| p == layout::ZARF_YAML) {
            return Err(FetchError::Core(zarf_core::CoreError::integrity(
                layout::ZARF_YAML,
                "remote package carries no package definition",
            )));
        }

        Ok(pulled)
    }

    /// Pull the layers needed for the requested components into `dest`.
    ///
    /// Metadata layers always transfer. Component tars transfer for the
    /// requested set (all components when the set is empty); the shared
    /// image layout transfers whenever any selected component needs it.
    /// Layer copies run with bounded concurrency.
    pub async fn pull_package(
        &mut self,
        dest: &Path,
        requested_components: &[String],
    ) -> Result<Vec<String>> {
        let manifest = self.fetch_manifest().await?;

        let selected: Vec<&Descriptor> = manifest
            .all_layers()
            .iter()
            .filter(|descriptor| {
                let Some(title) = descriptor.title() else {
                    return false;
                };
                if PackagePaths::metadata_entries().contains(&title)
                    || title == layout::SBOMS_TAR
                {
                    return true;
                }
                if let Some(component) = title
                    .strip_prefix("components/")
                    .and_then(|t| t.strip_suffix(".tar"))
                {
                    return requested_components.is_empty()
                        || requested_components.iter().any(|c| c == component);
                }
                // Everything else (the shared image layout, seed images)
                // rides along with any component selection.
                true
            })
            .collect();

        let total = PackageManifest::byte_sum(&selected);
        tracing::info!(layers = selected.len(), bytes = total, "pulling package layers");

        let titles: Vec<String> = selected
            .iter()
            .filter_map(|d| d.title().map(String::from))
            .collect();

        let remote = &*self;
        stream::iter(selected.into_iter().map(Ok::<_, FetchError>))
            .try_for_each_concurrent(Some(self.concurrency), |descriptor| async move {
                let title = descriptor.title().unwrap_or_default().to_string();
                let data = remote.pull_blob(&descriptor.digest).await?;
                let target = dest.join(&title);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(target, data)?;
                Ok(())
            })
            .await?;

        Ok(titles)
    }

    /// Fetch just the package definition from the remote
    pub async fn fetch_package_definition(&mut self) -> Result<Package> {
        let manifest = self.fetch_manifest().await?;
        let descriptor = manifest.locate(layout::ZARF_YAML).ok_or_else(|| {
            FetchError::Core(zarf_core::CoreError::integrity(
                layout::ZARF_YAML,
                "remote package carries no package definition",
            ))
        })?;
        let data = self.pull_blob(&descriptor.digest).await?;
        Ok(serde_yaml::from_slice(&data)?)
    }

    /// Fetch one component's tar into a content-addressed cache directory
    /// and extract it, returning the extraction directory. Used for
    /// `oci://` skeleton imports.
    pub async fn fetch_component_skeleton(
        &mut self,
        component_name: &str,
        cache_dir: &Path,
    ) -> Result<PathBuf> {
        let manifest = self.fetch_manifest().await?;
        let relative = PackagePaths::component_tar_relative(component_name);

        let dir = match manifest.locate(&relative) {
            Some(descriptor) => {
                let hex_digest = descriptor
                    .digest
                    .strip_prefix("sha256:")
                    .unwrap_or(&descriptor.digest);
                let tarball = cache_dir.join("blobs").join("sha256").join(hex_digest);
                let dir = cache_dir.join("dirs").join(hex_digest);

                if !tarball.is_file() {
                    if let Some(parent) = tarball.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    let data = self.pull_blob(&descriptor.digest).await?;
                    std::fs::write(&tarball, data)?;
                }
                if !dir.join(layout::ZARF_YAML).is_file() {
                    std::fs::create_dir_all(&dir)?;
                    zarf_core::archive::extract(&tarball, &dir)?;
                }
                dir
            }
            None => {
                // Nothing to fetch for a payload-less component; hand back
                // an empty directory keyed by the import identity.
                let id = zarf_core::checksums::sha256_of_bytes(
                    format!("{}/{}:{component_name}", self.registry, self.repository).as_bytes(),
                );
                let dir = cache_dir.join("dirs").join(id);
                std::fs::create_dir_all(&dir)?;
                dir
            }
        };

        // The skeleton definition rides next to the component payload.
        if !dir.join(layout::ZARF_YAML).is_file() {
            let pkg = self.fetch_package_definition().await?;
            std::fs::write(dir.join(layout::ZARF_YAML), serde_yaml::to_string(&pkg)?)?;
        }

        Ok(dir)
    }
}

/// All files under a package base directory, relative, sorted
fn enumerate_layout(base: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(base).sort_by_file_name() {
        let entry = entry.map_err(|e| FetchError::fetch("layout", e.to_string()))?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(base)
                .map_err(|e| FetchError::fetch("layout", e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            files.push(rel);
        }
    }
    Ok(files)
}

/// OCI manifest annotations mirroring package metadata
pub fn package_annotations(pkg: &Package) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "org.opencontainers.image.title".to_string(),
        pkg.metadata.name.clone(),
    );
    if let Some(description) = &pkg.metadata.description {
        annotations.insert(
            "org.opencontainers.image.description".to_string(),
            description.clone(),
        );
    }
    if let Some(url) = &pkg.metadata.url {
        annotations.insert("org.opencontainers.image.url".to_string(), url.clone());
    }
    if let Some(authors) = &pkg.metadata.authors {
        annotations.insert(
            "org.opencontainers.image.authors".to_string(),
            authors.clone(),
        );
    }
    if let Some(documentation) = &pkg.metadata.documentation {
        annotations.insert(
            "org.opencontainers.image.documentation".to_string(),
            documentation.clone(),
        );
    }
    if let Some(source) = &pkg.metadata.source {
        annotations.insert(
            "org.opencontainers.image.source".to_string(),
            source.clone(),
        );
    }
    if let Some(vendor) = &pkg.metadata.vendor {
        annotations.insert(
            "org.opencontainers.image.vendor".to_string(),
            vendor.clone(),
        );
    }
    annotations
}

/// Whether a manifest push response means "this registry does not take
/// artifact manifests", which drives the image-manifest fallback.
fn is_manifest_rejection(status: reqwest::StatusCode, body: &str) -> bool {
    status == reqwest::StatusCode::BAD_REQUEST
        || body.contains("MANIFEST_INVALID")
        || body.contains("UNSUPPORTED")
}

/// The synthesized config blob for the image-manifest fallback
fn fallback_config(pkg: &Package, annotations: &BTreeMap<String, String>) -> serde_json::Value {
    json!({
        "architecture": pkg.build.as_ref().map(|b| b.architecture.clone()).unwrap_or_default(),
        "ociVersion": "1.0.1",
        "annotations": annotations,
    })
}

fn challenge_field(challenge: &str, field: &str) -> Option<String> {
    let marker = format!("{field}=\"");
    let start = challenge.find(&marker)? + marker.len();
    let end = challenge[start..].find('"')? + start;
    Some(challenge[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zarf_core::schema::Metadata;

    #[test]
    fn media_types_by_extension() {
        assert_eq!(
            media_type_for("zarf.yaml"),
            "application/vnd.zarf.layer.v1.yaml"
        );
        assert_eq!(
            media_type_for("checksums.txt"),
            "application/vnd.zarf.layer.v1.txt"
        );
        assert_eq!(
            media_type_for("images/index.json"),
            "application/vnd.zarf.layer.v1.json"
        );
        assert_eq!(
            media_type_for("pkg.tar.zst"),
            "application/vnd.zarf.layer.v1.tar+zstd"
        );
        assert_eq!(
            media_type_for("components/baseline.tar"),
            "application/vnd.zarf.layer.v1.blob"
        );
        assert_eq!(
            media_type_for("images/blobs/sha256/abc"),
            "application/vnd.zarf.layer.v1.blob"
        );
    }

    #[test]
    fn reference_parsing() {
        let remote = OciRemote::new("oci://ghcr.io/org/pkg:1.0.0", false).unwrap();
        assert_eq!(remote.registry, "ghcr.io");
        assert_eq!(remote.repository(), "org/pkg");
        assert_eq!(remote.reference(), "1.0.0");

        let untagged = OciRemote::new("oci://ghcr.io/org/pkg", false).unwrap();
        assert_eq!(untagged.reference(), "latest");

        assert!(OciRemote::new("https://not-oci.example", false).is_err());
    }

    #[test]
    fn docker_io_registry_is_rewritten() {
        let remote = OciRemote::new("oci://docker.io/org/pkg:1.0.0", false).unwrap();
        assert_eq!(remote.registry, "registry-1.docker.io");
    }

    #[test]
    fn manifest_locate_by_title() {
        let manifest = PackageManifest {
            media_type: IMAGE_MANIFEST_MEDIA_TYPE.to_string(),
            layers: vec![Descriptor {
                media_type: "application/vnd.zarf.layer.v1.yaml".to_string(),
                digest: "sha256:abc".to_string(),
                size: 10,
                annotations: Some(BTreeMap::from([(
                    TITLE_ANNOTATION.to_string(),
                    "zarf.yaml".to_string(),
                )])),
            }],
            blobs: Vec::new(),
        };

        assert!(manifest.locate("zarf.yaml").is_some());
        assert!(manifest.locate("missing").is_none());
        assert_eq!(
            PackageManifest::byte_sum(&manifest.all_layers().iter().collect::<Vec<_>>()),
            10
        );
    }

    #[test]
    fn artifact_blobs_count_as_layers() {
        let manifest = PackageManifest {
            media_type: ARTIFACT_MANIFEST_MEDIA_TYPE.to_string(),
            layers: Vec::new(),
            blobs: vec![Descriptor {
                media_type: "application/vnd.zarf.layer.v1.txt".to_string(),
                digest: "sha256:def".to_string(),
                size: 4,
                annotations: None,
            }],
        };
        assert_eq!(manifest.all_layers().len(), 1);
    }

    #[test]
    fn annotations_mirror_metadata() {
        let pkg = Package {
            metadata: Metadata {
                name: "demo".to_string(),
                description: Some("a demo".to_string()),
                authors: Some("someone".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let annotations = package_annotations(&pkg);
        assert_eq!(annotations["org.opencontainers.image.title"], "demo");
        assert_eq!(annotations["org.opencontainers.image.description"], "a demo");
        assert_eq!(annotations["org.opencontainers.image.authors"], "someone");
        assert!(!annotations.contains_key("org.opencontainers.image.url"));
    }

    #[test]
    fn manifest_rejection_detection() {
        use reqwest::StatusCode;

        assert!(is_manifest_rejection(StatusCode::BAD_REQUEST, "manifest invalid"));
        assert!(is_manifest_rejection(
            StatusCode::NOT_IMPLEMENTED,
            r#"{"errors":[{"code":"UNSUPPORTED"}]}"#
        ));
        assert!(is_manifest_rejection(
            StatusCode::NOT_FOUND,
            r#"{"errors":[{"code":"MANIFEST_INVALID"}]}"#
        ));
        assert!(!is_manifest_rejection(StatusCode::UNAUTHORIZED, "denied"));
    }

    #[test]
    fn fallback_config_shape() {
        let mut pkg = Package::default();
        pkg.build = Some(zarf_core::schema::BuildData {
            architecture: "amd64".to_string(),
            ..Default::default()
        });

        let config = fallback_config(&pkg, &package_annotations(&pkg));
        assert_eq!(config["architecture"], "amd64");
        assert_eq!(config["ociVersion"], "1.0.1");
        assert!(config["annotations"].is_object());
    }

    #[test]
    fn challenge_parsing() {
        let challenge =
            r#"Bearer realm="https://auth.example/token",service="registry.example.com""#;
        assert_eq!(
            challenge_field(challenge, "realm").as_deref(),
            Some("https://auth.example/token")
        );
        assert_eq!(
            challenge_field(challenge, "service").as_deref(),
            Some("registry.example.com")
        );
        assert!(challenge_field(challenge, "missing").is_none());
    }
}
