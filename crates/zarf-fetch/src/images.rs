//! Container image fetcher
//!
//! Pulls every image referenced by a package build into one shared OCI
//! image layout (`images/`). Blobs are content-addressed, so images that
//! share layers across components deduplicate on disk for free.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{OciImageManifest, OciManifest};
use oci_distribution::{Client, Reference};
use serde::{Deserialize, Serialize};

use zarf_core::transform::ImageRef;

use crate::credentials::{resolve_registry_host, DockerConfig};
use crate::error::{FetchError, Result};

/// Shared pull configuration for every image in a package build
#[derive(Debug, Clone)]
pub struct ImagePullConfig {
    /// Target architecture; multi-arch images resolve to `linux/<arch>`
    pub architecture: String,

    /// Allow registries with invalid TLS material
    pub insecure: bool,
}

/// Minimal OCI image index model for the shared layout
#[derive(Debug, Default, Serialize, Deserialize)]
struct OciIndex {
    #[serde(rename = "schemaVersion")]
    schema_version: u32,
    manifests: Vec<OciDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OciDescriptor {
    #[serde(rename = "mediaType")]
    media_type: String,
    digest: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    annotations: Option<BTreeMap<String, String>>,
}

/// Annotation carrying the original reference of each image in the index
const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Pulls images into the shared OCI layout
pub struct ImageFetcher {
    client: Client,
    docker_config: DockerConfig,
    config: ImagePullConfig,
}

impl ImageFetcher {
    pub fn new(config: ImagePullConfig) -> Result<Self> {
        let client_config = ClientConfig {
            protocol: ClientProtocol::Https,
            accept_invalid_certificates: config.insecure,
            ..Default::default()
        };

        Ok(Self {
            client: Client::new(client_config),
            docker_config: DockerConfig::load_default()?,
            config,
        })
    }

    /// Pull every reference into the layout, returning the resolved
    /// manifest digest per original reference.
    pub async fn pull_all(
        &self,
        references: &[String],
        layout_dir: &Path,
    ) -> Result<BTreeMap<String, String>> {
        std::fs::create_dir_all(layout_dir.join("blobs").join("sha256"))?;
        std::fs::write(
            layout_dir.join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )?;

        let mut digests = BTreeMap::new();
        for reference in references {
            let digest = self.pull_one(reference, layout_dir).await?;
            digests.insert(reference.clone(), digest);
        }
        Ok(digests)
    }

    async fn pull_one(&self, reference: &str, layout_dir: &Path) -> Result<String> {
        tracing::info!(reference, "pulling image");

        let parsed = ImageRef::parse(reference)?;
        let host = resolve_registry_host(&parsed.host).to_string();
        let oci_ref: Reference = if parsed.digest.is_empty() {
            format!("{host}/{}:{}", parsed.path, parsed.tag).parse()?
        } else {
            format!("{host}/{}@{}", parsed.path, parsed.digest).parse()?
        };

        let auth = self.docker_config.auth_for(&host)?;
        let (manifest, digest) = self.client.pull_manifest(&oci_ref, &auth).await?;

        let image_manifest = match manifest {
            OciManifest::Image(m) => m,
            OciManifest::ImageIndex(index) => {
                // Resolve the linux/<arch> entry of a multi-arch image.
                let wanted_arch = &self.config.architecture;
                let entry = index
                    .manifests
                    .iter()
                    .find(|m| {
                        m.platform.as_ref().is_some_and(|p| {
                            p.os == "linux" && &p.architecture == wanted_arch
                        })
                    })
                    .ok_or_else(|| {
                        FetchError::not_found(
                            reference,
                            format!("no linux/{wanted_arch} manifest in image index"),
                        )
                    })?;

                let platform_ref = Reference::with_digest(
                    oci_ref.registry().to_string(),
                    oci_ref.repository().to_string(),
                    entry.digest.clone(),
                );
                match self.client.pull_manifest(&platform_ref, &auth).await? {
                    (OciManifest::Image(m), _) => m,
                    _ => {
                        return Err(FetchError::fetch(
                            reference,
                            "nested image index manifests are not supported",
                        ))
                    }
                }
            }
        };

        let manifest_json = serde_json::to_vec(&image_manifest)?;
        let manifest_digest = format!(
            "sha256:{}",
            zarf_core::checksums::sha256_of_bytes(&manifest_json)
        );
        // The registry-reported digest covers the original bytes; preserve it
        // when it parses, since digest-pinned deploys look blobs up by it.
        let manifest_digest = if digest.starts_with("sha256:") {
            digest
        } else {
            manifest_digest
        };

        self.write_blob(layout_dir, &manifest_digest, &manifest_json)?;
        self.pull_blobs(&oci_ref, &image_manifest, layout_dir).await?;

        self.append_index_entry(
            layout_dir,
            OciDescriptor {
                media_type: image_manifest
                    .media_type
                    .clone()
                    .unwrap_or_else(|| "application/vnd.oci.image.manifest.v1+json".to_string()),
                digest: manifest_digest.clone(),
                size: manifest_json.len() as u64,
                annotations: Some(BTreeMap::from([(
                    REF_NAME_ANNOTATION.to_string(),
                    reference.to_string(),
                )])),
            },
        )?;

        Ok(manifest_digest)
    }

    async fn pull_blobs(
        &self,
        oci_ref: &Reference,
        manifest: &OciImageManifest,
        layout_dir: &Path,
    ) -> Result<()> {
        let mut descriptors = vec![manifest.config.clone()];
        descriptors.extend(manifest.layers.iter().cloned());

        for descriptor in descriptors {
            let blob_path = self.blob_path(layout_dir, &descriptor.digest);
            if blob_path.is_file() {
                tracing::debug!(digest = %descriptor.digest, "blob already cached");
                continue;
            }

            let mut data = Vec::new();
            self.client
                .pull_blob(oci_ref, &descriptor, &mut data)
                .await?;
            self.write_blob(layout_dir, &descriptor.digest, &data)?;
        }

        Ok(())
    }

    fn blob_path(&self, layout_dir: &Path, digest: &str) -> PathBuf {
        let hex_digest = digest.strip_prefix("sha256:").unwrap_or(digest);
        layout_dir.join("blobs").join("sha256").join(hex_digest)
    }

    fn write_blob(&self, layout_dir: &Path, digest: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(layout_dir, digest);
        if !path.is_file() {
            std::fs::write(path, data)?;
        }
        Ok(())
    }

    fn append_index_entry(&self, layout_dir: &Path, descriptor: OciDescriptor) -> Result<()> {
        let index_path = layout_dir.join("index.json");
        let mut index: OciIndex = if index_path.is_file() {
            serde_json::from_slice(&std::fs::read(&index_path)?)?
        } else {
            OciIndex {
                schema_version: 2,
                manifests: Vec::new(),
            }
        };

        index.manifests.retain(|m| {
            m.annotations
                .as_ref()
                .and_then(|a| a.get(REF_NAME_ANNOTATION))
                != descriptor
                    .annotations
                    .as_ref()
                    .and_then(|a| a.get(REF_NAME_ANNOTATION))
        });
        index.manifests.push(descriptor);

        std::fs::write(&index_path, serde_json::to_vec_pretty(&index)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn index_entries_replace_by_reference() {
        let temp = TempDir::new().unwrap();
        let fetcher = ImageFetcher {
            client: Client::new(ClientConfig::default()),
            docker_config: DockerConfig::default(),
            config: ImagePullConfig {
                architecture: "amd64".to_string(),
                insecure: false,
            },
        };

        let descriptor = |digest: &str| OciDescriptor {
            media_type: "application/vnd.oci.image.manifest.v1+json".to_string(),
            digest: digest.to_string(),
            size: 1,
            annotations: Some(BTreeMap::from([(
                REF_NAME_ANNOTATION.to_string(),
                "nginx:1.25".to_string(),
            )])),
        };

        fetcher
            .append_index_entry(temp.path(), descriptor("sha256:aaa"))
            .unwrap();
        fetcher
            .append_index_entry(temp.path(), descriptor("sha256:bbb"))
            .unwrap();

        let index: OciIndex =
            serde_json::from_slice(&std::fs::read(temp.path().join("index.json")).unwrap())
                .unwrap();
        assert_eq!(index.manifests.len(), 1);
        assert_eq!(index.manifests[0].digest, "sha256:bbb");
    }

    #[test]
    fn blob_paths_strip_algorithm_prefix() {
        let fetcher = ImageFetcher {
            client: Client::new(ClientConfig::default()),
            docker_config: DockerConfig::default(),
            config: ImagePullConfig {
                architecture: "amd64".to_string(),
                insecure: false,
            },
        };

        let path = fetcher.blob_path(Path::new("/layout"), "sha256:abc");
        assert_eq!(path, PathBuf::from("/layout/blobs/sha256/abc"));
    }
}
