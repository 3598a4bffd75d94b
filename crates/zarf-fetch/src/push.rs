//! Image push into the in-cluster registry
//!
//! Reads images back out of the shared OCI layout and pushes them to the
//! registry recorded in cluster state. Every image lands under two tags:
//! the crc-suffixed name the admission agent rewrites pods to, and the
//! plain transformed name for tooling that looks images up directly.

use std::path::Path;

use serde_json::Value;

use zarf_core::state::RegistryInfo;
use zarf_core::transform::{
    image_transform_host, image_transform_host_without_checksum, ImageRef,
};

use crate::error::{FetchError, Result};
use crate::oci::{OciRemote, IMAGE_MANIFEST_MEDIA_TYPE};

/// Annotation carrying the original reference in the layout index
const REF_NAME_ANNOTATION: &str = "org.opencontainers.image.ref.name";

/// Push one image from the layout to the in-cluster registry.
///
/// `reference` is the original reference recorded at create time.
pub async fn push_image_from_layout(
    layout_dir: &Path,
    reference: &str,
    registry: &RegistryInfo,
    insecure: bool,
) -> Result<()> {
    let manifest_digest = index_lookup(layout_dir, reference)?;
    let manifest_bytes = read_blob(layout_dir, &manifest_digest)?;
    let manifest: Value = serde_json::from_slice(&manifest_bytes)?;

    for target in [
        image_transform_host(&registry.address, reference)?,
        image_transform_host_without_checksum(&registry.address, reference)?,
    ] {
        push_manifest_with_blobs(layout_dir, &manifest, &manifest_bytes, &target, registry, insecure)
            .await?;
    }

    Ok(())
}

async fn push_manifest_with_blobs(
    layout_dir: &Path,
    manifest: &Value,
    manifest_bytes: &[u8],
    target_reference: &str,
    registry: &RegistryInfo,
    insecure: bool,
) -> Result<()> {
    let target = ImageRef::parse(target_reference)?;
    let tag = if target.digest.is_empty() {
        target.tag.clone()
    } else {
        target.digest.clone()
    };

    let mut remote = OciRemote::from_parts(&target.host, &target.path, &tag, insecure);
    remote.set_basic_auth(&registry.push_username, &registry.push_password);
    remote.authenticate("pull,push").await?;

    tracing::info!(target = %target_reference, "pushing image to in-cluster registry");

    let mut digests: Vec<String> = Vec::new();
    if let Some(config) = manifest.pointer("/config/digest").and_then(Value::as_str) {
        digests.push(config.to_string());
    }
    if let Some(layers) = manifest.pointer("/layers").and_then(Value::as_array) {
        for layer in layers {
            if let Some(digest) = layer.pointer("/digest").and_then(Value::as_str) {
                digests.push(digest.to_string());
            }
        }
    }

    for digest in digests {
        let data = read_blob(layout_dir, &digest)?;
        remote.push_blob(&data).await?;
    }

    let media_type = manifest
        .pointer("/mediaType")
        .and_then(Value::as_str)
        .unwrap_or(IMAGE_MANIFEST_MEDIA_TYPE)
        .to_string();
    remote.put_manifest(manifest_bytes, &media_type).await?;

    Ok(())
}

/// Find an image's manifest digest in the layout index by its original
/// reference annotation.
fn index_lookup(layout_dir: &Path, reference: &str) -> Result<String> {
    let index: Value = serde_json::from_slice(&std::fs::read(layout_dir.join("index.json"))?)?;

    index
        .pointer("/manifests")
        .and_then(Value::as_array)
        .and_then(|manifests| {
            manifests.iter().find(|m| {
                m.pointer(&format!("/annotations/{REF_NAME_ANNOTATION}"))
                    .and_then(Value::as_str)
                    == Some(reference)
            })
        })
        .and_then(|m| m.pointer("/digest").and_then(Value::as_str))
        .map(String::from)
        .ok_or_else(|| {
            FetchError::not_found(reference, "image is not present in the package layout")
        })
}

fn read_blob(layout_dir: &Path, digest: &str) -> Result<Vec<u8>> {
    let hex_digest = digest.strip_prefix("sha256:").unwrap_or(digest);
    let path = layout_dir.join("blobs").join("sha256").join(hex_digest);
    if !path.is_file() {
        return Err(FetchError::not_found(
            digest,
            "blob is missing from the package layout",
        ));
    }
    Ok(std::fs::read(path)?)
}
