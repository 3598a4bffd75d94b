//! Shared HTTP download helpers
//!
//! File and chart downloads all flow through here so shasum verification
//! and error shaping stay in one place.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{FetchError, Result};

/// Download a URL into memory
pub async fn get_bytes(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(FetchError::fetch(
            url,
            format!("server returned {}", response.status()),
        ));
    }

    Ok(response.bytes().await?.to_vec())
}

/// Download a URL to a file, optionally verifying its sha256.
///
/// A mismatch removes the partial download and fails the fetch.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_shasum: Option<&str>,
) -> Result<()> {
    tracing::debug!(url, dest = %dest.display(), "downloading file");

    let data = get_bytes(client, url).await?;

    if let Some(expected) = expected_shasum {
        verify_bytes_shasum(url, &data, expected)?;
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, data)?;
    Ok(())
}

/// Compare a byte buffer against an expected sha256
pub fn verify_bytes_shasum(resource: &str, data: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(data));
    if actual != expected.trim().to_lowercase() {
        return Err(FetchError::ShasumMismatch {
            resource: resource.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Compare an on-disk file against an expected sha256
pub fn verify_file_shasum(path: &Path, expected: &str) -> Result<()> {
    let actual = zarf_core::checksums::sha256_of_file(path)?;
    if actual != expected.trim().to_lowercase() {
        return Err(FetchError::ShasumMismatch {
            resource: path.to_string_lossy().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Whether a source string is a URL rather than a local path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://")
        || source.starts_with("https://")
        || source.starts_with("oci://")
        || source.starts_with("sget://")
}
