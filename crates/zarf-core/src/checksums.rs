//! Per-file checksums and the aggregate integrity contract
//!
//! `checksums.txt` lists `<sha256hex> <relative path>` for every file in the
//! layout except `zarf.yaml`, its signature and the listing itself. The
//! package metadata pins `sha256(checksums.txt)` as the aggregate, so one
//! hash transitively covers the whole tree.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::layout::{CHECKSUMS_TXT, ZARF_YAML, ZARF_YAML_SIGNATURE};

/// sha256 of a file's contents, hex encoded
pub fn sha256_of_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// sha256 of a byte slice, hex encoded
pub fn sha256_of_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn is_excluded(rel: &str) -> bool {
    rel == ZARF_YAML || rel == ZARF_YAML_SIGNATURE || rel == CHECKSUMS_TXT
}

/// Hash every file under `base`, write `checksums.txt` and return the
/// aggregate checksum of the listing itself.
pub fn generate(base: &Path) -> Result<String> {
    let mut entries: BTreeMap<String, String> = BTreeMap::new();

    for entry in WalkDir::new(base).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::Archive(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(base)
            .map_err(|e| CoreError::Archive(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");
        if is_excluded(&rel) {
            continue;
        }
        entries.insert(rel, sha256_of_file(entry.path())?);
    }

    let mut listing = String::new();
    for (rel, sha) in &entries {
        listing.push_str(sha);
        listing.push(' ');
        listing.push_str(rel);
        listing.push('\n');
    }

    std::fs::write(base.join(CHECKSUMS_TXT), &listing)?;
    Ok(sha256_of_bytes(listing.as_bytes()))
}

/// Verify a package tree against its aggregate checksum.
///
/// With `paths_to_check` empty this is a full verification: every listed
/// entry must exist and match, and every file on disk must be listed. With a
/// subset, only the listed subset must exist and match, but each requested
/// path must actually be reached by the listing.
pub fn verify(base: &Path, aggregate: &str, paths_to_check: &[String]) -> Result<()> {
    if aggregate.len() != 64 {
        return Err(CoreError::integrity(
            CHECKSUMS_TXT,
            format!("invalid aggregate checksum {aggregate:?}"),
        ));
    }

    let is_partial = !paths_to_check.is_empty();
    let mut requested: BTreeMap<String, bool> = paths_to_check
        .iter()
        .map(|p| (p.clone(), false))
        .collect();

    let checksum_path = base.join(CHECKSUMS_TXT);
    let actual_aggregate = sha256_of_file(&checksum_path)?;
    if actual_aggregate != aggregate {
        return Err(CoreError::integrity(
            CHECKSUMS_TXT,
            format!("aggregate mismatch: expected {aggregate}, got {actual_aggregate}"),
        ));
    }

    // Track what exists on disk so a full verification can detect strays.
    let mut on_disk: BTreeMap<String, bool> = BTreeMap::new();
    for entry in WalkDir::new(base) {
        let entry = entry.map_err(|e| CoreError::Archive(e.to_string()))?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(base)
                .map_err(|e| CoreError::Archive(e.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            on_disk.insert(rel, false);
        }
    }
    for meta in [ZARF_YAML, ZARF_YAML_SIGNATURE, CHECKSUMS_TXT] {
        on_disk.insert(meta.to_string(), true);
    }

    let listing = std::fs::read_to_string(&checksum_path)?;
    for line in listing.lines() {
        let Some((sha, rel)) = line.split_once(' ') else {
            return Err(CoreError::integrity(
                CHECKSUMS_TXT,
                format!("invalid checksum line {line:?}"),
            ));
        };
        if sha.is_empty() || rel.is_empty() {
            return Err(CoreError::integrity(
                CHECKSUMS_TXT,
                format!("invalid checksum line {line:?}"),
            ));
        }

        let path = base.join(rel);
        if !path.is_file() {
            if !is_partial {
                return Err(CoreError::integrity(rel, "file is missing"));
            }
            if requested.contains_key(rel) {
                return Err(CoreError::integrity(rel, "requested file is missing"));
            }
            continue;
        }

        let actual = sha256_of_file(&path)?;
        if actual != sha {
            return Err(CoreError::integrity(
                rel,
                format!("checksum mismatch: expected {sha}, got {actual}"),
            ));
        }

        on_disk.insert(rel.to_string(), true);
        if let Some(seen) = requested.get_mut(rel) {
            *seen = true;
        }
    }

    if is_partial {
        for (rel, seen) in requested {
            if !seen {
                return Err(CoreError::integrity(
                    rel,
                    "requested path was never checked",
                ));
            }
        }
    } else {
        for (rel, checked) in on_disk {
            if !checked {
                return Err(CoreError::integrity(rel, "file is not listed in checksums"));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_tree(dir: &Path) {
        std::fs::write(dir.join(ZARF_YAML), "kind: ZarfPackageConfig\n").unwrap();
        std::fs::create_dir_all(dir.join("components")).unwrap();
        std::fs::write(dir.join("components/baseline.tar"), b"tar-bytes").unwrap();
        std::fs::create_dir_all(dir.join("images/blobs/sha256")).unwrap();
        std::fs::write(dir.join("images/blobs/sha256/aa"), b"blob").unwrap();
    }

    #[test]
    fn known_sha256_value() {
        // sha256("hi\n")
        assert_eq!(
            sha256_of_bytes(b"hi\n"),
            "98ea6e4f216f2fb4b69fff9b3a44842c38686ca685f3f55dc48c5d3fb1107be4"
        );
    }

    #[test]
    fn generate_then_full_verify() {
        let temp = TempDir::new().unwrap();
        make_tree(temp.path());

        let aggregate = generate(temp.path()).unwrap();
        verify(temp.path(), &aggregate, &[]).unwrap();

        let listing = std::fs::read_to_string(temp.path().join(CHECKSUMS_TXT)).unwrap();
        assert!(listing.contains("components/baseline.tar"));
        assert!(!listing.contains("zarf.yaml"));
    }

    #[test]
    fn tampering_is_detected() {
        let temp = TempDir::new().unwrap();
        make_tree(temp.path());
        let aggregate = generate(temp.path()).unwrap();

        std::fs::write(temp.path().join("components/baseline.tar"), b"changed").unwrap();
        let err = verify(temp.path(), &aggregate, &[]).unwrap_err();
        assert!(
            matches!(err, CoreError::Integrity { ref path, .. } if path == "components/baseline.tar")
        );
    }

    #[test]
    fn unlisted_file_fails_full_verification() {
        let temp = TempDir::new().unwrap();
        make_tree(temp.path());
        let aggregate = generate(temp.path()).unwrap();

        std::fs::write(temp.path().join("stray.bin"), b"stray").unwrap();
        assert!(verify(temp.path(), &aggregate, &[]).is_err());
    }

    #[test]
    fn partial_verification_ignores_absent_unrequested_paths() {
        let temp = TempDir::new().unwrap();
        make_tree(temp.path());
        let aggregate = generate(temp.path()).unwrap();

        // Simulate a selective pull where the image blob never landed.
        std::fs::remove_file(temp.path().join("images/blobs/sha256/aa")).unwrap();

        verify(
            temp.path(),
            &aggregate,
            &["components/baseline.tar".to_string()],
        )
        .unwrap();

        // But full verification still fails.
        assert!(verify(temp.path(), &aggregate, &[]).is_err());
    }

    #[test]
    fn partial_verification_requires_requested_paths() {
        let temp = TempDir::new().unwrap();
        make_tree(temp.path());
        let aggregate = generate(temp.path()).unwrap();

        let err = verify(
            temp.path(),
            &aggregate,
            &["components/missing.tar".to_string()],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::Integrity { .. }));
    }

    #[test]
    fn aggregate_mismatch_is_detected() {
        let temp = TempDir::new().unwrap();
        make_tree(temp.path());
        generate(temp.path()).unwrap();

        let bogus = "0".repeat(64);
        assert!(verify(temp.path(), &bogus, &[]).is_err());
    }
}
