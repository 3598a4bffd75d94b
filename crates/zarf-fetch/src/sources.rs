//! Package sources
//!
//! One polymorphic origin for packages: local tarballs, split tarballs,
//! OCI references, and HTTP(S)/sget URLs all load through the same trait.
//! Every source verifies the integrity of whatever subset it materialized.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use zarf_core::archive;
use zarf_core::layout::{self, PackagePaths};
use zarf_core::schema::Package;

use crate::error::{FetchError, Result};
use crate::http;
use crate::oci::OciRemote;

/// A place a package can be loaded from
#[async_trait]
pub trait PackageSource: Send {
    /// Materialize everything needed for the requested components into the
    /// destination layout and verify it. An empty component list means all.
    async fn load_package(
        &mut self,
        dest: &PackagePaths,
        optional_components: &[String],
    ) -> Result<Package>;

    /// Materialize only `zarf.yaml`, `checksums.txt` (and optionally the
    /// SBOM tar), verifying what was pulled.
    async fn load_package_metadata(
        &mut self,
        dest: &PackagePaths,
        want_sbom: bool,
    ) -> Result<Package>;
}

/// Classify a package location by scheme or extension
pub fn identify_source(location: &str) -> Option<&'static str> {
    if location.starts_with("oci://") {
        Some("oci")
    } else if location.starts_with("http://") || location.starts_with("https://") {
        Some("url")
    } else if location.starts_with("sget://") {
        Some("sget")
    } else if location.contains(".part000") {
        Some("split")
    } else if archive::is_archive_path(location) {
        Some("tarball")
    } else {
        None
    }
}

/// Build the right source for a location
pub fn new_source(
    location: &str,
    shasum: Option<String>,
    insecure: bool,
) -> Result<Box<dyn PackageSource>> {
    match identify_source(location) {
        Some("oci") => Ok(Box::new(OciSource {
            remote: OciRemote::new(location, insecure)?,
        })),
        Some("tarball") => Ok(Box::new(TarballSource {
            path: PathBuf::from(location),
        })),
        Some("split") => Ok(Box::new(SplitTarballSource {
            part000: PathBuf::from(location),
        })),
        Some("url") => Ok(Box::new(UrlSource {
            url: location.to_string(),
            shasum,
            insecure,
        })),
        Some("sget") => {
            tracing::warn!("sget support is deprecated, fetching over https instead");
            Ok(Box::new(UrlSource {
                url: location.replacen("sget://", "https://", 1),
                shasum,
                insecure,
            }))
        }
        _ => Err(FetchError::UnknownSource(location.to_string())),
    }
}

/// A local `.tar` / `.tar.zst` archive
#[derive(Debug)]
pub struct TarballSource {
    pub path: PathBuf,
}

impl TarballSource {
    fn load_all(&self, dest: &PackagePaths) -> Result<Package> {
        archive::extract(&self.path, dest.base())?;
        let pkg = read_definition(dest)?;
        verify_loaded(dest, &pkg, &[])?;
        Ok(pkg)
    }

    fn load_metadata(&self, dest: &PackagePaths, want_sbom: bool) -> Result<Package> {
        let mut wanted: Vec<String> = PackagePaths::metadata_entries()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if want_sbom {
            wanted.push(layout::SBOMS_TAR.to_string());
        }

        extract_selected(&self.path, dest.base(), &wanted)?;
        let pkg = read_definition(dest)?;

        let pulled: Vec<String> = wanted
            .into_iter()
            .filter(|p| dest.base().join(p).is_file())
            .collect();
        verify_loaded(dest, &pkg, &pulled)?;
        Ok(pkg)
    }
}

#[async_trait]
impl PackageSource for TarballSource {
    async fn load_package(
        &mut self,
        dest: &PackagePaths,
        _optional_components: &[String],
    ) -> Result<Package> {
        self.load_all(dest)
    }

    async fn load_package_metadata(
        &mut self,
        dest: &PackagePaths,
        want_sbom: bool,
    ) -> Result<Package> {
        self.load_metadata(dest, want_sbom)
    }
}

/// A split archive identified by its `part000` header file
pub struct SplitTarballSource {
    pub part000: PathBuf,
}

impl SplitTarballSource {
    /// Reassemble the parts next to the header and hand off to the tarball
    /// source.
    fn reassemble(&self) -> Result<TarballSource> {
        let name = self.part000.to_string_lossy();
        let base = name.trim_end_matches(".part000").to_string();
        let out = PathBuf::from(base);

        archive::reassemble(&self.part000, &out)?;
        Ok(TarballSource { path: out })
    }
}

#[async_trait]
impl PackageSource for SplitTarballSource {
    async fn load_package(
        &mut self,
        dest: &PackagePaths,
        optional_components: &[String],
    ) -> Result<Package> {
        self.reassemble()?
            .load_package(dest, optional_components)
            .await
    }

    async fn load_package_metadata(
        &mut self,
        dest: &PackagePaths,
        want_sbom: bool,
    ) -> Result<Package> {
        self.reassemble()?.load_package_metadata(dest, want_sbom).await
    }
}

/// A package archive behind an HTTP(S) URL
pub struct UrlSource {
    pub url: String,
    pub shasum: Option<String>,
    pub insecure: bool,
}

impl UrlSource {
    async fn download(&self) -> Result<TarballSource> {
        if self.shasum.is_none() && !self.insecure {
            return Err(FetchError::fetch(
                &self.url,
                "remote packages require a --shasum or explicit --insecure",
            ));
        }

        let name = self
            .url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("package.tar.zst");
        let download_dir = tempfile::Builder::new().prefix("zarf-url-").tempdir()?;
        let local = download_dir.path().join(name);

        let client = reqwest::Client::new();
        http::download_file(&client, &self.url, &local, self.shasum.as_deref()).await?;

        // Keep the download alive past the tempdir guard.
        let kept = std::env::temp_dir().join(format!(
            "zarf-download-{}",
            zarf_core::checksums::sha256_of_bytes(self.url.as_bytes())
        ));
        std::fs::create_dir_all(&kept)?;
        let kept_path = kept.join(name);
        std::fs::rename(&local, &kept_path).or_else(|_| {
            std::fs::copy(&local, &kept_path).map(|_| ())
        })?;

        Ok(TarballSource { path: kept_path })
    }
}

#[async_trait]
impl PackageSource for UrlSource {
    async fn load_package(
        &mut self,
        dest: &PackagePaths,
        optional_components: &[String],
    ) -> Result<Package> {
        self.download()
            .await?
            .load_package(dest, optional_components)
            .await
    }

    async fn load_package_metadata(
        &mut self,
        dest: &PackagePaths,
        want_sbom: bool,
    ) -> Result<Package> {
        self.download().await?.load_package_metadata(dest, want_sbom).await
    }
}

/// A package stored as an OCI artifact
pub struct OciSource {
    pub remote: OciRemote,
}

#[async_trait]
impl PackageSource for OciSource {
    async fn load_package(
        &mut self,
        dest: &PackagePaths,
        optional_components: &[String],
    ) -> Result<Package> {
        let pulled = self
            .remote
            .pull_package(dest.base(), optional_components)
            .await?;
        let pkg = read_definition(dest)?;
        verify_loaded(dest, &pkg, &pulled)?;
        Ok(pkg)
    }

    async fn load_package_metadata(
        &mut self,
        dest: &PackagePaths,
        want_sbom: bool,
    ) -> Result<Package> {
        let pulled = self.remote.pull_metadata(dest.base(), want_sbom).await?;
        let pkg = read_definition(dest)?;
        verify_loaded(dest, &pkg, &pulled)?;
        Ok(pkg)
    }
}

fn read_definition(dest: &PackagePaths) -> Result<Package> {
    let path = dest.zarf_yaml();
    if !path.is_file() {
        return Err(FetchError::Core(zarf_core::CoreError::integrity(
            layout::ZARF_YAML,
            "loaded package carries no package definition",
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

/// Verify the loaded subset against the aggregate checksum.
///
/// `pulled` empty means a full load; otherwise only the pulled non-metadata
/// paths must exist and match.
fn verify_loaded(dest: &PackagePaths, pkg: &Package, pulled: &[String]) -> Result<()> {
    let aggregate = &pkg.metadata.aggregate_checksum;
    if aggregate.is_empty() {
        tracing::warn!("package carries no aggregate checksum, skipping verification");
        return Ok(());
    }

    let partial: Vec<String> = pulled
        .iter()
        .filter(|p| {
            !PackagePaths::metadata_entries().contains(&p.as_str())
        })
        .cloned()
        .collect();

    if pulled.is_empty() {
        zarf_core::checksums::verify(dest.base(), aggregate, &[])?;
    } else if !partial.is_empty() {
        zarf_core::checksums::verify(dest.base(), aggregate, &partial)?;
    } else {
        // Metadata-only loads still re-hash the checksum listing itself.
        let actual = zarf_core::checksums::sha256_of_file(&dest.checksums())?;
        if &actual != aggregate {
            return Err(FetchError::Core(zarf_core::CoreError::integrity(
                layout::CHECKSUMS_TXT,
                format!("aggregate mismatch: expected {aggregate}, got {actual}"),
            )));
        }
    }

    Ok(())
}

/// Extract only the named entries from a tar / tar.zst archive
fn extract_selected(archive_path: &Path, dest: &Path, wanted: &[String]) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let file = std::fs::File::open(archive_path)?;

    let name = archive_path.to_string_lossy();
    if name.ends_with(".tar.zst") {
        let decoder = zstd::stream::read::Decoder::new(file)
            .map_err(|e| FetchError::fetch(&*name, e.to_string()))?;
        unpack_selected(tar::Archive::new(decoder), dest, wanted)
    } else {
        unpack_selected(tar::Archive::new(file), dest, wanted)
    }
}

fn unpack_selected<R: std::io::Read>(
    mut archive: tar::Archive<R>,
    dest: &Path,
    wanted: &[String],
) -> Result<()> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_string_lossy().to_string();
        if wanted.iter().any(|w| w == &path) {
            entry.unpack(dest.join(&path))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use zarf_core::schema::Metadata;

    fn build_package_dir(dir: &Path) -> Package {
        std::fs::create_dir_all(dir.join("components")).unwrap();
        std::fs::write(dir.join("components/baseline.tar"), b"tar-bytes").unwrap();

        let mut pkg = Package {
            metadata: Metadata {
                name: "test".to_string(),
                ..Default::default()
            },
            components: vec![zarf_core::schema::Component {
                name: "baseline".to_string(),
                required: true,
                ..Default::default()
            }],
            ..Default::default()
        };

        std::fs::write(dir.join("zarf.yaml"), serde_yaml::to_string(&pkg).unwrap()).unwrap();
        let aggregate = zarf_core::checksums::generate(dir).unwrap();
        pkg.metadata.aggregate_checksum = aggregate;
        std::fs::write(dir.join("zarf.yaml"), serde_yaml::to_string(&pkg).unwrap()).unwrap();
        pkg
    }

    #[test]
    fn source_identification() {
        assert_eq!(identify_source("oci://ghcr.io/org/pkg:1.0.0"), Some("oci"));
        assert_eq!(identify_source("https://example.com/p.tar.zst"), Some("url"));
        assert_eq!(identify_source("sget://example.com/p.tar.zst"), Some("sget"));
        assert_eq!(identify_source("pkg.tar.zst.part000"), Some("split"));
        assert_eq!(identify_source("pkg.tar.zst"), Some("tarball"));
        assert_eq!(identify_source("pkg.tar"), Some("tarball"));
        assert_eq!(identify_source("not-a-package.zip"), None);
    }

    #[tokio::test]
    async fn tarball_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        build_package_dir(&pkg_dir);

        let archive_path = temp.path().join("test.tar.zst");
        archive::tar_zst_directory(&pkg_dir, &archive_path).unwrap();

        let dest = PackagePaths::new(temp.path().join("out"));
        let mut source = new_source(archive_path.to_str().unwrap(), None, false).unwrap();
        let pkg = source.load_package(&dest, &[]).await.unwrap();

        assert_eq!(pkg.metadata.name, "test");
        assert!(dest.component_tar("baseline").is_file());
    }

    #[tokio::test]
    async fn tarball_metadata_load_skips_payload() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        build_package_dir(&pkg_dir);

        let archive_path = temp.path().join("test.tar");
        archive::tar_directory(&pkg_dir, &archive_path).unwrap();

        let dest = PackagePaths::new(temp.path().join("out"));
        let mut source = new_source(archive_path.to_str().unwrap(), None, false).unwrap();
        let pkg = source.load_package_metadata(&dest, false).await.unwrap();

        assert_eq!(pkg.metadata.name, "test");
        assert!(dest.zarf_yaml().is_file());
        assert!(dest.checksums().is_file());
        assert!(!dest.component_tar("baseline").exists());
    }

    #[tokio::test]
    async fn tampered_tarball_fails_verification() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        build_package_dir(&pkg_dir);

        std::fs::write(pkg_dir.join("components/baseline.tar"), b"tampered").unwrap();
        let archive_path = temp.path().join("test.tar");
        archive::tar_directory(&pkg_dir, &archive_path).unwrap();

        let dest = PackagePaths::new(temp.path().join("out"));
        let mut source = new_source(archive_path.to_str().unwrap(), None, false).unwrap();
        assert!(source.load_package(&dest, &[]).await.is_err());
    }

    #[tokio::test]
    async fn split_tarball_reassembles_and_loads() {
        let temp = TempDir::new().unwrap();
        let pkg_dir = temp.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        build_package_dir(&pkg_dir);

        let archive_path = temp.path().join("test.tar");
        archive::tar_directory(&pkg_dir, &archive_path).unwrap();
        let parts = archive::split(&archive_path, 1024).unwrap();

        let dest = PackagePaths::new(temp.path().join("out"));
        let mut source = new_source(parts[0].to_str().unwrap(), None, false).unwrap();
        let pkg = source.load_package(&dest, &[]).await.unwrap();
        assert_eq!(pkg.metadata.name, "test");
    }

    #[test]
    fn url_source_requires_shasum_or_insecure() {
        let source = UrlSource {
            url: "https://example.com/p.tar.zst".to_string(),
            shasum: None,
            insecure: false,
        };
        let err = futures::executor::block_on(source.download()).unwrap_err();
        assert!(matches!(err, FetchError::Fetch { .. }));
    }
}
