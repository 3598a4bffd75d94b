//! On-disk package layout
//!
//! Maps a package base directory to every well-known entry of the archive
//! format. All relative paths used in `checksums.txt` and OCI descriptors
//! come from here so the two sides can never drift.

use std::path::{Path, PathBuf};

/// The package definition file
pub const ZARF_YAML: &str = "zarf.yaml";

/// Detached signature over the package definition
pub const ZARF_YAML_SIGNATURE: &str = "zarf.yaml.sig";

/// Newline-delimited `<sha256hex> <relative path>` listing
pub const CHECKSUMS_TXT: &str = "checksums.txt";

/// OCI image layout shared by every component's images
pub const IMAGES_DIR: &str = "images";

/// One tar per component lives here
pub const COMPONENTS_DIR: &str = "components";

/// Combined SBOM archive, present unless skipped
pub const SBOMS_TAR: &str = "sboms.tar";

/// Registry bootstrap image, present only in init packages
pub const SEED_IMAGE_DIR: &str = "seed-image";

/// Directory names inside a component tar
pub mod component {
    pub const CHARTS: &str = "charts";
    pub const VALUES: &str = "values";
    pub const MANIFESTS: &str = "manifests";
    pub const FILES: &str = "files";
    pub const REPOS: &str = "repos";
    pub const DATA: &str = "data";
}

/// Resolved paths for one package tree on disk
#[derive(Debug, Clone)]
pub struct PackagePaths {
    base: PathBuf,
}

impl PackagePaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn zarf_yaml(&self) -> PathBuf {
        self.base.join(ZARF_YAML)
    }

    pub fn signature(&self) -> PathBuf {
        self.base.join(ZARF_YAML_SIGNATURE)
    }

    pub fn checksums(&self) -> PathBuf {
        self.base.join(CHECKSUMS_TXT)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.base.join(IMAGES_DIR)
    }

    pub fn oci_layout(&self) -> PathBuf {
        self.images_dir().join("oci-layout")
    }

    pub fn images_index(&self) -> PathBuf {
        self.images_dir().join("index.json")
    }

    pub fn image_blob(&self, hex_digest: &str) -> PathBuf {
        self.images_dir().join("blobs").join("sha256").join(hex_digest)
    }

    pub fn components_dir(&self) -> PathBuf {
        self.base.join(COMPONENTS_DIR)
    }

    pub fn component_tar(&self, component_name: &str) -> PathBuf {
        self.components_dir().join(format!("{component_name}.tar"))
    }

    /// Relative archive path of a component tar, as listed in checksums
    /// and OCI descriptors
    pub fn component_tar_relative(component_name: &str) -> String {
        format!("{COMPONENTS_DIR}/{component_name}.tar")
    }

    pub fn sboms_tar(&self) -> PathBuf {
        self.base.join(SBOMS_TAR)
    }

    pub fn seed_images_dir(&self) -> PathBuf {
        self.base.join(SEED_IMAGE_DIR)
    }

    /// The always-pulled metadata entries of a package, relative to base
    pub fn metadata_entries() -> [&'static str; 3] {
        [ZARF_YAML, ZARF_YAML_SIGNATURE, CHECKSUMS_TXT]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_resolve_under_base() {
        let paths = PackagePaths::new("/tmp/pkg");
        assert_eq!(paths.zarf_yaml(), PathBuf::from("/tmp/pkg/zarf.yaml"));
        assert_eq!(
            paths.component_tar("baseline"),
            PathBuf::from("/tmp/pkg/components/baseline.tar")
        );
        assert_eq!(
            paths.image_blob("abc123"),
            PathBuf::from("/tmp/pkg/images/blobs/sha256/abc123")
        );
    }

    #[test]
    fn component_tar_relative_path() {
        assert_eq!(
            PackagePaths::component_tar_relative("baseline"),
            "components/baseline.tar"
        );
    }
}
