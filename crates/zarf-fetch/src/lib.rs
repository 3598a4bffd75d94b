//! Artifact fetchers and package transport
//!
//! Everything that pulls bytes from outside the air gap: container images,
//! Helm charts, git repositories, loose files, and whole packages over
//! tarball, split-tarball, HTTP or OCI origins.

pub mod charts;
pub mod credentials;
pub mod error;
pub mod files;
pub mod http;
pub mod images;
pub mod oci;
pub mod push;
pub mod repos;
pub mod sources;

pub use error::{FetchError, Result};
pub use oci::OciRemote;
pub use sources::{new_source, PackageSource};
