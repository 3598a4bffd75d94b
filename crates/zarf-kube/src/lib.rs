//! Cluster-facing half of the air-gap package engine
//!
//! Owns the kube client, the state and deployed-package secret stores,
//! manifest apply/delete, chart lifecycle, waits, and data injection.

pub mod cluster;
pub mod error;
pub mod helm;
pub mod inject;
pub mod resources;
pub mod storage;
pub mod wait;

pub use cluster::Cluster;
pub use error::{KubeError, Result};
pub use helm::{ChartInstall, HelmClient};
pub use storage::{MemoryStore, PackageStore, SecretStore};
