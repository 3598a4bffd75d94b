//! Core of the air-gap package engine
//!
//! Everything that needs no network or cluster lives here: the `zarf.yaml`
//! schema and its invariants, import-chain composition, the on-disk layout
//! with its checksum contract, archive packing and splitting, the token
//! template engine, reference transforms, and the cluster-side state data
//! model.

pub mod archive;
pub mod checksums;
pub mod compose;
pub mod error;
pub mod layout;
pub mod schema;
pub mod sign;
pub mod state;
pub mod template;
pub mod transform;
pub mod variables;

pub use error::{CoreError, Result};
pub use layout::PackagePaths;
pub use schema::{Component, Package, PackageKind};
pub use state::{DeployedPackage, PackageState};
pub use template::TemplateMap;
pub use variables::VariableConfig;
