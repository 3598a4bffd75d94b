//! Package operation orchestration
//!
//! Ties the core, fetch and cluster layers together into the three package
//! operations: create (assemble an archive), deploy (replay it into a
//! cluster), and remove (tear it back down in reverse).

pub mod actions;
pub mod create;
pub mod deploy;
pub mod error;
pub mod remove;

pub use create::{create, CreateOptions};
pub use deploy::{DeployOptions, Deployer};
pub use error::{PackagerError, Result};
pub use remove::{RemoveOptions, Remover};
