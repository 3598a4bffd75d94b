//! In-cluster admission agent
//!
//! Mutates inbound Pods, Flux sources and Argo Applications so every image
//! and git reference points at the in-cluster services recorded in the
//! state secret. Patches are emitted as base64 JSON-Patch in standard
//! `admission.k8s.io/v1` responses.

pub mod admission;
pub mod error;
pub mod hooks;
pub mod operations;
pub mod server;

pub use admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
pub use error::{AgentError, Result};
pub use operations::{PatchOp, PatchOperation};
pub use server::{serve, AgentState};
