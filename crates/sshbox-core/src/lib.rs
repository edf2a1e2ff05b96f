//! Core logic for sshbox container lifecycle management
//!
//! This crate provides:
//! - Image identity handling (repository:tag[:id] coercion and naming)
//! - The container controller state machine (start, commit, kill, delete)
//! - The SSH readiness protocol (bounded two-level retry with backoff)
//! - One-time base image bootstrap (SSH server + public key installation)
//! - SSH client configuration registration (per-container host stanzas)
//! - Persisted image-to-container associations

mod association;
mod bootstrap;
mod controller;
mod error;
mod ids;
mod image;
mod readiness;
mod registrar;
mod relay;
mod session;
mod ssh;

pub use association::*;
pub use bootstrap::*;
pub use controller::*;
pub use error::*;
pub use ids::*;
pub use image::*;
pub use readiness::*;
pub use registrar::*;
pub use relay::*;
pub use session::*;
pub use ssh::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
