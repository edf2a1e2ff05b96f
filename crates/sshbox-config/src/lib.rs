//! Configuration for sshbox
//!
//! Handles the global configuration file (`~/.config/sshbox/config.toml`)
//! and the data directory where keys, state, and SSH fragments live.

mod error;
mod global;

pub use error::*;
pub use global::*;
