//! Error types for sshbox-core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid image name (expected 'repository:tag', got {0:?})")]
    InvalidImageName(String),

    #[error("No container is running for this image")]
    NoContainerRunning,

    #[error(
        "Time ran out while waiting to connect to container {image} over SSH \
         (most likely something went wrong while initializing the container)"
    )]
    ReadinessTimeout { image: String },

    #[error("Short id {prefix:?} matched {matches} image id(s), expected exactly one")]
    AmbiguousOrMissingId { prefix: String, matches: usize },

    #[error("Command {command:?} exited with nonzero status {status}")]
    ExternalProcessFailed { command: String, status: i32 },

    #[error("Configuration error: {0}")]
    Config(#[from] sshbox_config::ConfigError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] sshbox_provider::RuntimeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
