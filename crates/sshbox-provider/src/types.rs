//! Common types for container runtimes

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Container ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Abbreviated 12-character form, matching what `docker ps` shows
    pub fn short(&self) -> &str {
        if self.0.len() > 12 {
            &self.0[..12]
        } else {
            &self.0
        }
    }
}

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Image ID wrapper
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Abbreviated 12-character form
    pub fn short(&self) -> &str {
        if self.0.len() > 12 {
            &self.0[..12]
        } else {
            &self.0
        }
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ImageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Basic container info for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: ContainerId,
    /// Image name (repository:tag) or id the container was created from
    pub image: String,
}

/// Basic image info for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSummary {
    pub repository: String,
    pub tag: String,
    pub id: ImageId,
    /// Creation time as a unix timestamp
    pub created: i64,
}

impl ImageSummary {
    /// Human readable repository:tag name
    pub fn name(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Configuration for creating a container
#[derive(Debug, Clone, Default)]
pub struct CreateContainerConfig {
    /// Image to use (name or content id)
    pub image: String,
    /// Command to run as the container's main process
    pub command: Vec<String>,
    /// Hostname inside the container
    pub hostname: Option<String>,
    /// Container ports to expose; host ports are runtime-assigned
    pub exposed_ports: Vec<u16>,
}

/// Result of a container create call
#[derive(Debug, Clone)]
pub struct CreateResponse {
    pub id: ContainerId,
    pub warnings: Vec<String>,
}

/// Followed container output
pub struct OutputStream {
    pub stream: Pin<Box<dyn AsyncRead + Send>>,
}
