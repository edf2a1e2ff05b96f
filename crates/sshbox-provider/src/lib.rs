//! Container runtime capability trait for sshbox
//!
//! This crate defines the narrow set of operations the core needs from a
//! Docker-compatible container runtime, plus the bollard-backed production
//! implementation. Keeping the contract behind a trait lets the controller
//! and readiness protocol be tested against an in-memory runtime.

mod docker;
mod error;
mod types;

pub use docker::DockerRuntime;
pub use error::*;
pub use types::*;

use async_trait::async_trait;

/// Capability contract against the container runtime.
///
/// Runtime failures (connection refused, API errors) propagate as
/// [`RuntimeError`] without being wrapped into domain-specific kinds.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List running containers
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;

    /// List available images (one entry per repository:tag)
    async fn list_images(&self) -> Result<Vec<ImageSummary>>;

    /// Pull an image from a registry
    async fn pull(&self, repository: &str, tag: &str) -> Result<()>;

    /// Create a container from an image
    async fn create_container(&self, config: &CreateContainerConfig) -> Result<CreateResponse>;

    /// Start a created container
    async fn start(&self, id: &ContainerId) -> Result<()>;

    /// Kill a running container
    async fn kill(&self, id: &ContainerId) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, id: &ContainerId) -> Result<()>;

    /// Remove an image by name (repository:tag) or id
    async fn remove_image(&self, name: &str) -> Result<()>;

    /// Commit a container's changes as a new image revision.
    ///
    /// The returned id may be abbreviated; callers are expected to expand
    /// it against [`ContainerRuntime::list_images`].
    async fn commit(
        &self,
        id: &ContainerId,
        repository: &str,
        tag: &str,
        message: Option<&str>,
        author: Option<&str>,
    ) -> Result<ImageId>;

    /// Resolve the host port published for a container's internal port
    async fn resolve_published_port(&self, id: &ContainerId, internal_port: u16) -> Result<u16>;

    /// Block until the container's main process exits, returning its exit code
    async fn wait(&self, id: &ContainerId) -> Result<i64>;

    /// Follow a container's output so the operator sees boot diagnostics
    async fn attach_output(&self, id: &ContainerId) -> Result<OutputStream>;
}

/// Connect to the runtime named by the global configuration.
pub async fn connect_runtime(
    config: &sshbox_config::GlobalConfig,
) -> Result<Box<dyn ContainerRuntime>> {
    let runtime = DockerRuntime::new(&config.runtime.socket).await?;
    Ok(Box::new(runtime))
}
