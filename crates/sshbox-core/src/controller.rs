//! Container lifecycle controller
//!
//! One [`Controller`] manages the single container backing one image
//! identity. Operations are `start`, `commit`, `kill` and `delete`; each
//! re-discovers the world it needs (running container, custom image, base
//! image) instead of trusting cached state, so invocations compose across
//! processes through the association store and the runtime itself.

use crate::{
    discover_ssh_endpoint, expand_short_id, find_base_image, find_named_image, host_stanza,
    local_ipv4_addresses, ssh_alias, ssh_server_command, AccessRegistrar, AssociationStore,
    CoreError, FileRegistrar, ImageRef, OutputRelay, ProcessProber, Readiness, Result,
    RetrySchedule, Session, SshKeys, SshProber, SSH_PORT,
};
use sshbox_config::GlobalConfig;
use sshbox_provider::{ContainerId, ContainerRuntime, CreateContainerConfig};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

/// What happens to the container after its changes are committed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Kill the container and start a fresh one from the committed image
    #[default]
    Restart,
    /// Leave the container running with its uncommitted runtime state
    KeepRunning,
}

impl CommitPolicy {
    /// Parse the configured policy name, defaulting to restart
    pub fn from_config(value: &str) -> Self {
        match value {
            "keep-running" => Self::KeepRunning,
            _ => Self::Restart,
        }
    }
}

/// Where the controller currently stands with its container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No container is associated
    Unbound,
    /// A container is associated but not confirmed reachable
    Located,
    /// The container answered a full SSH handshake
    Ready,
}

type AddressSource = Box<dyn Fn() -> Vec<Ipv4Addr> + Send + Sync>;

/// Lifecycle manager for the container backing one image identity
pub struct Controller {
    runtime: Arc<dyn ContainerRuntime>,
    image: ImageRef,
    distribution: ImageRef,
    hostname: String,
    schedule: RetrySchedule,
    commit_policy: CommitPolicy,
    session: Session,
    keys: SshKeys,
    registrar: Box<dyn AccessRegistrar>,
    prober: Box<dyn SshProber>,
    association_path: PathBuf,
    addresses: AddressSource,
}

impl Controller {
    /// Controller wired to the operator's SSH configuration and data files
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        image: ImageRef,
        config: &GlobalConfig,
        hostname: Option<String>,
    ) -> Result<Self> {
        let distribution = ImageRef::coerce(&config.defaults.base_image)?;
        let hostname = hostname
            .or_else(|| config.defaults.hostname.clone())
            .unwrap_or_else(|| image.tag().to_string());
        let keys = SshKeys::new()?;
        let prober = ProcessProber::new(keys.private_key_path(&image.name()));
        Ok(Self {
            runtime,
            image,
            distribution,
            hostname,
            schedule: RetrySchedule::with_overall_secs(config.defaults.ssh_timeout_secs),
            commit_policy: CommitPolicy::from_config(&config.defaults.commit_policy),
            session: Session::new(),
            keys,
            registrar: Box::new(FileRegistrar::new()?),
            prober: Box::new(prober),
            association_path: AssociationStore::store_path()?,
            addresses: Box::new(local_ipv4_addresses),
        })
    }

    pub fn with_registrar(mut self, registrar: Box<dyn AccessRegistrar>) -> Self {
        self.registrar = registrar;
        self
    }

    pub fn with_keys(mut self, keys: SshKeys) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_prober(mut self, prober: Box<dyn SshProber>) -> Self {
        self.prober = prober;
        self
    }

    pub fn with_association_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.association_path = path.into();
        self
    }

    pub fn with_addresses(
        mut self,
        addresses: impl Fn() -> Vec<Ipv4Addr> + Send + Sync + 'static,
    ) -> Self {
        self.addresses = Box::new(addresses);
        self
    }

    pub fn with_schedule(mut self, schedule: RetrySchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    /// Image identity this controller manages
    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    /// Alias registered for SSH access to the container
    pub fn ssh_alias(&self) -> String {
        ssh_alias(&self.hostname)
    }

    /// Where the controller currently stands with its container
    pub fn state(&self) -> ControllerState {
        match (self.session.container_id(), self.session.ssh_endpoint()) {
            (None, _) => ControllerState::Unbound,
            (Some(_), None) => ControllerState::Located,
            (Some(_), Some(_)) => ControllerState::Ready,
        }
    }

    /// Start the container (creating it and its image as needed), wait for it
    /// to answer over SSH and register client access.
    pub async fn start(&mut self) -> Result<()> {
        if !self.find_running_container().await? {
            if let Some(custom) = self.find_custom_image().await? {
                self.create_and_start(&custom).await?;
            } else {
                tracing::info!("Image {} doesn't exist yet, creating it ..", self.image);
                let public_key = self
                    .keys
                    .public_key(&self.image.name(), &self.hostname)
                    .await?;
                let base =
                    find_base_image(self.runtime.as_ref(), &self.distribution, &public_key).await?;
                self.create_and_start(&base).await?;
            }
        }
        self.await_readiness().await?;
        self.setup_ssh_access()
    }

    /// Commit the container's changes as a new revision of its image
    pub async fn commit(&mut self, message: Option<&str>, author: Option<&str>) -> Result<()> {
        if !self.find_running_container().await? {
            return Err(CoreError::NoContainerRunning);
        }
        let container_id = match self.session.container_id() {
            Some(id) => id.clone(),
            None => return Err(CoreError::NoContainerRunning),
        };
        tracing::info!(
            "Committing changes: {}",
            message.unwrap_or("no description given")
        );
        let short = self
            .runtime
            .commit(
                &container_id,
                self.image.repository(),
                self.image.tag(),
                message,
                author,
            )
            .await?;
        let candidates: Vec<String> = self
            .runtime
            .list_images()
            .await?
            .into_iter()
            .map(|image| image.id.0)
            .collect();
        let full_id = expand_short_id(short.as_ref(), &candidates)?;
        self.image.set_id(full_id);
        match self.commit_policy {
            CommitPolicy::Restart => {
                tracing::info!("Restarting container from committed image ..");
                self.kill().await?;
                self.start().await
            }
            CommitPolicy::KeepRunning => Ok(()),
        }
    }

    /// Kill and remove the container, discarding changes since the last
    /// commit. Safe to call when nothing is running.
    pub async fn kill(&mut self) -> Result<()> {
        if self.find_running_container().await? {
            if let Some(relay) = self.session.take_relay() {
                relay.detach();
            }
            if let Some(id) = self.session.container_id().cloned() {
                tracing::info!("Killing container ..");
                self.runtime.kill(&id).await?;
                tracing::info!("Removing container ..");
                self.runtime.remove_container(&id).await?;
            }
            self.session.reset();
            self.forget_association()?;
        }
        self.revoke_ssh_access()
    }

    /// Kill the container and delete its image
    pub async fn delete(&mut self) -> Result<()> {
        self.kill().await?;
        if let Some(custom) =
            find_named_image(self.runtime.as_ref(), self.image.repository(), self.image.tag())
                .await?
        {
            tracing::info!("Deleting image {} ..", self.image);
            self.runtime.remove_image(&custom.unique_name()).await?;
        } else {
            tracing::info!("No image to delete for {}.", self.image);
        }
        Ok(())
    }

    /// Bind to a container already running for this image, if one exists.
    ///
    /// The association store is consulted first; stale entries (the recorded
    /// container is gone) are cleared. Falls back to scanning running
    /// containers by image name.
    async fn find_running_container(&mut self) -> Result<bool> {
        if self.session.container_id().is_some() {
            return Ok(true);
        }
        tracing::info!("Looking for running container ..");
        let running = self.runtime.list_containers().await?;

        let mut store = AssociationStore::load_from(&self.association_path)?;
        if let Some(recorded) = store.get(&self.image.name()).map(str::to_string) {
            if let Some(found) = running.iter().find(|c| c.id.0 == recorded) {
                tracing::info!("Found running container: {}", found.id.short());
                self.session.bind_container(found.id.clone());
                return Ok(true);
            }
            tracing::debug!("Recorded container {} is gone, forgetting it.", &recorded);
            store.remove(&self.image.name());
            store.save_to(&self.association_path)?;
        }

        let name = self.image.name();
        let unique = self.image.unique_name();
        if let Some(found) = running
            .iter()
            .find(|c| c.image == name || c.image == unique)
        {
            tracing::info!("Found running container: {}", found.id.short());
            self.session.bind_container(found.id.clone());
            self.remember_association(&found.id)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Most recent committed image for this identity, cached per session
    async fn find_custom_image(&mut self) -> Result<Option<ImageRef>> {
        if let Some(cached) = self.session.image() {
            return Ok(Some(cached.clone()));
        }
        tracing::debug!("Looking for existing image: {}", self.image);
        let found = find_named_image(
            self.runtime.as_ref(),
            self.image.repository(),
            self.image.tag(),
        )
        .await?;
        if let Some(image) = &found {
            self.session.set_image(image.clone());
        }
        Ok(found)
    }

    /// Create a container from the given image and start its SSH server
    async fn create_and_start(&mut self, from: &ImageRef) -> Result<()> {
        tracing::debug!("Creating container from image: {}", from.unique_name());
        let response = self
            .runtime
            .create_container(&CreateContainerConfig {
                image: from.unique_name(),
                command: ssh_server_command(),
                hostname: Some(self.hostname.clone()),
                exposed_ports: vec![SSH_PORT],
            })
            .await?;
        for warning in &response.warnings {
            tracing::warn!("{}", warning);
        }
        tracing::debug!("Created container: {}", response.id.short());
        self.session.bind_container(response.id.clone());
        self.remember_association(&response.id)?;
        tracing::info!("Starting SSH server ..");
        self.runtime.start(&response.id).await?;
        let relay = OutputRelay::attach(self.runtime.as_ref(), &response.id).await?;
        self.session.attach_relay(relay);
        Ok(())
    }

    /// Wait until the container answers a full SSH handshake.
    ///
    /// On timeout the container is left running so the operator can inspect
    /// it; only the error is reported.
    async fn await_readiness(&mut self) -> Result<()> {
        if self.session.ssh_endpoint().is_some() {
            return Ok(());
        }
        let container_id = match self.session.container_id() {
            Some(id) => id.clone(),
            None => return Err(CoreError::NoContainerRunning),
        };
        let addresses = &self.addresses;
        let readiness = discover_ssh_endpoint(
            self.runtime.as_ref(),
            &container_id,
            self.prober.as_ref(),
            self.schedule,
            || addresses(),
        )
        .await?;
        match readiness {
            Readiness::Reachable(endpoint) => {
                self.session.set_ssh_endpoint(endpoint);
                Ok(())
            }
            Readiness::TimedOut => Err(CoreError::ReadinessTimeout {
                image: self.image.name(),
            }),
        }
    }

    /// Register the client stanza for the confirmed endpoint
    fn setup_ssh_access(&mut self) -> Result<()> {
        let endpoint = match self.session.ssh_endpoint() {
            Some(endpoint) => endpoint,
            None => return Err(CoreError::NoContainerRunning),
        };
        tracing::debug!("Configuring SSH access ..");
        let alias = self.ssh_alias();
        let stanza = host_stanza(
            &alias,
            endpoint,
            &self.keys.private_key_path(&self.image.name()),
        );
        self.registrar.write_stanza(&self.image.name(), &stanza)?;
        self.registrar.regenerate()?;
        tracing::info!(
            "Successfully configured SSH access. Use this command: ssh {}",
            alias
        );
        Ok(())
    }

    /// Remove the client stanza, tolerating its absence
    fn revoke_ssh_access(&mut self) -> Result<()> {
        tracing::info!("Removing SSH client configuration ..");
        self.registrar.remove_stanza(&self.image.name())?;
        self.registrar.regenerate()
    }

    fn remember_association(&self, id: &ContainerId) -> Result<()> {
        let mut store = AssociationStore::load_from(&self.association_path)?;
        store.set(self.image.name(), id.0.clone());
        store.save_to(&self.association_path)
    }

    fn forget_association(&self) -> Result<()> {
        let mut store = AssociationStore::load_from(&self.association_path)?;
        if store.remove(&self.image.name()).is_some() {
            store.save_to(&self.association_path)?;
        }
        Ok(())
    }
}
