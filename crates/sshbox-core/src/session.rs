//! Process-local session state
//!
//! One [`Session`] per controller, exclusively owned by it. The SSH endpoint
//! is only ever recorded after a successful readiness confirmation for the
//! current container, and is cleared whenever the bound container changes.

use crate::{ImageRef, OutputRelay, SshEndpoint};
use sshbox_provider::ContainerId;

/// Mutable record of the currently associated container
#[derive(Default)]
pub struct Session {
    container_id: Option<ContainerId>,
    image: Option<ImageRef>,
    relay: Option<OutputRelay>,
    ssh_endpoint: Option<SshEndpoint>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn container_id(&self) -> Option<&ContainerId> {
        self.container_id.as_ref()
    }

    /// Bind the session to a container, invalidating any endpoint discovered
    /// for a previous one.
    pub fn bind_container(&mut self, id: ContainerId) {
        if self.container_id.as_ref() != Some(&id) {
            self.ssh_endpoint = None;
        }
        self.container_id = Some(id);
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.image.as_ref()
    }

    pub fn set_image(&mut self, image: ImageRef) {
        self.image = Some(image);
    }

    pub fn ssh_endpoint(&self) -> Option<SshEndpoint> {
        self.ssh_endpoint
    }

    /// Record a confirmed endpoint for the currently bound container
    pub fn set_ssh_endpoint(&mut self, endpoint: SshEndpoint) {
        debug_assert!(self.container_id.is_some());
        self.ssh_endpoint = Some(endpoint);
    }

    pub fn attach_relay(&mut self, relay: OutputRelay) {
        self.relay = Some(relay);
    }

    pub fn take_relay(&mut self) -> Option<OutputRelay> {
        self.relay.take()
    }

    /// Reset to the all-empty state, stopping any attached relay
    pub fn reset(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.detach();
        }
        *self = Self::default();
    }
}
