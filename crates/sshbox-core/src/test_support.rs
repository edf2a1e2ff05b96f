//! Test support utilities for sshbox-core
//!
//! Provides MockRuntime and helpers for unit testing the Controller without
//! requiring a real Docker runtime. The mock keeps a small world of images
//! and containers so multi-step flows (bootstrap, commit, restart) behave
//! consistently across calls.

use crate::{SshEndpoint, SshProber};
use async_trait::async_trait;
use sshbox_provider::*;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncRead;

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    ListContainers,
    ListImages,
    Pull { repository: String, tag: String },
    Create { image: String },
    Start { id: String },
    Kill { id: String },
    RemoveContainer { id: String },
    RemoveImage { name: String },
    Commit { id: String, repository: String, tag: String },
    ResolvePort { id: String },
    Wait { id: String },
    Attach { id: String },
}

struct MockContainer {
    id: String,
    image: String,
    running: bool,
    host_port: u16,
}

struct World {
    images: Vec<ImageSummary>,
    containers: Vec<MockContainer>,
    next_container: u64,
    next_image: u64,
    clock: i64,
}

/// In-memory container runtime for testing
pub struct MockRuntime {
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    /// Exit code returned by wait calls
    pub wait_exit_code: Arc<Mutex<i64>>,
    world: Mutex<World>,
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            wait_exit_code: Arc::new(Mutex::new(0)),
            world: Mutex::new(World {
                images: Vec::new(),
                containers: Vec::new(),
                next_container: 0,
                next_image: 0,
                clock: 0,
            }),
        }
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Count calls matching a predicate
    pub fn count_calls(&self, f: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| f(c)).count()
    }

    /// Seed an image into the world, returning its full id
    pub fn add_image(&self, repository: &str, tag: &str) -> String {
        let mut world = self.world.lock().unwrap();
        let id = full_image_id(world.next_image);
        world.next_image += 1;
        world.clock += 1;
        let created = world.clock;
        world.images.push(ImageSummary {
            repository: repository.to_string(),
            tag: tag.to_string(),
            id: ImageId::new(id.clone()),
            created,
        });
        id
    }

    /// Seed a running container into the world, returning its id
    pub fn add_running_container(&self, image: &str) -> String {
        let mut world = self.world.lock().unwrap();
        let id = full_container_id(world.next_container);
        let host_port = 49000 + world.next_container as u16;
        world.next_container += 1;
        world.containers.push(MockContainer {
            id: id.clone(),
            image: image.to_string(),
            running: true,
            host_port,
        });
        id
    }

    /// Whether a container with the given id is currently running
    pub fn is_running(&self, id: &str) -> bool {
        self.world
            .lock()
            .unwrap()
            .containers
            .iter()
            .any(|c| c.id == id && c.running)
    }

    /// Ids of all containers the world still knows about
    pub fn container_ids(&self) -> Vec<String> {
        self.world
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    /// Names of all images the world still knows about
    pub fn image_names(&self) -> Vec<String> {
        self.world
            .lock()
            .unwrap()
            .images
            .iter()
            .map(ImageSummary::name)
            .collect()
    }

    /// Image a container was created from, if the container exists
    pub fn container_image(&self, id: &str) -> Option<String> {
        self.world
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.image.clone())
    }
}

// Ids differ within their first 12 characters so abbreviated forms stay
// unambiguous, matching how real ids behave in practice.
fn full_container_id(n: u64) -> String {
    format!("c0{:010x}{}", n, "0".repeat(52))
}

fn full_image_id(n: u64) -> String {
    format!("1a{:010x}{}", n, "0".repeat(52))
}

/// A no-op async reader for mock output streams
struct EmptyReader;

impl AsyncRead for EmptyReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        self.record(MockCall::ListContainers);
        Ok(self
            .world
            .lock()
            .unwrap()
            .containers
            .iter()
            .filter(|c| c.running)
            .map(|c| ContainerSummary {
                id: ContainerId::new(c.id.clone()),
                image: c.image.clone(),
            })
            .collect())
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>> {
        self.record(MockCall::ListImages);
        Ok(self.world.lock().unwrap().images.clone())
    }

    async fn pull(&self, repository: &str, tag: &str) -> Result<()> {
        self.record(MockCall::Pull {
            repository: repository.to_string(),
            tag: tag.to_string(),
        });
        self.add_image(repository, tag);
        Ok(())
    }

    async fn create_container(&self, config: &CreateContainerConfig) -> Result<CreateResponse> {
        self.record(MockCall::Create {
            image: config.image.clone(),
        });
        let mut world = self.world.lock().unwrap();
        let id = full_container_id(world.next_container);
        let host_port = 49000 + world.next_container as u16;
        world.next_container += 1;
        world.containers.push(MockContainer {
            id: id.clone(),
            image: config.image.clone(),
            running: false,
            host_port,
        });
        Ok(CreateResponse {
            id: ContainerId::new(id),
            warnings: Vec::new(),
        })
    }

    async fn start(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::Start { id: id.0.clone() });
        let mut world = self.world.lock().unwrap();
        match world.containers.iter_mut().find(|c| c.id == id.0) {
            Some(container) => {
                container.running = true;
                Ok(())
            }
            None => Err(RuntimeError::ContainerNotFound(id.0.clone())),
        }
    }

    async fn kill(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::Kill { id: id.0.clone() });
        let mut world = self.world.lock().unwrap();
        match world.containers.iter_mut().find(|c| c.id == id.0) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(RuntimeError::ContainerNotFound(id.0.clone())),
        }
    }

    async fn remove_container(&self, id: &ContainerId) -> Result<()> {
        self.record(MockCall::RemoveContainer { id: id.0.clone() });
        let mut world = self.world.lock().unwrap();
        let before = world.containers.len();
        world.containers.retain(|c| c.id != id.0);
        if world.containers.len() == before {
            return Err(RuntimeError::ContainerNotFound(id.0.clone()));
        }
        Ok(())
    }

    async fn remove_image(&self, name: &str) -> Result<()> {
        self.record(MockCall::RemoveImage {
            name: name.to_string(),
        });
        let mut world = self.world.lock().unwrap();
        let before = world.images.len();
        world.images.retain(|i| i.name() != name && i.id.0 != name);
        if world.images.len() == before {
            return Err(RuntimeError::ImageNotFound(name.to_string()));
        }
        Ok(())
    }

    async fn commit(
        &self,
        id: &ContainerId,
        repository: &str,
        tag: &str,
        _message: Option<&str>,
        _author: Option<&str>,
    ) -> Result<ImageId> {
        self.record(MockCall::Commit {
            id: id.0.clone(),
            repository: repository.to_string(),
            tag: tag.to_string(),
        });
        {
            let world = self.world.lock().unwrap();
            if !world.containers.iter().any(|c| c.id == id.0) {
                return Err(RuntimeError::ContainerNotFound(id.0.clone()));
            }
        }
        let full = self.add_image(repository, tag);
        // The real API reports abbreviated ids from commit.
        Ok(ImageId::new(&full[..12]))
    }

    async fn resolve_published_port(&self, id: &ContainerId, internal_port: u16) -> Result<u16> {
        self.record(MockCall::ResolvePort { id: id.0.clone() });
        let world = self.world.lock().unwrap();
        world
            .containers
            .iter()
            .find(|c| c.id == id.0 && c.running)
            .map(|c| c.host_port)
            .ok_or(RuntimeError::PortNotPublished {
                id: id.0.clone(),
                internal_port,
            })
    }

    async fn wait(&self, id: &ContainerId) -> Result<i64> {
        self.record(MockCall::Wait { id: id.0.clone() });
        let mut world = self.world.lock().unwrap();
        match world.containers.iter_mut().find(|c| c.id == id.0) {
            Some(container) => {
                container.running = false;
                Ok(*self.wait_exit_code.lock().unwrap())
            }
            None => Err(RuntimeError::ContainerNotFound(id.0.clone())),
        }
    }

    async fn attach_output(&self, id: &ContainerId) -> Result<OutputStream> {
        self.record(MockCall::Attach { id: id.0.clone() });
        Ok(OutputStream {
            stream: Box::pin(EmptyReader),
        })
    }
}

/// Prober that succeeds after a configurable number of failed attempts
pub struct CountingProber {
    attempts: AtomicUsize,
    succeed_after: usize,
}

impl CountingProber {
    /// Prober that succeeds on the first attempt
    pub fn always_ready() -> Self {
        Self::succeed_after(0)
    }

    /// Prober that never succeeds
    pub fn never_ready() -> Self {
        Self::succeed_after(usize::MAX)
    }

    /// Prober that fails the first `failures` attempts
    pub fn succeed_after(failures: usize) -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            succeed_after: failures,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SshProber for CountingProber {
    async fn probe(&self, _endpoint: SshEndpoint) -> bool {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst);
        n >= self.succeed_after
    }
}
