//! SSH readiness protocol
//!
//! Turns a freshly started, slow-booting container into a deterministically
//! reachable SSH endpoint. The published host port for the container's SSH
//! port is resolved once per protocol run; candidate host addresses are
//! re-enumerated on every outer pass because interfaces can change during
//! the boot window. Two timeout levels apply: an overall deadline bounds the
//! whole discovery, and a per-attempt timeout keeps a single hung connection
//! from starving the other candidates.

use crate::Result;
use async_trait::async_trait;
use sshbox_provider::{ContainerId, ContainerRuntime};
use std::future::Future;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Container-internal SSH port
pub const SSH_PORT: u16 = 22;

/// Timing parameters for the readiness loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySchedule {
    /// Overall deadline for the whole discovery
    pub overall: Duration,
    /// Deadline for a single connection attempt
    pub per_attempt: Duration,
    /// Fixed pause after a failed attempt
    pub backoff: Duration,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self {
            overall: Duration::from_secs(10),
            per_attempt: Duration::from_secs(10),
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetrySchedule {
    /// Schedule with a custom overall deadline in seconds
    pub fn with_overall_secs(secs: u64) -> Self {
        Self {
            overall: Duration::from_secs(secs),
            ..Default::default()
        }
    }
}

/// A host address/port pair through which a container's SSH daemon answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SshEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl std::fmt::Display for SshEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Outcome of the readiness protocol: either a full SSH handshake
/// round-tripped, or the deadline elapsed. No partial state exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Reachable(SshEndpoint),
    TimedOut,
}

/// A single bounded connection attempt against a candidate endpoint
#[async_trait]
pub trait SshProber: Send + Sync {
    /// Returns true when a full handshake succeeded
    async fn probe(&self, endpoint: SshEndpoint) -> bool;
}

/// Two-level bounded retry: try every candidate under a per-attempt timeout,
/// pausing between attempts, re-enumerating candidates each outer pass,
/// until one attempt succeeds or the overall deadline elapses.
///
/// Failed attempts are logged at debug level and swallowed here; this is the
/// only place in the system where errors are intentionally not surfaced.
pub async fn probe_candidates<C, E, F, Fut>(
    schedule: RetrySchedule,
    mut enumerate: E,
    mut attempt: F,
) -> Option<C>
where
    C: Clone + std::fmt::Debug,
    E: FnMut() -> Vec<C>,
    F: FnMut(C) -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + schedule.overall;
    while tokio::time::Instant::now() < deadline {
        let candidates = enumerate();
        if candidates.is_empty() {
            tracing::debug!("No candidate endpoints, waiting before re-enumerating");
            tokio::time::sleep(schedule.backoff).await;
            continue;
        }
        for candidate in candidates {
            tracing::debug!("Trying candidate {:?}", candidate);
            match tokio::time::timeout(schedule.per_attempt, attempt(candidate.clone())).await {
                Ok(true) => return Some(candidate),
                Ok(false) => tracing::debug!("Attempt against {:?} failed", candidate),
                Err(_) => tracing::debug!("Attempt against {:?} timed out", candidate),
            }
            tokio::time::sleep(schedule.backoff).await;
            if tokio::time::Instant::now() >= deadline {
                break;
            }
        }
    }
    None
}

/// Discover the externally reachable SSH endpoint of a running container and
/// block until a handshake actually succeeds through it (not merely until
/// the port is open).
pub async fn discover_ssh_endpoint<E>(
    runtime: &dyn ContainerRuntime,
    id: &ContainerId,
    prober: &dyn SshProber,
    schedule: RetrySchedule,
    mut enumerate_addresses: E,
) -> Result<Readiness>
where
    E: FnMut() -> Vec<Ipv4Addr>,
{
    // Port mappings never change while the container runs, so one resolution
    // per protocol run is enough.
    let host_port = runtime.resolve_published_port(id, SSH_PORT).await?;
    tracing::debug!(
        "Container {} publishes port {} as host port {}",
        id.short(),
        SSH_PORT,
        host_port
    );

    tracing::info!(
        "Waiting for SSH connection to {} (max {} seconds)",
        id.short(),
        schedule.overall.as_secs()
    );

    let hit = probe_candidates(
        schedule,
        || {
            enumerate_addresses()
                .into_iter()
                .map(|address| SshEndpoint {
                    address,
                    port: host_port,
                })
                .collect()
        },
        |endpoint| prober.probe(endpoint),
    )
    .await;

    Ok(match hit {
        Some(endpoint) => {
            tracing::debug!("Connected to {} over SSH at {}", id.short(), endpoint);
            Readiness::Reachable(endpoint)
        }
        None => Readiness::TimedOut,
    })
}

/// Non-loopback IPv4 addresses of local network interfaces.
///
/// Container port redirection is not reachable over loopback under the
/// runtime's networking model; IPv6 is out of scope.
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();
    let Ok(interfaces) = nix::ifaddrs::getifaddrs() else {
        return addresses;
    };
    for interface in interfaces {
        if let Some(storage) = interface.address {
            if let Some(sin) = storage.as_sockaddr_in() {
                let ip = sin.ip();
                if !ip.is_loopback() {
                    addresses.push(ip);
                }
            }
        }
    }
    addresses.sort();
    addresses.dedup();
    addresses
}
