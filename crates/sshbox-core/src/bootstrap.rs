//! Base image provisioning
//!
//! New image identities start from a shared provisioned base image rather
//! than a bare distribution image. The base differs from the distribution
//! image it was created from on a couple of points:
//!
//! - automatic installation of recommended packages is disabled to conserve
//!   disk space;
//! - an SSH server and a process runner are installed (the runtime replaces
//!   `/sbin/init`, so nothing else supervises long-running daemons);
//! - the generated SSH public key is installed for the root user;
//! - the process runner is configured to keep the SSH server running.
//!
//! Provisioning runs as the single command of a throwaway container whose
//! filesystem is then committed as the base image.

use crate::{expand_short_id, ImageRef, OutputRelay, Result, SSH_PORT};
use base64::Engine;
use sshbox_provider::{ContainerRuntime, CreateContainerConfig};

/// Repository of the shared base image
pub const BASE_IMAGE_REPOSITORY: &str = "sshbox";
/// Tag of the shared base image
pub const BASE_IMAGE_TAG: &str = "base";

const APT_CONFIG: &str = "\
# /etc/apt/apt.conf.d/90sshbox:
# Disable automatic installation of recommended packages.

APT::Install-Recommends \"false\";
";

const SUPERVISOR_CONFIG: &str = "\
# /etc/supervisor/conf.d/ssh-server.conf:
# Replacement for the init-managed SSH service.

[program:ssh-server]
command = bash -c 'mkdir -p -m0755 /var/run/sshd && /usr/sbin/sshd -eD'
autorestart = true
";

/// Command run as the main process of provisioned containers.
///
/// The SSH server is started directly because the runtime replaces
/// `/sbin/init` inside the container.
pub fn ssh_server_command() -> Vec<String> {
    vec![
        "bash".to_string(),
        "-c".to_string(),
        "mkdir -p -m0755 /var/run/sshd && exec /usr/sbin/sshd -eD".to_string(),
    ]
}

/// Find the most recent image with the given repository and tag
pub async fn find_named_image(
    runtime: &dyn ContainerRuntime,
    repository: &str,
    tag: &str,
) -> Result<Option<ImageRef>> {
    let mut matches: Vec<_> = runtime
        .list_images()
        .await?
        .into_iter()
        .filter(|image| image.repository == repository && image.tag == tag)
        .collect();
    matches.sort_by_key(|image| image.created);
    Ok(matches
        .pop()
        .map(|image| ImageRef::with_id(image.repository, image.tag, image.id.0)))
}

/// Pull an image unless it is already available locally
pub async fn download_image(runtime: &dyn ContainerRuntime, image: &ImageRef) -> Result<()> {
    if find_named_image(runtime, image.repository(), image.tag())
        .await?
        .is_none()
    {
        tracing::info!(
            "Downloading image {} (please be patient, this can take a while) ..",
            image
        );
        runtime.pull(image.repository(), image.tag()).await?;
        tracing::info!("Finished downloading image.");
    }
    Ok(())
}

/// Id of the shared base image, creating it first when it doesn't exist yet
pub async fn find_base_image(
    runtime: &dyn ContainerRuntime,
    distribution: &ImageRef,
    public_key: &str,
) -> Result<ImageRef> {
    tracing::debug!("Looking for base image ..");
    if let Some(base) = find_named_image(runtime, BASE_IMAGE_REPOSITORY, BASE_IMAGE_TAG).await? {
        tracing::debug!("Found base image: {}", base.unique_name());
        return Ok(base);
    }
    tracing::debug!("No base image found, creating it ..");
    create_base_image(runtime, distribution, public_key).await
}

/// Provision the shared base image from a distribution image
pub async fn create_base_image(
    runtime: &dyn ContainerRuntime,
    distribution: &ImageRef,
    public_key: &str,
) -> Result<ImageRef> {
    download_image(runtime, distribution).await?;
    tracing::info!(
        "Initializing base image (this can take a few minutes but you only have to do it once) .."
    );
    let command = provisioning_command(public_key);
    tracing::debug!("Generated provisioning command: {}", command);
    let response = runtime
        .create_container(&CreateContainerConfig {
            image: distribution.unique_name(),
            command: vec!["bash".to_string(), "-c".to_string(), command],
            hostname: Some("sshbox-template".to_string()),
            exposed_ports: vec![SSH_PORT],
        })
        .await?;
    for warning in &response.warnings {
        tracing::warn!("{}", warning);
    }
    let container_id = response.id;
    tracing::debug!("Created container {}.", container_id.short());
    runtime.start(&container_id).await?;

    let relay = OutputRelay::attach(runtime, &container_id).await?;
    tracing::info!("Waiting for initialization to finish ..");
    let exit_code = runtime.wait(&container_id).await?;
    relay.detach();
    if exit_code != 0 {
        tracing::warn!("Provisioning command exited with status {}.", exit_code);
    }

    tracing::info!("Saving initialized container as new base image ..");
    let short = runtime
        .commit(
            &container_id,
            BASE_IMAGE_REPOSITORY,
            BASE_IMAGE_TAG,
            Some("Installed SSH server & public key"),
            None,
        )
        .await?;
    // The provisioning container has served its purpose.
    runtime.remove_container(&container_id).await?;

    let candidates: Vec<String> = runtime
        .list_images()
        .await?
        .into_iter()
        .map(|image| image.id.0)
        .collect();
    let full_id = expand_short_id(short.as_ref(), &candidates)?;
    tracing::info!("Committed base image as {}.", &short);
    Ok(ImageRef::with_id(
        BASE_IMAGE_REPOSITORY,
        BASE_IMAGE_TAG,
        full_id,
    ))
}

/// Shell command that provisions a distribution image into the base image.
///
/// File contents travel base64-encoded so no shell quoting is needed.
fn provisioning_command(public_key: &str) -> String {
    let b64 = base64::engine::general_purpose::STANDARD;
    [
        format!(
            "mkdir -p /etc/apt/apt.conf.d && echo {} | base64 -d > /etc/apt/apt.conf.d/90sshbox",
            b64.encode(APT_CONFIG)
        ),
        "apt-get update".to_string(),
        "DEBIAN_FRONTEND=noninteractive apt-get install -q -y --no-install-recommends \
         openssh-server supervisor"
            .to_string(),
        "apt-get clean".to_string(),
        "mkdir -p /root/.ssh".to_string(),
        format!(
            "echo {} | base64 -d > /root/.ssh/authorized_keys",
            b64.encode(public_key)
        ),
        "chmod 600 /root/.ssh/authorized_keys".to_string(),
        format!(
            "mkdir -p /etc/supervisor/conf.d && echo {} | base64 -d \
             > /etc/supervisor/conf.d/ssh-server.conf",
            b64.encode(SUPERVISOR_CONFIG)
        ),
    ]
    .join(" && ")
}
