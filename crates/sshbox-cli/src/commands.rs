//! CLI command implementations
//!
//! Each command maps an image identity to a [`Controller`] and runs one
//! lifecycle operation per named image.

use sshbox_config::GlobalConfig;
use sshbox_core::{Controller, ImageRef};
use sshbox_provider::ContainerRuntime;
use std::io::IsTerminal;
use std::sync::Arc;

fn controller_for(
    runtime: Arc<dyn ContainerRuntime>,
    config: &GlobalConfig,
    hostname: Option<String>,
    image_name: &str,
) -> anyhow::Result<Controller> {
    let image = ImageRef::coerce(image_name)?;
    Ok(Controller::new(runtime, image, config, hostname)?)
}

/// Start each container and wait for SSH readiness; with a single image on
/// an interactive terminal, drop into an SSH session afterwards.
pub async fn start(
    runtime: Arc<dyn ContainerRuntime>,
    config: &GlobalConfig,
    hostname: Option<String>,
    images: &[String],
) -> anyhow::Result<()> {
    for image_name in images {
        let mut controller =
            controller_for(runtime.clone(), config, hostname.clone(), image_name)?;
        controller.start().await?;
        if images.len() == 1 && interactive_terminal() {
            tracing::info!("Detected interactive terminal, connecting to container ..");
            connect(&controller.ssh_alias()).await?;
        }
    }
    Ok(())
}

pub async fn commit(
    runtime: Arc<dyn ContainerRuntime>,
    config: &GlobalConfig,
    hostname: Option<String>,
    images: &[String],
    message: Option<&str>,
    author: Option<&str>,
) -> anyhow::Result<()> {
    for image_name in images {
        let mut controller =
            controller_for(runtime.clone(), config, hostname.clone(), image_name)?;
        controller.commit(message, author).await?;
    }
    Ok(())
}

pub async fn kill(
    runtime: Arc<dyn ContainerRuntime>,
    config: &GlobalConfig,
    hostname: Option<String>,
    images: &[String],
) -> anyhow::Result<()> {
    for image_name in images {
        let mut controller =
            controller_for(runtime.clone(), config, hostname.clone(), image_name)?;
        controller.kill().await?;
    }
    Ok(())
}

pub async fn delete(
    runtime: Arc<dyn ContainerRuntime>,
    config: &GlobalConfig,
    hostname: Option<String>,
    images: &[String],
) -> anyhow::Result<()> {
    for image_name in images {
        let mut controller =
            controller_for(runtime.clone(), config, hostname.clone(), image_name)?;
        controller.delete().await?;
    }
    Ok(())
}

fn interactive_terminal() -> bool {
    std::io::stdin().is_terminal()
        && std::io::stdout().is_terminal()
        && std::io::stderr().is_terminal()
}

/// Hand the terminal to an SSH session against the registered alias
async fn connect(alias: &str) -> anyhow::Result<()> {
    let status = tokio::process::Command::new("ssh")
        .arg(alias)
        .status()
        .await?;
    match status.code() {
        Some(0) => tracing::info!("SSH client exited."),
        Some(code) => tracing::warn!("SSH client exited with status {}.", code),
        None => tracing::warn!("SSH client was terminated by a signal."),
    }
    Ok(())
}
