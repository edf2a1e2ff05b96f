//! SSH key management and connection probing
//!
//! Each image gets a dedicated key pair under the application data directory.
//! The public half is baked into provisioned images; the private half is
//! referenced from the generated client configuration. Host keys of
//! containers are throwaway, so all client invocations disable host key
//! checking.

use crate::{CoreError, Result, SshEndpoint, SshProber};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Per-image SSH key pairs stored on the host
pub struct SshKeys {
    catalog: PathBuf,
}

impl SshKeys {
    /// Key catalog under the application data directory
    pub fn new() -> Result<Self> {
        Ok(Self {
            catalog: sshbox_config::GlobalConfig::data_dir()?.join("ssh"),
        })
    }

    pub fn with_catalog(catalog: impl Into<PathBuf>) -> Self {
        Self {
            catalog: catalog.into(),
        }
    }

    /// Path of the private key for the named image
    pub fn private_key_path(&self, image_name: &str) -> PathBuf {
        self.catalog.join(image_name)
    }

    /// Path of the public key for the named image
    pub fn public_key_path(&self, image_name: &str) -> PathBuf {
        self.catalog.join(format!("{image_name}.pub"))
    }

    /// Read the public key, generating the pair first when none exists yet
    pub async fn public_key(&self, image_name: &str, hostname: &str) -> Result<String> {
        let public_key_path = self.public_key_path(image_name);
        if !public_key_path.is_file() {
            self.generate_key_pair(image_name, hostname).await?;
        }
        let contents = std::fs::read_to_string(&public_key_path)?;
        Ok(contents.trim().to_string())
    }

    async fn generate_key_pair(&self, image_name: &str, hostname: &str) -> Result<()> {
        std::fs::create_dir_all(&self.catalog)?;
        let private_key_path = self.private_key_path(image_name);
        if private_key_path.is_file() {
            tracing::debug!("Key pair already exists: {}", private_key_path.display());
            return Ok(());
        }
        tracing::info!(
            "No existing SSH key pair found, generating new pair: {}",
            private_key_path.display()
        );
        let status = Command::new("ssh-keygen")
            .arg("-t")
            .arg("rsa")
            .arg("-f")
            .arg(&private_key_path)
            .arg("-N")
            .arg("")
            .arg("-C")
            .arg(format!("root@{hostname}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(CoreError::ExternalProcessFailed {
                command: "ssh-keygen".to_string(),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Arguments for an SSH client invocation against a container endpoint.
///
/// Containers are accessed as root with the image's generated key; host keys
/// are neither checked nor stored.
pub fn ssh_client_args(private_key: &Path, endpoint: SshEndpoint) -> Vec<String> {
    vec![
        "-l".to_string(),
        "root".to_string(),
        "-i".to_string(),
        private_key.display().to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        "-o".to_string(),
        "UserKnownHostsFile=/dev/null".to_string(),
        "-q".to_string(),
        "-p".to_string(),
        endpoint.port.to_string(),
        "-e".to_string(),
        "none".to_string(),
        endpoint.address.to_string(),
    ]
}

/// Probes endpoints by running the system `ssh` client in batch mode
pub struct ProcessProber {
    private_key: PathBuf,
}

impl ProcessProber {
    pub fn new(private_key: impl Into<PathBuf>) -> Self {
        Self {
            private_key: private_key.into(),
        }
    }
}

#[async_trait]
impl SshProber for ProcessProber {
    async fn probe(&self, endpoint: SshEndpoint) -> bool {
        tracing::debug!("Connecting over SSH at {} ..", endpoint);
        let result = Command::new("ssh")
            .args(ssh_client_args(&self.private_key, endpoint))
            // Probes must never block on a password prompt.
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;
        matches!(result, Ok(status) if status.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_key_paths_are_per_image() {
        let keys = SshKeys::with_catalog("/tmp/catalog");
        assert_eq!(
            keys.private_key_path("alice:demo"),
            PathBuf::from("/tmp/catalog/alice:demo")
        );
        assert_eq!(
            keys.public_key_path("alice:demo"),
            PathBuf::from("/tmp/catalog/alice:demo.pub")
        );
    }

    #[tokio::test]
    async fn test_failing_keygen_surfaces_exit_status() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let stub = bin.join("ssh-keygen");
        std::fs::write(&stub, "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::env::set_var("PATH", &bin);

        let keys = SshKeys::with_catalog(tmp.path().join("catalog"));
        let result = keys.public_key("alice:demo", "devbox").await;
        match result {
            Err(CoreError::ExternalProcessFailed { command, status }) => {
                assert_eq!(command, "ssh-keygen");
                assert_eq!(status, 3);
            }
            other => panic!("expected key generation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_client_args_disable_host_key_checks() {
        let endpoint = SshEndpoint {
            address: Ipv4Addr::new(192, 168, 1, 10),
            port: 49153,
        };
        let args = ssh_client_args(Path::new("/keys/alice:demo"), endpoint);
        assert!(args.contains(&"StrictHostKeyChecking=no".to_string()));
        assert!(args.contains(&"UserKnownHostsFile=/dev/null".to_string()));
        assert!(args.contains(&"192.168.1.10".to_string()));
        assert!(args.contains(&"49153".to_string()));
    }
}
