//! Global configuration for sshbox
//!
//! Located at `~/.config/sshbox/config.toml`

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global sshbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub defaults: DefaultsConfig,
    pub runtime: RuntimeConfig,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Base image new containers are bootstrapped from
    pub base_image: String,
    /// Host name override for containers (defaults to the image tag)
    pub hostname: Option<String>,
    /// Overall timeout in seconds while waiting for a container to accept SSH
    pub ssh_timeout_secs: u64,
    /// What happens to the container after a commit: "restart" or "keep-running"
    pub commit_policy: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            base_image: "ubuntu:jammy".to_string(),
            hostname: None,
            ssh_timeout_secs: 10,
            commit_policy: "restart".to_string(),
        }
    }
}

/// Container runtime connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Docker-compatible API socket path
    pub socket: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            socket: default_socket(),
        }
    }
}

#[cfg(windows)]
fn default_socket() -> String {
    "//./pipe/docker_engine".to_string()
}

#[cfg(not(windows))]
fn default_socket() -> String {
    "/var/run/docker.sock".to_string()
}

impl GlobalConfig {
    /// Load global configuration from the default path
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load global configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.clone(),
            source: e,
        })?;

        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "sshbox").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (SSH keys, container associations)
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "sshbox").ok_or(ConfigError::NoDataDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GlobalConfig::default();
        assert_eq!(config.defaults.base_image, "ubuntu:jammy");
        assert_eq!(config.defaults.ssh_timeout_secs, 10);
        assert_eq!(config.defaults.commit_policy, "restart");
        assert!(config.defaults.hostname.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[defaults]
base_image = "debian:bookworm"
ssh_timeout_secs = 30
commit_policy = "keep-running"

[runtime]
socket = "/run/user/1000/podman/podman.sock"
"#;

        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.defaults.base_image, "debian:bookworm");
        assert_eq!(config.defaults.ssh_timeout_secs, 30);
        assert_eq!(config.defaults.commit_policy, "keep-running");
        assert_eq!(config.runtime.socket, "/run/user/1000/podman/podman.sock");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let toml = r#"
[runtime]
socket = "/custom/docker.sock"
"#;
        let config: GlobalConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.runtime.socket, "/custom/docker.sock");
        assert_eq!(config.defaults.ssh_timeout_secs, 10);
    }
}
