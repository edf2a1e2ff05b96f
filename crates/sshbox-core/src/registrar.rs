//! SSH client configuration registration
//!
//! Containers become reachable through a memorable alias by writing a host
//! stanza into the operator's SSH client configuration. Each image identity
//! owns one fragment file under `~/.ssh/config.d/`; the merged configuration
//! is regenerated from the fragments after every change. A configuration
//! that predates the first run is carried over as a fragment of its own.
//! Writes are last-writer-wins; concurrent invocations are not coordinated.

use crate::{Result, SshEndpoint};
use std::path::{Path, PathBuf};

/// Registration of per-container SSH client configuration
pub trait AccessRegistrar: Send + Sync {
    /// Write (or overwrite) the stanza registered under a key
    fn write_stanza(&self, key: &str, stanza: &str) -> Result<()>;

    /// Remove the stanza registered under a key, if present
    fn remove_stanza(&self, key: &str) -> Result<()>;

    /// Rebuild the merged configuration from all registered stanzas
    fn regenerate(&self) -> Result<()>;
}

/// Fragment-per-container registrar over `~/.ssh/config.d/`
pub struct FileRegistrar {
    config_file: PathBuf,
    fragment_dir: PathBuf,
}

impl FileRegistrar {
    /// Registrar over the operator's `~/.ssh/config`
    pub fn new() -> Result<Self> {
        let home = directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("/root"));
        let ssh_dir = home.join(".ssh");
        Ok(Self::with_paths(
            ssh_dir.join("config"),
            ssh_dir.join("config.d"),
        ))
    }

    pub fn with_paths(config_file: impl Into<PathBuf>, fragment_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            fragment_dir: fragment_dir.into(),
        }
    }

    fn fragment_path(&self, key: &str) -> PathBuf {
        self.fragment_dir.join(format!("sshbox:{key}"))
    }

    /// On the first run, take over an existing hand-written configuration as
    /// a fragment of its own so regeneration keeps it. Named `local` so it
    /// sorts ahead of every `sshbox:` fragment in the merge.
    fn adopt_existing_config(&self) -> Result<()> {
        if self.fragment_dir.exists() || !self.config_file.is_file() {
            return Ok(());
        }
        let contents = std::fs::read_to_string(&self.config_file)?;
        std::fs::create_dir_all(&self.fragment_dir)?;
        if contents.trim().is_empty() {
            return Ok(());
        }
        let local = self.fragment_dir.join("local");
        tracing::info!(
            "Preserving existing SSH client configuration as {}",
            local.display()
        );
        crate::association::atomic_write(&local, contents.as_bytes())?;
        Ok(())
    }
}

impl AccessRegistrar for FileRegistrar {
    fn write_stanza(&self, key: &str, stanza: &str) -> Result<()> {
        self.adopt_existing_config()?;
        std::fs::create_dir_all(&self.fragment_dir)?;
        let path = self.fragment_path(key);
        tracing::debug!("Writing SSH client configuration: {}", path.display());
        crate::association::atomic_write(&path, stanza.as_bytes())?;
        Ok(())
    }

    fn remove_stanza(&self, key: &str) -> Result<()> {
        let path = self.fragment_path(key);
        if path.is_file() {
            tracing::debug!("Removing SSH client configuration: {}", path.display());
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn regenerate(&self) -> Result<()> {
        self.adopt_existing_config()?;
        let mut fragments = Vec::new();
        if self.fragment_dir.is_dir() {
            for entry in std::fs::read_dir(&self.fragment_dir)? {
                let entry = entry?;
                if entry.file_type()?.is_file() {
                    fragments.push(entry.path());
                }
            }
        }
        // Deterministic merge order.
        fragments.sort();

        let mut merged = String::new();
        for path in fragments {
            let contents = std::fs::read_to_string(&path)?;
            merged.push_str(&contents);
            if !contents.ends_with('\n') {
                merged.push('\n');
            }
        }

        if let Some(parent) = self.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        crate::association::atomic_write(&self.config_file, merged.as_bytes())?;
        Ok(())
    }
}

/// Convert text to a lowercase hyphen-separated slug
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_hyphen = true;
    for c in text.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Alias used to reach a container over SSH
pub fn ssh_alias(hostname: &str) -> String {
    slug(&format!("{hostname}-container"))
}

/// Render the host stanza registered for a ready container
pub fn host_stanza(alias: &str, endpoint: SshEndpoint, private_key: &Path) -> String {
    format!(
        "Host {alias}\n  \
         Hostname {address}\n  \
         Port {port}\n  \
         User root\n  \
         IdentityFile {key}\n  \
         StrictHostKeyChecking no\n  \
         UserKnownHostsFile /dev/null\n",
        alias = alias,
        address = endpoint.address,
        port = endpoint.port,
        key = private_key.display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_slug_replaces_punctuation() {
        assert_eq!(slug("Some Random Text!"), "some-random-text");
        assert_eq!(slug("demo"), "demo");
        assert_eq!(slug("a__b..c"), "a-b-c");
    }

    #[test]
    fn test_ssh_alias_appends_container_suffix() {
        assert_eq!(ssh_alias("demo"), "demo-container");
        assert_eq!(ssh_alias("My Box"), "my-box-container");
    }

    #[test]
    fn test_host_stanza_contents() {
        let stanza = host_stanza(
            "demo-container",
            SshEndpoint {
                address: Ipv4Addr::new(192, 168, 1, 5),
                port: 49153,
            },
            Path::new("/keys/alice:demo"),
        );
        assert!(stanza.starts_with("Host demo-container\n"));
        assert!(stanza.contains("Hostname 192.168.1.5"));
        assert!(stanza.contains("Port 49153"));
        assert!(stanza.contains("IdentityFile /keys/alice:demo"));
        assert!(stanza.contains("StrictHostKeyChecking no"));
    }

    #[test]
    fn test_write_and_regenerate_merges_fragments() {
        let tmp = tempfile::tempdir().unwrap();
        let registrar = FileRegistrar::with_paths(
            tmp.path().join("config"),
            tmp.path().join("config.d"),
        );

        registrar.write_stanza("alice:a", "Host a\n").unwrap();
        registrar.write_stanza("alice:b", "Host b\n").unwrap();
        registrar.regenerate().unwrap();

        let merged = std::fs::read_to_string(tmp.path().join("config")).unwrap();
        // Fragments merge in sorted filename order.
        let a = merged.find("Host a").unwrap();
        let b = merged.find("Host b").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_existing_config_survives_first_regenerate() {
        let tmp = tempfile::tempdir().unwrap();
        let config = tmp.path().join("config");
        std::fs::write(&config, "Host work-server\n  User deploy\n").unwrap();
        let registrar = FileRegistrar::with_paths(&config, tmp.path().join("config.d"));

        registrar.write_stanza("alice:demo", "Host demo-container\n").unwrap();
        registrar.regenerate().unwrap();

        let merged = std::fs::read_to_string(&config).unwrap();
        // Hand-written configuration is kept ahead of generated stanzas.
        let existing = merged.find("Host work-server").unwrap();
        let generated = merged.find("Host demo-container").unwrap();
        assert!(existing < generated);
        assert!(merged.contains("User deploy"));

        // Later regenerations keep it too.
        registrar.remove_stanza("alice:demo").unwrap();
        registrar.regenerate().unwrap();
        let merged = std::fs::read_to_string(&config).unwrap();
        assert!(merged.contains("Host work-server"));
        assert!(!merged.contains("Host demo-container"));
    }

    #[test]
    fn test_remove_stanza_then_regenerate() {
        let tmp = tempfile::tempdir().unwrap();
        let registrar = FileRegistrar::with_paths(
            tmp.path().join("config"),
            tmp.path().join("config.d"),
        );

        registrar.write_stanza("alice:a", "Host a\n").unwrap();
        registrar.regenerate().unwrap();
        registrar.remove_stanza("alice:a").unwrap();
        registrar.regenerate().unwrap();

        let merged = std::fs::read_to_string(tmp.path().join("config")).unwrap();
        assert!(merged.is_empty());
    }

    #[test]
    fn test_remove_missing_stanza_is_ok() {
        let tmp = tempfile::tempdir().unwrap();
        let registrar = FileRegistrar::with_paths(
            tmp.path().join("config"),
            tmp.path().join("config.d"),
        );
        assert!(registrar.remove_stanza("alice:gone").is_ok());
    }
}
