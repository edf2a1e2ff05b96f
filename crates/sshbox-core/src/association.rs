//! Image-to-container associations
//!
//! Persists the mapping from image name to container id at
//! `~/.local/share/sshbox/containers.json` so a second invocation can adopt
//! a container started by an earlier one. Entries may go stale when
//! containers die out of band; readers verify against the runtime and treat
//! stale entries as absence.

use crate::Result;
use serde::{Deserialize, Serialize};
use sshbox_config::GlobalConfig;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write content to a file atomically using a temp-file-then-rename pattern.
///
/// Writes to a temporary file in the same directory, then renames it to the
/// target path. A crash during write leaves the old file intact.
pub(crate) fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(content)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// On-disk map from image name to the id of its running container
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AssociationStore {
    /// Version for forward compatibility
    pub version: u32,
    /// Container id per image name
    pub containers: HashMap<String, String>,
}

impl AssociationStore {
    const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            containers: HashMap::new(),
        }
    }

    /// Load associations from the default location
    pub fn load() -> Result<Self> {
        let path = Self::store_path()?;
        Self::load_from(&path)
    }

    /// Load associations from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)?;
        let store: Self = serde_json::from_str(&content)?;

        if store.version > Self::CURRENT_VERSION {
            tracing::warn!(
                "Association file version {} is newer than supported version {}",
                store.version,
                Self::CURRENT_VERSION
            );
        }

        Ok(store)
    }

    /// Save associations to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::store_path()?;
        self.save_to(&path)
    }

    /// Save associations to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        atomic_write(path, content.as_bytes())?;

        Ok(())
    }

    /// Get the default association file path
    pub fn store_path() -> Result<PathBuf> {
        let data_dir = GlobalConfig::data_dir()?;
        Ok(data_dir.join("containers.json"))
    }

    /// Container id recorded for an image name, if any
    pub fn get(&self, image_name: &str) -> Option<&str> {
        self.containers.get(image_name).map(String::as_str)
    }

    /// Record the container backing an image name
    pub fn set(&mut self, image_name: impl Into<String>, container_id: impl Into<String>) {
        self.containers.insert(image_name.into(), container_id.into());
    }

    /// Drop the record for an image name
    pub fn remove(&mut self, image_name: &str) -> Option<String> {
        self.containers.remove(image_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("containers.json");

        let mut store = AssociationStore::new();
        store.set("alice:demo", "abc123456789");
        store.save_to(&path).unwrap();

        let loaded = AssociationStore::load_from(&path).unwrap();
        assert_eq!(loaded.get("alice:demo"), Some("abc123456789"));
    }

    #[test]
    fn test_load_nonexistent_returns_empty() {
        let path = PathBuf::from("/tmp/nonexistent_sshbox_associations.json");
        let store = AssociationStore::load_from(&path).unwrap();
        assert!(store.containers.is_empty());
        assert_eq!(store.version, AssociationStore::CURRENT_VERSION);
    }

    #[test]
    fn test_load_corrupted_json_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "not valid json {{{").unwrap();

        assert!(AssociationStore::load_from(&path).is_err());
    }

    #[test]
    fn test_load_future_version_still_loads() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("future.json");
        std::fs::write(&path, r#"{"version": 999, "containers": {}}"#).unwrap();

        let store = AssociationStore::load_from(&path).unwrap();
        assert_eq!(store.version, 999);
    }

    #[test]
    fn test_remove_then_save_drops_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("containers.json");

        let mut store = AssociationStore::new();
        store.set("alice:demo", "abc");
        store.set("alice:other", "def");
        store.save_to(&path).unwrap();

        store.remove("alice:demo");
        store.save_to(&path).unwrap();

        let loaded = AssociationStore::load_from(&path).unwrap();
        assert!(loaded.get("alice:demo").is_none());
        assert_eq!(loaded.get("alice:other"), Some("def"));
    }

    #[test]
    fn test_save_to_atomic_no_temp_file_left() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("containers.json");

        AssociationStore::new().save_to(&path).unwrap();

        for entry in std::fs::read_dir(tmp.path()).unwrap().filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            assert!(!name.contains(".tmp"), "Temp file left behind: {}", name);
        }
    }
}
