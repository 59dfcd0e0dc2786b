//! File-based token storage.
//!
//! Stores session entries in a TOML file with owner-only permissions
//! (0600 on Unix).  The file is re-read on every access so a logout written by
//! another process sharing the file is observed on the next read.
//!
//! # File Format
//!
//! ```toml
//! [entries]
//! "civic_link.access_token" = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9..."
//! "civic_link.refresh_token" = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9..."
//! "civic_link.user" = "{\"id\":\"u1\",...}"
//! ```

use super::{apply_updates, StorageChange, TokenStore};
use crate::error::{CivicLinkError, Result};
use crate::event_handlers::Listeners;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Top-level TOML structure
#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default)]
    entries: HashMap<String, String>,
}

/// File-backed [`TokenStore`].
///
/// Writes go to a sibling temporary file that is then renamed over the
/// target, so a batch is either fully visible or not at all.
pub struct FileTokenStore {
    file_path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
    listeners: Listeners<StorageChange>,
}

impl FileTokenStore {
    /// Create a store at a custom location. The file is created lazily on the
    /// first write.
    pub fn with_path(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            write_lock: Mutex::new(()),
            listeners: Listeners::new(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn load(&self) -> Result<HashMap<String, String>> {
        if !self.file_path.exists() {
            return Ok(HashMap::new());
        }

        let contents = fs::read_to_string(&self.file_path).map_err(|e| {
            CivicLinkError::StorageError(format!(
                "Cannot read token file {}: {}",
                self.file_path.display(),
                e
            ))
        })?;

        let file: TokenFile = toml::from_str(&contents).map_err(|e| {
            CivicLinkError::StorageError(format!(
                "Corrupted token file {}: {}",
                self.file_path.display(),
                e
            ))
        })?;

        Ok(file.entries)
    }

    fn save(&self, entries: HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let contents = toml::to_string_pretty(&TokenFile { entries })?;
        let tmp_path = self.file_path.with_extension("toml.tmp");
        fs::write(&tmp_path, contents)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, &self.file_path)?;
        Ok(())
    }

    fn apply(&self, updates: Vec<(String, Option<String>)>) -> Result<()> {
        let changes = {
            let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
            let mut entries = self.load()?;
            let changes = apply_updates(&mut entries, updates);
            if !changes.is_empty() {
                self.save(entries)?;
            }
            changes
        };
        for change in &changes {
            self.listeners.emit(change);
        }
        Ok(())
    }
}

impl std::fmt::Debug for FileTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTokenStore")
            .field("file_path", &self.file_path)
            .finish()
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        self.apply(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), Some(v.to_string())))
                .collect(),
        )
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        self.apply(keys.iter().map(|k| (k.to_string(), None)).collect())
    }

    fn changes(&self) -> Option<Listeners<StorageChange>> {
        Some(self.listeners.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_roundtrip_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.toml");

        let store = FileTokenStore::with_path(&path);
        assert_eq!(store.get("civic_link.access_token").unwrap(), None);

        store
            .set_many(&[("civic_link.access_token", "a"), ("civic_link.user", r#"{"id":"u1"}"#)])
            .unwrap();

        // A second instance over the same file sees the data.
        let other = FileTokenStore::with_path(&path);
        assert_eq!(other.get("civic_link.access_token").unwrap(), Some("a".to_string()));
        assert_eq!(other.get("civic_link.user").unwrap(), Some(r#"{"id":"u1"}"#.to_string()));

        other.remove_many(&["civic_link.access_token"]).unwrap();
        assert_eq!(store.get("civic_link.access_token").unwrap(), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        let store = FileTokenStore::with_path(&path);
        store.set_many(&[("k", "v")]).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupted_file_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        fs::write(&path, "entries = [not valid").unwrap();

        let store = FileTokenStore::with_path(&path);
        assert!(matches!(store.get("k"), Err(CivicLinkError::StorageError(_))));
    }
}
