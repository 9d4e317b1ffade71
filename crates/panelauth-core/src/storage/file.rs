use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::{Expiry, KeyValueStore, StorageError, StoredEntry};

/// Store that keeps one JSON file per key inside a directory.
///
/// Used as the durable tier under the data directory, and as the CLI's
/// short-lived tier under the runtime directory (which the OS empties when
/// the login session ends).
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::file_stem(key)))
    }

    /// Keys become file names; anything outside `[A-Za-z0-9_-]` is replaced.
    fn file_stem(key: &str) -> String {
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    fn load(&self, key: &str) -> Result<Option<StoredEntry>, StorageError> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)?;
        let entry: StoredEntry = serde_json::from_str(&contents)?;
        Ok(Some(entry))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        match self.load(key)? {
            Some(entry) if entry.is_expired() => {
                debug!(key = key, "Stored entry expired");
                self.remove(key)?;
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: Value, expiry: Expiry) -> Result<(), StorageError> {
        let entry = StoredEntry::new(value, expiry);
        let contents = serde_json::to_string_pretty(&entry)?;
        std::fs::write(self.entry_path(key), contents)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                std::fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
