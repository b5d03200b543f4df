//! File-backed flat key-value store.
//!
//! The native stand-in for a browser's synchronous local storage. Used as
//! the identity Tier-1 and as the scope cache's durable local store.

use super::atomic_file::AtomicFile;
use chatstudy_core::error::Result;
use chatstudy_core::identity::KeyValueStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

type Entries = BTreeMap<String, String>;

/// Key-value store persisted as a single JSON object.
///
/// Directory structure:
/// ```text
/// base_dir/
/// ├── identity.json   # Tier-1
/// └── scope.json      # scope cache
/// ```
pub struct FileKeyValueStore {
    file: AtomicFile<Entries>,
}

impl FileKeyValueStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: AtomicFile::json(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn entries(&self) -> Result<Entries> {
        Ok(self.file.load()?.unwrap_or_default())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Entries),
    {
        let path = self.file.path().display().to_string();
        self.file.update(
            Entries::new(),
            |e| {
                tracing::warn!(
                    "[FileKeyValueStore] Discarding unreadable store {}: {}",
                    path,
                    e
                );
                Some(Entries::new())
            },
            |entries| {
                f(entries);
                Ok(())
            },
        )
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        if !self.file.path().exists() {
            return Ok(());
        }
        self.update(|entries| {
            entries.remove(key);
        })
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries()?.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_remove() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path().join("kv.json"));

        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kv.json");
        FileKeyValueStore::new(path.clone()).set("k", "v").unwrap();

        let reopened = FileKeyValueStore::new(path);
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_corrupt_file_reads_as_error_then_write_repairs() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("kv.json");
        std::fs::write(&path, "[1,2").unwrap();
        let store = FileKeyValueStore::new(path);

        assert!(store.get("k").is_err());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_remove_on_missing_file_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::new(temp_dir.path().join("kv.json"));
        store.remove("nothing").unwrap();
        assert!(!store.path().exists());
    }
}
