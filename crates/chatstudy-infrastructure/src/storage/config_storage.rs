//! `config.toml` storage.

use super::atomic_file::AtomicFile;
use chatstudy_core::config::StudyConfig;
use chatstudy_core::error::{Result, StudyError};
use std::path::PathBuf;

/// Loads and saves [`StudyConfig`].
///
/// A missing or empty file yields the defaults. A file that exists but
/// cannot be parsed is reported as a `Config` error; unlike the cache
/// tiers, configuration is never silently discarded.
pub struct ConfigStorage {
    file: AtomicFile<StudyConfig>,
}

impl ConfigStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: AtomicFile::toml(path),
        }
    }

    pub fn load(&self) -> Result<StudyConfig> {
        match self.file.load() {
            Ok(config) => Ok(config.unwrap_or_default()),
            Err(e) if e.is_serialization() => Err(StudyError::config(format!(
                "{}: {}",
                self.file.path().display(),
                e
            ))),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, config: &StudyConfig) -> Result<()> {
        self.file.save(config)
    }

    /// Applies `f` to the stored configuration under the file lock.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut StudyConfig),
    {
        self.file.update(StudyConfig::default(), |_| None, |config| {
            f(config);
            Ok(())
        })
    }
}
