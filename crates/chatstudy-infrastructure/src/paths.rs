//! Unified path management for chatstudy files.

use std::path::{Path, PathBuf};

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home / config directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for chatstudy_core::StudyError {
    fn from(err: PathError) -> Self {
        chatstudy_core::StudyError::config(err.to_string())
    }
}

/// Path layout for one client installation.
///
/// # Directory Structure
///
/// ```text
/// ~/.config/chatstudy/
/// ├── config.toml        # StudyConfig
/// ├── identity.json      # identity Tier-1 (flat key-value file)
/// ├── vault.sqlite3      # identity Tier-2 (embedded key-value store)
/// ├── scope.json         # principal-scoped cache
/// └── logs/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyPaths {
    base: PathBuf,
}

impl StudyPaths {
    const APP_DIR: &'static str = "chatstudy";

    /// Resolves the platform config directory (e.g. `~/.config/chatstudy`).
    pub fn default_location() -> Result<Self, PathError> {
        let base = dirs::config_dir()
            .ok_or(PathError::HomeDirNotFound)?
            .join(Self::APP_DIR);
        Ok(Self { base })
    }

    /// Uses `base` as the root directory.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.toml")
    }

    pub fn identity_file(&self) -> PathBuf {
        self.base.join("identity.json")
    }

    pub fn vault_file(&self) -> PathBuf {
        self.base.join("vault.sqlite3")
    }

    pub fn scope_file(&self) -> PathBuf {
        self.base.join("scope.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_location_ends_with_app_dir() {
        if let Ok(paths) = StudyPaths::default_location() {
            assert!(paths.base_dir().ends_with("chatstudy"));
        }
    }

    #[test]
    fn test_files_live_under_base() {
        let paths = StudyPaths::with_base("/tmp/study");
        for file in [
            paths.config_file(),
            paths.identity_file(),
            paths.vault_file(),
            paths.scope_file(),
            paths.logs_dir(),
        ] {
            assert!(file.starts_with("/tmp/study"));
        }
        assert_ne!(paths.identity_file(), paths.scope_file());
        assert!(paths.vault_file().ends_with("vault.sqlite3"));
    }
}
