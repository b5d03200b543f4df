//! Configuration model.
//!
//! Every field has a default so that a missing or partial `config.toml`
//! still yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct StudyConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub remote: RemoteSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Conversation synchronizer settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SyncSettings {
    /// Quiet period after the last message before a conversation is saved.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// How often the background driver checks for due saves.
    #[serde(default = "default_driver_tick_ms")]
    pub driver_tick_ms: u64,
}

impl SyncSettings {
    /// The debounce interval, capped at [`MAX_DEBOUNCE_MS`].
    pub fn debounce(&self) -> chrono::Duration {
        let ms = i64::try_from(self.debounce_ms.min(MAX_DEBOUNCE_MS)).unwrap_or(0);
        chrono::Duration::milliseconds(ms)
    }

    pub fn driver_tick(&self) -> Duration {
        Duration::from_millis(self.driver_tick_ms.max(1))
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            driver_tick_ms: default_driver_tick_ms(),
        }
    }
}

/// Upper bound for `debounce_ms`: one day.
pub const MAX_DEBOUNCE_MS: u64 = 24 * 60 * 60 * 1000;

fn default_debounce_ms() -> u64 {
    1000
}

fn default_driver_tick_ms() -> u64 {
    250
}

/// Digest used for device fingerprints.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    /// Rolling multiplicative hash, for embedders without a digest primitive.
    Rolling,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct IdentitySettings {
    /// Number of hex characters kept from the fingerprint digest.
    #[serde(default = "default_fingerprint_length")]
    pub fingerprint_length: usize,
    #[serde(default)]
    pub hash_algorithm: HashAlgorithm,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            fingerprint_length: default_fingerprint_length(),
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

fn default_fingerprint_length() -> usize {
    32
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RemoteSettings {
    /// Base URL of the conversation store. `None` runs in offline mode.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
