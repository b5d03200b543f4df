//! Storage layer: atomic files, persistence tiers and configuration.

mod atomic_file;
mod config_storage;
mod file_store;
mod memory;
mod sqlite_vault;

pub use atomic_file::{AtomicFile, FileFormat};
pub use config_storage::ConfigStorage;
pub use file_store::FileKeyValueStore;
pub use memory::{InMemoryDurableStore, InMemoryKeyValueStore};
pub use sqlite_vault::SqliteVault;
