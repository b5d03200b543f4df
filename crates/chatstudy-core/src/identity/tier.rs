//! Persistence tier traits.
//!
//! Defines the two independently failable surfaces the identity resolver
//! and the scope cache persist through.

use crate::error::Result;
use async_trait::async_trait;

/// A synchronous flat key-value surface (Tier-1, and the scope cache's
/// local store).
///
/// Fast, but expected to be cleared by routine privacy actions.
/// Every method may fail (quota, disabled, permission); callers treat
/// failure as "tier unavailable".
pub trait KeyValueStore: Send + Sync {
    /// Reads a value.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))`: key present
    /// - `Ok(None)`: key absent
    /// - `Err(_)`: the store could not be read
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value, replacing any existing one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Lists every key currently stored.
    fn keys(&self) -> Result<Vec<String>>;
}

/// An asynchronous structured surface (Tier-2).
///
/// Slower than Tier-1 but survives Tier-1 being cleared.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
