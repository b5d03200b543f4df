use chatstudy_core::identity::KeyValueStore;
use chatstudy_core::scope::{EntityKind, is_scope_key, principal_prefix, scope_key};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Local cache for tasks, settings and conversations, namespaced by the
/// principal that owns them.
///
/// Values are stored as JSON in a [`KeyValueStore`] under keys built by
/// [`scope_key`], and memoized in memory. A read for one principal can
/// never observe a value written for another, because the key always
/// embeds the principal id.
///
/// Store failures never reach the caller: reads degrade to the in-memory
/// memo (or absent) and writes report whether they became durable.
pub struct ScopeCache {
    store: Arc<dyn KeyValueStore>,
    /// scope key → raw JSON
    memo: Mutex<HashMap<String, String>>,
}

impl ScopeCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            memo: Mutex::new(HashMap::new()),
        }
    }

    fn memo(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.memo.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reads the value cached for `principal_id`. Malformed values read as
    /// absent.
    pub fn read<T: DeserializeOwned>(&self, principal_id: &str, kind: EntityKind) -> Option<T> {
        let key = scope_key(principal_id, kind);

        let memoized = self.memo().get(&key).cloned();
        let raw = match memoized {
            Some(raw) => raw,
            None => match self.store.get(&key) {
                Ok(Some(raw)) => {
                    self.memo().insert(key.clone(), raw.clone());
                    raw
                }
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!("[ScopeCache] Failed to read {}: {}", kind, e);
                    return None;
                }
            },
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("[ScopeCache] Discarding malformed {} entry: {}", kind, e);
                self.memo().remove(&key);
                None
            }
        }
    }

    /// Caches `value` for `principal_id`.
    ///
    /// Returns `true` if the value reached the durable store; `false` means
    /// it is only held in memory for this process.
    pub fn write<T: Serialize>(&self, principal_id: &str, kind: EntityKind, value: &T) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("[ScopeCache] Failed to encode {}: {}", kind, e);
                return false;
            }
        };
        let key = scope_key(principal_id, kind);
        self.memo().insert(key.clone(), raw.clone());

        match self.store.set(&key, &raw) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("[ScopeCache] Failed to persist {}: {}", kind, e);
                false
            }
        }
    }

    /// Removes one entity kind for `principal_id`.
    pub fn remove(&self, principal_id: &str, kind: EntityKind) {
        let key = scope_key(principal_id, kind);
        self.memo().remove(&key);
        if let Err(e) = self.store.remove(&key) {
            tracing::warn!("[ScopeCache] Failed to remove {}: {}", kind, e);
        }
    }

    /// Drops the in-memory memo for `principal_id`, leaving the durable
    /// entries in place. Called when the principal stops being active.
    pub fn release(&self, principal_id: &str) {
        let prefix = principal_prefix(principal_id);
        self.memo().retain(|key, _| !key.starts_with(&prefix));
    }

    /// Deletes everything cached for `principal_id`. Invoked on logout.
    pub fn clear(&self, principal_id: &str) {
        self.release(principal_id);
        for kind in EntityKind::ALL {
            if let Err(e) = self.store.remove(&scope_key(principal_id, kind)) {
                tracing::warn!("[ScopeCache] Failed to clear {}: {}", kind, e);
            }
        }
        tracing::debug!("[ScopeCache] Cleared principal {}", principal_id);
    }

    /// Deletes every scoped entry of every principal. Invoked on identity
    /// reset. Keys outside the scope namespace are left alone.
    pub fn clear_all(&self) {
        self.memo().clear();
        let keys = match self.store.keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("[ScopeCache] Failed to list keys: {}", e);
                return;
            }
        };
        for key in keys.into_iter().filter(|k| is_scope_key(k)) {
            if let Err(e) = self.store.remove(&key) {
                tracing::warn!("[ScopeCache] Failed to remove {}: {}", key, e);
            }
        }
        tracing::debug!("[ScopeCache] Cleared all principals");
    }
}
