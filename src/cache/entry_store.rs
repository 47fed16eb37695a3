//! Typed, namespaced access to the persistent tier
//!
//! Converts between [`CacheEntry`] values and the JSON strings held by a
//! [`PersistentStore`]. Nothing here ever fails loudly: unreadable or
//! malformed data reads as absent and failed writes are logged and dropped.

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::store::PersistentStore;

/// Prefix applied to every persisted key unless configured otherwise
pub const DEFAULT_NAMESPACE: &str = "swc:";

/// Reads and writes cache entries under a namespace prefix
#[derive(Clone)]
pub struct EntryStore {
    store: Arc<dyn PersistentStore>,
    namespace: String,
}

impl EntryStore {
    /// Wraps `store`, prefixing every key with `namespace`
    pub fn new(store: Arc<dyn PersistentStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// The key actually used in the underlying store
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    /// Reads the entry for `key`
    ///
    /// Returns `None` when the key is absent, the store fails, the content is
    /// not JSON, or the JSON does not have the entry shape for `T`.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
        let storage_key = self.storage_key(key);
        let raw = match self.store.get_item(&storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(key = %storage_key, error = %e, "persistent read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!(key = %storage_key, error = %e, "malformed persisted entry, treating as miss");
                None
            }
        }
    }

    /// Writes `entry` under `key`
    ///
    /// Serialization and storage failures are logged and ignored.
    pub fn write<T: Serialize>(&self, key: &str, entry: &CacheEntry<T>) {
        let storage_key = self.storage_key(key);
        let json = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(e) => {
                warn!(key = %storage_key, error = %e, "failed to serialize cache entry");
                return;
            }
        };

        if let Err(e) = self.store.set_item(&storage_key, &json) {
            warn!(key = %storage_key, error = %e, "failed to persist cache entry");
        }
    }
}

impl std::fmt::Debug for EntryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
