use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::KeyValueStore;

/// Derived read views kept next to the authoritative store.
///
/// Every operation is best-effort: a failing cache degrades to a miss and
/// is reported with `warn!`, never to the caller.
#[derive(Debug, Clone)]
pub struct ReadCache<K> {
    store: K,
}

impl<K: KeyValueStore> ReadCache<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key, error = %e, "Read cache lookup failed");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache entry");
                None
            }
        }
    }

    pub async fn put<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key, error = %e, "Could not encode cache entry");
                return;
            }
        };

        if let Err(e) = self.store.set(key, &raw, ttl).await {
            tracing::warn!(key, error = %e, "Read cache write failed");
        }
    }

    /// Evicts every view matching `pattern`. Returns how many were removed.
    pub async fn invalidate(&self, pattern: &str) -> usize {
        match self.store.delete_pattern(pattern).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(pattern, error = %e, "Cache invalidation failed");
                0
            }
        }
    }
}
