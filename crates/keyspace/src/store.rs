use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::Result;

/// A key-value store shared between replicas.
///
/// Every conditional operation must be atomic on the store itself; callers
/// never combine a read and a write on the client side.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Writes `value` under `key` with a time-to-live, only if the key is
    /// absent. Returns whether the write happened.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `key` only if its current value equals `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Resets the time-to-live of `key` only if its current value equals
    /// `expected`.
    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes `value` under `key` unconditionally, replacing any previous
    /// value and time-to-live.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Deletes every key matching a glob pattern (`*` and `?`). Returns the
    /// number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<usize>;
}

#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Arc<T> {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        (**self).set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        (**self).compare_and_delete(key, expected).await
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        (**self).compare_and_expire(key, expected, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        (**self).set(key, value, ttl).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        (**self).exists(key).await
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        (**self).delete_pattern(pattern).await
    }
}
