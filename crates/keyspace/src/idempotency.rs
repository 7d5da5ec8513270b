use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::{KeyValueStore, Result};

/// Maps an operation key to the result it produced.
///
/// Records are JSON under `idempotency:{operation_key}` and are written with
/// set-if-absent: once stored, a record does not change until its ttl runs
/// out, after which the operation counts as new.
#[derive(Debug, Clone)]
pub struct IdempotencyCache<K> {
    store: K,
}

impl<K: KeyValueStore> IdempotencyCache<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    fn key(operation_key: &str) -> String {
        format!("idempotency:{operation_key}")
    }

    /// Returns the stored result for `operation_key`, if any.
    pub async fn lookup<T: DeserializeOwned>(&self, operation_key: &str) -> Result<Option<T>> {
        match self.store.get(&Self::key(operation_key)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Records `result` for `operation_key`.
    ///
    /// Returns `false` when a record already exists; the existing record is
    /// kept as is.
    pub async fn store<T: Serialize + Sync>(
        &self,
        operation_key: &str,
        result: &T,
        ttl: Duration,
    ) -> Result<bool> {
        let raw = serde_json::to_string(result)?;
        self.store
            .set_if_absent(&Self::key(operation_key), &raw, ttl)
            .await
    }

    /// Overwrites the record for `operation_key` unconditionally.
    ///
    /// Only for records that [`lookup`](Self::lookup) could not decode, so
    /// that retries replay `result` instead of executing again.
    pub async fn replace<T: Serialize + Sync>(
        &self,
        operation_key: &str,
        result: &T,
        ttl: Duration,
    ) -> Result<()> {
        let raw = serde_json::to_string(result)?;
        self.store.set(&Self::key(operation_key), &raw, ttl).await
    }
}
