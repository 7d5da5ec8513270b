use std::{fmt, time::Duration};

use uuid::Uuid;

use crate::{KeyValueStore, LockError};

/// Proof of ownership handed out by [`LockManager::acquire`].
///
/// Only the exact token a lock was granted with can release or extend it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named, non-blocking, expiring exclusive holds in the shared keyspace.
///
/// A lock is stored as `lock:{resource} -> owner token` with a ttl, so a
/// holder that crashes never blocks the resource for longer than the ttl.
#[derive(Debug, Clone)]
pub struct LockManager<K> {
    store: K,
}

impl<K: KeyValueStore> LockManager<K> {
    pub fn new(store: K) -> Self {
        Self { store }
    }

    fn key(resource: &str) -> String {
        format!("lock:{resource}")
    }

    /// Takes the lock if nobody holds it. Never waits.
    ///
    /// # Errors
    ///
    /// `LockError::Busy` when another owner holds the lock. This is the
    /// normal outcome under contention.
    pub async fn acquire(&self, resource: &str, ttl: Duration) -> Result<LockToken, LockError> {
        self.try_acquire(resource, ttl)
            .await?
            .ok_or_else(|| LockError::Busy {
                resource: resource.to_string(),
            })
    }

    /// Like [`acquire`](Self::acquire), with contention reported as `None`.
    pub async fn try_acquire(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> crate::Result<Option<LockToken>> {
        let token = LockToken::generate();

        if self
            .store
            .set_if_absent(&Self::key(resource), token.as_str(), ttl)
            .await?
        {
            tracing::debug!(resource, "Lock acquired");
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    /// Releases the lock if `token` still owns it.
    ///
    /// # Errors
    ///
    /// `LockError::NotOwned` when the lock expired in the meantime, and was
    /// possibly taken by another owner.
    pub async fn release(&self, resource: &str, token: &LockToken) -> Result<(), LockError> {
        if self
            .store
            .compare_and_delete(&Self::key(resource), token.as_str())
            .await?
        {
            tracing::debug!(resource, "Lock released");
            Ok(())
        } else {
            Err(LockError::NotOwned {
                resource: resource.to_string(),
            })
        }
    }

    /// Resets the ttl of a lock still owned by `token`.
    ///
    /// # Errors
    ///
    /// `LockError::NotOwned` when the lock is no longer held by `token`.
    pub async fn extend(
        &self,
        resource: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<(), LockError> {
        if self
            .store
            .compare_and_expire(&Self::key(resource), token.as_str(), ttl)
            .await?
        {
            Ok(())
        } else {
            Err(LockError::NotOwned {
                resource: resource.to_string(),
            })
        }
    }
}
