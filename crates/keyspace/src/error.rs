use thiserror::Error;

/// Errors raised by a key-value store backend.
#[derive(Debug, Error)]
pub enum KeyspaceError {
    /// The Redis server rejected the command or the connection failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A cached value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store refused the call (used by the in-memory store's failure
    /// injection).
    #[error("Keyspace unavailable: {0}")]
    Unavailable(String),
}

/// Lock manager failures.
///
/// `Busy` is the expected outcome under contention. `NotOwned` means the
/// hold already timed out and may belong to someone else now.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock on {resource} is held by another owner")]
    Busy { resource: String },

    #[error("Lock on {resource} is not held by this owner")]
    NotOwned { resource: String },

    #[error(transparent)]
    Store(#[from] KeyspaceError),
}

/// Result type for keyspace operations.
pub type Result<T> = std::result::Result<T, KeyspaceError>;
