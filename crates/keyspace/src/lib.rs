//! Shared key-value keyspace used by every service replica.
//!
//! The [`KeyValueStore`] trait exposes the atomic conditional operations the
//! higher-level primitives rely on. Two backends are provided:
//! [`RedisKeyValueStore`] for deployments and [`InMemoryKeyValueStore`] for
//! tests and single-process runs.
//!
//! On top of the store sit:
//! - [`LockManager`]: short-lived named exclusive holds with owner tokens
//! - [`IdempotencyCache`]: operation key to previously computed result
//! - [`ReadCache`]: best-effort derived read views with pattern invalidation

pub mod error;
pub mod idempotency;
pub mod lock;
pub mod memory;
pub mod read_cache;
pub mod redis_store;
pub mod store;

pub use error::{KeyspaceError, LockError, Result};
pub use idempotency::IdempotencyCache;
pub use lock::{LockManager, LockToken};
pub use memory::InMemoryKeyValueStore;
pub use read_cache::ReadCache;
pub use redis_store::RedisKeyValueStore;
pub use store::KeyValueStore;
