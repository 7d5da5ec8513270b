//! Redis-backed keyspace.
//!
//! Conditional writes map onto native commands where Redis has one
//! (`SET NX PX`) and onto server-side Lua scripts otherwise, so that the
//! compare and the write execute as one step on the server.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::{KeyValueStore, Result};

/// Deletes the key only while it still holds the caller's value.
const COMPARE_AND_DELETE: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
"#;

/// Resets the ttl only while the key still holds the caller's value.
const COMPARE_AND_EXPIRE: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('PEXPIRE', KEYS[1], ARGV[2])
    end
    return 0
"#;

const SCAN_BATCH: usize = 100;

/// Key-value store over a Redis connection manager.
///
/// Cloning is cheap; clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisKeyValueStore {
    conn: ConnectionManager,
}

impl RedisKeyValueStore {
    /// Connects to Redis at `redis_url` (`redis://[:password@]host[:port][/db]`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the server is unreachable.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!("Redis keyspace connected");

        Ok(Self { conn })
    }

    fn millis(ttl: Duration) -> u64 {
        u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();

        // Replies OK when written and nil when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(Self::millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();

        let deleted: i64 = Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;

        Ok(deleted == 1)
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();

        let updated: i64 = Script::new(COMPARE_AND_EXPIRE)
            .key(key)
            .arg(expected)
            .arg(Self::millis(ttl))
            .invoke_async(&mut conn)
            .await?;

        Ok(updated == 1)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.pset_ex(key, value, Self::millis(ttl)).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        // Incremental SCAN keeps the server responsive; KEYS would block it.
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let removed: usize = conn.del(&keys).await?;
                deleted += removed;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(pattern, deleted, "Deleted keys by pattern");

        Ok(deleted)
    }
}
