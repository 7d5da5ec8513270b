use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use crate::{KeyValueStore, KeyspaceError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    deadline: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.deadline > now
    }
}

#[derive(Debug, Default)]
struct KeyspaceState {
    entries: HashMap<String, Entry>,
    fail_writes: bool,
}

impl KeyspaceState {
    fn live(&mut self, key: &str, now: Instant) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes {
            return Err(KeyspaceError::Unavailable(
                "writes are disabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// In-memory keyspace for tests and single-process deployments.
///
/// Deadlines follow the tokio clock, so tests can use `tokio::time::pause`
/// and `advance` to expire keys. All operations run under one mutex, which
/// makes the conditional ones atomic within the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    state: Arc<Mutex<KeyspaceState>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail with `Unavailable` until turned off again.
    /// Reads keep working.
    pub async fn set_fail_writes(&self, fail: bool) {
        self.state.lock().await.fail_writes = fail;
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock().await;
        state.entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.check_writable()?;

        if state.live(key, now).is_some() {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                deadline: now + ttl,
            },
        );
        Ok(true)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.check_writable()?;

        let owned = state.live(key, now).is_some_and(|e| e.value == expected);
        if owned {
            state.entries.remove(key);
        }
        Ok(owned)
    }

    async fn compare_and_expire(&self, key: &str, expected: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.check_writable()?;

        match state.live(key, now) {
            Some(entry) if entry.value == expected => {
                entry.deadline = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Ok(state.live(key, now).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.check_writable()?;

        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                deadline: now + ttl,
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        Ok(state.live(key, now).is_some())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.check_writable()?;

        let mut deleted = 0;
        state.entries.retain(|key, entry| {
            if !entry.is_live(now) {
                return false;
            }
            let matched = glob_match(pattern, key);
            if matched {
                deleted += 1;
            }
            !matched
        });
        Ok(deleted)
    }
}

/// Redis-style glob matching restricted to `*` (any run) and `?` (one char).
fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();

    let (mut p, mut k) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while k < key.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
            p += 1;
            k += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = k;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            k = resume;
        } else {
            return false;
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}
