//! In-process cache backend, used when no remote cache is configured.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::{CacheError, CacheStore};

#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub value: Arc<Value>,
    pub written_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value: Arc::new(value),
            written_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.written_at.elapsed() >= self.ttl
    }
}

#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, CachedEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live entry exists, without touching hit/miss logging.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove `key` only if it is still expired; a concurrent `set` may have
    /// replaced it since it was read.
    fn evict_expired(&self, key: &str) {
        self.entries.remove_if(key, |_, e| e.is_expired());
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                tracing::debug!(key = %key, "cache hit (memory)");
                return Ok(Some(Value::clone(&entry.value)));
            }
            drop(entry);
            self.evict_expired(key);
        }
        tracing::debug!(key = %key, "cache miss (memory)");
        Ok(None)
    }

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), CachedEntry::new(value.clone(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
