//! Document cache in front of the catalog store.
//!
//! Every operation may fail with a transient error. Callers treat a failure
//! as a miss and go to the database; cache availability never blocks a read.

pub mod keys;
pub mod memory;
pub mod redis;
pub mod registry;

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

pub use keys::{CacheKey, KeyShape, DERIVED_PREFIXES};
pub use memory::MemoryCacheStore;
pub use self::redis::RedisCacheStore;
pub use registry::{CacheKeyRegistry, CatalogMutation, CountChange, ListingTotals, ProductSnapshot, PurgePlan};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("cached value is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key/value document store with per-key TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    async fn set(&self, key: &str, value: &Value, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key starting with `prefix`; returns how many were removed.
    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    fn backend(&self) -> &'static str;
}

/// Run a cache call under a deadline, folding the timeout into `CacheError`.
pub async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout(timeout)),
    }
}
