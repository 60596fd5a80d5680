//! Cache-aside reads with per-key load coalescing.
//!
//! A miss starts one shared load per key; concurrent misses on the same key
//! await that load instead of querying the store again. The load repopulates
//! the cache only if no write committed while it ran (tracked by a global
//! invalidation epoch), and re-checks after the set so a purge that raced the
//! set still wins.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::CatalogError;
use crate::cache::{self, CacheKey, CacheStore};
use crate::database::{self, DatabaseError};

/// Result of one store load.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    /// `None` when the entity does not exist.
    pub value: Option<Value>,
    /// Whether the value may be written to the cache.
    pub cacheable: bool,
}

impl Fetched {
    pub fn cached(value: Value) -> Self {
        Self { value: Some(value), cacheable: true }
    }

    /// Returned to the caller but never cached.
    pub fn transient(value: Value) -> Self {
        Self { value: Some(value), cacheable: false }
    }

    pub fn missing() -> Self {
        Self { value: None, cacheable: false }
    }
}

type SharedLoad = Shared<BoxFuture<'static, Result<Fetched, Arc<DatabaseError>>>>;

struct Flight {
    id: u64,
    load: SharedLoad,
}

pub struct CatalogReadPath {
    cache: Arc<dyn CacheStore>,
    cache_timeout: Duration,
    db_timeout: Duration,
    in_flight: Arc<DashMap<String, Flight>>,
    epoch: Arc<AtomicU64>,
    next_flight: AtomicU64,
}

impl CatalogReadPath {
    pub fn new(cache: Arc<dyn CacheStore>, cache_timeout: Duration, db_timeout: Duration) -> Self {
        Self {
            cache,
            cache_timeout,
            db_timeout,
            in_flight: Arc::new(DashMap::new()),
            epoch: Arc::new(AtomicU64::new(0)),
            next_flight: AtomicU64::new(1),
        }
    }

    /// Serve `key` from the cache, or run `load` once for all concurrent
    /// misses and cache its result for `ttl`.
    pub async fn read<F, Fut>(&self, key: &CacheKey, ttl: Duration, load: F) -> Result<Option<Value>, CatalogError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Fetched, DatabaseError>> + Send + 'static,
    {
        let key = key.to_string();

        match cache::bounded(self.cache_timeout, self.cache.get(&key)).await {
            Ok(Some(value)) => {
                debug!(key = %key, "cache hit");
                return Ok(Some(value));
            }
            Ok(None) => debug!(key = %key, "cache miss"),
            Err(e) => warn!(key = %key, error = %e, backend = self.cache.backend(), "cache read failed, falling back to database"),
        }

        let shared = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(flight) => {
                debug!(key = %key, "joining in-flight load");
                flight.get().load.clone()
            }
            Entry::Vacant(slot) => {
                let id = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let shared = self.start_flight(key.clone(), id, ttl, load()).boxed().shared();
                slot.insert(Flight { id, load: shared.clone() });
                shared
            }
        };

        let fetched = shared.await?;
        Ok(fetched.value)
    }

    /// Detach every in-flight load from the cache. Called after a write
    /// commits and before its purge runs.
    pub fn invalidate_in_flight(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.in_flight.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn start_flight<Fut>(
        &self,
        key: String,
        id: u64,
        ttl: Duration,
        load: Fut,
    ) -> impl Future<Output = Result<Fetched, Arc<DatabaseError>>> + Send + 'static
    where
        Fut: Future<Output = Result<Fetched, DatabaseError>> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let in_flight = Arc::clone(&self.in_flight);
        let epoch = Arc::clone(&self.epoch);
        let cache_timeout = self.cache_timeout;
        let db_timeout = self.db_timeout;

        async move {
            let started = epoch.load(Ordering::SeqCst);
            let result = database::bounded(db_timeout, load).await;

            if let Ok(Fetched { value: Some(value), cacheable: true }) = &result {
                populate(cache.as_ref(), cache_timeout, &epoch, started, &key, value, ttl).await;
            }

            in_flight.remove_if(&key, |_, flight| flight.id == id);
            result.map_err(|e| {
                tracing::error!(key = %key, error = %e, "catalog load failed");
                Arc::new(e)
            })
        }
    }
}

async fn populate(
    cache: &dyn CacheStore,
    timeout: Duration,
    epoch: &AtomicU64,
    started: u64,
    key: &str,
    value: &Value,
    ttl: Duration,
) {
    if epoch.load(Ordering::SeqCst) != started {
        debug!(key = %key, "write committed during load, not caching");
        return;
    }

    if let Err(e) = cache::bounded(timeout, cache.set(key, value, ttl)).await {
        warn!(key = %key, error = %e, "cache write failed");
        return;
    }

    if epoch.load(Ordering::SeqCst) != started {
        if let Err(e) = cache::bounded(timeout, cache.delete(key)).await {
            tracing::error!(target: "consistency", key = %key, error = %e, "could not withdraw value cached across a write");
        }
    }
}
