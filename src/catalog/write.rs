//! Commit-then-purge writes.
//!
//! A command is applied by the store in one transaction. Only after it
//! commits are in-flight loads detached and every key the mutation stales
//! purged. A purge failure never fails the write: the store of record is
//! already correct, so the failure is reported on the `consistency` target
//! and the caller still gets success.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::read::CatalogReadPath;
use crate::cache::{self, CacheKey, CacheKeyRegistry, CacheStore, PurgePlan, DERIVED_PREFIXES};
use crate::database::{self, CatalogCommand, CatalogStore, CommitReceipt, DatabaseError};

/// Outcome of purging one plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub plan: PurgePlan,
    pub removed_by_prefix: u64,
    pub failed_keys: Vec<String>,
    pub failed_prefixes: Vec<String>,
}

impl PurgeReport {
    pub fn is_complete(&self) -> bool {
        self.failed_keys.is_empty() && self.failed_prefixes.is_empty()
    }
}

pub struct CatalogWritePath {
    store: Arc<dyn CatalogStore>,
    cache: Arc<dyn CacheStore>,
    reads: Arc<CatalogReadPath>,
    registry: CacheKeyRegistry,
    db_timeout: Duration,
    purge_timeout: Duration,
}

impl CatalogWritePath {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        cache: Arc<dyn CacheStore>,
        reads: Arc<CatalogReadPath>,
        registry: CacheKeyRegistry,
        db_timeout: Duration,
        purge_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            reads,
            registry,
            db_timeout,
            purge_timeout,
        }
    }

    /// Apply `command`, then purge every key it stales before returning.
    pub async fn write(&self, command: CatalogCommand) -> Result<(CommitReceipt, PurgeReport), DatabaseError> {
        let receipt = match database::bounded(self.db_timeout, self.store.apply(command)).await {
            Ok(receipt) => receipt,
            Err(DatabaseError::Timeout(after)) => {
                // The commit may or may not have landed; purge as if it did.
                self.reads.invalidate_in_flight();
                let report = self.purge(Self::everything()).await;
                Self::report(&report);
                return Err(DatabaseError::Timeout(after));
            }
            Err(e) => return Err(e),
        };

        self.reads.invalidate_in_flight();
        let plan = self.registry.keys_affected_by(&receipt.mutation);
        debug!(keys = plan.keys.len(), prefixes = plan.prefixes.len(), "purging cache after commit");

        let report = self.purge(plan).await;
        Self::report(&report);
        Ok((receipt, report))
    }

    /// Delete every key and sweep every prefix in `plan`, concurrently. Each
    /// call gets the purge deadline, not the read-path one: prefix sweeps walk
    /// the whole keyspace.
    pub async fn purge(&self, plan: PurgePlan) -> PurgeReport {
        let key_results = join_all(plan.keys.iter().map(|key| async move {
            (key.clone(), cache::bounded(self.purge_timeout, self.cache.delete(key)).await)
        }));
        let prefix_results = join_all(plan.prefixes.iter().map(|prefix| async move {
            (prefix.clone(), cache::bounded(self.purge_timeout, self.cache.delete_by_prefix(prefix)).await)
        }));
        let (key_results, prefix_results) = futures::join!(key_results, prefix_results);

        let mut report = PurgeReport::default();
        for (key, result) in key_results {
            if let Err(e) = result {
                warn!(key = %key, error = %e, "cache delete failed");
                report.failed_keys.push(key);
            }
        }
        for (prefix, result) in prefix_results {
            match result {
                Ok(removed) => report.removed_by_prefix += removed,
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "cache prefix sweep failed");
                    report.failed_prefixes.push(prefix);
                }
            }
        }
        report.plan = plan;
        report
    }

    fn report(report: &PurgeReport) {
        if !report.is_complete() {
            error!(
                target: "consistency",
                failed_keys = ?report.failed_keys,
                failed_prefixes = ?report.failed_prefixes,
                "cache purge incomplete after commit; stale entries may outlive their TTL"
            );
        }
    }

    fn everything() -> PurgePlan {
        let mut plan = PurgePlan::default();
        for key in [CacheKey::Categories, CacheKey::FeaturedProducts, CacheKey::AdminProducts] {
            plan.keys.insert(key.to_string());
        }
        for prefix in DERIVED_PREFIXES {
            plan.prefixes.insert(prefix.to_string());
        }
        plan
    }
}
