//! Per-client admission control.
//!
//! This is a fixed-window counter, not a smoothing token bucket: a bucket
//! holds `capacity` points, each admitted request spends one, and the bucket
//! is reset to full capacity only once its whole window has elapsed. There is
//! no partial refill, so a client that exhausts its budget at the end of one
//! window can spend a full budget again right after the reset. Callers rely on
//! that coarser behaviour; do not swap in a leaky-bucket here.
//!
//! Buckets are per process. Replicas behind a load balancer each hold their
//! own budget per identity.

use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

/// Quota state for one client identity.
#[derive(Debug, Clone)]
pub struct RateBucket {
    pub points_remaining: u32,
    pub window_start: Instant,
    pub window: Duration,
    pub capacity: u32,
}

impl RateBucket {
    fn new(capacity: u32, window: Duration, now: Instant) -> Self {
        Self {
            points_remaining: capacity,
            window_start: now,
            window,
            capacity,
        }
    }

    fn window_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) >= self.window
    }

    fn consume(&mut self, now: Instant) -> Admission {
        if self.window_elapsed(now) {
            self.points_remaining = self.capacity;
            self.window_start = now;
        }

        if self.points_remaining > 0 {
            self.points_remaining -= 1;
            Admission::Allowed { remaining: self.points_remaining }
        } else {
            let elapsed = now.saturating_duration_since(self.window_start);
            Admission::Rejected { retry_after: self.window.saturating_sub(elapsed) }
        }
    }
}

/// Fixed-window limiter keyed by client identity.
///
/// Constructed once at startup and shared through `AppState`. Each identity's
/// bucket is guarded by its own map shard, so unrelated clients don't contend.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    capacity: u32,
    window: Duration,
    buckets: DashMap<String, RateBucket>,
}

impl FixedWindowLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            buckets: DashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.capacity, config.window())
    }

    /// Spend one point for `identity`, creating its bucket on first sight.
    pub fn admit(&self, identity: &str) -> Admission {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| RateBucket::new(self.capacity, self.window, now));
        bucket.consume(now)
    }

    /// Drop buckets whose window has fully elapsed; they would be reset on the
    /// next request anyway.
    pub fn retain_recent(&self) {
        let now = Instant::now();
        self.buckets.retain(|_, bucket| !bucket.window_elapsed(now));
    }

    pub fn tracked_identities(&self) -> usize {
        self.buckets.len()
    }
}
