//! Counters for the balance cache.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Balance cache metrics (thread-safe counters, cheap to clone).
#[derive(Debug, Clone)]
pub struct BalanceCacheMetrics {
    /// Address balances served from the cache
    pub hits: Arc<AtomicU64>,
    /// Address balances missing or expired in the cache
    pub misses: Arc<AtomicU64>,
    /// Reads that skipped the cache because a refresh was requested
    pub bypassed: Arc<AtomicU64>,
    /// Calls forwarded to the underlying provider
    pub upstream_fetches: Arc<AtomicU64>,
    /// Forwarded calls that failed
    pub upstream_errors: Arc<AtomicU64>,
}

impl Default for BalanceCacheMetrics {
    fn default() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            bypassed: Arc::new(AtomicU64::new(0)),
            upstream_fetches: Arc::new(AtomicU64::new(0)),
            upstream_errors: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl BalanceCacheMetrics {
    pub fn record_hits(&self, count: u64) {
        self.hits.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_misses(&self, count: u64) {
        self.misses.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_bypass(&self) {
        self.bypassed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_fetch(&self) {
        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BalanceCacheSnapshot {
        BalanceCacheSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypassed: self.bypassed.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.bypassed.store(0, Ordering::Relaxed);
        self.upstream_fetches.store(0, Ordering::Relaxed);
        self.upstream_errors.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`BalanceCacheMetrics`] (for reporting).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCacheSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub bypassed: u64,
    pub upstream_fetches: u64,
    pub upstream_errors: u64,
}

impl BalanceCacheSnapshot {
    /// Fraction of address lookups answered from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }

    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        lines.push("Balance Cache".to_string());
        lines.push("=".repeat(40));
        lines.push(format!("  Hits:             {}", self.hits));
        lines.push(format!("  Misses:           {}", self.misses));
        lines.push(format!("  Refresh bypasses: {}", self.bypassed));
        lines.push(format!("  Upstream fetches: {}", self.upstream_fetches));
        lines.push(format!("  Upstream errors:  {}", self.upstream_errors));
        lines.push(format!("  Hit Rate:         {:.1}%", self.hit_rate() * 100.0));
        lines.join("\n")
    }
}
