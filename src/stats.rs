//! Hit/miss accounting.
//!
//! Pure atomics, no locks: every terminal outcome of a lookup bumps exactly
//! one counter, and `total_requests` is derived at snapshot time so the
//! `total == memory_hits + persistent_hits + misses` invariant holds by
//! construction.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Thread-safe counters for cache outcomes.
#[derive(Debug)]
pub struct StatisticsTracker {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    persistent_errors: AtomicU64,
    cost_per_computation: f64,
}

impl StatisticsTracker {
    pub fn new(cost_per_computation: f64) -> Self {
        Self {
            memory_hits: AtomicU64::new(0),
            persistent_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            persistent_errors: AtomicU64::new(0),
            cost_per_computation,
        }
    }

    /// The request was served from the memory tier.
    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// The request was served from the persistent tier.
    pub fn record_persistent_hit(&self) {
        self.persistent_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// The request fell through to the compute function.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A persistent-tier call failed and was absorbed.
    ///
    /// Not a terminal outcome; tracked separately so degraded-mode episodes
    /// are visible in snapshots.
    pub fn record_persistent_error(&self) {
        self.persistent_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Immutable copy of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        let memory_hits = self.memory_hits.load(Ordering::Relaxed);
        let persistent_hits = self.persistent_hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total_requests = memory_hits + persistent_hits + misses;
        let hits = memory_hits + persistent_hits;

        let hit_rate = if total_requests == 0 {
            0.0
        } else {
            hits as f64 / total_requests as f64
        };

        StatsSnapshot {
            memory_hits,
            persistent_hits,
            misses,
            persistent_errors: self.persistent_errors.load(Ordering::Relaxed),
            total_requests,
            hit_rate,
            cost_saved: hits as f64 * self.cost_per_computation,
        }
    }
}

/// Point-in-time view of the counters, for an external metrics collector.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub persistent_errors: u64,
    pub total_requests: u64,
    /// Fraction of requests served without invoking the compute function.
    pub hit_rate: f64,
    /// Computations avoided, priced at the configured per-call cost.
    pub cost_saved: f64,
}
