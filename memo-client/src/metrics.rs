//! # Pool Counters
//!
//! Purpose: Count member lifecycle events so callers can see how a pool is
//! sized against its workload.
//!
//! ## Design Principles
//! 1. **Accumulator Pattern**: Atomic counters aggregate events cheaply.
//! 2. **Relaxed Ordering**: Counters need no cross-field ordering; only the
//!    idle/claimed figures come from the locked pool state.
//! 3. **Plain Snapshots**: `PoolStats` is a `Copy` struct with no heap work.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a pool's state and lifetime counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Members waiting in the pool.
    pub idle: usize,
    /// Members currently held by callers.
    pub claimed: usize,
    /// Low-water mark.
    pub lower_limit: usize,
    /// Upper bound on idle plus claimed members.
    pub upper_limit: usize,
    /// Backend connections opened over the pool's lifetime.
    pub opened: u64,
    /// Members closed by shrink or by releasing into a full pool.
    pub disposed: u64,
    /// Successful claims.
    pub claims: u64,
    /// Claims served by opening a member on demand.
    pub on_demand: u64,
    /// Claims rejected with `PoolExhausted`.
    pub exhausted: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PoolMetrics {
    opened: AtomicU64,
    disposed: AtomicU64,
    claims: AtomicU64,
    on_demand: AtomicU64,
    exhausted: AtomicU64,
}

impl PoolMetrics {
    pub(crate) fn record_opened(&self) {
        self.opened.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disposed(&self) {
        self.disposed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_claim(&self, on_demand: bool) {
        self.claims.fetch_add(1, Ordering::Relaxed);
        if on_demand {
            self.on_demand.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Fills the counter fields of `stats`.
    pub(crate) fn fill(&self, stats: &mut PoolStats) {
        stats.opened = self.opened.load(Ordering::Relaxed);
        stats.disposed = self.disposed.load(Ordering::Relaxed);
        stats.claims = self.claims.load(Ordering::Relaxed);
        stats.on_demand = self.on_demand.load(Ordering::Relaxed);
        stats.exhausted = self.exhausted.load(Ordering::Relaxed);
    }
}
