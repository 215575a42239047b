//! Coordinator counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the driving loop, readable from any thread
#[derive(Debug, Default)]
pub struct CoordinatorStats {
    /// Cycles run
    pub cycles: AtomicU64,

    /// Batches accepted by the output channel
    pub batches_published: AtomicU64,

    /// Batches discarded because the channel was full
    pub batches_dropped: AtomicU64,

    /// Per-source collection timeouts
    pub source_timeouts: AtomicU64,

    /// Cycles that overran the period
    pub overruns: AtomicU64,
}

impl CoordinatorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cycle(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.batches_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.source_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overrun(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            batches_published: self.batches_published.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            source_timeouts: self.source_timeouts.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`CoordinatorStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub batches_published: u64,
    pub batches_dropped: u64,
    pub source_timeouts: u64,
    pub overruns: u64,
}
