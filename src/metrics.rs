//! Scheduler metrics - lock-free counters
//!
//! Relaxed atomics only; readers get a coherent-enough snapshot for
//! statistics without touching the queue locks.

use core::sync::atomic::{AtomicU64, Ordering};

/// Ordering used for relaxed counters (metrics don't need strict ordering)
const RELAXED: Ordering = Ordering::Relaxed;

/// Lock-free counters for one scheduling domain.
#[derive(Debug, Default)]
pub struct SchedMetrics {
    /// Timer ticks handled
    pub ticks: AtomicU64,
    /// Slice expiries (reset happened, rotation or not)
    pub slice_resets: AtomicU64,
    /// Slice expiries that rotated the task (contended)
    pub rotations: AtomicU64,
    /// Voluntary yields
    pub yields: AtomicU64,
    /// Picks that produced a task
    pub picks: AtomicU64,
    /// Picks that fell through to idle
    pub idle_picks: AtomicU64,
    /// Tasks made runnable
    pub enqueues: AtomicU64,
    /// Tasks removed from a queue
    pub dequeues: AtomicU64,
    /// Cross-CPU migrations
    pub migrations: AtomicU64,
    /// Balance passes executed
    pub balance_passes: AtomicU64,
}

impl SchedMetrics {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            slice_resets: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            yields: AtomicU64::new(0),
            picks: AtomicU64::new(0),
            idle_picks: AtomicU64::new(0),
            enqueues: AtomicU64::new(0),
            dequeues: AtomicU64::new(0),
            migrations: AtomicU64::new(0),
            balance_passes: AtomicU64::new(0),
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, RELAXED);
    }

    pub fn record_slice_reset(&self, rotated: bool) {
        self.slice_resets.fetch_add(1, RELAXED);
        if rotated {
            self.rotations.fetch_add(1, RELAXED);
        }
    }

    pub fn record_yield(&self) {
        self.yields.fetch_add(1, RELAXED);
    }

    pub fn record_pick(&self, idle: bool) {
        if idle {
            self.idle_picks.fetch_add(1, RELAXED);
        } else {
            self.picks.fetch_add(1, RELAXED);
        }
    }

    pub fn record_enqueue(&self) {
        self.enqueues.fetch_add(1, RELAXED);
    }

    pub fn record_dequeue(&self) {
        self.dequeues.fetch_add(1, RELAXED);
    }

    pub fn record_migrations(&self, count: u64) {
        self.migrations.fetch_add(count, RELAXED);
    }

    pub fn record_balance_pass(&self) {
        self.balance_passes.fetch_add(1, RELAXED);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(RELAXED),
            slice_resets: self.slice_resets.load(RELAXED),
            rotations: self.rotations.load(RELAXED),
            yields: self.yields.load(RELAXED),
            picks: self.picks.load(RELAXED),
            idle_picks: self.idle_picks.load(RELAXED),
            enqueues: self.enqueues.load(RELAXED),
            dequeues: self.dequeues.load(RELAXED),
            migrations: self.migrations.load(RELAXED),
            balance_passes: self.balance_passes.load(RELAXED),
        }
    }
}

/// Plain-value copy of [`SchedMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub slice_resets: u64,
    pub rotations: u64,
    pub yields: u64,
    pub picks: u64,
    pub idle_picks: u64,
    pub enqueues: u64,
    pub dequeues: u64,
    pub migrations: u64,
    pub balance_passes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let metrics = SchedMetrics::new();
        metrics.record_tick();
        metrics.record_tick();
        metrics.record_slice_reset(true);
        metrics.record_slice_reset(false);
        metrics.record_pick(false);
        metrics.record_pick(true);
        metrics.record_migrations(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.ticks, 2);
        assert_eq!(snap.slice_resets, 2);
        assert_eq!(snap.rotations, 1);
        assert_eq!(snap.picks, 1);
        assert_eq!(snap.idle_picks, 1);
        assert_eq!(snap.migrations, 3);
    }
}
