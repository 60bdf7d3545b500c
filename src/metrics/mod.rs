use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Per-engine counters (low overhead, relaxed ordering). Values are
/// coarse-grained: a snapshot taken under traffic is not a consistent cut.
#[derive(Debug, Default)]
pub struct EngineStats {
    pushed: AtomicU64,
    delivered: AtomicU64,
    evicted: AtomicU64,
    completed: AtomicU64,
    queues_created: AtomicU64,
    queues_deleted: AtomicU64,
}

/// Serializable snapshot of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub pushed: u64,
    pub delivered: u64,
    pub evicted: u64,
    pub completed: u64,
    pub queues_created: u64,
    pub queues_deleted: u64,
}

impl EngineStats {
    #[inline]
    pub fn inc_pushed(&self) {
        self.pushed.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_evicted(&self, n: u64) {
        self.evicted.fetch_add(n, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_queues_created(&self) {
        self.queues_created.fetch_add(1, Ordering::Relaxed);
    }
    #[inline]
    pub fn inc_queues_deleted(&self) {
        self.queues_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            pushed: self.pushed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            queues_created: self.queues_created.load(Ordering::Relaxed),
            queues_deleted: self.queues_deleted.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Queues created and not yet deleted.
    pub fn live_queues(&self) -> u64 {
        self.queues_created.saturating_sub(self.queues_deleted)
    }

    /// Simple text format (Prometheus-style without HELP/TYPE lines).
    pub fn render(&self) -> String {
        format!(
            "leasemq_pushed {}\nleasemq_delivered {}\nleasemq_evicted {}\nleasemq_completed {}\nleasemq_queues_created {}\nleasemq_queues_deleted {}\n",
            self.pushed,
            self.delivered,
            self.evicted,
            self.completed,
            self.queues_created,
            self.queues_deleted,
        )
    }
}
