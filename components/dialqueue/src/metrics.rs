use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Run counters for the dial queue executor. Queue depth gauges are read from
/// the queue itself when a snapshot is taken.
#[derive(Debug, Default)]
pub struct DialMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    aborted: AtomicU64,
}

impl DialMetrics {
    pub(crate) fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_aborted(&self) {
        self.aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, queued: usize, running: usize) -> DialMetricsSnapshot {
        DialMetricsSnapshot {
            queued,
            running,
            started: self.started.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            aborted: self.aborted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DialMetricsSnapshot {
    pub queued: usize,
    pub running: usize,
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub aborted: u64,
}
