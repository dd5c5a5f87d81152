//! Shared progress counters

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Total, succeeded and failed row counts shared by the producer and every
/// worker. Updates are single atomic adds; no lock is ever held.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

impl ProgressSnapshot {
    /// Rows read but not (yet) classified
    pub fn unaccounted(&self) -> u64 {
        self.total.saturating_sub(self.succeeded + self.failed)
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_seen(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_succeeded(&self, count: u64) {
        self.succeeded.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_failed(&self, count: u64) {
        self.failed.fetch_add(count, Ordering::Relaxed);
    }

    /// Each counter is read atomically; the three reads are not one
    /// consistent cut while workers are still running.
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
