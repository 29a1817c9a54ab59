//! Dispatch metrics for reporting

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every clone of a dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Total outbound attempts
    attempts: AtomicU64,
    /// Logical calls that returned content
    successes: AtomicU64,
    /// Failed attempts (any classification)
    failures: AtomicU64,
    /// Backoff sleeps taken
    backoffs: AtomicU64,
    /// Total time spent in backoff
    backoff_ms: AtomicU64,
    /// Logical calls that ran out of attempts
    exhausted: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_successes(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_backoff(&self, ms: u64) {
        self.backoffs.fetch_add(1, Ordering::Relaxed);
        self.backoff_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn inc_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            backoff_ms: self.backoff_ms.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub backoffs: u64,
    pub backoff_ms: u64,
    pub exhausted: u64,
}
