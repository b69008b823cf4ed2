//! Scan counters
//!
//! Monotonic counters updated by the scheduler; `snapshot()` gives a
//! serializable copy for logs or a status endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Debug, Default)]
pub struct ScanMetrics {
    pub cycles: AtomicU64,
    pub cycles_disabled: AtomicU64,
    pub config_failures: AtomicU64,

    pub fetches: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub fetch_timeouts: AtomicU64,

    // data quality
    pub malformed_levels: AtomicU64,
    pub unusable_snapshots: AtomicU64,

    pub alerts_emitted: AtomicU64,
    pub alerts_suppressed: AtomicU64,
}

/// Point-in-time copy of `ScanMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub cycles: u64,
    pub cycles_disabled: u64,
    pub config_failures: u64,
    pub fetches: u64,
    pub fetch_failures: u64,
    pub fetch_timeouts: u64,
    pub malformed_levels: u64,
    pub unusable_snapshots: u64,
    pub alerts_emitted: u64,
    pub alerts_suppressed: u64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    add(counter, 1);
}

pub(crate) fn add(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl ScanMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            cycles: load(&self.cycles),
            cycles_disabled: load(&self.cycles_disabled),
            config_failures: load(&self.config_failures),
            fetches: load(&self.fetches),
            fetch_failures: load(&self.fetch_failures),
            fetch_timeouts: load(&self.fetch_timeouts),
            malformed_levels: load(&self.malformed_levels),
            unusable_snapshots: load(&self.unusable_snapshots),
            alerts_emitted: load(&self.alerts_emitted),
            alerts_suppressed: load(&self.alerts_suppressed),
        }
    }
}
