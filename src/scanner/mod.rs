//! Scan loop and its observability
//!
//! - `scheduler`: fixed-interval cycles, bounded concurrent fetches, cooperative stop
//! - `state`: lifecycle state machine
//! - `report`: per-cycle outcome
//! - `metrics` / `health`: counters and derived health status

pub mod health;
pub mod metrics;
pub mod report;
pub mod scheduler;
pub mod state;

pub use health::{HealthStatus, ScannerHealth};
pub use metrics::{MetricsSnapshot, ScanMetrics};
pub use report::{CycleReport, TargetError, TargetFailure};
pub use scheduler::{ScanScheduler, SchedulerOptions};
pub use state::ScannerState;
