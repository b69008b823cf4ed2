//! Scanner health
//!
//! Derived on demand from the lifecycle state, the consecutive configuration
//! failure count and the last completed cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::report::CycleReport;
use crate::scanner::state::ScannerState;

/// Health status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Ok,

    /// Partial functionality (some targets failing or config unreadable)
    Degraded,

    /// Nothing is being scanned successfully
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannerHealth {
    pub status: HealthStatus,
    pub state: ScannerState,
    pub consecutive_config_failures: u32,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle_targets: usize,
    pub last_cycle_failures: usize,

    /// Human-readable explanation if status != 'ok'
    pub reason: Option<String>,
}

impl ScannerHealth {
    pub(crate) fn assess(
        state: ScannerState,
        consecutive_config_failures: u32,
        escalation_threshold: u32,
        last_cycle: Option<&CycleReport>,
    ) -> Self {
        let (targets, failures) = last_cycle
            .filter(|r| !r.disabled)
            .map(|r| (r.targets_attempted(), r.failures.len()))
            .unwrap_or((0, 0));

        let (status, reason) = if matches!(state, ScannerState::Stopping | ScannerState::Stopped) {
            (HealthStatus::Error, Some(format!("Scanner is {}", state)))
        } else if consecutive_config_failures >= escalation_threshold {
            (
                HealthStatus::Degraded,
                Some(format!(
                    "Configuration unavailable for {} consecutive cycles",
                    consecutive_config_failures
                )),
            )
        } else if targets > 0 && failures == targets {
            (
                HealthStatus::Error,
                Some(format!("All {} targets failed last cycle", targets)),
            )
        } else if failures > 0 {
            (
                HealthStatus::Degraded,
                Some(format!("{}/{} targets failed last cycle", failures, targets)),
            )
        } else {
            (HealthStatus::Ok, None)
        };

        Self {
            status,
            state,
            consecutive_config_failures,
            last_cycle_at: last_cycle.map(|r| r.started_at),
            last_cycle_targets: targets,
            last_cycle_failures: failures,
            reason,
        }
    }
}
