//! Per-cycle outcome

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::{DensityError, FetchError};

/// Why a target produced no evaluation this cycle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Snapshot unusable: all {malformed} live levels malformed")]
    Unusable { malformed: usize },

    #[error(transparent)]
    Evaluation(#[from] DensityError),
}

impl TargetError {
    pub fn error_type(&self) -> &'static str {
        match self {
            TargetError::Fetch(e) => e.error_type(),
            TargetError::Unusable { .. } => "unusable_snapshot",
            TargetError::Evaluation(_) => "evaluation_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetFailure {
    pub exchange: String,
    pub symbol: String,
    pub error: TargetError,
}

/// What one scan cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,

    /// Scanning was switched off; nothing was fetched
    pub disabled: bool,

    /// Targets whose order book was fetched and evaluated
    pub targets_scanned: usize,

    /// Targets not started because the scanner was stopping
    pub targets_skipped: usize,

    pub failures: Vec<TargetFailure>,
    pub alerts_emitted: usize,
    pub alerts_suppressed: usize,
    pub malformed_levels: usize,
}

impl CycleReport {
    pub(crate) fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            disabled: false,
            targets_scanned: 0,
            targets_skipped: 0,
            failures: Vec::new(),
            alerts_emitted: 0,
            alerts_suppressed: 0,
            malformed_levels: 0,
        }
    }

    pub(crate) fn disabled(started_at: DateTime<Utc>) -> Self {
        Self {
            disabled: true,
            ..Self::new(started_at)
        }
    }

    /// Targets attempted (scanned or failed)
    pub fn targets_attempted(&self) -> usize {
        self.targets_scanned + self.failures.len()
    }

    pub fn failure_for(&self, exchange: &str, symbol: &str) -> Option<&TargetError> {
        self.failures
            .iter()
            .find(|f| f.exchange == exchange && f.symbol == symbol)
            .map(|f| &f.error)
    }
}
