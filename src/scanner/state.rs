//! Scanner lifecycle state

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// `Idle → Running → Stopping → Stopped`, or `Idle → Stopped` when stopped
/// before it ever ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl ScannerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScannerState::Idle => "idle",
            ScannerState::Running => "running",
            ScannerState::Stopping => "stopping",
            ScannerState::Stopped => "stopped",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            ScannerState::Idle => 0,
            ScannerState::Running => 1,
            ScannerState::Stopping => 2,
            ScannerState::Stopped => 3,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ScannerState::Idle,
            1 => ScannerState::Running,
            2 => ScannerState::Stopping,
            _ => ScannerState::Stopped,
        }
    }
}

impl fmt::Display for ScannerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for `ScannerState`
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(ScannerState::Idle.to_u8()))
    }

    pub(crate) fn get(&self) -> ScannerState {
        ScannerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from → to`; on mismatch returns the actual state.
    pub(crate) fn transition(
        &self,
        from: ScannerState,
        to: ScannerState,
    ) -> Result<(), ScannerState> {
        self.0
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ScannerState::from_u8)
    }

    pub(crate) fn set(&self, state: ScannerState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}
