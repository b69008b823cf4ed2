//! Alert delivery
//!
//! The scanner hands every admitted alert to an `AlertSink` exactly once.
//! Sinks must not block; whatever happens after the hand-off is the sink's
//! concern and never fails a scan.

pub mod formatter;

pub use formatter::format_alert;

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{error, warn};

use crate::density::DensityAlert;

/// Fire-and-forget consumer of admitted alerts
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: DensityAlert);
}

impl<F> AlertSink for F
where
    F: Fn(DensityAlert) + Send + Sync,
{
    fn deliver(&self, alert: DensityAlert) {
        self(alert)
    }
}

/// Bounded queue between the scanner and a delivery task
///
/// A full or closed queue drops the alert with a log line.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<DensityAlert>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DensityAlert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Alerts dropped because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AlertSink for ChannelSink {
    fn deliver(&self, alert: DensityAlert) {
        match self.tx.try_send(alert) {
            Ok(()) => {}
            Err(TrySendError::Full(alert)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    exchange = %alert.exchange,
                    symbol = %alert.symbol,
                    "Alert queue is full, dropping alert"
                );
            }
            Err(TrySendError::Closed(alert)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    exchange = %alert.exchange,
                    symbol = %alert.symbol,
                    "Alert queue closed, dropping alert"
                );
            }
        }
    }
}
