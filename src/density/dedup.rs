//! Alert cooldown table
//!
//! Suppresses repeated alerts for the same wall. A key is opened when an alert
//! is admitted and stays closed until `cooldown` has elapsed since that first
//! detection; suppressed repeats never extend the window, so a wall that stays
//! above threshold re-alerts on a fixed cadence.
//!
//! Prices are grouped into logarithmic buckets whose width is the configured
//! relative tolerance, so two prices sharing a bucket are always within the
//! tolerance of each other. Lookups also probe the neighbouring buckets and
//! compare against the price that opened the window, so any price within the
//! tolerance of that anchor is treated as the same wall regardless of bucket
//! edges.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

use crate::density::alert::DensityAlert;
use crate::error::ConfigError;
use crate::orderbook::Side;

/// Default relative bucket tolerance (0.1%)
pub const DEFAULT_PRICE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// A price within the tolerance of an anchor can sit at most this many
/// buckets away from it (`-ln(1 - t)` is slightly wider than `ln(1 + t)`).
const NEIGHBOUR_BUCKETS: i64 = 2;

/// Composite key of the cooldown table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CooldownKey {
    pub exchange: String,
    pub symbol: String,
    pub side: Side,
    pub bucket: i64,
}

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    /// Price of the alert that opened the window
    anchor: Decimal,
    expires_at: DateTime<Utc>,
}

/// Tracks which walls have an unexpired alert
#[derive(Debug)]
pub struct AlertDeduplicator {
    /// Open windows per key; a bucket can hold more than one wall when float
    /// rounding lands distinct anchors in it
    entries: HashMap<CooldownKey, Vec<CooldownEntry>>,
    tolerance: Decimal,
    /// Natural-log width of one bucket
    bucket_width: f64,
}

impl AlertDeduplicator {
    /// Create a deduplicator with the given relative price tolerance.
    ///
    /// The tolerance must lie strictly between 0 and 1 (0.001 = 0.1%).
    pub fn new(tolerance: Decimal) -> Result<Self, ConfigError> {
        let bucket_width = bucket_width(tolerance)?;
        Ok(Self {
            entries: HashMap::new(),
            tolerance,
            bucket_width,
        })
    }

    pub fn tolerance(&self) -> Decimal {
        self.tolerance
    }

    /// Number of entries currently held (expired ones included until evicted)
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Switch to a new tolerance. Existing buckets are meaningless under a new
    /// width, so the table is cleared when the value actually changes.
    pub fn reconfigure(&mut self, tolerance: Decimal) -> Result<bool, ConfigError> {
        if tolerance == self.tolerance {
            return Ok(false);
        }
        self.bucket_width = bucket_width(tolerance)?;
        self.tolerance = tolerance;
        self.entries.clear();
        Ok(true)
    }

    /// Key the alert would be stored under.
    pub fn key_for(&self, alert: &DensityAlert) -> CooldownKey {
        CooldownKey {
            exchange: alert.exchange.clone(),
            symbol: alert.symbol.clone(),
            side: alert.side,
            bucket: self.bucket(alert.price),
        }
    }

    /// Decide whether `alert` should be forwarded.
    ///
    /// Returns `true` and opens a cooldown window of `cooldown` when no
    /// unexpired entry covers the alert's price; `false` otherwise.
    pub fn admit(&mut self, alert: &DensityAlert, now: DateTime<Utc>, cooldown: Duration) -> bool {
        let key = self.key_for(alert);
        let tolerance = self.tolerance;

        for offset in -NEIGHBOUR_BUCKETS..=NEIGHBOUR_BUCKETS {
            let probe = CooldownKey {
                bucket: key.bucket.saturating_add(offset),
                ..key.clone()
            };

            let Some(windows) = self.entries.get_mut(&probe) else {
                continue;
            };

            windows.retain(|entry| entry.expires_at > now);
            let covering = windows
                .iter()
                .find(|entry| within_tolerance(tolerance, entry.anchor, alert.price))
                .copied();
            if windows.is_empty() {
                self.entries.remove(&probe);
            }

            if let Some(entry) = covering {
                debug!(
                    exchange = %alert.exchange,
                    symbol = %alert.symbol,
                    side = %alert.side,
                    price = %alert.price,
                    anchor = %entry.anchor,
                    expires_at = %entry.expires_at,
                    "Alert suppressed by cooldown"
                );
                return false;
            }
        }

        let expires_at = now
            .checked_add_signed(cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries.entry(key).or_default().push(CooldownEntry {
            anchor: alert.price,
            expires_at,
        });
        true
    }

    /// Remove every expired entry.
    ///
    /// # Returns
    /// Number of entries removed
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.len();
        self.entries.retain(|_, windows| {
            windows.retain(|entry| entry.expires_at > now);
            !windows.is_empty()
        });
        before - self.len()
    }

    /// Drop all entries belonging to an exchange/symbol pair.
    pub fn forget_target(&mut self, exchange: &str, symbol: &str) -> usize {
        let before = self.len();
        self.entries
            .retain(|key, _| !(key.exchange == exchange && key.symbol == symbol));
        before - self.len()
    }

    fn bucket(&self, price: Decimal) -> i64 {
        let price = price.to_f64().unwrap_or(0.0);
        if price <= 0.0 || !price.is_finite() {
            return i64::MIN;
        }
        (price.ln() / self.bucket_width).floor() as i64
    }
}

fn within_tolerance(tolerance: Decimal, anchor: Decimal, price: Decimal) -> bool {
    let diff = (price - anchor).abs();
    match anchor.checked_mul(tolerance) {
        Some(allowed) => diff <= allowed,
        None => false,
    }
}

/// Bucket width in log space: `ln(1 + tolerance)`.
fn bucket_width(tolerance: Decimal) -> Result<f64, ConfigError> {
    if tolerance <= Decimal::ZERO || tolerance >= Decimal::ONE {
        return Err(ConfigError::Invalid(format!(
            "price bucket tolerance must be between 0 and 1 (exclusive), got {}",
            tolerance
        )));
    }
    let tol = tolerance
        .to_f64()
        .ok_or_else(|| ConfigError::Invalid(format!("unrepresentable tolerance {}", tolerance)))?;
    Ok(tol.ln_1p())
}
