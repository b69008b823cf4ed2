//! Per-snapshot density detection
//!
//! Turns a normalized order book into the set of levels whose individual
//! notional volume (`price * amount`) reaches `base_threshold * multiplier`.
//! Levels are independent: nothing is carried over or subtracted between
//! adjacent levels.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::density::alert::DensityAlert;
use crate::error::DensityError;
use crate::orderbook::{OrderBookSnapshot, PriceLevel, Side};

/// Why a level was excluded from evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
    NonPositivePrice,
    NegativeAmount,
    /// Price does not strictly improve on the previous accepted level
    OutOfOrder,
    /// `price * amount` does not fit in a decimal
    Overflow,
}

/// A level that was skipped because it violates the snapshot invariants
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedLevel {
    pub side: Side,
    /// Position of the level within its side, as received
    pub index: usize,
    pub level: PriceLevel,
    pub reason: MalformedReason,
}

/// Result of evaluating one snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    pub alerts: Vec<DensityAlert>,
    pub malformed: Vec<MalformedLevel>,

    /// Levels that were actually compared against the threshold
    pub evaluated_levels: usize,
}

impl Evaluation {
    /// True when the book carried live levels but none of them were usable.
    pub fn is_unusable(&self) -> bool {
        self.evaluated_levels == 0 && !self.malformed.is_empty()
    }
}

/// Evaluate a snapshot against `base_threshold * multiplier`.
///
/// Zero-amount levels are removed levels and are skipped silently. Levels with
/// a non-positive price, a negative amount, or a price that breaks the side's
/// strict ordering are skipped and reported in `Evaluation::malformed`.
pub fn evaluate(
    exchange: &str,
    symbol: &str,
    snapshot: &OrderBookSnapshot,
    base_threshold: Decimal,
    multiplier: Decimal,
    now: DateTime<Utc>,
) -> Result<Evaluation, DensityError> {
    let threshold = effective_threshold(base_threshold, multiplier)?;

    let mut evaluation = Evaluation::default();

    for side in [Side::Bid, Side::Ask] {
        evaluate_side(
            exchange,
            symbol,
            side,
            snapshot.levels(side),
            threshold,
            now,
            &mut evaluation,
        );
    }

    Ok(evaluation)
}

/// `base_threshold * multiplier`, validating both factors.
pub fn effective_threshold(
    base_threshold: Decimal,
    multiplier: Decimal,
) -> Result<Decimal, DensityError> {
    if base_threshold <= Decimal::ZERO {
        return Err(DensityError::InvalidThreshold(base_threshold.to_string()));
    }
    if multiplier <= Decimal::ZERO {
        return Err(DensityError::InvalidMultiplier(multiplier.to_string()));
    }

    base_threshold
        .checked_mul(multiplier)
        .ok_or_else(|| DensityError::ThresholdOverflow {
            base: base_threshold.to_string(),
            multiplier: multiplier.to_string(),
        })
}

fn evaluate_side(
    exchange: &str,
    symbol: &str,
    side: Side,
    levels: &[PriceLevel],
    threshold: Decimal,
    now: DateTime<Utc>,
    out: &mut Evaluation,
) {
    // Last price that passed validation; ordering is checked against it so a
    // single bad level does not poison the rest of the side.
    let mut last_price: Option<Decimal> = None;

    for (index, level) in levels.iter().enumerate() {
        if level.amount.is_zero() {
            continue;
        }

        let reason = if level.price <= Decimal::ZERO {
            Some(MalformedReason::NonPositivePrice)
        } else if level.amount.is_sign_negative() {
            Some(MalformedReason::NegativeAmount)
        } else if last_price.is_some_and(|prev| !improves_on(side, prev, level.price)) {
            Some(MalformedReason::OutOfOrder)
        } else {
            None
        };

        if let Some(reason) = reason {
            out.malformed.push(MalformedLevel {
                side,
                index,
                level: *level,
                reason,
            });
            continue;
        }

        let Some(volume) = level.notional() else {
            out.malformed.push(MalformedLevel {
                side,
                index,
                level: *level,
                reason: MalformedReason::Overflow,
            });
            continue;
        };

        last_price = Some(level.price);
        out.evaluated_levels += 1;

        if volume >= threshold {
            out.alerts.push(DensityAlert {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                side,
                price: level.price,
                amount: level.amount,
                volume,
                threshold_used: threshold,
                timestamp: now,
            });
        }
    }
}

/// Bids must strictly decrease, asks strictly increase.
fn improves_on(side: Side, previous: Decimal, next: Decimal) -> bool {
    match side {
        Side::Bid => next < previous,
        Side::Ask => next > previous,
    }
}
