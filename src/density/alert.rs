use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::orderbook::Side;

/// A single order book level whose notional volume reached the threshold
///
/// Created by the evaluator for exactly one qualifying level and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DensityAlert {
    /// Exchange identifier (lowercase, e.g. "binance")
    pub exchange: String,

    /// Symbol as configured for the scan target
    pub symbol: String,

    pub side: Side,

    /// Price of the qualifying level
    pub price: Decimal,

    /// Resting quantity at that price (individual, not cumulative)
    pub amount: Decimal,

    /// `price * amount` of this level alone
    pub volume: Decimal,

    /// Effective threshold the level was compared against
    /// (`base_threshold * multiplier`)
    pub threshold_used: Decimal,

    /// Poll time
    pub timestamp: DateTime<Utc>,
}

impl DensityAlert {
    /// How many times the level exceeds the threshold it was checked against.
    pub fn threshold_ratio(&self) -> Option<Decimal> {
        if self.threshold_used.is_zero() {
            return None;
        }
        self.volume.checked_div(self.threshold_used)
    }
}
