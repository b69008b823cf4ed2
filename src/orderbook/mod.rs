//! Normalized order book snapshots
//!
//! Gateways produce `OrderBookSnapshot`s; the density evaluator consumes them.

pub mod types;

pub use types::{OrderBookSnapshot, PriceLevel, Side};
