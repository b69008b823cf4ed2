//! Density wall detection
//!
//! - `evaluator`: stateless per-snapshot threshold check
//! - `dedup`: cooldown table suppressing repeated alerts for the same wall
//! - `alert`: the alert record handed to the delivery sink

pub mod alert;
pub mod dedup;
pub mod evaluator;

pub use alert::DensityAlert;
pub use dedup::{AlertDeduplicator, CooldownKey, DEFAULT_PRICE_TOLERANCE};
pub use evaluator::{evaluate, Evaluation, MalformedLevel, MalformedReason};
