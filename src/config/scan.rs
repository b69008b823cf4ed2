//! Per-cycle scan configuration
//!
//! The scheduler takes one `ScanConfig` snapshot at the top of every cycle and
//! never observes changes mid-cycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use crate::density::DEFAULT_PRICE_TOLERANCE;
use crate::error::ConfigError;

/// Default notional threshold for a level to count as a wall (quote currency)
pub const DEFAULT_BASE_THRESHOLD: Decimal = Decimal::from_parts(500_000, 0, 0, false, 0);

/// Default cooldown between repeated alerts for the same wall
pub const DEFAULT_COOLDOWN_SECS: u64 = 300;

/// Longest accepted cooldown (30 days)
pub const MAX_COOLDOWN_SECS: u64 = 30 * 24 * 60 * 60;

/// One exchange/symbol pair to poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanTarget {
    /// Exchange identifier (matched case-insensitively against gateways)
    pub exchange: String,

    /// Symbol in the exchange's own notation (e.g. "BTCUSDT", "BTC/USD:USD")
    pub symbol: String,

    /// Per-symbol base threshold overriding the global one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Decimal>,
}

impl ScanTarget {
    pub fn new(exchange: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into().to_lowercase(),
            symbol: symbol.into(),
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Decimal) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Base threshold to use for this target.
    pub fn base_threshold(&self, global: Decimal) -> Decimal {
        self.threshold.unwrap_or(global)
    }

    /// `exchange/symbol`, used in logs
    pub fn id(&self) -> String {
        format!("{}/{}", self.exchange, self.symbol)
    }
}

/// Immutable configuration view for one scan cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Global on/off switch; a disabled cycle fetches nothing
    pub enabled: bool,

    /// Notional volume a single level must reach (before the multiplier)
    pub base_threshold: Decimal,

    /// Scales every threshold, global and per-symbol
    pub multiplier: Decimal,

    /// Seconds before the same wall may alert again
    pub cooldown_seconds: u64,

    /// Relative tolerance for treating nearby prices as the same wall
    pub price_bucket_tolerance: Decimal,

    pub targets: Vec<ScanTarget>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_threshold: DEFAULT_BASE_THRESHOLD,
            multiplier: Decimal::ONE,
            cooldown_seconds: DEFAULT_COOLDOWN_SECS,
            price_bucket_tolerance: DEFAULT_PRICE_TOLERANCE,
            targets: Vec::new(),
        }
    }
}

impl ScanConfig {
    pub fn cooldown(&self) -> chrono::Duration {
        // Capped so an unvalidated value cannot overflow the conversion.
        let secs = self.cooldown_seconds.min(MAX_COOLDOWN_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    /// Check every field the scheduler relies on.
    ///
    /// # Validation Rules
    /// - `base_threshold`, `multiplier` and every per-target threshold > 0
    /// - `price_bucket_tolerance` strictly between 0 and 1
    /// - `cooldown_seconds` at most `MAX_COOLDOWN_SECS`
    /// - targets have non-empty exchange and symbol and are unique
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_threshold <= Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "base_threshold must be positive, got {}",
                self.base_threshold
            )));
        }

        if self.multiplier <= Decimal::ZERO {
            return Err(ConfigError::Invalid(format!(
                "multiplier must be positive, got {}",
                self.multiplier
            )));
        }

        if self.price_bucket_tolerance <= Decimal::ZERO
            || self.price_bucket_tolerance >= Decimal::ONE
        {
            return Err(ConfigError::Invalid(format!(
                "price_bucket_tolerance must be between 0 and 1, got {}",
                self.price_bucket_tolerance
            )));
        }

        if self.cooldown_seconds > MAX_COOLDOWN_SECS {
            return Err(ConfigError::Invalid(format!(
                "cooldown_seconds must be at most {}, got {}",
                MAX_COOLDOWN_SECS, self.cooldown_seconds
            )));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.exchange.trim().is_empty() || target.symbol.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "scan target '{}' must name an exchange and a symbol",
                    target.id()
                )));
            }

            if let Some(threshold) = target.threshold {
                if threshold <= Decimal::ZERO {
                    return Err(ConfigError::Invalid(format!(
                        "threshold override for {} must be positive, got {}",
                        target.id(),
                        threshold
                    )));
                }
            }

            if !seen.insert((target.exchange.to_lowercase(), target.symbol.clone())) {
                return Err(ConfigError::DuplicateTarget {
                    exchange: target.exchange.clone(),
                    symbol: target.symbol.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Read accessor for the configuration collaborator
///
/// Called once per cycle; implementations may return a different snapshot on
/// every call (hot reload).
pub trait ConfigSource: Send + Sync {
    fn snapshot(&self) -> Result<ScanConfig, ConfigError>;
}

impl<T: ConfigSource + ?Sized> ConfigSource for Arc<T> {
    fn snapshot(&self) -> Result<ScanConfig, ConfigError> {
        (**self).snapshot()
    }
}

/// In-memory configuration that can be swapped while the scanner runs
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<ScanConfig>>,
}

impl SharedConfig {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Replace the whole configuration; picked up on the next cycle.
    pub fn replace(&self, config: ScanConfig) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = config;
    }

    pub fn update<F: FnOnce(&mut ScanConfig)>(&self, f: F) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.update(|cfg| cfg.enabled = enabled);
    }
}

impl ConfigSource for SharedConfig {
    fn snapshot(&self) -> Result<ScanConfig, ConfigError> {
        let guard = self
            .inner
            .read()
            .map_err(|_| ConfigError::Unavailable("configuration lock poisoned".to_string()))?;
        Ok(guard.clone())
    }
}
