//! Process-level runtime options
//!
//! Knobs that shape the scheduler and gateways rather than detection. They are
//! read once at startup; detection parameters live in the settings file.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BINANCE_BASE_URL: &str = "https://api.binance.com";
pub const DEFAULT_HYPERLIQUID_BASE_URL: &str = "https://api.hyperliquid.xyz";

/// Runtime options
///
/// ## Environment Variables
///
/// - `SCAN_INTERVAL_SECS`: Seconds between cycle starts (default: 10)
/// - `FETCH_TIMEOUT_SECS`: Per-fetch deadline (default: 5)
/// - `MAX_FETCHES_PER_EXCHANGE`: In-flight fetches per exchange (default: 1)
/// - `ORDERBOOK_DEPTH_LIMIT`: Levels requested per side (default: 100)
/// - `EXCHANGE_REQUESTS_PER_MINUTE`: Client-side rate limit per gateway (default: 1200)
/// - `ALERT_QUEUE_CAPACITY`: Bounded alert queue size (default: 1000)
/// - `CONFIG_FAILURE_ESCALATION`: Consecutive config failures before an error log (default: 3)
/// - `SETTINGS_PATH`: Settings JSON file (default: settings.json)
/// - `BINANCE_BASE_URL`, `HYPERLIQUID_BASE_URL`: REST endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeOptions {
    pub scan_interval: Duration,

    /// Fetches exceeding this are abandoned and counted as timeouts
    pub fetch_timeout: Duration,

    pub max_fetches_per_exchange: usize,

    pub orderbook_depth: u32,

    pub requests_per_minute: u32,

    pub alert_queue_capacity: usize,

    pub config_failure_escalation: u32,

    pub settings_path: PathBuf,

    pub binance_base_url: String,

    pub hyperliquid_base_url: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(5),
            max_fetches_per_exchange: 1,
            orderbook_depth: 100,
            requests_per_minute: 1200,
            alert_queue_capacity: 1000,
            config_failure_escalation: 3,
            settings_path: PathBuf::from("settings.json"),
            binance_base_url: DEFAULT_BINANCE_BASE_URL.to_string(),
            hyperliquid_base_url: DEFAULT_HYPERLIQUID_BASE_URL.to_string(),
        }
    }
}

impl RuntimeOptions {
    /// Load runtime options from environment variables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnv` if a variable is set but unparseable
    /// or zero where a positive value is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let scan_interval = Duration::from_secs(positive(
            &lookup,
            "SCAN_INTERVAL_SECS",
            defaults.scan_interval.as_secs(),
        )?);
        let fetch_timeout = Duration::from_secs(positive(
            &lookup,
            "FETCH_TIMEOUT_SECS",
            defaults.fetch_timeout.as_secs(),
        )?);

        Ok(Self {
            scan_interval,
            fetch_timeout,
            max_fetches_per_exchange: positive(
                &lookup,
                "MAX_FETCHES_PER_EXCHANGE",
                defaults.max_fetches_per_exchange,
            )?,
            orderbook_depth: positive(&lookup, "ORDERBOOK_DEPTH_LIMIT", defaults.orderbook_depth)?,
            requests_per_minute: positive(
                &lookup,
                "EXCHANGE_REQUESTS_PER_MINUTE",
                defaults.requests_per_minute,
            )?,
            alert_queue_capacity: positive(
                &lookup,
                "ALERT_QUEUE_CAPACITY",
                defaults.alert_queue_capacity,
            )?,
            config_failure_escalation: positive(
                &lookup,
                "CONFIG_FAILURE_ESCALATION",
                defaults.config_failure_escalation,
            )?,
            settings_path: lookup("SETTINGS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.settings_path),
            binance_base_url: lookup("BINANCE_BASE_URL").unwrap_or(defaults.binance_base_url),
            hyperliquid_base_url: lookup("HYPERLIQUID_BASE_URL")
                .unwrap_or(defaults.hyperliquid_base_url),
        })
    }
}

fn positive<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidEnv { name, value: raw }),
    }
}
