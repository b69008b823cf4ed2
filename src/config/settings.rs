//! Persisted operator settings
//!
//! A single JSON document holding the alert destination, the global on/off
//! switch and the detection parameters. The file is re-read on every
//! snapshot, so edits take effect on the next scan cycle without a restart.
//!
//! ## Example
//!
//! ```json
//! {
//!   "chat_id": -1003892216818,
//!   "alerts_enabled": true,
//!   "base_threshold": 500000,
//!   "multiplier": 1.0,
//!   "cooldown_seconds": 300,
//!   "price_bucket_tolerance": 0.001,
//!   "targets": [
//!     { "exchange": "binance", "symbol": "BTCUSDT", "threshold": 2000000 },
//!     { "exchange": "hyperliquid", "symbol": "ETH/USD:USD" }
//!   ]
//! }
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use crate::config::scan::{
    ConfigSource, ScanConfig, ScanTarget, DEFAULT_BASE_THRESHOLD, DEFAULT_COOLDOWN_SECS,
};
use crate::density::DEFAULT_PRICE_TOLERANCE;
use crate::error::ConfigError;

/// On-disk settings document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Chat that receives alerts. Legacy files store it as a string.
    #[serde(default, deserialize_with = "deserialize_chat_id")]
    pub chat_id: Option<i64>,

    #[serde(default = "default_enabled")]
    pub alerts_enabled: bool,

    #[serde(default = "default_base_threshold")]
    pub base_threshold: Decimal,

    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,

    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    #[serde(default = "default_tolerance")]
    pub price_bucket_tolerance: Decimal,

    #[serde(default)]
    pub targets: Vec<ScanTarget>,
}

fn default_enabled() -> bool {
    true
}

fn default_base_threshold() -> Decimal {
    DEFAULT_BASE_THRESHOLD
}

fn default_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_cooldown_seconds() -> u64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_tolerance() -> Decimal {
    DEFAULT_PRICE_TOLERANCE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chat_id: None,
            alerts_enabled: default_enabled(),
            base_threshold: default_base_threshold(),
            multiplier: default_multiplier(),
            cooldown_seconds: default_cooldown_seconds(),
            price_bucket_tolerance: default_tolerance(),
            targets: Vec::new(),
        }
    }
}

impl Settings {
    /// Project the settings onto the scheduler's per-cycle view.
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            enabled: self.alerts_enabled,
            base_threshold: self.base_threshold,
            multiplier: self.multiplier,
            cooldown_seconds: self.cooldown_seconds,
            price_bucket_tolerance: self.price_bucket_tolerance,
            targets: self
                .targets
                .iter()
                .map(|t| ScanTarget {
                    exchange: t.exchange.to_lowercase(),
                    symbol: t.symbol.clone(),
                    threshold: t.threshold,
                })
                .collect(),
        }
    }
}

/// Parse a chat id supplied as text (CLI flag or legacy settings file).
pub fn parse_chat_id(raw: &str) -> Result<i64, ConfigError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ConfigError::InvalidChatId(raw.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChatId {
    Number(i64),
    Text(String),
}

fn deserialize_chat_id<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawChatId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawChatId::Number(id)) => Ok(Some(id)),
        Some(RawChatId::Text(text)) => parse_chat_id(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// JSON-file backed settings
///
/// Writes go through a temporary file and an atomic rename so a concurrent
/// snapshot never observes a half-written document.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the settings; a missing file yields the defaults.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Settings file not found, using defaults");
                Ok(Settings::default())
            }
            Err(e) => Err(ConfigError::Io {
                path: self.path.display().to_string(),
                source: e,
            }),
        }
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.write_atomic(settings)
    }

    /// Read-modify-write under the store's write lock.
    pub fn update<F>(&self, f: F) -> Result<Settings, ConfigError>
    where
        F: FnOnce(&mut Settings) -> Result<(), ConfigError>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut settings = self.load()?;
        f(&mut settings)?;
        self.write_atomic(&settings)?;
        Ok(settings)
    }

    /// Enable or disable alerting; the scanner observes it next cycle.
    pub fn set_alerts_enabled(&self, enabled: bool) -> Result<(), ConfigError> {
        self.update(|s| {
            s.alerts_enabled = enabled;
            Ok(())
        })?;
        info!(enabled, "Alerts toggled");
        Ok(())
    }

    pub fn set_chat_id(&self, raw: &str) -> Result<i64, ConfigError> {
        let chat_id = parse_chat_id(raw)?;
        self.update(|s| {
            s.chat_id = Some(chat_id);
            Ok(())
        })?;
        info!(chat_id, "Chat id updated");
        Ok(chat_id)
    }

    fn write_atomic(&self, settings: &Settings) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        };

        let json = serde_json::to_string_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl ConfigSource for SettingsStore {
    fn snapshot(&self) -> Result<ScanConfig, ConfigError> {
        Ok(self.load()?.scan_config())
    }
}
