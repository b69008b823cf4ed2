use std::time::Duration;

use thiserror::Error;

/// Failure to obtain an order book snapshot from an exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Fetch timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Unknown symbol {symbol} on {exchange}")]
    UnknownSymbol { exchange: String, symbol: String },

    #[error("Unsupported exchange: {0}")]
    UnsupportedExchange(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Transient failures are retried automatically on the next scan cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Connection(_) | FetchError::RateLimited(_) | FetchError::Timeout(_)
        )
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            FetchError::Connection(_) => "connection_error",
            FetchError::RateLimited(_) => "rate_limit",
            FetchError::Timeout(_) => "timeout",
            FetchError::UnknownSymbol { .. } => "unknown_symbol",
            FetchError::UnsupportedExchange(_) => "unsupported_exchange",
            FetchError::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Connection("request timeout".to_string())
        } else if err.is_connect() {
            FetchError::Connection(format!("failed to connect: {}", err))
        } else if err.is_decode() {
            FetchError::InvalidResponse(format!("failed to decode body: {}", err))
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                429 => FetchError::RateLimited("HTTP 429 from exchange".to_string()),
                418 => FetchError::RateLimited("IP temporarily banned (HTTP 418)".to_string()),
                403 => FetchError::RateLimited("WAF limit violated (HTTP 403)".to_string()),
                500..=599 => {
                    FetchError::Connection(format!("exchange server error (HTTP {})", status))
                }
                _ => FetchError::InvalidResponse(format!("HTTP error: {}", status)),
            }
        } else {
            FetchError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::InvalidResponse(format!("JSON parsing failed: {}", err))
    }
}

/// The configuration collaborator could not produce a usable snapshot.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Duplicate scan target {exchange}/{symbol}")]
    DuplicateTarget { exchange: String, symbol: String },

    #[error("Invalid chat id {0:?}: must be an integer")]
    InvalidChatId(String),

    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("Configuration source unavailable: {0}")]
    Unavailable(String),
}

/// Rejected evaluator parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DensityError {
    #[error("Base threshold must be positive, got {0}")]
    InvalidThreshold(String),

    #[error("Multiplier must be positive, got {0}")]
    InvalidMultiplier(String),

    #[error("Effective threshold overflowed ({base} * {multiplier})")]
    ThresholdOverflow { base: String, multiplier: String },
}

/// Errors that terminate or skip a whole scan cycle.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration unavailable: {0}")]
    ConfigurationUnavailable(#[from] ConfigError),

    #[error("Scanner cannot run from state {0}")]
    InvalidState(&'static str),

    #[error("Internal scanner error: {0}")]
    Internal(String),
}
