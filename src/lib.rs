// Library exports for density-scanner

pub mod error;

pub mod config; // Settings, runtime options, per-cycle config snapshots
pub mod delivery; // Alert sinks and chat message formatting
pub mod density; // Threshold evaluation and alert cooldowns
pub mod exchange; // Exchange REST gateways
pub mod orderbook; // Normalized order book snapshot types
pub mod scanner; // Scan scheduler, metrics, health

pub use config::{ConfigSource, RuntimeOptions, ScanConfig, ScanTarget, SettingsStore, SharedConfig};
pub use delivery::{format_alert, AlertSink, ChannelSink};
pub use density::{evaluate, AlertDeduplicator, DensityAlert, Evaluation};
pub use error::{ConfigError, DensityError, FetchError, ScanError};
pub use exchange::{ExchangeGateway, GatewayRegistry};
pub use orderbook::{OrderBookSnapshot, PriceLevel, Side};
pub use scanner::{CycleReport, HealthStatus, ScanScheduler, ScannerHealth, ScannerState, SchedulerOptions};
