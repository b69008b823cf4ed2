//! Configuration Management
//!
//! - `scan`: per-cycle detection parameters and the `ConfigSource` seam
//! - `settings`: JSON settings file with hot reload
//! - `runtime`: process-level options read from the environment

pub mod runtime;
pub mod scan;
pub mod settings;

// Re-export
pub use runtime::RuntimeOptions;
pub use scan::{ConfigSource, ScanConfig, ScanTarget, SharedConfig};
pub use settings::{parse_chat_id, Settings, SettingsStore};
