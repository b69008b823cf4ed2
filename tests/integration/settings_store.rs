// Integration tests for the JSON settings store
//
// Covers persistence, legacy chat id conversion, hot reload through the
// ConfigSource seam and scanner behaviour when the file is broken.

use chrono::Utc;
use density_scanner::config::{ConfigSource, Settings, SettingsStore};
use density_scanner::density::DensityAlert;
use density_scanner::error::{ConfigError, FetchError, ScanError};
use density_scanner::exchange::ExchangeGateway;
use density_scanner::orderbook::{OrderBookSnapshot, PriceLevel};
use density_scanner::scanner::{ScanScheduler, SchedulerOptions};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> SettingsStore {
    SettingsStore::new(dir.path().join("settings.json"))
}

#[test]
fn missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    let settings = store.load().unwrap();
    assert_eq!(settings, Settings::default());
    assert!(settings.alerts_enabled);
    assert!(settings.chat_id.is_none());
}

#[test]
fn toggles_persist_across_instances() {
    let dir = TempDir::new().unwrap();
    store_in(&dir).set_alerts_enabled(false).unwrap();
    store_in(&dir).set_chat_id("-1003892216818").unwrap();

    let reloaded = store_in(&dir).load().unwrap();
    assert!(!reloaded.alerts_enabled);
    assert_eq!(reloaded.chat_id, Some(-1003892216818));

    // No temp file left behind by the atomic write
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers.len(), 1);
}

#[test]
fn chat_id_is_written_as_integer() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store.set_chat_id("12345").unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
    assert_eq!(raw["chat_id"], serde_json::json!(12345));
}

#[test]
fn legacy_string_chat_id_is_read_as_integer() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    std::fs::write(
        store.path(),
        r#"{"chat_id": "-1003892216818", "alerts_enabled": true}"#,
    )
    .unwrap();

    assert_eq!(store.load().unwrap().chat_id, Some(-1003892216818));
}

#[test]
fn invalid_chat_id_is_rejected_and_not_persisted() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    store.set_chat_id("42").unwrap();

    let err = store.set_chat_id("not_a_number").unwrap_err();
    assert!(matches!(err, ConfigError::InvalidChatId(_)));
    assert_eq!(store.load().unwrap().chat_id, Some(42));
}

#[test]
fn corrupt_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    std::fs::write(store.path(), "{ not json").unwrap();

    assert!(matches!(store.snapshot(), Err(ConfigError::Parse(_))));
}

#[test]
fn snapshot_reflects_file_edits() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);

    std::fs::write(
        store.path(),
        r#"{"targets": [{"exchange": "binance", "symbol": "BTCUSDT"}]}"#,
    )
    .unwrap();
    assert_eq!(store.snapshot().unwrap().targets.len(), 1);

    store
        .update(|s| {
            s.multiplier = dec!(2);
            s.targets.clear();
            Ok(())
        })
        .unwrap();

    let cfg = store.snapshot().unwrap();
    assert_eq!(cfg.multiplier, dec!(2));
    assert!(cfg.targets.is_empty());
}

struct OneWall;

#[async_trait::async_trait]
impl ExchangeGateway for OneWall {
    async fn fetch_order_book(
        &self,
        _exchange: &str,
        _symbol: &str,
    ) -> Result<OrderBookSnapshot, FetchError> {
        Ok(OrderBookSnapshot::new(
            vec![PriceLevel::new(dec!(50000), dec!(10))],
            vec![],
        ))
    }
}

#[tokio::test]
async fn scanner_follows_the_settings_file() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(store_in(&dir));
    store
        .update(|s| {
            s.base_threshold = dec!(480000);
            s.targets = serde_json::from_str(r#"[{"exchange": "binance", "symbol": "BTCUSDT"}]"#)
                .map_err(ConfigError::Parse)?;
            Ok(())
        })
        .unwrap();

    let alerts = Arc::new(std::sync::Mutex::new(0usize));
    let sink = {
        let alerts = Arc::clone(&alerts);
        move |_alert: DensityAlert| *alerts.lock().unwrap() += 1
    };
    let scheduler = ScanScheduler::new(
        Arc::clone(&store),
        OneWall,
        sink,
        SchedulerOptions::default(),
    );

    let t0 = Utc::now();
    scheduler.run_cycle_at(t0).await.unwrap();
    assert_eq!(*alerts.lock().unwrap(), 1);

    store.set_alerts_enabled(false).unwrap();
    let report = scheduler
        .run_cycle_at(t0 + chrono::Duration::seconds(10))
        .await
        .unwrap();
    assert!(report.disabled);

    std::fs::write(store.path(), "{ broken").unwrap();
    let err = scheduler
        .run_cycle_at(t0 + chrono::Duration::seconds(20))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScanError::ConfigurationUnavailable(ConfigError::Parse(_))
    ));
    assert_eq!(*alerts.lock().unwrap(), 1);
}
