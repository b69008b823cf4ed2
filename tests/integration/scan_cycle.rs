// Integration tests for the scan scheduler
//
// End-to-end cycles against an in-memory gateway and a collecting sink:
// - failure isolation between targets
// - enable/disable toggling between cycles
// - cooldown suppression across cycles and its interaction with config changes
// - fetch timeouts, per-exchange concurrency, cooperative stop

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use density_scanner::config::{ConfigSource, ScanConfig, ScanTarget, SharedConfig};
use density_scanner::density::DensityAlert;
use density_scanner::error::{ConfigError, FetchError, ScanError};
use density_scanner::exchange::ExchangeGateway;
use density_scanner::orderbook::{OrderBookSnapshot, PriceLevel, Side};
use density_scanner::scanner::{
    HealthStatus, ScanScheduler, ScannerState, SchedulerOptions, TargetError,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone)]
enum Behavior {
    Book(OrderBookSnapshot),
    Fail(FetchError),
    Hang,
}

/// Gateway serving canned books, tracking calls and per-exchange concurrency
#[derive(Default)]
struct FakeGateway {
    books: Mutex<HashMap<(String, String), Behavior>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: Mutex<HashMap<String, usize>>,
    peak: Mutex<HashMap<String, usize>>,
}

struct InFlight<'a> {
    gateway: &'a FakeGateway,
    exchange: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.gateway.in_flight.lock().unwrap();
        if let Some(n) = in_flight.get_mut(&self.exchange) {
            *n -= 1;
        }
    }
}

impl FakeGateway {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn set(&self, exchange: &str, symbol: &str, behavior: Behavior) {
        self.books
            .lock()
            .unwrap()
            .insert((exchange.to_string(), symbol.to_string()), behavior);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak(&self, exchange: &str) -> usize {
        self.peak.lock().unwrap().get(exchange).copied().unwrap_or(0)
    }

    fn enter(&self, exchange: &str) -> InFlight<'_> {
        let mut in_flight = self.in_flight.lock().unwrap();
        let n = in_flight.entry(exchange.to_string()).or_default();
        *n += 1;
        let mut peak = self.peak.lock().unwrap();
        let p = peak.entry(exchange.to_string()).or_default();
        *p = (*p).max(*n);
        InFlight {
            gateway: self,
            exchange: exchange.to_string(),
        }
    }
}

#[async_trait]
impl ExchangeGateway for FakeGateway {
    async fn fetch_order_book(
        &self,
        exchange: &str,
        symbol: &str,
    ) -> Result<OrderBookSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .books
            .lock()
            .unwrap()
            .get(&(exchange.to_string(), symbol.to_string()))
            .cloned();

        let _guard = self.enter(exchange);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match behavior {
            Some(Behavior::Book(book)) => Ok(book),
            Some(Behavior::Fail(err)) => Err(err),
            Some(Behavior::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(FetchError::Connection("hung fetch resumed".into()))
            }
            None => Err(FetchError::UnknownSymbol {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
            }),
        }
    }
}

/// Bid wall at `price` worth `price * amount`, plus a small level below it
fn wall(price: Decimal, amount: Decimal) -> Behavior {
    Behavior::Book(OrderBookSnapshot::new(
        vec![
            PriceLevel::new(price, amount),
            PriceLevel::new(price - dec!(100), dec!(1)),
        ],
        vec![PriceLevel::new(price + dec!(10), dec!(0.5))],
    ))
}

fn collecting_sink() -> (
    Arc<Mutex<Vec<DensityAlert>>>,
    impl Fn(DensityAlert) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let seen = Arc::clone(&seen);
        move |alert: DensityAlert| seen.lock().unwrap().push(alert)
    };
    (seen, sink)
}

fn scan_config(targets: &[(&str, &str)]) -> ScanConfig {
    ScanConfig {
        base_threshold: dec!(480000),
        multiplier: dec!(1),
        cooldown_seconds: 300,
        targets: targets
            .iter()
            .map(|(exchange, symbol)| ScanTarget::new(*exchange, *symbol))
            .collect(),
        ..ScanConfig::default()
    }
}

fn options() -> SchedulerOptions {
    SchedulerOptions {
        interval: Duration::from_secs(10),
        fetch_timeout: Duration::from_secs(5),
        ..SchedulerOptions::default()
    }
}

#[tokio::test]
async fn failing_target_does_not_block_other_targets() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));
    gateway.set(
        "binance",
        "ETHUSDT",
        Behavior::Fail(FetchError::RateLimited("HTTP 429 from exchange".into())),
    );
    gateway.set("hyperliquid", "BTC/USD:USD", wall(dec!(50020), dec!(12)));

    let config = SharedConfig::new(scan_config(&[
        ("binance", "BTCUSDT"),
        ("binance", "ETHUSDT"),
        ("binance", "NOPEUSDT"),
        ("hyperliquid", "BTC/USD:USD"),
    ]));
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, Arc::clone(&gateway), sink, options());

    let report = scheduler.run_cycle_at(Utc::now()).await.unwrap();

    assert_eq!(report.targets_scanned, 2);
    assert_eq!(report.failures.len(), 2);
    assert!(matches!(
        report.failure_for("binance", "ETHUSDT"),
        Some(TargetError::Fetch(FetchError::RateLimited(_)))
    ));
    let unknown = report.failure_for("binance", "NOPEUSDT").unwrap();
    assert_eq!(unknown.error_type(), "unknown_symbol");

    let alerts = seen.lock().unwrap();
    assert_eq!(alerts.len(), 2);
    assert!(alerts.iter().all(|a| a.side == Side::Bid));
    let mut symbols: Vec<_> = alerts.iter().map(|a| a.symbol.as_str()).collect();
    symbols.sort();
    assert_eq!(symbols, vec!["BTC/USD:USD", "BTCUSDT"]);

    assert_eq!(scheduler.health().status, HealthStatus::Degraded);
}

#[tokio::test]
async fn only_the_qualifying_level_alerts() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set(
        "binance",
        "BTCUSDT",
        Behavior::Book(OrderBookSnapshot::new(
            vec![
                PriceLevel::new(dec!(50000), dec!(10)),
                PriceLevel::new(dec!(49900), dec!(6)),
                PriceLevel::new(dec!(49800), dec!(4)),
                PriceLevel::new(dec!(49700), dec!(0)),
            ],
            vec![],
        )),
    );

    let config = SharedConfig::new(scan_config(&[("binance", "BTCUSDT")]));
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, gateway, sink, options());

    scheduler.run_cycle_at(Utc::now()).await.unwrap();

    let alerts = seen.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].price, dec!(50000));
    assert_eq!(alerts[0].amount, dec!(10));
    assert_eq!(alerts[0].volume, dec!(500000));
    assert_eq!(alerts[0].threshold_used, dec!(480000));
}

#[tokio::test]
async fn per_symbol_threshold_and_multiplier() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));
    gateway.set("binance", "ETHUSDT", wall(dec!(3000), dec!(100)));

    let mut cfg = scan_config(&[]);
    cfg.multiplier = dec!(0.5);
    cfg.targets = vec![
        ScanTarget::new("binance", "BTCUSDT").with_threshold(dec!(2000000)),
        ScanTarget::new("binance", "ETHUSDT"),
    ];
    let config = SharedConfig::new(cfg);
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, gateway, sink, options());

    scheduler.run_cycle_at(Utc::now()).await.unwrap();

    // BTC: 500k < 2M * 0.5; ETH: 300k >= 480k * 0.5
    let alerts = seen.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].symbol, "ETHUSDT");
    assert_eq!(alerts[0].threshold_used, dec!(240000));
}

#[tokio::test]
async fn disabling_stops_alerts_and_reenabling_resumes() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    let mut cfg = scan_config(&[("binance", "BTCUSDT")]);
    cfg.enabled = false;
    let config = SharedConfig::new(cfg);
    let (seen, sink) = collecting_sink();
    let scheduler =
        ScanScheduler::new(config.clone(), Arc::clone(&gateway), sink, options());

    let t0 = Utc::now();
    let report = scheduler.run_cycle_at(t0).await.unwrap();
    assert!(report.disabled);
    assert_eq!(gateway.calls(), 0);
    assert!(seen.lock().unwrap().is_empty());

    config.set_enabled(true);
    let report = scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(10))
        .await
        .unwrap();
    assert!(!report.disabled);
    assert_eq!(report.alerts_emitted, 1);
    assert_eq!(seen.lock().unwrap().len(), 1);

    config.set_enabled(false);
    let report = scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(20))
        .await
        .unwrap();
    assert!(report.disabled);
    assert!(report.failures.is_empty());
    assert_eq!(gateway.calls(), 1);
    assert_eq!(scheduler.metrics().cycles_disabled, 2);
}

#[tokio::test]
async fn persistent_wall_realerts_after_cooldown() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    let mut cfg = scan_config(&[("binance", "BTCUSDT")]);
    cfg.cooldown_seconds = 60;
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(SharedConfig::new(cfg), gateway, sink, options());

    let t0 = Utc::now();
    let mut emitted = Vec::new();
    for offset in [0, 10, 30, 50, 60, 70] {
        let report = scheduler
            .run_cycle_at(t0 + ChronoDuration::seconds(offset))
            .await
            .unwrap();
        emitted.push(report.alerts_emitted);
    }

    // Suppression never extends the window, so the wall re-alerts at t=60.
    assert_eq!(emitted, vec![1, 0, 0, 0, 1, 0]);
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(scheduler.metrics().alerts_suppressed, 4);
}

#[tokio::test]
async fn price_jitter_within_tolerance_is_the_same_wall() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    let config = SharedConfig::new(scan_config(&[("binance", "BTCUSDT")]));
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, Arc::clone(&gateway), sink, options());

    let t0 = Utc::now();
    scheduler.run_cycle_at(t0).await.unwrap();

    gateway.set("binance", "BTCUSDT", wall(dec!(50040), dec!(10)));
    let report = scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(10))
        .await
        .unwrap();
    assert_eq!(report.alerts_suppressed, 1);

    gateway.set("binance", "BTCUSDT", wall(dec!(50100), dec!(10)));
    let report = scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(20))
        .await
        .unwrap();
    assert_eq!(report.alerts_emitted, 1);

    let prices: Vec<Decimal> = seen.lock().unwrap().iter().map(|a| a.price).collect();
    assert_eq!(prices, vec![dec!(50000), dec!(50100)]);
}

#[tokio::test]
async fn removing_a_target_forgets_its_cooldowns() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    let config = SharedConfig::new(scan_config(&[("binance", "BTCUSDT")]));
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config.clone(), gateway, sink, options());

    let t0 = Utc::now();
    scheduler.run_cycle_at(t0).await.unwrap();

    config.update(|cfg| cfg.targets.clear());
    scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(10))
        .await
        .unwrap();

    config.update(|cfg| cfg.targets.push(ScanTarget::new("binance", "BTCUSDT")));
    let report = scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(20))
        .await
        .unwrap();

    assert_eq!(report.alerts_emitted, 1);
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn tolerance_change_clears_cooldowns() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    let config = SharedConfig::new(scan_config(&[("binance", "BTCUSDT")]));
    let (_seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config.clone(), gateway, sink, options());

    let t0 = Utc::now();
    scheduler.run_cycle_at(t0).await.unwrap();

    config.update(|cfg| cfg.price_bucket_tolerance = dec!(0.005));
    let report = scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(10))
        .await
        .unwrap();
    assert_eq!(report.alerts_emitted, 1);
}

#[tokio::test(start_paused = true)]
async fn hung_fetch_times_out_without_blocking_the_cycle() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "SLOWUSDT", Behavior::Hang);
    gateway.set("hyperliquid", "BTC", wall(dec!(50000), dec!(10)));

    let config = SharedConfig::new(scan_config(&[("binance", "SLOWUSDT"), ("hyperliquid", "BTC")]));
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, gateway, sink, options());

    let started = tokio::time::Instant::now();
    let report = scheduler.run_cycle_at(Utc::now()).await.unwrap();

    assert!(started.elapsed() <= Duration::from_secs(6));
    assert_eq!(
        report.failure_for("binance", "SLOWUSDT"),
        Some(&TargetError::Fetch(FetchError::Timeout(Duration::from_secs(5))))
    );
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(scheduler.metrics().fetch_timeouts, 1);
}

#[tokio::test(start_paused = true)]
async fn fetches_are_bounded_per_exchange() {
    let gateway = Arc::new(FakeGateway::with_delay(Duration::from_millis(200)));
    for symbol in ["A", "B", "C"] {
        gateway.set("binance", symbol, wall(dec!(1000), dec!(1)));
        gateway.set("hyperliquid", symbol, wall(dec!(1000), dec!(1)));
    }

    let config = SharedConfig::new(scan_config(&[
        ("binance", "A"),
        ("binance", "B"),
        ("binance", "C"),
        ("hyperliquid", "A"),
        ("hyperliquid", "B"),
        ("hyperliquid", "C"),
    ]));
    let (_seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, Arc::clone(&gateway), sink, options());

    let started = tokio::time::Instant::now();
    let report = scheduler.run_cycle_at(Utc::now()).await.unwrap();

    assert_eq!(report.targets_scanned, 6);
    assert_eq!(gateway.peak("binance"), 1);
    assert_eq!(gateway.peak("hyperliquid"), 1);
    // Exchanges proceed in parallel: three sequential fetches, not six.
    assert!(started.elapsed() < Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn run_until_stopped() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    let config = SharedConfig::new(scan_config(&[("binance", "BTCUSDT")]));
    let (seen, sink) = collecting_sink();
    let scheduler = Arc::new(ScanScheduler::new(config, gateway, sink, options()));

    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(scheduler.state(), ScannerState::Running);
    assert!(matches!(
        scheduler.run().await,
        Err(ScanError::InvalidState("running"))
    ));

    scheduler.stop();
    runner.await.unwrap().unwrap();

    assert_eq!(scheduler.state(), ScannerState::Stopped);
    assert!(scheduler.metrics().cycles >= 2);
    // The wall persisted through every cycle but stays inside its cooldown.
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(scheduler.health().status, HealthStatus::Error);
}

#[tokio::test(start_paused = true)]
async fn stop_returns_within_one_fetch_timeout() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "SLOWUSDT", Behavior::Hang);
    gateway.set("binance", "NEXTUSDT", Behavior::Hang);

    let config = SharedConfig::new(scan_config(&[("binance", "SLOWUSDT"), ("binance", "NEXTUSDT")]));
    let (_seen, sink) = collecting_sink();
    let scheduler = Arc::new(ScanScheduler::new(
        config,
        Arc::clone(&gateway),
        sink,
        options(),
    ));

    let runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let stop_requested = tokio::time::Instant::now();
    scheduler.stop();
    assert_eq!(scheduler.state(), ScannerState::Stopping);

    runner.await.unwrap().unwrap();
    assert!(stop_requested.elapsed() <= Duration::from_secs(5));

    // Whichever fetch took the only permit hung; the queued one never started.
    assert_eq!(gateway.calls(), 1);
    let report = scheduler.last_report().unwrap();
    assert_eq!(report.targets_skipped, 1);
}

struct FlakyConfig {
    inner: SharedConfig,
    failures_left: AtomicUsize,
}

impl ConfigSource for FlakyConfig {
    fn snapshot(&self) -> Result<ScanConfig, ConfigError> {
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(ConfigError::Unavailable("settings locked".into()));
        }
        self.inner.snapshot()
    }
}

#[tokio::test]
async fn repeated_config_failures_degrade_health_then_recover() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    let config = FlakyConfig {
        inner: SharedConfig::new(scan_config(&[("binance", "BTCUSDT")])),
        failures_left: AtomicUsize::new(3),
    };
    let (seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, Arc::clone(&gateway), sink, options());

    let t0 = Utc::now();
    for i in 0..3 {
        let err = scheduler
            .run_cycle_at(t0 + ChronoDuration::seconds(i * 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::ConfigurationUnavailable(_)));
    }

    let health = scheduler.health();
    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(health.consecutive_config_failures, 3);
    assert_eq!(gateway.calls(), 0);

    scheduler
        .run_cycle_at(t0 + ChronoDuration::seconds(30))
        .await
        .unwrap();
    let health = scheduler.health();
    assert_eq!(health.status, HealthStatus::Ok);
    assert_eq!(health.consecutive_config_failures, 0);
    assert_eq!(seen.lock().unwrap().len(), 1);
    assert_eq!(scheduler.metrics().config_failures, 3);
}

#[tokio::test]
async fn duplicate_targets_are_a_config_failure() {
    let config = SharedConfig::new(scan_config(&[
        ("binance", "BTCUSDT"),
        ("binance", "BTCUSDT"),
    ]));
    let (_seen, sink) = collecting_sink();
    let scheduler = ScanScheduler::new(config, FakeGateway::default(), sink, options());

    let err = scheduler.run_cycle_at(Utc::now()).await.unwrap_err();
    assert!(matches!(
        err,
        ScanError::ConfigurationUnavailable(ConfigError::DuplicateTarget { .. })
    ));
}

#[tokio::test]
async fn oversized_cooldown_skips_the_cycle() {
    let gateway = Arc::new(FakeGateway::default());
    gateway.set("binance", "BTCUSDT", wall(dec!(50000), dec!(10)));

    for cooldown_seconds in [u64::MAX, 100_000_000_000_000] {
        let mut cfg = scan_config(&[("binance", "BTCUSDT")]);
        cfg.base_threshold = dec!(1000);
        cfg.cooldown_seconds = cooldown_seconds;
        let (seen, sink) = collecting_sink();
        let scheduler =
            ScanScheduler::new(SharedConfig::new(cfg), Arc::clone(&gateway), sink, options());

        let err = scheduler.run_cycle_at(Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::ConfigurationUnavailable(ConfigError::Invalid(_))
        ));
        assert!(seen.lock().unwrap().is_empty());
    }
    assert_eq!(gateway.calls(), 0);
}
