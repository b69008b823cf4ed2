//! Scan scheduler
//!
//! Drives fixed-interval scan cycles. Each cycle snapshots the configuration,
//! fetches every target's order book concurrently (bounded per exchange),
//! evaluates the books, filters the alerts through the cooldown table and
//! hands the survivors to the sink.
//!
//! # Cancellation
//! `stop()` cancels a token shared by the loop and every fetch. Fetches still
//! waiting for a permit never start; fetches already running finish or hit
//! their timeout, so `run()` returns within one fetch timeout.

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{ConfigSource, RuntimeOptions, ScanConfig, ScanTarget};
use crate::delivery::AlertSink;
use crate::density::{evaluate, AlertDeduplicator};
use crate::error::{FetchError, ScanError};
use crate::exchange::ExchangeGateway;
use crate::orderbook::OrderBookSnapshot;
use crate::scanner::health::ScannerHealth;
use crate::scanner::metrics::{add, bump, MetricsSnapshot, ScanMetrics};
use crate::scanner::report::{CycleReport, TargetError, TargetFailure};
use crate::scanner::state::{ScannerState, StateCell};

/// Scheduling knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Time between cycle starts
    pub interval: Duration,

    /// Deadline for a single order book fetch
    pub fetch_timeout: Duration,

    /// In-flight fetches allowed per exchange
    pub max_fetches_per_exchange: usize,

    /// Consecutive configuration failures before escalating to error logs
    pub config_failure_escalation: u32,

    /// Cycles between sweeps of expired cooldown entries
    pub sweep_every_cycles: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(5),
            max_fetches_per_exchange: 1,
            config_failure_escalation: 3,
            sweep_every_cycles: 30,
        }
    }
}

impl From<&RuntimeOptions> for SchedulerOptions {
    fn from(options: &RuntimeOptions) -> Self {
        Self {
            interval: options.scan_interval,
            fetch_timeout: options.fetch_timeout,
            max_fetches_per_exchange: options.max_fetches_per_exchange,
            config_failure_escalation: options.config_failure_escalation,
            ..Self::default()
        }
    }
}

/// State owned by the coordinating loop
#[derive(Default)]
struct LoopState {
    /// Created from the first configuration snapshot
    dedup: Option<AlertDeduplicator>,
    semaphores: HashMap<String, Arc<Semaphore>>,
    targets: HashSet<(String, String)>,
    enabled: Option<bool>,
    cycles_since_sweep: u64,
}

enum FetchOutcome {
    Snapshot(OrderBookSnapshot),
    Failed(FetchError),
    /// Cancelled before the fetch began
    NotStarted,
}

/// Periodic density scanner
pub struct ScanScheduler {
    config: Box<dyn ConfigSource>,
    gateway: Box<dyn ExchangeGateway>,
    sink: Box<dyn AlertSink>,
    options: SchedulerOptions,

    state: StateCell,
    cancel: CancellationToken,
    loop_state: Mutex<LoopState>,

    metrics: ScanMetrics,
    config_failures: AtomicU32,
    cycle_seq: AtomicU64,
    last_report: RwLock<Option<CycleReport>>,
}

impl std::fmt::Debug for ScanScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanScheduler")
            .field("state", &self.state.get())
            .field("options", &self.options)
            .finish()
    }
}

impl ScanScheduler {
    pub fn new<C, G, S>(config: C, gateway: G, sink: S, options: SchedulerOptions) -> Self
    where
        C: ConfigSource + 'static,
        G: ExchangeGateway + 'static,
        S: AlertSink + 'static,
    {
        Self {
            config: Box::new(config),
            gateway: Box::new(gateway),
            sink: Box::new(sink),
            options,
            state: StateCell::new(),
            cancel: CancellationToken::new(),
            loop_state: Mutex::new(LoopState::default()),
            metrics: ScanMetrics::default(),
            config_failures: AtomicU32::new(0),
            cycle_seq: AtomicU64::new(0),
            last_report: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ScannerState {
        self.state.get()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.last_report
            .read()
            .map(|r| r.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn health(&self) -> ScannerHealth {
        let last = self.last_report();
        ScannerHealth::assess(
            self.state(),
            self.config_failures.load(Ordering::Relaxed),
            self.options.config_failure_escalation,
            last.as_ref(),
        )
    }

    /// Run scan cycles until `stop()` is called.
    ///
    /// # Errors
    /// `ScanError::InvalidState` if the scanner is not idle, or an internal
    /// failure of the scheduling logic itself. Per-target and configuration
    /// failures never end the loop.
    pub async fn run(&self) -> Result<(), ScanError> {
        self.state
            .transition(ScannerState::Idle, ScannerState::Running)
            .map_err(|actual| ScanError::InvalidState(actual.as_str()))?;

        info!(
            interval_secs = self.options.interval.as_secs_f64(),
            fetch_timeout_ms = self.options.fetch_timeout.as_millis() as u64,
            max_fetches_per_exchange = self.options.max_fetches_per_exchange,
            "Density scanner started"
        );

        let mut ticker = tokio::time::interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let result = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            let cycle = self.cycle_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let outcome = self
                .run_cycle_at(Utc::now())
                .instrument(info_span!("scan_cycle", cycle))
                .await;

            match outcome {
                Ok(_) | Err(ScanError::ConfigurationUnavailable(_)) => {}
                Err(e) => {
                    error!(error = %e, "Scan loop failed");
                    break Err(e);
                }
            }
        };

        self.cancel.cancel();
        self.state.set(ScannerState::Stopped);
        info!("Density scanner stopped");
        result
    }

    /// Request a cooperative stop. Idempotent.
    pub fn stop(&self) {
        match self
            .state
            .transition(ScannerState::Idle, ScannerState::Stopped)
        {
            Ok(()) => info!("Density scanner stopped before it started"),
            Err(ScannerState::Running) => {
                if self
                    .state
                    .transition(ScannerState::Running, ScannerState::Stopping)
                    .is_ok()
                {
                    info!("Stopping density scanner");
                }
            }
            Err(_) => {}
        }
        self.cancel.cancel();
    }

    /// Run one scan cycle stamped with `now`.
    ///
    /// # Errors
    /// `ScanError::ConfigurationUnavailable` when the configuration cannot be
    /// read or fails validation; the cycle is skipped.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<CycleReport, ScanError> {
        let config = self.load_config()?;

        let mut guard = self.loop_state.lock().await;
        let state = &mut *guard;
        self.apply_config(state, &config)?;
        bump(&self.metrics.cycles);

        if !config.enabled {
            bump(&self.metrics.cycles_disabled);
            debug!("Scanning disabled, skipping cycle");
            let report = CycleReport::disabled(now);
            self.store_report(&report);
            return Ok(report);
        }

        let Some(dedup) = state.dedup.as_mut() else {
            return Err(ScanError::Internal(
                "cooldown table missing after configuration".to_string(),
            ));
        };

        state.cycles_since_sweep += 1;
        if state.cycles_since_sweep >= self.options.sweep_every_cycles {
            state.cycles_since_sweep = 0;
            let removed = dedup.sweep(now);
            if removed > 0 {
                debug!(removed, remaining = dedup.len(), "Swept expired cooldowns");
            }
        }

        let cooldown = config.cooldown();
        let mut report = CycleReport::new(now);

        let mut fetches = FuturesUnordered::new();
        for target in &config.targets {
            let permits = state
                .semaphores
                .entry(target.exchange.clone())
                .or_insert_with(|| {
                    Arc::new(Semaphore::new(self.options.max_fetches_per_exchange.max(1)))
                });
            fetches.push(self.fetch_target(target, Arc::clone(permits)));
        }

        while let Some((target, outcome)) = fetches.next().await {
            match outcome {
                FetchOutcome::NotStarted => report.targets_skipped += 1,
                FetchOutcome::Failed(err) => {
                    bump(&self.metrics.fetch_failures);
                    if matches!(err, FetchError::Timeout(_)) {
                        bump(&self.metrics.fetch_timeouts);
                    }
                    warn!(
                        exchange = %target.exchange,
                        symbol = %target.symbol,
                        error_type = err.error_type(),
                        transient = err.is_transient(),
                        error = %err,
                        "Order book fetch failed"
                    );
                    report.failures.push(TargetFailure {
                        exchange: target.exchange.clone(),
                        symbol: target.symbol.clone(),
                        error: err.into(),
                    });
                }
                FetchOutcome::Snapshot(snapshot) => {
                    let ctx = CycleContext {
                        config: &config,
                        now,
                        cooldown,
                    };
                    self.process_snapshot(target, &snapshot, &ctx, dedup, &mut report);
                }
            }
        }

        if report.failures.is_empty() && report.alerts_emitted == 0 {
            debug!(
                targets = report.targets_scanned,
                suppressed = report.alerts_suppressed,
                "Scan cycle complete"
            );
        } else {
            info!(
                targets = report.targets_scanned,
                failures = report.failures.len(),
                alerts = report.alerts_emitted,
                suppressed = report.alerts_suppressed,
                skipped = report.targets_skipped,
                "Scan cycle complete"
            );
        }

        self.store_report(&report);
        Ok(report)
    }

    fn load_config(&self) -> Result<ScanConfig, ScanError> {
        let loaded = self
            .config
            .snapshot()
            .and_then(|config| config.validate().map(|()| config));

        match loaded {
            Ok(config) => {
                let previous = self.config_failures.swap(0, Ordering::Relaxed);
                if previous > 0 {
                    info!(failed_cycles = previous, "Configuration available again");
                }
                Ok(config)
            }
            Err(e) => {
                bump(&self.metrics.config_failures);
                let consecutive = self.config_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if consecutive >= self.options.config_failure_escalation {
                    error!(
                        consecutive_failures = consecutive,
                        error = %e,
                        "Configuration unavailable, scan cycles are being skipped"
                    );
                } else {
                    warn!(
                        consecutive_failures = consecutive,
                        error = %e,
                        "Configuration unavailable, skipping cycle"
                    );
                }
                Err(ScanError::ConfigurationUnavailable(e))
            }
        }
    }

    /// Fold a new configuration snapshot into the loop state.
    fn apply_config(&self, state: &mut LoopState, config: &ScanConfig) -> Result<(), ScanError> {
        if let Some(dedup) = state.dedup.as_mut() {
            if dedup.reconfigure(config.price_bucket_tolerance)? {
                info!(
                    tolerance = %config.price_bucket_tolerance,
                    "Price tolerance changed, cooldown table cleared"
                );
            }
        } else {
            state.dedup = Some(AlertDeduplicator::new(config.price_bucket_tolerance)?);
        }

        if state.enabled != Some(config.enabled) {
            if state.enabled.is_some() {
                info!(enabled = config.enabled, "Scanning toggled");
            }
            state.enabled = Some(config.enabled);
        }

        let current: HashSet<(String, String)> = config
            .targets
            .iter()
            .map(|t| (t.exchange.clone(), t.symbol.clone()))
            .collect();

        for (exchange, symbol) in state.targets.difference(&current) {
            let cleared = state
                .dedup
                .as_mut()
                .map(|d| d.forget_target(exchange, symbol))
                .unwrap_or(0);
            info!(exchange = %exchange, symbol = %symbol, cleared, "Scan target removed");
        }
        for (exchange, symbol) in current.difference(&state.targets) {
            info!(exchange = %exchange, symbol = %symbol, "Scan target added");
        }
        state.targets = current;

        Ok(())
    }

    async fn fetch_target<'a>(
        &self,
        target: &'a ScanTarget,
        permits: Arc<Semaphore>,
    ) -> (&'a ScanTarget, FetchOutcome) {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        };

        let Some(_permit) = permit else {
            return (target, FetchOutcome::NotStarted);
        };
        if self.cancel.is_cancelled() {
            return (target, FetchOutcome::NotStarted);
        }

        bump(&self.metrics.fetches);
        let fetch = self
            .gateway
            .fetch_order_book(&target.exchange, &target.symbol);

        let outcome = match tokio::time::timeout(self.options.fetch_timeout, fetch).await {
            Ok(Ok(snapshot)) => FetchOutcome::Snapshot(snapshot),
            Ok(Err(e)) => FetchOutcome::Failed(e),
            Err(_) => FetchOutcome::Failed(FetchError::Timeout(self.options.fetch_timeout)),
        };

        (target, outcome)
    }

    fn process_snapshot(
        &self,
        target: &ScanTarget,
        snapshot: &OrderBookSnapshot,
        ctx: &CycleContext<'_>,
        dedup: &mut AlertDeduplicator,
        report: &mut CycleReport,
    ) {
        let base_threshold = target.base_threshold(ctx.config.base_threshold);
        let evaluation = match evaluate(
            &target.exchange,
            &target.symbol,
            snapshot,
            base_threshold,
            ctx.config.multiplier,
            ctx.now,
        ) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                error!(
                    exchange = %target.exchange,
                    symbol = %target.symbol,
                    error = %e,
                    "Density evaluation failed"
                );
                report.failures.push(TargetFailure {
                    exchange: target.exchange.clone(),
                    symbol: target.symbol.clone(),
                    error: TargetError::Evaluation(e),
                });
                return;
            }
        };

        let malformed = evaluation.malformed.len();
        if malformed > 0 {
            add(&self.metrics.malformed_levels, malformed as u64);
            report.malformed_levels += malformed;
            warn!(
                exchange = %target.exchange,
                symbol = %target.symbol,
                malformed,
                first_reason = ?evaluation.malformed.first().map(|m| m.reason),
                "Skipped malformed order book levels"
            );
        }

        if evaluation.is_unusable() {
            bump(&self.metrics.unusable_snapshots);
            warn!(
                exchange = %target.exchange,
                symbol = %target.symbol,
                "Order book snapshot unusable, skipping target this cycle"
            );
            report.failures.push(TargetFailure {
                exchange: target.exchange.clone(),
                symbol: target.symbol.clone(),
                error: TargetError::Unusable { malformed },
            });
            return;
        }

        report.targets_scanned += 1;

        for alert in evaluation.alerts {
            if dedup.admit(&alert, ctx.now, ctx.cooldown) {
                info!(
                    exchange = %alert.exchange,
                    symbol = %alert.symbol,
                    side = %alert.side,
                    price = %alert.price,
                    volume = %alert.volume,
                    threshold = %alert.threshold_used,
                    "Density wall detected"
                );
                self.sink.deliver(alert);
                bump(&self.metrics.alerts_emitted);
                report.alerts_emitted += 1;
            } else {
                bump(&self.metrics.alerts_suppressed);
                report.alerts_suppressed += 1;
            }
        }
    }

    fn store_report(&self, report: &CycleReport) {
        let mut last = self.last_report.write().unwrap_or_else(|e| e.into_inner());
        *last = Some(report.clone());
    }
}

struct CycleContext<'a> {
    config: &'a ScanConfig,
    now: DateTime<Utc>,
    cooldown: chrono::Duration,
}
