use anyhow::Context;
use clap::Parser;
use density_scanner::config::{RuntimeOptions, SettingsStore};
use density_scanner::delivery::{format_alert, ChannelSink};
use density_scanner::exchange::GatewayRegistry;
use density_scanner::scanner::{ScanScheduler, SchedulerOptions};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Order book density scanner: polls exchanges and alerts on large resting levels
#[derive(Debug, Parser)]
#[command(name = "density-scanner", version)]
struct Cli {
    /// Settings JSON file (overrides SETTINGS_PATH)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Chat id to persist in the settings file before starting
    #[arg(long, allow_hyphen_values = true)]
    chat_id: Option<String>,

    /// Seconds between scan cycles (overrides SCAN_INTERVAL_SECS)
    #[arg(long)]
    interval: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut options = RuntimeOptions::from_env().context("Invalid runtime configuration")?;
    if let Some(path) = cli.settings {
        options.settings_path = path;
    }
    if let Some(secs) = cli.interval {
        anyhow::ensure!(secs > 0, "--interval must be at least 1 second");
        options.scan_interval = Duration::from_secs(secs);
    }

    info!("Starting density scanner...");

    let store = Arc::new(SettingsStore::new(options.settings_path.clone()));
    if let Some(raw) = cli.chat_id.as_deref() {
        let chat_id = store.set_chat_id(raw).context("Failed to store chat id")?;
        info!(chat_id, "Chat id set from CLI");
    }

    let settings = store.load().context("Failed to load settings")?;
    info!(
        path = %store.path().display(),
        targets = settings.targets.len(),
        enabled = settings.alerts_enabled,
        "Settings loaded"
    );
    match settings.chat_id {
        Some(chat_id) => info!(chat_id, "Alerts are addressed to chat"),
        None => warn!("No chat id configured, alerts will only be logged"),
    }

    let registry =
        GatewayRegistry::from_options(&options).context("Failed to build exchange gateways")?;
    info!(exchanges = ?registry.exchanges(), "Exchange gateways ready");
    for target in &settings.targets {
        if !registry.supports(&target.exchange) {
            warn!(
                exchange = %target.exchange,
                symbol = %target.symbol,
                "No gateway for exchange, target will fail every cycle"
            );
        }
    }

    let (sink, mut alerts) = ChannelSink::new(options.alert_queue_capacity);
    let consumer = tokio::spawn(async move {
        while let Some(alert) = alerts.recv().await {
            let message = format_alert(&alert);
            info!(
                exchange = %alert.exchange,
                symbol = %alert.symbol,
                text = %message,
                "Alert ready for delivery"
            );
        }
    });

    let scheduler = Arc::new(ScanScheduler::new(
        Arc::clone(&store),
        registry,
        sink,
        SchedulerOptions::from(&options),
    ));

    let result = run_until_shutdown(Arc::clone(&scheduler), shutdown_signal()).await;
    info!(metrics = ?scheduler.metrics(), "Final scan metrics");

    // Last handle to the sink; closing it ends the consumer.
    drop(scheduler);
    if let Err(e) = consumer.await {
        error!("Alert consumer failed: {}", e);
    }

    result?;
    info!("Density scanner shut down cleanly");
    Ok(())
}

/// Run the scheduler until `shutdown` resolves or the scheduler exits on its
/// own, whichever comes first.
///
/// An early exit is an error even when `run()` returned `Ok`: nothing is
/// scanning any more and the process should not linger.
async fn run_until_shutdown<F>(scheduler: Arc<ScanScheduler>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let mut runner = {
        let scheduler = Arc::clone(&scheduler);
        tokio::spawn(async move { scheduler.run().await })
    };

    tokio::select! {
        _ = shutdown => {
            scheduler.stop();
            runner.await.context("Scanner task panicked")??;
            Ok(())
        }
        joined = &mut runner => {
            match joined {
                Ok(Ok(())) => {
                    error!("Scanner stopped without a shutdown request");
                    anyhow::bail!("scanner stopped unexpectedly")
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Scanner exited with an error");
                    Err(e.into())
                }
                Err(e) => {
                    error!(error = %e, "Scanner task panicked");
                    Err(anyhow::Error::new(e).context("Scanner task panicked"))
                }
            }
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received shutdown signal (Ctrl+C)"),
        _ = terminate => info!("Received shutdown signal (SIGTERM)"),
    }
}
