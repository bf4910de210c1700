//! Meterwatch - energy reading monitor
//!
//! Reads newline-delimited JSON readings from stdin, classifies them, raises
//! and resolves device alerts, and serves health and metrics endpoints.

use anyhow::{Context, Result};
use meterwatch::{config::MonitorConfig, feed, Monitor, VERSION};
use tokio::io::BufReader;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting meterwatch");

    let config = MonitorConfig::load().context("invalid monitor configuration")?;
    info!(
        node_name = %config.node_name,
        api_port = config.api_port,
        sweep_interval_secs = config.sweep_interval_secs,
        "Monitor configured"
    );

    let monitor = Monitor::build(config).await?;
    monitor.logger.log_startup(
        VERSION,
        monitor.config.tolerance_percentage,
        monitor.config.consecutive_quarantine_threshold,
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let notification_log = tokio::spawn(feed::log_notifications(monitor.hub.subscribe()));
    let sweep_handle = tokio::spawn(monitor.sweep_loop().run(shutdown_tx.subscribe()));
    let api_handle = tokio::spawn(meterwatch::api::serve(
        monitor.config.api_port,
        monitor.app_state(),
        shutdown_tx.subscribe(),
    ));

    monitor.health.set_ready(true).await;

    let stdin = BufReader::new(tokio::io::stdin());
    let reading_feed = monitor.feed();
    let reason = tokio::select! {
        result = reading_feed.run(stdin) => {
            match result {
                Ok(summary) => info!(lines = summary.lines, "Reading feed closed"),
                Err(e) => warn!(error = %e, "Reading feed failed"),
            }
            // keep sweeping and serving probes after the feed ends
            tokio::signal::ctrl_c().await?;
            "SIGINT received"
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            "SIGINT received"
        }
    };

    monitor.logger.log_shutdown(reason);
    monitor.health.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Err(e) = sweep_handle.await {
        warn!(error = %e, "Sweep task ended abnormally");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server failed"),
        Err(e) => warn!(error = %e, "API task ended abnormally"),
        Ok(Ok(())) => {}
    }
    notification_log.abort();

    info!("Shutting down");
    Ok(())
}
