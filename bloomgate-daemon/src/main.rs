//! bloomgate-daemon entry point.
//!
//! Parses CLI arguments, loads and validates configuration, sets up
//! logging and metrics, then hands control to the bridge supervisor
//! until a shutdown signal arrives.

use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use bloomgate_core::config::BloomgateConfig;
use bloomgate_core::metrics as m;

use bloomgate_daemon::cli::DaemonCli;
use bloomgate_daemon::supervisor::Supervisor;
use bloomgate_daemon::{logging, metrics_server};

#[tokio::main]
async fn main() -> Result<()> {
    let args = DaemonCli::parse();

    let mut config = BloomgateConfig::load(&args.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", args.config.display(), e))?;

    // CLI overrides take precedence over file and environment
    if let Some(level) = args.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = args.log_format {
        config.general.log_format = format;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if args.validate {
        println!("configuration OK: {}", args.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "bloomgate-daemon starting"
    );

    let start_time = Instant::now();
    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
        metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    }

    let shutdown = CancellationToken::new();

    // Translate SIGTERM/SIGINT into cancellation
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => tracing::info!(signal, "shutdown signal received"),
                Err(e) => tracing::error!(error = %e, "failed to wait for shutdown signal"),
            }
            shutdown.cancel();
        }
    });

    let mut uptime_task = if config.metrics.enabled {
        Some(spawn_uptime_updater(start_time, shutdown.clone()))
    } else {
        None
    };

    let mut supervisor = Supervisor::new(config, shutdown.clone());
    let result = supervisor.run().await;

    shutdown.cancel();
    if let Some(task) = uptime_task.take() {
        let _ = task.await;
    }

    match &result {
        Ok(()) => tracing::info!("bloomgate-daemon shut down"),
        Err(e) => tracing::error!(error = %e, "bloomgate-daemon exiting with error"),
    }
    result
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Spawn a background task that periodically updates the uptime metric.
///
/// Updates every 10 seconds to keep the metric fresh for Prometheus scrapes.
fn spawn_uptime_updater(
    start_time: Instant,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
