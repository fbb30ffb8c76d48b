// =============================================================================
// Pullback Scalper - Main Entry Point
// =============================================================================
//
// Connects one multiplexed market-data stream for a symbol, feeds closed
// candles to the pullback strategy and logs the ENTRY / EXIT events it emits.
// Signals only: nothing here places orders.
// =============================================================================

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pullback_scalper::{
    pipeline::Pipeline,
    runtime_config::AppConfig,
    strategy::{PullbackStrategy, StrategyEvent},
    stream::{StreamManager, StreamNotification, WsConnector},
};

const DEFAULT_CONFIG_PATH: &str = "scalper_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Pullback Scalper - Starting Up                   ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path =
        std::env::var("SCALPER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = AppConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    if let Ok(symbol) = std::env::var("SCALPER_SYMBOL") {
        config.symbol = symbol.trim().to_uppercase();
    }
    if let Ok(interval) = std::env::var("SCALPER_INTERVAL") {
        config.interval = interval.trim().to_string();
    }
    config.validate()?;

    let key = config.candle_key();
    let spec = config.stream_spec();
    info!(series = %key, streams = ?spec.names(), "Configured market data");

    // ── 2. Strategy ──────────────────────────────────────────────────────
    let strategy =
        PullbackStrategy::new(config.strategy.clone()).context("failed to build strategy")?;

    // ── 3. Market data stream ────────────────────────────────────────────
    let manager = Arc::new(StreamManager::new(Arc::new(WsConnector)));
    let mut notifications = manager.subscribe();

    let monitor = Arc::clone(&manager);
    tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(StreamNotification::Connected { key }) => {
                    info!(key = %key, active = monitor.active_count(), "stream connected")
                }
                Ok(StreamNotification::Disconnected { key, code, reason }) => {
                    let status = monitor.status().remove(&key).unwrap_or_default();
                    warn!(
                        key = %key,
                        code,
                        reason = %reason,
                        reconnect_attempts = status.reconnect_attempts,
                        "stream disconnected"
                    )
                }
                Ok(StreamNotification::Error { key, error }) => {
                    warn!(key = %key, error = %error, "stream error")
                }
                Ok(StreamNotification::Abandoned { key, attempts }) => {
                    error!(
                        key = %key,
                        attempts,
                        active = monitor.active_count(),
                        "stream abandoned after reconnect attempts"
                    )
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification receiver lagged")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let handle = manager
        .connect(key.to_string(), &spec, config.stream.clone(), None)
        .context("failed to start market data stream")?;

    // ── 4. Pipeline + event log ──────────────────────────────────────────
    let (event_tx, mut event_rx) = mpsc::channel::<StrategyEvent>(config.event_channel_capacity);
    let pipeline_task = tokio::spawn(Pipeline::new(key.clone(), strategy, event_tx).run(handle.events));

    let log_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => info!(event = %json, "strategy event"),
                Err(e) => error!(error = %e, "failed to serialise strategy event"),
            }
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received - stopping gracefully");

    let closed = manager.close_all().await;
    info!(closed, still_registered = manager.is_registered(&key.to_string()), "streams closed");

    match pipeline_task.await {
        Ok(stats) => info!(
            applied = stats.candles_applied,
            rejected = stats.candles_rejected,
            emitted = stats.events_emitted,
            trades = stats.trades,
            liquidations = stats.liquidations,
            "pipeline finished"
        ),
        Err(e) => error!(error = %e, "pipeline task failed"),
    }
    if let Err(e) = log_task.await {
        error!(error = %e, "event log task failed");
    }

    if let Err(e) = config.save(&config_path) {
        error!(error = %e, "Failed to save config on shutdown");
    }

    info!("Pullback Scalper shut down complete.");
    Ok(())
}
