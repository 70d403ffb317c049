//! Price Stream Client Binary
//!
//! Connects to a price feed, tracks the configured symbols, and logs every
//! applied batch.
//!
//! # Usage
//!
//! ```bash
//! PRICE_FEED_URL=wss://feed.example.com/ws PRICE_FEED_SYMBOLS=005930,000660 \
//!     cargo run --bin price-stream-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `PRICE_FEED_URL`: Feed WebSocket URL (`ws://` or `wss://`)
//!
//! ## Optional
//! - `PRICE_FEED_SYMBOLS`: Comma-separated symbols to track
//! - `PRICE_FEED_DEBOUNCE_MS`: Subscription debounce (default: 300)
//! - `PRICE_FEED_BATCH_WINDOW_MS`: Update batch window (default: 100)
//! - `PRICE_FEED_AUTO_CONNECT`: Connect on first interest (default: true)
//! - `PRICE_FEED_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 5)
//! - `PRICE_FEED_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use price_stream_client::infrastructure::health::{HealthServer, HealthServerState};
use price_stream_client::{ClientConfig, PriceFeed, PriceSubscription, init_metrics, init_telemetry};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for the feed session to close cleanly.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = init_telemetry().context("failed to initialize telemetry")?;

    tracing::info!("Starting price stream client");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = ClientConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let feed = PriceFeed::new(&config);

    if config.server.health_port != 0 {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            feed.clone(),
        ));
        let health_server =
            HealthServer::new(config.server.health_port, state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = health_server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        });
    }

    let prices = feed.use_desired(config.symbols.clone(), true);
    let reporter = tokio::spawn(report_prices(prices, shutdown_token.clone()));

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, feed.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Feed session did not stop in time"
        );
    }
    if let Err(e) = reporter.await {
        tracing::error!(error = %e, "Price reporter task failed");
    }

    tracing::info!("Price stream client stopped");
    Ok(())
}

/// Log each change of the tracked symbols until shutdown.
async fn report_prices(mut prices: PriceSubscription, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            changed = prices.changed() => {
                if !changed {
                    break;
                }
                let view = prices.view();
                tracing::info!(
                    state = %view.connection_status.state,
                    priced = view.records.len(),
                    tracked = prices.symbols().len(),
                    last_updated_at = ?view.last_updated_at,
                    "Prices updated"
                );
                for record in view.records.values() {
                    tracing::debug!(
                        symbol = %record.symbol,
                        price = %record.price,
                        "Price"
                    );
                }
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        url = %config.url,
        symbols = config.symbols.len(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        debounce_ms = config.sync.debounce.as_millis(),
        batch_window_ms = config.sync.batch_window.as_millis(),
        max_reconnect_attempts = config.websocket.max_reconnect_attempts,
        "Session timing"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
