//! Chart Stream Binary
//!
//! Connects the configured channels, subscribes the configured symbols and
//! serves health, metrics and series reads over HTTP.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin chart-stream
//! ```
//!
//! # Environment Variables
//!
//! - `CHART_STREAM_HOST`: Feed host (default: localhost:8000)
//! - `CHART_STREAM_SCHEME`: ws | wss (default: ws)
//! - `CHART_STREAM_CHANNELS`: Comma separated channels (default: crypto,stocks)
//! - `CHART_STREAM_SYMBOLS_<CHANNEL>`: Startup symbols, e.g. `CHART_STREAM_SYMBOLS_CRYPTO=BTC/USD`
//! - `CHART_STREAM_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chart_stream::infrastructure::health::{HealthServer, HealthServerState};
use chart_stream::infrastructure::telemetry;
use chart_stream::{EngineRegistry, StreamConfig, WebSocketTransport, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Upper bound on closing every channel at shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("rustls crypto provider already installed"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting chart stream");

    let _metrics_handle = init_metrics().context("failed to install Prometheus recorder")?;

    let config = StreamConfig::from_env().context("invalid chart stream configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let registry = Arc::new(EngineRegistry::new(
        config.clone(),
        Arc::new(WebSocketTransport::new()),
    ));

    for &channel in &config.channels {
        let engine = registry.engine(channel);
        let symbols = config.symbols_for(channel);
        if !symbols.is_empty() {
            engine.subscribe(symbols);
        }
        engine.connect();
        tracing::info!(
            channel = %channel,
            upstream = %channel.upstream(),
            symbols = symbols.len(),
            "Channel started"
        );
    }

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&registry),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Chart stream ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, registry.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Channels did not close in time"
        );
    }
    if let Err(e) = health_task.await {
        tracing::warn!(error = %e, "Health server task failed");
    }

    tracing::info!("Chart stream stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    let channels: Vec<&str> = config.channels.iter().map(|c| c.as_str()).collect();
    tracing::info!(
        host = %config.host,
        channels = ?channels,
        max_bars = config.store.max_bars,
        late_data = ?config.store.late_data,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    for &channel in &config.channels {
        tracing::debug!(channel = %channel, url = %config.channel_url(channel), "Feed endpoint");
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
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
