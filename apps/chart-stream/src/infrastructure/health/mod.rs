//! Health, Metrics and Series Endpoint
//!
//! HTTP endpoint for health checks, Prometheus metrics and read-only views of
//! the engines' series and prices.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status per channel
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (at least one channel open)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /prices` - Latest prices for every channel
//! - `GET /prices/{channel}/{symbol}` - Latest price for one symbol
//! - `GET /series/{channel}/{symbol}?timeframe=5m&chart=line` - Chart series

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{EngineRegistry, LatestPrice, MarketDataEngine};
use crate::domain::chart::{ChartRepresentation, SeriesPoint};
use crate::domain::market::DataChannel;
use crate::domain::timeframe::Timeframe;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Per-channel status, in channel order.
    pub channels: Vec<ChannelInfo>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every channel open.
    Healthy,
    /// Some channels open.
    Degraded,
    /// No channel open.
    Unhealthy,
}

/// Status of one channel's engine.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    /// Channel name.
    pub channel: DataChannel,
    /// Connection status.
    pub state: &'static str,
    /// Whether the socket is open.
    pub connected: bool,
    /// Symbols in the subscription registry.
    pub subscribed_symbols: Vec<String>,
    /// Symbols with a live series.
    pub tracked_symbols: Vec<String>,
    /// Reconnect attempts since the last open.
    pub reconnect_attempt: u32,
    /// Registered listeners.
    pub listeners: usize,
}

/// Chart series response.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesResponse {
    /// Channel name.
    pub channel: DataChannel,
    /// Requested symbol.
    pub symbol: String,
    /// Bucket width.
    pub timeframe: Timeframe,
    /// Chart representation.
    pub chart: ChartRepresentation,
    /// Projected points, oldest first.
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Deserialize)]
struct SeriesQuery {
    timeframe: Option<String>,
    chart: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    registry: Arc<EngineRegistry>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, registry: Arc<EngineRegistry>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            registry,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Build the HTTP router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/prices", get(prices_handler))
        .route("/prices/{channel}/{symbol}", get(price_handler))
        .route("/series/{channel}/{symbol}", get(series_handler))
        .with_state(state)
}

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let is_ready = state.registry.engines().iter().any(|e| e.is_connected());

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

async fn prices_handler(
    State(state): State<Arc<HealthServerState>>,
) -> Json<BTreeMap<DataChannel, Vec<LatestPrice>>> {
    Json(
        state
            .registry
            .engines()
            .iter()
            .map(|engine| (engine.channel(), engine.latest_prices()))
            .collect(),
    )
}

async fn price_handler(
    State(state): State<Arc<HealthServerState>>,
    Path((channel, symbol)): Path<(String, String)>,
) -> Response {
    let engine = match lookup_engine(&state, &channel) {
        Ok(engine) => engine,
        Err(response) => return response,
    };
    engine.latest_price(&symbol).map_or_else(
        || error_response(StatusCode::NOT_FOUND, format!("no price for {symbol}")),
        |price| Json(price).into_response(),
    )
}

async fn series_handler(
    State(state): State<Arc<HealthServerState>>,
    Path((channel, symbol)): Path<(String, String)>,
    Query(query): Query<SeriesQuery>,
) -> Response {
    let engine = match lookup_engine(&state, &channel) {
        Ok(engine) => engine,
        Err(response) => return response,
    };

    let timeframe = match query.timeframe.as_deref() {
        None => Timeframe::default(),
        Some(label) => match Timeframe::from_label(label) {
            Some(timeframe) => timeframe,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unknown timeframe: {label}"),
                );
            }
        },
    };

    let chart = match query.chart.as_deref() {
        None => ChartRepresentation::default(),
        Some(name) => match ChartRepresentation::from_str_case_insensitive(name) {
            Some(chart) => chart,
            None => {
                return error_response(StatusCode::BAD_REQUEST, format!("unknown chart: {name}"));
            }
        },
    };

    let points = engine.get_series(&symbol, timeframe, chart);
    Json(SeriesResponse {
        channel: engine.channel(),
        symbol,
        timeframe,
        chart,
        points,
    })
    .into_response()
}

fn lookup_engine(
    state: &HealthServerState,
    channel: &str,
) -> Result<Arc<MarketDataEngine>, Response> {
    let Some(channel) = DataChannel::from_str_case_insensitive(channel) else {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            format!("unknown channel: {channel}"),
        ));
    };
    state.registry.get(channel).ok_or_else(|| {
        error_response(
            StatusCode::NOT_FOUND,
            format!("channel not running: {channel}"),
        )
    })
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let channels: Vec<ChannelInfo> = state
        .registry
        .engines()
        .iter()
        .map(|engine| channel_info(engine))
        .collect();

    HealthResponse {
        status: determine_health_status(&channels),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        channels,
    }
}

fn channel_info(engine: &MarketDataEngine) -> ChannelInfo {
    let connection = engine.connection_state();
    ChannelInfo {
        channel: engine.channel(),
        state: connection.status.as_str(),
        connected: engine.is_connected(),
        subscribed_symbols: connection.subscribed_symbols,
        tracked_symbols: engine.tracked_symbols(),
        reconnect_attempt: connection.reconnect_attempt,
        listeners: engine.listener_count(),
    }
}

fn determine_health_status(channels: &[ChannelInfo]) -> HealthStatus {
    let connected = channels.iter().filter(|c| c.connected).count();

    match connected {
        0 => HealthStatus::Unhealthy,
        n if n == channels.len() => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::ports::{Transport, TransportError, TransportSession};
    use crate::domain::streaming::FeedEvent;
    use crate::domain::test_support::{flat_bar, ohlc_bar};
    use crate::infrastructure::config::StreamConfig;

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn open(&self, _url: &str) -> Result<TransportSession, TransportError> {
            Err(TransportError::StreamEnded)
        }
    }

    fn state() -> Arc<HealthServerState> {
        let registry = Arc::new(EngineRegistry::new(
            StreamConfig::default(),
            Arc::new(RefusingTransport),
        ));
        let crypto = registry.engine(DataChannel::Crypto);
        crypto.subscribe(&["BTC/USD"]);
        crypto.ingest(FeedEvent::Bar(ohlc_bar("BTC/USD", 0, ["100", "110", "95", "105", "2"])));
        crypto.ingest(FeedEvent::Bar(flat_bar("BTC/USD", 60, "107", "1")));
        Arc::new(HealthServerState::new("0.1.0".to_string(), registry))
    }

    async fn get_json(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn info(connected: bool) -> ChannelInfo {
        ChannelInfo {
            channel: DataChannel::Crypto,
            state: if connected { "open" } else { "disconnected" },
            connected,
            subscribed_symbols: Vec::new(),
            tracked_symbols: Vec::new(),
            reconnect_attempt: 0,
            listeners: 0,
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status() {
        assert_eq!(
            determine_health_status(&[info(true), info(true)]),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(&[info(true), info(false)]),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(&[info(false)]),
            HealthStatus::Unhealthy
        );
        assert_eq!(determine_health_status(&[]), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn health_reports_channels() {
        let (status, body) = get_json("/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["channels"][0]["channel"], "crypto");
        assert_eq!(body["channels"][0]["state"], "disconnected");
        assert_eq!(body["channels"][0]["subscribed_symbols"][0], "BTC/USD");
    }

    #[tokio::test]
    async fn readiness_requires_an_open_channel() {
        let response = router(state())
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn series_is_resampled_and_projected() {
        let (status, body) = get_json("/series/crypto/BTC?timeframe=5m&chart=line").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["timeframe"], "5m");
        assert_eq!(body["chart"], "line");
        assert_eq!(body["points"].as_array().unwrap().len(), 1);
        assert_eq!(body["points"][0]["time"], 0);
        assert_eq!(body["points"][0]["value"].as_f64(), Some(107.0));
    }

    #[tokio::test]
    async fn series_defaults_to_one_minute_candles() {
        let (status, body) = get_json("/series/crypto/BTCUSD").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["points"].as_array().unwrap().len(), 2);
        assert_eq!(body["points"][0]["high"].as_f64(), Some(110.0));
    }

    #[tokio::test]
    async fn series_rejects_unknown_timeframe() {
        let (status, body) = get_json("/series/crypto/BTC?timeframe=7m").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown timeframe: 7m");
    }

    #[tokio::test]
    async fn unknown_or_idle_channel_is_not_found() {
        let (status, _) = get_json("/series/forex/EURUSD").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get_json("/prices/stocks/AAPL").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn prices_by_channel_and_symbol() {
        let (status, body) = get_json("/prices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["crypto"][0]["symbol"], "BTC/USD");

        let (status, body) = get_json("/prices/crypto/btc").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["timestamp_ms"], 60_000);
    }
}
