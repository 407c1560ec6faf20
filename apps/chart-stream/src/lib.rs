#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_possible_wrap
    )
)]

//! Chart Stream - Live OHLC Aggregation Engine
//!
//! Keeps one socket per market-data channel, folds bar and trade events into
//! bounded per-symbol series, and derives chart-ready views at any timeframe
//! on read.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Market types and pure rules
//!   - `market`: Bars, trades, quotes, channels, symbol matching
//!   - `bars`: Bounded series and the merge algorithm
//!   - `timeframe`: Bucket widths and the resampler
//!   - `chart`: Chart projections and incremental render updates
//!
//! - **Application**: Ports and the engine facade
//!   - `ports`: Transport and event sink interfaces
//!   - `services`: Per-channel engine, engine registry, price cache
//!
//! - **Infrastructure**: Adapters and process plumbing
//!   - `feed`: WebSocket transport, codec, reconnecting connection
//!   - `dispatch`: Listener fan-out and broadcast bus
//!   - `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! socket ─▶ codec ─▶ BarStore merge ─▶ Dispatcher ─▶ listeners / bus
//!                        │
//!                        └─(on read)─▶ resample ─▶ project ─▶ consumer
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market types and pure aggregation rules.
pub mod domain;

/// Application layer - Ports and the engine facade.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::bars::{BarMergeOutcome, BarStore, LateDataPolicy, MergePolicy, TradeOutcome};
pub use domain::chart::{
    ChartRepresentation, ChartSink, RenderBridge, RenderError, RenderOutcome, SeriesPoint,
    SeriesUpdate,
};
pub use domain::market::{Bar, DataChannel, Quote, Symbol, Trade};
pub use domain::streaming::{FeedError, FeedErrorKind, FeedEvent};
pub use domain::timeframe::Timeframe;

// Application
pub use application::ports::{EventSink, Transport, TransportError, TransportSession};
pub use application::services::{EngineConfig, EngineRegistry, LatestPrice, MarketDataEngine};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedSettings, ServerSettings, StoreSettings, StreamConfig,
};

// Feed
pub use infrastructure::dispatch::ListenerId;
pub use infrastructure::feed::{ConnectionState, ConnectionStatus, WebSocketTransport};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
