//! Prometheus Metrics Module
//!
//! Exposes engine metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: Decoded events by kind, decode failures
//! - **Connections**: Per-channel connection status, reconnect attempts
//! - **Store**: Bar merge outcomes, trade outcomes, tracked symbols
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::bars::{BarMergeOutcome, TradeOutcome};
use crate::domain::market::DataChannel;
use crate::domain::streaming::EventKind;
use crate::infrastructure::feed::ConnectionStatus;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Repeated calls return the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "chart_stream_frames_received_total",
        "Events decoded from feed frames, by kind"
    );
    describe_counter!(
        "chart_stream_decode_errors_total",
        "Feed frames that failed to decode"
    );

    describe_gauge!(
        "chart_stream_connection_status",
        "Connection status per channel (0 disconnected, 1 connecting, 2 open, 3 closing)"
    );
    describe_counter!(
        "chart_stream_reconnects_total",
        "Scheduled reconnect attempts"
    );

    describe_counter!(
        "chart_stream_bar_merges_total",
        "Bar events merged into the store, by outcome"
    );
    describe_counter!(
        "chart_stream_trades_total",
        "Trades applied to the store, by outcome"
    );
    describe_gauge!(
        "chart_stream_tracked_symbols",
        "Symbols with a live series"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn status_value(status: ConnectionStatus) -> f64 {
    match status {
        ConnectionStatus::Disconnected => 0.0,
        ConnectionStatus::Connecting => 1.0,
        ConnectionStatus::Open => 2.0,
        ConnectionStatus::Closing => 3.0,
    }
}

/// Record an event decoded from a feed frame.
pub fn record_frame_received(channel: DataChannel, kind: EventKind) {
    counter!(
        "chart_stream_frames_received_total",
        "channel" => channel.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a frame that failed to decode.
pub fn record_decode_error(channel: DataChannel, reason: &'static str) {
    counter!(
        "chart_stream_decode_errors_total",
        "channel" => channel.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Update the connection status gauge for a channel.
pub fn set_connection_status(channel: DataChannel, status: ConnectionStatus) {
    gauge!(
        "chart_stream_connection_status",
        "channel" => channel.as_str()
    )
    .set(status_value(status));
}

/// Record a scheduled reconnect attempt.
pub fn record_reconnect_attempt(channel: DataChannel) {
    counter!(
        "chart_stream_reconnects_total",
        "channel" => channel.as_str()
    )
    .increment(1);
}

/// Record the outcome of a bar merge.
pub fn record_bar_merge(channel: DataChannel, outcome: BarMergeOutcome) {
    counter!(
        "chart_stream_bar_merges_total",
        "channel" => channel.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record the outcome of a trade.
pub fn record_trade(channel: DataChannel, outcome: TradeOutcome) {
    counter!(
        "chart_stream_trades_total",
        "channel" => channel.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Update the tracked symbol gauge for a channel.
#[allow(clippy::cast_precision_loss)]
pub fn set_tracked_symbols(channel: DataChannel, count: usize) {
    gauge!(
        "chart_stream_tracked_symbols",
        "channel" => channel.as_str()
    )
    .set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_values_are_distinct() {
        let values: Vec<f64> = [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Open,
            ConnectionStatus::Closing,
        ]
        .into_iter()
        .map(status_value)
        .collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_frame_received(DataChannel::Crypto, EventKind::Bar);
        record_decode_error(DataChannel::Crypto, "json");
        set_connection_status(DataChannel::Stocks, ConnectionStatus::Open);
        record_reconnect_attempt(DataChannel::Stocks);
        set_tracked_symbols(DataChannel::Etfs, 3);
    }
}
