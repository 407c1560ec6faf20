//! Domain Layer - Market data types and aggregation logic.
//!
//! Everything here is synchronous and free of I/O. The merge, resample and
//! projection rules live in this layer so they can be tested without a
//! socket or a runtime.

/// Bars, trades, quotes, channels and symbol/timestamp helpers.
pub mod market;

/// Typed events produced by the feed decoder.
pub mod streaming;

/// Symbol set replayed on every reconnect.
pub mod subscription;

/// Per-symbol bounded bar buffers and the merge algorithm.
pub mod bars;

/// Timeframes and the resampler.
pub mod timeframe;

/// Chart representations, series projection and incremental render updates.
pub mod chart;
