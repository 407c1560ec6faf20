//! Series Adapter
//!
//! Projects an OHLC series into the point shape a chart representation
//! draws. Switching representation is a pure re-projection of the same
//! bars.

mod update;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::market::Bar;

pub use update::{plan_update, ChartSink, RenderBridge, RenderError, RenderOutcome, SeriesUpdate};

#[cfg(test)]
pub use update::MockChartSink;

// =============================================================================
// Representation
// =============================================================================

/// How a series is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartRepresentation {
    /// Candles with bodies and wicks.
    #[default]
    Candlestick,
    /// OHLC bars.
    Bar,
    /// Close prices joined by a line.
    Line,
    /// Filled line.
    Area,
    /// Line split around a base value.
    Baseline,
    /// Volume columns coloured by direction.
    Histogram,
}

impl ChartRepresentation {
    /// All representations.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Candlestick,
            Self::Bar,
            Self::Line,
            Self::Area,
            Self::Baseline,
            Self::Histogram,
        ]
    }

    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Candlestick => "candlestick",
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Area => "area",
            Self::Baseline => "baseline",
            Self::Histogram => "histogram",
        }
    }

    /// Parse a name, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Self::all().iter().copied().find(|r| r.as_str() == s)
    }
}

impl fmt::Display for ChartRepresentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Points
// =============================================================================

/// Colour hint for histogram columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Close at or above open.
    Up,
    /// Close below open.
    Down,
}

/// Point for candlestick and bar charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OhlcPoint {
    /// Bucket start, epoch seconds.
    pub time: i64,
    /// Open.
    #[serde(with = "rust_decimal::serde::float")]
    pub open: Decimal,
    /// High.
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    /// Low.
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    /// Close.
    #[serde(with = "rust_decimal::serde::float")]
    pub close: Decimal,
    /// Volume.
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
}

/// Point for line, area and baseline charts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValuePoint {
    /// Bucket start, epoch seconds.
    pub time: i64,
    /// Close price.
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

/// Point for volume histograms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramPoint {
    /// Bucket start, epoch seconds.
    pub time: i64,
    /// Volume.
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    /// Whether the bucket closed up or down.
    pub direction: Direction,
}

/// One projected point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SeriesPoint {
    /// Candlestick or bar.
    Ohlc(OhlcPoint),
    /// Line, area or baseline.
    Value(ValuePoint),
    /// Histogram.
    Histogram(HistogramPoint),
}

impl SeriesPoint {
    /// Bucket start, epoch seconds.
    #[must_use]
    pub const fn time(&self) -> i64 {
        match self {
            Self::Ohlc(p) => p.time,
            Self::Value(p) => p.time,
            Self::Histogram(p) => p.time,
        }
    }
}

/// Project one bar.
#[must_use]
pub fn project_bar(bar: &Bar, representation: ChartRepresentation) -> SeriesPoint {
    match representation {
        ChartRepresentation::Candlestick | ChartRepresentation::Bar => {
            SeriesPoint::Ohlc(OhlcPoint {
                time: bar.time,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            })
        }
        ChartRepresentation::Line | ChartRepresentation::Area | ChartRepresentation::Baseline => {
            SeriesPoint::Value(ValuePoint {
                time: bar.time,
                value: bar.close,
            })
        }
        ChartRepresentation::Histogram => SeriesPoint::Histogram(HistogramPoint {
            time: bar.time,
            value: bar.volume,
            direction: if bar.is_up() {
                Direction::Up
            } else {
                Direction::Down
            },
        }),
    }
}

/// Project a series.
#[must_use]
pub fn project(bars: &[Bar], representation: ChartRepresentation) -> Vec<SeriesPoint> {
    bars.iter()
        .map(|bar| project_bar(bar, representation))
        .collect()
}
