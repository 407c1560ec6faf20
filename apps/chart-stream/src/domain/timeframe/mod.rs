//! Timeframes
//!
//! Bucket widths a consumer can view the base series at.

mod resample;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use resample::{resample, resample_width};

/// Bucket width for a resampled series.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Timeframe {
    /// One minute.
    #[default]
    #[serde(rename = "1m")]
    M1,
    /// Five minutes.
    #[serde(rename = "5m")]
    M5,
    /// Ten minutes.
    #[serde(rename = "10m")]
    M10,
    /// Fifteen minutes.
    #[serde(rename = "15m")]
    M15,
    /// Thirty minutes.
    #[serde(rename = "30m")]
    M30,
    /// One hour.
    #[serde(rename = "1h")]
    H1,
    /// Four hours.
    #[serde(rename = "4h")]
    H4,
    /// One day.
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All timeframes, narrowest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::M1,
            Self::M5,
            Self::M10,
            Self::M15,
            Self::M30,
            Self::H1,
            Self::H4,
            Self::D1,
        ]
    }

    /// Bucket width in seconds.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        match self {
            Self::M1 => 60,
            Self::M5 => 300,
            Self::M10 => 600,
            Self::M15 => 900,
            Self::M30 => 1800,
            Self::H1 => 3600,
            Self::H4 => 14_400,
            Self::D1 => 86_400,
        }
    }

    /// Short label (`1m`, `4h`, ...).
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M5 => "5m",
            Self::M10 => "10m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H4 => "4h",
            Self::D1 => "1d",
        }
    }

    /// Timeframe with exactly this width.
    #[must_use]
    pub fn from_secs(secs: i64) -> Option<Self> {
        Self::all().iter().copied().find(|tf| tf.as_secs() == secs)
    }

    /// Parse a label (`5m`, `1H`) or a width in seconds (`300`).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        if let Ok(secs) = label.parse::<i64>() {
            return Self::from_secs(secs);
        }
        Self::all().iter().copied().find(|tf| tf.label() == label)
    }

    /// Left edge of the bucket containing `time`. Floors negative times too.
    #[must_use]
    pub const fn bucket_start(&self, time: i64) -> i64 {
        bucket_start(time, self.as_secs())
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Left edge of the `width`-second bucket containing `time`.
#[must_use]
pub const fn bucket_start(time: i64, width: i64) -> i64 {
    time.div_euclid(width) * width
}
