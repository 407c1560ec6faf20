//! Market Data Types
//!
//! Canonical in-memory representation of the bars, trades and quotes that
//! arrive on a data channel. These types are codec-agnostic; the wire format
//! lives in `infrastructure::feed::messages`.

pub mod symbol;
pub mod timestamp;

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use symbol::{normalize_symbol, symbols_match};
pub use timestamp::{now_millis, now_secs, resolve_epoch_millis};

/// A symbol string as supplied by a consumer or by the feed.
pub type Symbol = String;

// =============================================================================
// Data Channel
// =============================================================================

/// Logical market-data channel. Each channel runs its own connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataChannel {
    /// Crypto pairs.
    Crypto,
    /// US equities.
    Stocks,
    /// Options (served from the stock feed upstream).
    Options,
    /// Exchange traded funds (served from the stock feed upstream).
    Etfs,
}

impl DataChannel {
    /// All channels in declaration order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Crypto, Self::Stocks, Self::Options, Self::Etfs]
    }

    /// Channel name as used in stream paths.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Stocks => "stocks",
            Self::Options => "options",
            Self::Etfs => "etfs",
        }
    }

    /// Parse a channel name, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "crypto" => Some(Self::Crypto),
            "stocks" | "stock" => Some(Self::Stocks),
            "options" | "option" => Some(Self::Options),
            "etfs" | "etf" => Some(Self::Etfs),
            _ => None,
        }
    }

    /// The upstream feed that actually carries this channel's data.
    ///
    /// ETFs and options are served from the stock stream.
    #[must_use]
    pub const fn upstream(&self) -> Self {
        match self {
            Self::Crypto => Self::Crypto,
            Self::Stocks | Self::Options | Self::Etfs => Self::Stocks,
        }
    }

    /// Stream path for this channel, relative to the host.
    #[must_use]
    pub fn stream_path(&self) -> String {
        format!("/ws/alpaca/{}", self.as_str())
    }
}

impl fmt::Display for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Bar
// =============================================================================

/// Errors raised when a bar violates the OHLCV invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BarError {
    /// `low ≤ min(open, close) ≤ max(open, close) ≤ high` does not hold.
    #[error("inconsistent range for {symbol}: o={open} h={high} l={low} c={close}")]
    InconsistentRange {
        /// Offending symbol.
        symbol: Symbol,
        /// Open price.
        open: Decimal,
        /// High price.
        high: Decimal,
        /// Low price.
        low: Decimal,
        /// Close price.
        close: Decimal,
    },

    /// Volume below zero.
    #[error("negative volume {volume} for {symbol}")]
    NegativeVolume {
        /// Offending symbol.
        symbol: Symbol,
        /// Reported volume.
        volume: Decimal,
    },
}

/// An OHLCV aggregate for one time bucket of one symbol.
///
/// `time` is the left edge of the bucket, in seconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Symbol as reported by the feed.
    pub symbol: Symbol,
    /// Bucket start, epoch seconds.
    pub time: i64,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    pub volume: Decimal,
}

impl Bar {
    /// Build a bar, checking the OHLCV invariants.
    ///
    /// # Errors
    ///
    /// Returns `BarError` if the price range is inconsistent or the volume
    /// is negative.
    pub fn new(
        symbol: impl Into<Symbol>,
        time: i64,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, BarError> {
        let bar = Self {
            symbol: symbol.into(),
            time,
            open,
            high,
            low,
            close,
            volume,
        };
        bar.validate()?;
        Ok(bar)
    }

    /// Check the OHLCV invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), BarError> {
        let body_low = self.open.min(self.close);
        let body_high = self.open.max(self.close);
        if self.low > body_low || body_high > self.high {
            return Err(BarError::InconsistentRange {
                symbol: self.symbol.clone(),
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        if self.volume.is_sign_negative() && !self.volume.is_zero() {
            return Err(BarError::NegativeVolume {
                symbol: self.symbol.clone(),
                volume: self.volume,
            });
        }
        Ok(())
    }

    /// Fold one execution into this bar.
    pub fn refine(&mut self, price: Decimal, size: Decimal) {
        self.close = price;
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.volume += size.max(Decimal::ZERO);
    }

    /// Whether the bar closed at or above its open.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.close >= self.open
    }
}

// =============================================================================
// Trade / Quote
// =============================================================================

/// A single execution. Refines the open bar; never stored on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Symbol as reported by the feed.
    pub symbol: Symbol,
    /// Execution time, epoch milliseconds.
    pub timestamp_ms: i64,
    /// Execution price.
    pub price: Decimal,
    /// Execution size.
    pub size: Decimal,
}

impl Trade {
    /// Execution time in whole seconds.
    #[must_use]
    pub const fn time_secs(&self) -> i64 {
        self.timestamp_ms.div_euclid(1000)
    }
}

/// Top of book for a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol as reported by the feed.
    pub symbol: Symbol,
    /// Quote time, epoch milliseconds.
    pub timestamp_ms: i64,
    /// Best bid.
    pub bid_price: Decimal,
    /// Size at the best bid.
    pub bid_size: Decimal,
    /// Best ask.
    pub ask_price: Decimal,
    /// Size at the best ask.
    pub ask_size: Decimal,
}

impl Quote {
    /// Midpoint of bid and ask, or whichever side is present.
    #[must_use]
    pub fn midpoint(&self) -> Option<Decimal> {
        match (self.bid_price.is_zero(), self.ask_price.is_zero()) {
            (false, false) => Some((self.bid_price + self.ask_price) / Decimal::TWO),
            (false, true) => Some(self.bid_price),
            (true, false) => Some(self.ask_price),
            (true, true) => None,
        }
    }
}
