//! Feed Wire Messages
//!
//! JSON shapes exchanged with the market-data socket.
//!
//! # Client → Server
//! ```json
//! {"action": "subscribe", "symbols": ["BTC/USD", "ETH/USD"]}
//! {"action": "unsubscribe", "symbols": ["ETH/USD"]}
//! ```
//!
//! # Server → Client
//! ```json
//! {"type": "connected", "message": "Connected to crypto stream"}
//! {"type": "subscribed", "symbols": ["BTC/USD"]}
//! {"type": "bar", "data": {"symbol": "BTC/USD", "timestamp": 1700000000, "open": 1, ...}}
//! {"type": "trade", "data": {"symbol": "BTC/USD", "timestamp": 1700000000123, "price": 1, "size": 0.5}}
//! {"type": "quote", "data": {"symbol": "AAPL", "timestamp": "2024-01-02T15:04:05Z", ...}}
//! {"type": "error", "message": "unknown symbol"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Client Control Frames
// =============================================================================

/// Control action sent to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Start streaming symbols.
    Subscribe,
    /// Stop streaming symbols.
    Unsubscribe,
}

/// A subscribe or unsubscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// Requested action.
    pub action: ControlAction,
    /// Symbols affected.
    pub symbols: Vec<String>,
}

impl ControlFrame {
    /// Subscribe request.
    #[must_use]
    pub fn subscribe(symbols: Vec<String>) -> Self {
        Self {
            action: ControlAction::Subscribe,
            symbols,
        }
    }

    /// Unsubscribe request.
    #[must_use]
    pub fn unsubscribe(symbols: Vec<String>) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            symbols,
        }
    }
}

// =============================================================================
// Server Frames
// =============================================================================

/// Frame types the decoder understands.
pub const KNOWN_FRAME_TYPES: [&str; 6] = ["connected", "subscribed", "bar", "trade", "quote", "error"];

/// A frame sent by the server, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerFrame {
    /// Greeting after the socket opens.
    Connected {
        /// Greeting text.
        #[serde(default)]
        message: String,
    },
    /// Subscription acknowledgement.
    Subscribed {
        /// Symbols now streaming.
        #[serde(default)]
        symbols: Vec<String>,
    },
    /// OHLCV bar.
    Bar {
        /// Bar payload.
        data: BarPayload,
    },
    /// Single execution.
    Trade {
        /// Trade payload.
        data: TradePayload,
    },
    /// Top of book.
    Quote {
        /// Quote payload.
        data: QuotePayload,
    },
    /// Server-side error.
    Error {
        /// Error text.
        #[serde(default, alias = "msg")]
        message: String,
    },
}

/// Wire bar.
///
/// `timestamp` may be seconds or milliseconds, a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BarPayload {
    /// Symbol.
    pub symbol: String,
    /// Bucket time.
    #[serde(default, alias = "time", alias = "t")]
    pub timestamp: Option<serde_json::Value>,
    /// Open.
    pub open: Decimal,
    /// High.
    pub high: Decimal,
    /// Low.
    pub low: Decimal,
    /// Close.
    pub close: Decimal,
    /// Volume, zero when absent.
    #[serde(default)]
    pub volume: Decimal,
}

/// Wire trade.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TradePayload {
    /// Symbol.
    pub symbol: String,
    /// Execution time.
    #[serde(default, alias = "time", alias = "t")]
    pub timestamp: Option<serde_json::Value>,
    /// Price.
    pub price: Decimal,
    /// Size, zero when absent.
    #[serde(default)]
    pub size: Decimal,
}

/// Wire quote.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuotePayload {
    /// Symbol.
    pub symbol: String,
    /// Quote time.
    #[serde(default, alias = "time", alias = "t")]
    pub timestamp: Option<serde_json::Value>,
    /// Best bid.
    #[serde(default)]
    pub bid_price: Decimal,
    /// Bid size.
    #[serde(default)]
    pub bid_size: Decimal,
    /// Best ask.
    #[serde(default)]
    pub ask_price: Decimal,
    /// Ask size.
    #[serde(default)]
    pub ask_size: Decimal,
}
