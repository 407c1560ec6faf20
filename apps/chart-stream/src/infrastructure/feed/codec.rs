//! Feed Codec
//!
//! Turns inbound text frames into [`FeedEvent`]s and control frames into
//! text. The server normally sends one JSON object per frame; a JSON array
//! of objects is accepted as a batch, decoded entry by entry.

use chrono::DateTime;

use super::messages::{
    BarPayload, ControlFrame, QuotePayload, ServerFrame, TradePayload, KNOWN_FRAME_TYPES,
};
use crate::domain::market::{resolve_epoch_millis, Bar, BarError, Quote, Trade};
use crate::domain::streaming::{FeedError, FeedEvent};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// The `type` field names no known frame.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// The frame has no `type` field.
    #[error("message has no type field")]
    MissingType,

    /// Not a JSON object or array.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    /// A bar violates the OHLCV invariants.
    #[error("invalid bar: {0}")]
    InvalidBar(#[from] BarError),

    /// A market-data payload has a blank symbol.
    #[error("empty symbol in {0} payload")]
    EmptySymbol(&'static str),
}

impl CodecError {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::UnknownMessageType(_) => "unknown_type",
            Self::MissingType => "missing_type",
            Self::InvalidFormat(_) => "invalid_format",
            Self::InvalidBar(_) => "invalid_bar",
            Self::EmptySymbol(_) => "empty_symbol",
        }
    }
}

/// Events decoded from one text frame.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// Entries that decoded, in frame order.
    pub events: Vec<FeedEvent>,
    /// Batch entries that did not. A bad entry never sinks its neighbours.
    pub rejected: Vec<CodecError>,
}

/// JSON codec for the market-data socket.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON, or if a single-object frame
    /// names an unknown type or carries an invalid payload. Bad entries of a
    /// batch are reported in [`DecodedFrame::rejected`] instead.
    pub fn decode(&self, text: &str) -> Result<DecodedFrame, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let values: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
            let mut decoded = DecodedFrame::default();
            for value in values {
                match self.decode_value(value) {
                    Ok(event) => decoded.events.push(event),
                    Err(e) => decoded.rejected.push(e),
                }
            }
            Ok(decoded)
        } else if trimmed.starts_with('{') {
            let value: serde_json::Value = serde_json::from_str(trimmed)?;
            Ok(DecodedFrame {
                events: vec![self.decode_value(value)?],
                rejected: Vec::new(),
            })
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFormat(format!(
                "expected JSON object or array, got: {preview}..."
            )))
        }
    }

    /// Encode a control frame.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode_control(&self, frame: &ControlFrame) -> Result<String, CodecError> {
        Ok(serde_json::to_string(frame)?)
    }

    fn decode_value(&self, value: serde_json::Value) -> Result<FeedEvent, CodecError> {
        let frame_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(CodecError::MissingType)?;
        if !KNOWN_FRAME_TYPES.contains(&frame_type) {
            return Err(CodecError::UnknownMessageType(frame_type.to_string()));
        }

        let frame: ServerFrame = serde_json::from_value(value)?;
        Ok(match frame {
            ServerFrame::Connected { message } => FeedEvent::Connected { message },
            ServerFrame::Subscribed { symbols } => FeedEvent::Subscribed { symbols },
            ServerFrame::Bar { data } => FeedEvent::Bar(self.bar(data)?),
            ServerFrame::Trade { data } => FeedEvent::Trade(self.trade(data)?),
            ServerFrame::Quote { data } => FeedEvent::Quote(self.quote(data)?),
            ServerFrame::Error { message } => FeedEvent::Error(FeedError::upstream(message)),
        })
    }

    fn bar(&self, data: BarPayload) -> Result<Bar, CodecError> {
        let symbol = non_empty(data.symbol, "bar")?;
        let time = resolve_timestamp(data.timestamp.as_ref()).div_euclid(1000);
        Ok(Bar::new(
            symbol, time, data.open, data.high, data.low, data.close, data.volume,
        )?)
    }

    fn trade(&self, data: TradePayload) -> Result<Trade, CodecError> {
        Ok(Trade {
            symbol: non_empty(data.symbol, "trade")?,
            timestamp_ms: resolve_timestamp(data.timestamp.as_ref()),
            price: data.price,
            size: data.size,
        })
    }

    fn quote(&self, data: QuotePayload) -> Result<Quote, CodecError> {
        Ok(Quote {
            symbol: non_empty(data.symbol, "quote")?,
            timestamp_ms: resolve_timestamp(data.timestamp.as_ref()),
            bid_price: data.bid_price,
            bid_size: data.bid_size,
            ask_price: data.ask_price,
            ask_size: data.ask_size,
        })
    }
}

fn non_empty(symbol: String, kind: &'static str) -> Result<String, CodecError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(CodecError::EmptySymbol(kind));
    }
    if trimmed.len() == symbol.len() {
        Ok(symbol)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Epoch milliseconds for a wire timestamp, falling back to now.
fn resolve_timestamp(raw: Option<&serde_json::Value>) -> i64 {
    resolve_epoch_millis(raw.and_then(raw_epoch))
}

/// Raw epoch number (seconds or milliseconds) carried by a wire value.
#[allow(clippy::cast_precision_loss)]
fn raw_epoch(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(s)
                    .ok()
                    .map(|dt| dt.timestamp_millis() as f64)
            })
        }
        _ => None,
    }
}
