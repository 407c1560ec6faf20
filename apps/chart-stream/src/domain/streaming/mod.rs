//! Market Data Streaming Types
//!
//! The typed event union every inbound frame decodes into. Listeners and
//! the event bus both receive [`FeedEvent`] values.

use std::fmt;

use super::market::{Bar, Quote, Symbol, Trade};

// =============================================================================
// Feed Errors
// =============================================================================

/// Where a feed error originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// An `error` frame sent by the server.
    Upstream,
    /// A socket failure; the connection will retry.
    Transport,
    /// The retry budget is exhausted; no further reconnects are scheduled.
    Terminal,
}

impl FeedErrorKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upstream => "upstream",
            Self::Transport => "transport",
            Self::Terminal => "terminal",
        }
    }
}

/// An error surfaced to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedError {
    /// Human readable description.
    pub message: String,
    /// Origin of the error.
    pub kind: FeedErrorKind,
}

impl FeedError {
    /// Error frame from the server.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FeedErrorKind::Upstream,
        }
    }

    /// Recoverable socket failure.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FeedErrorKind::Transport,
        }
    }

    /// Retry budget exhausted.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: FeedErrorKind::Terminal,
        }
    }

    /// Whether the connection has stopped retrying.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self.kind, FeedErrorKind::Terminal)
    }
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.kind.as_str(), self.message)
    }
}

// =============================================================================
// Feed Events
// =============================================================================

/// Discriminant of a [`FeedEvent`], for metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// OHLCV bar.
    Bar,
    /// Single execution.
    Trade,
    /// Top of book.
    Quote,
    /// Server greeting.
    Connected,
    /// Subscription acknowledgement.
    Subscribed,
    /// Upstream, transport or terminal error.
    Error,
}

impl EventKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::Connected => "connected",
            Self::Subscribed => "subscribed",
            Self::Error => "error",
        }
    }
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A bar for one bucket.
    Bar(Bar),
    /// A single execution.
    Trade(Trade),
    /// A top-of-book update.
    Quote(Quote),
    /// The server accepted the socket.
    Connected {
        /// Greeting text.
        message: String,
    },
    /// The server acknowledged a subscription.
    Subscribed {
        /// Symbols now streaming.
        symbols: Vec<Symbol>,
    },
    /// Something went wrong.
    Error(FeedError),
}

impl FeedEvent {
    /// Discriminant of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Bar(_) => EventKind::Bar,
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
            Self::Connected { .. } => EventKind::Connected,
            Self::Subscribed { .. } => EventKind::Subscribed,
            Self::Error(_) => EventKind::Error,
        }
    }

    /// Symbol carried by a market-data event.
    #[must_use]
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Self::Bar(bar) => Some(&bar.symbol),
            Self::Trade(trade) => Some(&trade.symbol),
            Self::Quote(quote) => Some(&quote.symbol),
            Self::Connected { .. } | Self::Subscribed { .. } | Self::Error(_) => None,
        }
    }

    /// Whether this is the terminal error emitted after the retry budget.
    #[must_use]
    pub const fn is_fatal_error(&self) -> bool {
        matches!(self, Self::Error(err) if err.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_terminal_errors_are_fatal() {
        assert!(FeedError::terminal("gave up").is_fatal());
        assert!(!FeedError::transport("reset").is_fatal());
        assert!(!FeedError::upstream("bad symbol").is_fatal());
    }

    #[test]
    fn event_kind_and_symbol() {
        let event = FeedEvent::Subscribed {
            symbols: vec!["BTC".to_string()],
        };
        assert_eq!(event.kind(), EventKind::Subscribed);
        assert_eq!(event.symbol(), None);

        let event = FeedEvent::Error(FeedError::terminal("x"));
        assert_eq!(event.kind().as_str(), "error");
        assert!(event.is_fatal_error());
    }

    #[test]
    fn error_display_includes_kind() {
        let err = FeedError::transport("connection reset");
        assert_eq!(err.to_string(), "transport error: connection reset");
    }
}
