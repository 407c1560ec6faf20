//! Transport Port (Driven Port)
//!
//! A bidirectional text-frame socket. The WebSocket adapter lives in
//! `infrastructure::feed::websocket`; tests substitute an in-memory
//! implementation.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

/// Close code for a normal, intentional closure.
pub const NORMAL_CLOSE: u16 = 1000;

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The socket could not be opened.
    #[error("connect failed: {message}")]
    ConnectFailed {
        /// Error details.
        message: String,
    },

    /// An outbound frame could not be written.
    #[error("send failed: {message}")]
    Send {
        /// Error details.
        message: String,
    },

    /// Reading from the socket failed.
    #[error("receive failed: {message}")]
    Receive {
        /// Error details.
        message: String,
    },

    /// The peer closed the socket with a non-normal code.
    #[error("closed by peer (code={code:?}): {reason}")]
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// The stream ended without a close frame.
    #[error("stream ended unexpectedly")]
    StreamEnded,
}

/// One inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// A text payload.
    Text(String),
    /// The peer is closing.
    Close {
        /// Close code, if any.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

impl InboundFrame {
    /// Whether this is a normal (code 1000) close.
    #[must_use]
    pub const fn is_clean_close(&self) -> bool {
        matches!(self, Self::Close { code: Some(NORMAL_CLOSE), .. })
    }
}

/// Outbound half of a session.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Inbound half of a session.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<InboundFrame, TransportError>> + Send>>;

/// An open socket, split into halves.
pub struct TransportSession {
    /// Outbound text frames.
    pub sink: FrameSink,
    /// Inbound frames.
    pub stream: FrameStream,
}

impl std::fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSession").finish_non_exhaustive()
    }
}

/// Port for opening sockets.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket to `url`.
    async fn open(&self, url: &str) -> Result<TransportSession, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_code_1000_is_clean() {
        let clean = InboundFrame::Close {
            code: Some(1000),
            reason: String::new(),
        };
        let abnormal = InboundFrame::Close {
            code: Some(1006),
            reason: "abnormal".to_string(),
        };
        let bare = InboundFrame::Close {
            code: None,
            reason: String::new(),
        };

        assert!(clean.is_clean_close());
        assert!(!abnormal.is_clean_close());
        assert!(!bare.is_clean_close());
        assert!(!InboundFrame::Text("{}".to_string()).is_clean_close());
    }

    #[test]
    fn closed_error_display() {
        let err = TransportError::Closed {
            code: Some(1011),
            reason: "server error".to_string(),
        };
        assert_eq!(err.to_string(), "closed by peer (code=Some(1011)): server error");
    }
}
