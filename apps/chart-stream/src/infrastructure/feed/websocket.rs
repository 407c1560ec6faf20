//! WebSocket Transport
//!
//! `tokio-tungstenite` adapter for the [`Transport`] port. Text and close
//! frames are surfaced; pings are answered by tungstenite and other control
//! frames are dropped.

use async_trait::async_trait;
use futures::future;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::application::ports::{InboundFrame, Transport, TransportError, TransportSession};

/// Transport backed by `tokio_tungstenite::connect_async`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportSession, TransportError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectFailed {
                message: e.to_string(),
            })?;

        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| TransportError::Send {
                message: e.to_string(),
            })
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text.into()))));

        let stream = read.filter_map(|msg| future::ready(to_inbound(msg)));

        Ok(TransportSession {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

fn to_inbound(
    msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<InboundFrame, TransportError>> {
    match msg {
        Ok(Message::Text(text)) => Some(Ok(InboundFrame::Text(text.as_str().to_owned()))),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(InboundFrame::Text(text))),
            Err(_) => {
                tracing::debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame");
                None
            }
        },
        Ok(Message::Close(frame)) => Some(Ok(match frame {
            Some(frame) => InboundFrame::Close {
                code: Some(u16::from(frame.code)),
                reason: frame.reason.as_str().to_owned(),
            },
            None => InboundFrame::Close {
                code: None,
                reason: String::new(),
            },
        })),
        Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
        Err(e) => Some(Err(TransportError::Receive {
            message: e.to_string(),
        })),
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    #[test]
    fn text_frames_pass_through() {
        let frame = to_inbound(Ok(Message::Text("{\"type\":\"connected\"}".into())));
        assert_eq!(
            frame,
            Some(Ok(InboundFrame::Text("{\"type\":\"connected\"}".to_string())))
        );
    }

    #[test]
    fn close_frame_keeps_code_and_reason() {
        let frame = to_inbound(Ok(Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))));
        let Some(Ok(close)) = frame else {
            panic!("expected close frame");
        };
        assert!(close.is_clean_close());
        assert_eq!(
            close,
            InboundFrame::Close {
                code: Some(1000),
                reason: "bye".to_string()
            }
        );
    }

    #[test]
    fn control_frames_are_skipped() {
        assert_eq!(to_inbound(Ok(Message::Ping(Vec::new().into()))), None);
        assert_eq!(to_inbound(Ok(Message::Pong(Vec::new().into()))), None);
    }

    #[tokio::test]
    async fn unreachable_host_fails_to_connect() {
        let result = WebSocketTransport::new().open("ws://127.0.0.1:1/ws/alpaca/crypto").await;
        assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
    }
}
