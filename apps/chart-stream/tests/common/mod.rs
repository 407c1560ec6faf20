//! In-memory transport shared by the integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chart_stream::application::ports::InboundFrame;
use chart_stream::{
    DataChannel, EngineConfig, FeedEvent, MarketDataEngine, Transport, TransportError,
    TransportSession,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// What the next `open()` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Accept,
    Refuse,
}

/// Server end of one accepted session.
pub struct ServerSide {
    sent: mpsc::UnboundedReceiver<String>,
    push: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
}

impl ServerSide {
    /// Push a text frame to the client.
    pub fn send_text(&self, text: &str) {
        let _ = self.push.send(Ok(InboundFrame::Text(text.to_string())));
    }

    /// Push a JSON frame to the client.
    pub fn send_json(&self, value: &serde_json::Value) {
        self.send_text(&value.to_string());
    }

    /// Close the socket with `code`.
    pub fn close(&self, code: u16) {
        let _ = self.push.send(Ok(InboundFrame::Close {
            code: Some(code),
            reason: String::new(),
        }));
    }

    /// Fail the socket with a receive error.
    pub fn fail(&self) {
        let _ = self.push.send(Err(TransportError::Receive {
            message: "connection reset".to_string(),
        }));
    }

    /// Next frame the client sent, parsed as JSON. `None` once the client
    /// dropped its end.
    pub async fn recv_json(&mut self) -> Option<serde_json::Value> {
        let text = self.sent.recv().await?;
        Some(serde_json::from_str(&text).unwrap())
    }

    /// Frames the client sent that have not been read yet.
    pub fn drain_json(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.sent.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }
}

/// Scripted transport. Opens beyond the script use the fallback plan.
pub struct MockTransport {
    script: Mutex<VecDeque<Plan>>,
    fallback: Plan,
    opens: AtomicUsize,
    urls: Mutex<Vec<String>>,
    servers_tx: mpsc::UnboundedSender<ServerSide>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerSide>>,
}

impl MockTransport {
    pub fn new(script: impl IntoIterator<Item = Plan>, fallback: Plan) -> Arc<Self> {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            opens: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            servers_tx,
            servers_rx: tokio::sync::Mutex::new(servers_rx),
        })
    }

    /// Accepts every open.
    pub fn accepting() -> Arc<Self> {
        Self::new([], Plan::Accept)
    }

    /// Refuses every open.
    pub fn refusing() -> Arc<Self> {
        Self::new([], Plan::Refuse)
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().clone()
    }

    /// Server end of the next accepted session.
    pub async fn next_server(&self) -> ServerSide {
        self.servers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("transport dropped")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &str) -> Result<TransportSession, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().push(url.to_string());

        let plan = self.script.lock().pop_front().unwrap_or(self.fallback);
        if plan == Plan::Refuse {
            return Err(TransportError::ConnectFailed {
                message: "connection refused".to_string(),
            });
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<String>();
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        let sink = futures::sink::unfold(sent_tx, |tx, text: String| async move {
            tx.send(text).map_err(|e| TransportError::Send {
                message: e.to_string(),
            })?;
            Ok::<_, TransportError>(tx)
        });

        let _ = self.servers_tx.send(ServerSide {
            sent: sent_rx,
            push: push_tx,
        });

        Ok(TransportSession {
            sink: Box::pin(sink),
            stream: Box::pin(UnboundedReceiverStream::new(push_rx)),
        })
    }
}

/// Engine over `transport` with default settings.
pub fn engine(channel: DataChannel, transport: Arc<MockTransport>) -> MarketDataEngine {
    MarketDataEngine::new(
        &EngineConfig::new(channel, format!("ws://test{}", channel.stream_path())),
        transport,
    )
}

/// Listener that records every event.
pub fn record_events(engine: &MarketDataEngine) -> Arc<Mutex<Vec<FeedEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    engine.add_listener(move |event: &FeedEvent| sink.lock().push(event.clone()));
    events
}
