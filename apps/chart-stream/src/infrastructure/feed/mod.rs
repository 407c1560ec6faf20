//! Feed Adapters
//!
//! The market-data socket: wire messages, JSON codec, backoff policy, the
//! WebSocket transport and the connection state machine that ties them
//! together.

pub mod codec;
pub mod connection;
pub mod messages;
pub mod reconnect;
pub mod websocket;

pub use codec::{CodecError, DecodedFrame, JsonCodec};
pub use connection::{Connection, ConnectionConfig, ConnectionState, ConnectionStatus};
pub use messages::{ControlAction, ControlFrame, ServerFrame};
pub use reconnect::{BackoffStrategy, ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use websocket::WebSocketTransport;
