//! Application Ports
//!
//! - `Transport` (driven): opens a framed text socket to a URL.
//! - `EventSink` (driven): receives every decoded feed event.

mod event_sink_port;
mod transport_port;

pub use event_sink_port::{EventSink, NoOpEventSink};
pub use transport_port::{
    FrameSink, FrameStream, InboundFrame, Transport, TransportError, TransportSession,
    NORMAL_CLOSE,
};
