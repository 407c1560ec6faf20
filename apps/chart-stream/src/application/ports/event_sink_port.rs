//! Event Sink Port (Driven Port)
//!
//! Where a connection hands decoded events. Calls happen on the
//! connection's driver task, one at a time, in frame order.

use crate::domain::streaming::FeedEvent;

/// Receiver of decoded feed events.
pub trait EventSink: Send + Sync {
    /// Handle one event. Must not block.
    fn on_event(&self, event: FeedEvent);
}

/// Event sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn on_event(&self, _event: FeedEvent) {}
}
