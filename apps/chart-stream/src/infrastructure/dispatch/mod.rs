//! Message Dispatcher
//!
//! Fans decoded feed events out to registered listeners and to a tokio
//! broadcast bus.
//!
//! Listeners are called synchronously, in registration order, on the
//! connection's driver task. Registration and removal are amortized O(1)
//! and take effect from the next event: each dispatch works on a snapshot
//! taken before the first listener runs. A panicking listener is logged and
//! does not affect the others.
//!
//! Removed listeners leave a hole that is compacted away once holes
//! outnumber live listeners, so add/remove churn keeps the list bounded.
//!
//! The broadcast bus serves async consumers. A receiver that falls more
//! than the bus capacity behind loses the oldest events.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::domain::streaming::FeedEvent;

/// Default broadcast bus capacity.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// A registered event callback.
pub type Listener = Arc<dyn Fn(&FeedEvent) + Send + Sync>;

/// Handle returned by [`Dispatcher::add_listener`].
///
/// Sequence numbers are never reused, so a stale handle cannot remove a
/// newer listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    seq: u64,
}

#[derive(Default)]
struct Slots {
    next_seq: u64,
    /// Registration order. `None` is a removed listener not yet compacted.
    listeners: Vec<Option<(u64, Listener)>>,
    /// Live sequence number to its position in `listeners`.
    index: HashMap<u64, usize>,
}

impl Slots {
    fn compact(&mut self) {
        self.listeners.retain(Option::is_some);
        self.index = self
            .listeners
            .iter()
            .enumerate()
            .filter_map(|(pos, slot)| slot.as_ref().map(|(seq, _)| (*seq, pos)))
            .collect();
    }
}

/// Listener registry plus broadcast bus.
pub struct Dispatcher {
    slots: RwLock<Slots>,
    bus: broadcast::Sender<FeedEvent>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listener_count())
            .field("bus_receivers", &self.bus.receiver_count())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl Dispatcher {
    /// Create a dispatcher whose bus holds `capacity` events per receiver.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: RwLock::new(Slots::default()),
            bus: broadcast::channel(capacity.max(1)).0,
        }
    }

    /// Register a listener.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        let mut slots = self.slots.write();
        let seq = slots.next_seq;
        slots.next_seq += 1;
        let pos = slots.listeners.len();
        slots.listeners.push(Some((seq, Arc::new(listener))));
        slots.index.insert(seq, pos);
        ListenerId { seq }
    }

    /// Remove a listener. Returns `false` if the handle is stale or was
    /// already removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut slots = self.slots.write();
        let Some(pos) = slots.index.remove(&id.seq) else {
            return false;
        };
        slots.listeners[pos] = None;
        if slots.listeners.len() > 2 * slots.index.len() {
            slots.compact();
        }
        true
    }

    /// Remove every listener. Existing handles become stale.
    pub fn clear_listeners(&self) {
        let mut slots = self.slots.write();
        slots.listeners.clear();
        slots.index.clear();
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.slots.read().index.len()
    }

    /// Deliver an event to every listener, then to the bus.
    pub fn dispatch(&self, event: &FeedEvent) {
        let snapshot: Vec<Listener> = self
            .slots
            .read()
            .listeners
            .iter()
            .flatten()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::error!(kind = event.kind().as_str(), "Feed listener panicked");
            }
        }

        // No receivers is fine.
        let _ = self.bus.send(event.clone());
    }

    /// New receiver on the broadcast bus.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.bus.subscribe()
    }

    /// Bus receiver as a stream that skips over lag gaps.
    #[must_use]
    pub fn event_stream(&self) -> impl Stream<Item = FeedEvent> + Send + 'static {
        BroadcastStream::new(self.bus.subscribe()).filter_map(|item| match item {
            Ok(event) => Some(event),
            Err(lagged) => {
                tracing::debug!(error = %lagged, "Event stream receiver lagged");
                None
            }
        })
    }

    /// Number of bus receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.bus.receiver_count()
    }
}
