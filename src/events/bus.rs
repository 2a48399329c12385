//! # Event bus for broadcasting runtime events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. Publishing is a plain synchronous
//! call, so worker threads, the failure handler and the action bus publish
//! without needing a runtime; only receivers live on tokio.
//!
//! ```text
//! Publishers (many):                       Receiver (one per listener):
//!   Worker threads ──┐
//!   WorkerPool     ──┼──────► Bus ───────► Engine subscriber listener ──► SubscriberSet
//!   Registry       ──┤  (broadcast chan)
//!   ActionBus      ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Bounded capacity**: one ring buffer holds the most recent events.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` items.
//! - **No persistence**: events published with no receiver are dropped.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for runtime events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that observes events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn publish_without_receivers_is_silent() {
        let bus = Bus::new(0);
        bus.publish(Event::new(EventKind::ComponentAdded));
    }

    #[test]
    fn receivers_see_events_in_order() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::ComponentAdded).with_component("a"));
        bus.publish(Event::new(EventKind::ComponentRemoved).with_component("a"));

        let first = rx.try_recv().map(|e| e.kind);
        let second = rx.try_recv().map(|e| e.kind);
        assert_eq!(first, Ok(EventKind::ComponentAdded));
        assert_eq!(second, Ok(EventKind::ComponentRemoved));
    }
}
