use tokio::sync::broadcast;
use tracing::trace;

use super::{ChangeEvent, EventSink};
use crate::config::EventsConfig;

/// Broadcaster for change events using a tokio broadcast channel.
///
/// Slow subscribers lag and lose the oldest events; they should treat a lag
/// as a `ReloadAll` for both lists.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a broadcaster sized by the `[events]` config section.
    pub fn from_config(config: &EventsConfig) -> Self {
        Self::new(config.capacity)
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventSink for EventBroadcaster {
    fn push(&self, event: ChangeEvent) {
        // Send errors just mean no one is listening
        if self.sender.send(event).is_err() {
            trace!("Change event dropped, no subscribers");
        }
    }
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn push(&self, _event: ChangeEvent) {}
}
