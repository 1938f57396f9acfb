//! Event sink that records what it receives.

use parking_lot::Mutex;

use crate::events::{ChangeEvent, EventSink};

/// Keeps every pushed event in order for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<ChangeEvent> {
        self.events.lock().clone()
    }

    /// Return and forget everything recorded so far.
    pub fn take(&self) -> Vec<ChangeEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn push(&self, event: ChangeEvent) {
        self.events.lock().push(event);
    }
}
