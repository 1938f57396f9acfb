//! Change notifications emitted by the manager.

mod broadcaster;
mod types;

pub use broadcaster::{EventBroadcaster, NullSink};
pub use types::{ChangeEvent, EntityKind, EventSink};
