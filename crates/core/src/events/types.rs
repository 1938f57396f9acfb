use serde::{Deserialize, Serialize};

use crate::model::ListKind;

/// Kind of entity an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    File,
    Package,
}

/// A visible change to one of the two lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// An entity appeared at `position`.
    Insert {
        kind: EntityKind,
        id: i64,
        list: ListKind,
        position: i64,
    },
    /// An entity's fields changed.
    Update {
        kind: EntityKind,
        id: i64,
        list: ListKind,
    },
    /// An entity left the list.
    Remove {
        kind: EntityKind,
        id: i64,
        list: ListKind,
    },
    /// Positions in the list changed; observers should reload it.
    ReloadAll { list: ListKind },
}

impl ChangeEvent {
    /// The list this event targets.
    pub fn list(&self) -> ListKind {
        match self {
            ChangeEvent::Insert { list, .. }
            | ChangeEvent::Update { list, .. }
            | ChangeEvent::Remove { list, .. }
            | ChangeEvent::ReloadAll { list } => *list,
        }
    }
}

/// Receiver of change notifications.
///
/// Delivery is fire-and-forget: implementations must not block the caller
/// and must not fail it.
pub trait EventSink: Send + Sync {
    fn push(&self, event: ChangeEvent);
}
