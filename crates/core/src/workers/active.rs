use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::trace;

use super::WorkerRegistry;
use crate::model::FileId;

/// In-process worker registry.
///
/// Workers call [`begin`](Self::begin) when they pick up a file and drop the
/// returned guard when they are done with it; waiters are woken on every
/// release instead of polling.
#[derive(Debug, Default)]
pub struct ActiveWorkers {
    // id -> number of workers holding it
    active: Mutex<HashMap<FileId, usize>>,
    released: Condvar,
}

impl ActiveWorkers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the calling worker as processing `id`.
    pub fn begin(self: &Arc<Self>, id: FileId) -> WorkGuard {
        *self.active.lock().entry(id).or_insert(0) += 1;
        trace!(file_id = id, "Worker started processing file");
        WorkGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    fn finish(&self, id: FileId) {
        let mut active = self.active.lock();
        if let Some(holders) = active.get_mut(&id) {
            *holders -= 1;
            if *holders == 0 {
                active.remove(&id);
            }
        }
        drop(active);
        trace!(file_id = id, "Worker released file");
        self.released.notify_all();
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

impl WorkerRegistry for ActiveWorkers {
    fn processing_ids(&self) -> HashSet<FileId> {
        self.active.lock().keys().copied().collect()
    }

    fn is_processing(&self, id: FileId) -> bool {
        self.active.lock().contains_key(&id)
    }

    fn wait_idle(&self, id: FileId) {
        let mut active = self.active.lock();
        while active.contains_key(&id) {
            self.released.wait(&mut active);
        }
    }
}

/// Marks a file as being processed until dropped.
#[derive(Debug)]
pub struct WorkGuard {
    registry: Arc<ActiveWorkers>,
    id: FileId,
}

impl WorkGuard {
    pub fn file_id(&self) -> FileId {
        self.id
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.registry.finish(self.id);
    }
}
