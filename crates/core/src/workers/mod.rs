//! Worker registry.
//!
//! Tracks which files are being processed so that deletes and aborts can
//! wait for in-flight work to stop cooperatively.

mod active;

pub use active::{ActiveWorkers, WorkGuard};

use std::collections::HashSet;

use crate::model::FileId;

/// Source of truth for the files currently held by workers.
pub trait WorkerRegistry: Send + Sync {
    /// Ids of every file some worker is processing right now.
    fn processing_ids(&self) -> HashSet<FileId>;

    fn is_processing(&self, id: FileId) -> bool {
        self.processing_ids().contains(&id)
    }

    /// Block until no worker is processing `id`.
    ///
    /// There is no timeout: the wait ends when the worker notices the abort
    /// flag and lets go of the file.
    fn wait_idle(&self, id: FileId);
}
