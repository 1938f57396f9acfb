//! Manager façade over the cache, executor and dispatcher.
//!
//! Every lifecycle operation on files and packages goes through
//! [`FileManager`]. Structural changes (insert, delete, reorder, moving a
//! package between lists) renumber positions in the store, refresh live
//! entries and invalidate job batches before the matching change event is
//! pushed to the sink.

mod file_manager;

pub use file_manager::{Collaborators, FileManager};

use thiserror::Error;

use crate::model::{FileId, PackageId};
use crate::plugin::PluginError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Package not found: {0}")]
    PackageNotFound(PackageId),

    #[error("File not found: {0}")]
    FileNotFound(FileId),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),
}

impl From<StoreError> for ManagerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PackageNotFound(id) => ManagerError::PackageNotFound(id),
            StoreError::FileNotFound(id) => ManagerError::FileNotFound(id),
            other => ManagerError::Store(other),
        }
    }
}
