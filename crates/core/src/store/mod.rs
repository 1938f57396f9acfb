//! Persistent store for files and packages.
//!
//! The store is owned by the executor thread; nothing else opens a handle to
//! the same database. Writes happen inside a lazily opened transaction that
//! only becomes durable on [`FileStore::commit`].

pub mod ordering;
mod sqlite;
pub mod version;

pub use ordering::Scope;
pub use sqlite::FileStore;
pub use version::{check_version, VersionCheck, VersionPaths, CURRENT_SCHEMA_VERSION};

use thiserror::Error;

use crate::model::{FileId, PackageId};

/// Errors raised by the store and the executor that owns it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Package not found: {0}")]
    PackageNotFound(PackageId),

    #[error("File not found: {0}")]
    FileNotFound(FileId),

    /// Positions of a scope are no longer `0..n`.
    #[error("Ordering violation in {scope}: {detail}")]
    OrderingViolation { scope: Scope, detail: String },

    #[error("Executor is not running")]
    ExecutorStopped,

    /// The operation panicked on the executor thread.
    #[error("Operation aborted: {0}")]
    OperationAborted(&'static str),
}
