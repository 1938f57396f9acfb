//! Single-writer command executor.
//!
//! One dedicated thread owns the [`FileStore`](crate::store::FileStore).
//! Callers submit closures through an [`ExecutorHandle`]; the thread runs
//! them strictly in submission order, which is what makes multi-step
//! structural changes atomic with respect to every other queued operation.
//!
//! Durability: writes become durable only when a commit operation runs
//! ([`ExecutorHandle::flush`], [`ExecutorHandle::sync_flush`], or the final
//! commit on shutdown). Asynchronous writes queued after the last commit are
//! lost if the process dies abruptly; their failures are logged and never
//! reach the submitter.

mod handle;
mod runner;

pub use handle::ExecutorHandle;
pub use runner::Executor;
