use tokio::sync::{mpsc, oneshot};
use tracing::error;

use crate::store::{FileStore, StoreError};

/// Type-erased store operation. Returns whether it succeeded.
pub(super) type Operation = Box<dyn FnOnce(&mut FileStore) -> bool + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Mode {
    Sync,
    Async,
}

impl Mode {
    pub(super) fn as_str(&self) -> &'static str {
        match self {
            Mode::Sync => "sync",
            Mode::Async => "async",
        }
    }
}

pub(super) enum Command {
    Run {
        label: &'static str,
        mode: Mode,
        op: Operation,
    },
    /// Stop after every earlier command has run.
    Stop,
}

/// Handle for submitting operations to the executor thread.
///
/// This is cheaply cloneable and can be shared across threads. Every
/// synchronous submission gets its own completion channel, so concurrent
/// callers always receive the result of their own operation.
#[derive(Clone)]
pub struct ExecutorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ExecutorHandle {
    pub(super) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    pub(super) fn send(&self, command: Command) -> Result<(), StoreError> {
        self.tx
            .send(command)
            .map_err(|_| StoreError::ExecutorStopped)
    }

    /// Whether the executor still accepts operations.
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    fn enqueue<T, F>(
        &self,
        label: &'static str,
        op: F,
    ) -> Result<oneshot::Receiver<Result<T, StoreError>>, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FileStore) -> Result<T, StoreError> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let op: Operation = Box::new(move |store| {
            let result = op(store);
            let ok = result.is_ok();
            // The caller may have given up waiting; nothing to do then
            let _ = done_tx.send(result);
            ok
        });
        self.send(Command::Run {
            label,
            mode: Mode::Sync,
            op,
        })?;
        Ok(done_rx)
    }

    fn lost(&self, label: &'static str) -> StoreError {
        if self.is_running() {
            StoreError::OperationAborted(label)
        } else {
            StoreError::ExecutorStopped
        }
    }

    /// Run `op` on the executor thread and block until it has finished.
    ///
    /// Must not be called from inside an async runtime (use
    /// [`submit`](Self::submit) there) or from an operation running on the
    /// executor thread itself, which would deadlock.
    pub fn submit_sync<T, F>(&self, label: &'static str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FileStore) -> Result<T, StoreError> + Send + 'static,
    {
        let done_rx = self.enqueue(label, op)?;
        done_rx.blocking_recv().map_err(|_| self.lost(label))?
    }

    /// Run `op` on the executor thread and await its result.
    pub async fn submit<T, F>(&self, label: &'static str, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FileStore) -> Result<T, StoreError> + Send + 'static,
    {
        let done_rx = self.enqueue(label, op)?;
        done_rx.await.map_err(|_| self.lost(label))?
    }

    /// Queue `op` and return immediately. Failures are logged, never returned.
    pub fn submit_async<F>(&self, label: &'static str, op: F)
    where
        F: FnOnce(&mut FileStore) -> Result<(), StoreError> + Send + 'static,
    {
        let op: Operation = Box::new(move |store| match op(store) {
            Ok(()) => true,
            Err(e) => {
                error!(op = label, "Asynchronous store operation failed: {}", e);
                false
            }
        });
        let command = Command::Run {
            label,
            mode: Mode::Async,
            op,
        };
        if let Err(e) = self.send(command) {
            error!(op = label, "Dropped asynchronous store operation: {}", e);
        }
    }

    /// Queue a commit without waiting for it.
    pub fn flush(&self) {
        self.submit_async("commit", |store| store.commit());
    }

    /// Queue a commit and wait until every earlier write is durable.
    pub fn sync_flush(&self) -> Result<(), StoreError> {
        self.submit_sync("commit", |store| store.commit())
    }
}
