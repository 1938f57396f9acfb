use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::handle::{Command, ExecutorHandle};
use crate::metrics::{EXECUTOR_DURATION, EXECUTOR_OPERATIONS};
use crate::store::{FileStore, StoreError};

/// Owner of the executor thread.
///
/// Dropping the executor stops the thread after it has run every operation
/// submitted so far and committed once more.
pub struct Executor {
    handle: ExecutorHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Executor {
    /// Move `store` onto a new executor thread.
    pub fn spawn(store: FileStore) -> Result<Self, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let thread = thread::Builder::new()
            .name("linkhoard-store".into())
            .spawn(move || run(store, rx))?;

        Ok(Self {
            handle: ExecutorHandle::new(tx),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Handle for submitting operations. Clone it to share across threads.
    pub fn handle(&self) -> &ExecutorHandle {
        &self.handle
    }

    /// Queue the stop sentinel and wait for the thread to exit.
    ///
    /// Operations submitted before this call still run; later ones fail with
    /// [`StoreError::ExecutorStopped`]. Calling it twice is harmless.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if self.handle.send(Command::Stop).is_err() {
            debug!("Executor already stopped");
        }
        if thread.join().is_err() {
            error!("File store executor thread panicked");
        }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(mut store: FileStore, mut rx: mpsc::UnboundedReceiver<Command>) {
    info!("File store executor started");

    while let Some(command) = rx.blocking_recv() {
        match command {
            Command::Run { label, mode, op } => {
                let started = Instant::now();
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| op(&mut store)));
                let result = match outcome {
                    Ok(true) => "ok",
                    Ok(false) => "error",
                    Err(_) => {
                        error!(op = label, "Store operation panicked and was aborted");
                        "panic"
                    }
                };
                EXECUTOR_OPERATIONS
                    .with_label_values(&[mode.as_str(), result])
                    .inc();
                EXECUTOR_DURATION
                    .with_label_values(&[label])
                    .observe(started.elapsed().as_secs_f64());
            }
            Command::Stop => {
                debug!("Executor received stop");
                break;
            }
        }
    }

    // Anything queued after the stop is dropped, failing its submitter
    rx.close();

    if let Err(e) = store.commit() {
        error!("Final commit failed: {}", e);
    }

    info!("File store executor stopped");
}
