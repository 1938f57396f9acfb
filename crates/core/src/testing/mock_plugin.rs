//! Mock transfer plugin for testing.

use parking_lot::{Condvar, Mutex};

use crate::plugin::{PluginError, TransferPlugin, TransferProgress};

#[derive(Debug, Default)]
struct MockTransferState {
    aborted: bool,
    finished: bool,
    starts: usize,
    progress: TransferProgress,
}

/// Mock implementation of the TransferPlugin trait.
///
/// Provides controllable behavior for testing:
/// - Non-blocking plugins complete as soon as they are started
/// - Blocking plugins run until [`finish`](Self::finish) or an abort
/// - Progress can be set directly
///
/// # Example
///
/// ```rust,ignore
/// let plugin = MockPlugin::blocking("Hoster");
///
/// // On a worker thread
/// let result = plugin.start(); // blocks
///
/// // Elsewhere
/// plugin.abort(); // start() returns Err(PluginError::Transfer(..))
/// ```
#[derive(Debug)]
pub struct MockPlugin {
    name: String,
    blocking: bool,
    state: Mutex<MockTransferState>,
    changed: Condvar,
}

impl MockPlugin {
    /// Create a plugin whose transfers complete immediately.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocking: false,
            state: Mutex::new(MockTransferState::default()),
            changed: Condvar::new(),
        }
    }

    /// Create a plugin whose transfers block until finished or aborted.
    pub fn blocking(name: impl Into<String>) -> Self {
        Self {
            blocking: true,
            ..Self::new(name)
        }
    }

    /// Let a blocked transfer complete successfully.
    pub fn finish(&self) {
        self.state.lock().finished = true;
        self.changed.notify_all();
    }

    pub fn set_progress(&self, progress: TransferProgress) {
        self.state.lock().progress = progress;
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Number of times `start` was called.
    pub fn start_count(&self) -> usize {
        self.state.lock().starts
    }
}

impl TransferPlugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&self) -> Result<(), PluginError> {
        let mut state = self.state.lock();
        state.starts += 1;
        if self.blocking {
            while !state.finished && !state.aborted {
                self.changed.wait(&mut state);
            }
        }
        if state.aborted {
            return Err(PluginError::Transfer("aborted".to_string()));
        }
        state.progress.arrived = state.progress.total;
        Ok(())
    }

    fn abort(&self) {
        self.state.lock().aborted = true;
        self.changed.notify_all();
    }

    fn reset_abort(&self) {
        self.state.lock().aborted = false;
    }

    fn progress(&self) -> TransferProgress {
        self.state.lock().progress
    }
}
