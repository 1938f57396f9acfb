use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::model::{FileId, FileRecord, FileStatus, FileView, ListKind, PackageId, PackageRecord};
use crate::plugin::{PluginError, PluginResolver, TransferPlugin, TransferProgress};

/// The single in-memory representative of a file.
///
/// Persisted fields live behind a mutex and are read as snapshots. The
/// runtime fields (wait deadline, dispatch claim, abort and reconnect flags,
/// plugin instance) are never written to the store.
pub struct LiveFile {
    id: FileId,
    record: Mutex<FileRecord>,
    wait_until: Mutex<Option<DateTime<Utc>>>,
    /// Set while the file is handed to a worker.
    dispatched: AtomicBool,
    abort: AtomicBool,
    reconnected: AtomicBool,
    plugin: Mutex<Option<Arc<dyn TransferPlugin>>>,
}

impl std::fmt::Debug for LiveFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let record = self.record.lock();
        f.debug_struct("LiveFile")
            .field("id", &self.id)
            .field("name", &record.name)
            .field("plugin", &record.plugin)
            .field("status", &record.status)
            .finish()
    }
}

impl LiveFile {
    pub(crate) fn new(record: FileRecord) -> Self {
        Self {
            id: record.id,
            record: Mutex::new(record),
            wait_until: Mutex::new(None),
            dispatched: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            reconnected: AtomicBool::new(false),
            plugin: Mutex::new(None),
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    /// Copy of the persisted fields.
    pub fn snapshot(&self) -> FileRecord {
        self.record.lock().clone()
    }

    /// Mutate persisted fields in place. Nothing is written until the file
    /// is synced.
    pub fn update<R>(&self, f: impl FnOnce(&mut FileRecord) -> R) -> R {
        f(&mut self.record.lock())
    }

    pub fn package_id(&self) -> PackageId {
        self.record.lock().package_id
    }

    pub fn plugin_name(&self) -> String {
        self.record.lock().plugin.clone()
    }

    pub fn position(&self) -> i64 {
        self.record.lock().position
    }

    pub(crate) fn set_position(&self, position: i64) {
        self.record.lock().position = position;
    }

    pub fn status(&self) -> FileStatus {
        self.record.lock().status
    }

    pub fn has_status(&self, status: FileStatus) -> bool {
        self.status() == status
    }

    pub fn set_status(&self, status: FileStatus) {
        self.record.lock().status = status;
    }

    pub fn set_error(&self, error: impl Into<String>) {
        self.record.lock().error = error.into();
    }

    // ---------------------------------------------------------------------
    // Runtime state
    // ---------------------------------------------------------------------

    pub fn wait_until(&self) -> Option<DateTime<Utc>> {
        *self.wait_until.lock()
    }

    /// Hold the file back for `duration` from now.
    pub fn set_wait(&self, duration: Duration) {
        *self.wait_until.lock() = Some(Utc::now() + duration);
    }

    pub fn clear_wait(&self) {
        *self.wait_until.lock() = None;
    }

    /// Time left until the wait deadline, zero when not waiting.
    pub fn remaining_wait(&self) -> Duration {
        match self.wait_until() {
            Some(deadline) => (deadline - Utc::now()).max(Duration::zero()),
            None => Duration::zero(),
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.remaining_wait() > Duration::zero()
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    pub fn is_dispatched(&self) -> bool {
        self.dispatched.load(Ordering::Acquire)
    }

    /// Claim the file for a worker. Returns false if it was already claimed.
    pub(crate) fn claim(&self) -> bool {
        self.dispatched
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Give the file back to the job pool.
    pub(crate) fn unclaim(&self) {
        self.dispatched.store(false, Ordering::Release);
    }

    pub(crate) fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
        if let Some(plugin) = self.plugin() {
            plugin.abort();
        }
    }

    pub(crate) fn clear_abort(&self) {
        self.abort.store(false, Ordering::Release);
        if let Some(plugin) = self.plugin() {
            plugin.reset_abort();
        }
    }

    pub fn is_reconnected(&self) -> bool {
        self.reconnected.load(Ordering::Acquire)
    }

    /// Mark the file as retried after a reconnect.
    ///
    /// Any wait deadline is dropped, so the file is dispatchable right away.
    pub fn mark_reconnected(&self) {
        self.reconnected.store(true, Ordering::Release);
        self.clear_wait();
        self.set_status(FileStatus::Reconnected);
        self.unclaim();
    }

    pub fn clear_reconnected(&self) {
        self.reconnected.store(false, Ordering::Release);
    }

    // ---------------------------------------------------------------------
    // Plugin
    // ---------------------------------------------------------------------

    /// Build the plugin instance for this file, replacing any previous one.
    pub fn init_plugin(
        &self,
        resolver: &dyn PluginResolver,
    ) -> Result<Arc<dyn TransferPlugin>, PluginError> {
        let record = self.snapshot();
        let plugin = resolver.create(&record.plugin, &record)?;
        *self.plugin.lock() = Some(Arc::clone(&plugin));
        Ok(plugin)
    }

    pub fn plugin(&self) -> Option<Arc<dyn TransferPlugin>> {
        self.plugin.lock().clone()
    }

    pub fn progress(&self) -> TransferProgress {
        self.plugin()
            .map(|plugin| plugin.progress())
            .unwrap_or_default()
    }

    /// Stored size, or the plugin's expected total when the size is unknown.
    pub fn size(&self) -> i64 {
        let stored = self.record.lock().size;
        if stored > 0 {
            stored
        } else {
            self.progress().total
        }
    }

    pub fn percent(&self) -> u8 {
        self.progress().percent()
    }

    /// Presentation copy with the live size merged in.
    pub fn view(&self) -> FileView {
        let mut file = self.snapshot();
        file.size = self.size();
        FileView { file, live: true }
    }
}

/// The single in-memory representative of a package.
#[derive(Debug)]
pub struct LivePackage {
    id: PackageId,
    record: Mutex<PackageRecord>,
}

impl LivePackage {
    pub(crate) fn new(record: PackageRecord) -> Self {
        Self {
            id: record.id,
            record: Mutex::new(record),
        }
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn snapshot(&self) -> PackageRecord {
        self.record.lock().clone()
    }

    /// Mutate metadata in place. List membership and position are managed by
    /// the manager and are overwritten on the next structural change.
    pub fn update<R>(&self, f: impl FnOnce(&mut PackageRecord) -> R) -> R {
        f(&mut self.record.lock())
    }

    pub fn list(&self) -> ListKind {
        self.record.lock().list
    }

    pub fn position(&self) -> i64 {
        self.record.lock().position
    }

    pub(crate) fn place(&self, list: ListKind, position: i64) {
        let mut record = self.record.lock();
        record.list = list;
        record.position = position;
    }
}
