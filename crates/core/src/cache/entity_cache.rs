use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{LiveFile, LivePackage};
use crate::executor::ExecutorHandle;
use crate::metrics::CACHE_ENTRIES;
use crate::model::{FileId, FileRecord, ListKind, PackageId, PackageRecord};
use crate::store::StoreError;

/// Map of live entities in front of the executor.
///
/// At most one [`LiveFile`] exists per file id and one [`LivePackage`] per
/// package id; materializing an id that is already live returns the existing
/// representative.
pub struct EntityCache {
    executor: ExecutorHandle,
    files: Mutex<HashMap<FileId, Arc<LiveFile>>>,
    packages: Mutex<HashMap<PackageId, Arc<LivePackage>>>,
}

impl EntityCache {
    pub fn new(executor: ExecutorHandle) -> Self {
        Self {
            executor,
            files: Mutex::new(HashMap::new()),
            packages: Mutex::new(HashMap::new()),
        }
    }

    // ---------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------

    pub fn live_file(&self, id: FileId) -> Option<Arc<LiveFile>> {
        self.files.lock().get(&id).cloned()
    }

    pub fn live_package(&self, id: PackageId) -> Option<Arc<LivePackage>> {
        self.packages.lock().get(&id).cloned()
    }

    /// Live values if the file is live, otherwise the stored row.
    pub fn get_file(&self, id: FileId) -> Result<Option<FileRecord>, StoreError> {
        if let Some(file) = self.live_file(id) {
            return Ok(Some(file.snapshot()));
        }
        self.executor
            .submit_sync("get_file", move |store| store.get_file(id))
    }

    /// Live values if the package is live, otherwise the stored row.
    pub fn get_package(&self, id: PackageId) -> Result<Option<PackageRecord>, StoreError> {
        if let Some(package) = self.live_package(id) {
            return Ok(Some(package.snapshot()));
        }
        self.executor
            .submit_sync("get_package", move |store| store.get_package(id))
    }

    pub fn live_files(&self) -> Vec<Arc<LiveFile>> {
        self.files.lock().values().cloned().collect()
    }

    pub fn live_packages(&self) -> Vec<Arc<LivePackage>> {
        self.packages.lock().values().cloned().collect()
    }

    pub fn live_files_in_package(&self, package: PackageId) -> Vec<Arc<LiveFile>> {
        self.files
            .lock()
            .values()
            .filter(|file| file.package_id() == package)
            .cloned()
            .collect()
    }

    // ---------------------------------------------------------------------
    // Materialization
    // ---------------------------------------------------------------------

    /// Make a file live, loading it from the store if needed.
    pub fn materialize_file(&self, id: FileId) -> Result<Option<Arc<LiveFile>>, StoreError> {
        self.materialize_file_if(id, |_| true)
    }

    /// Like [`materialize_file`](Self::materialize_file), but only when the
    /// current values satisfy `accept`. A rejected file that was not live
    /// stays out of the cache.
    pub fn materialize_file_if(
        &self,
        id: FileId,
        accept: impl Fn(&FileRecord) -> bool,
    ) -> Result<Option<Arc<LiveFile>>, StoreError> {
        if let Some(file) = self.live_file(id) {
            return Ok(accept(&file.snapshot()).then_some(file));
        }

        let Some(record) = self
            .executor
            .submit_sync("get_file", move |store| store.get_file(id))?
        else {
            return Ok(None);
        };
        if !accept(&record) {
            return Ok(None);
        }

        let mut files = self.files.lock();
        // Another caller may have materialized it while the store was read
        let file = files
            .entry(id)
            .or_insert_with(|| Arc::new(LiveFile::new(record)))
            .clone();
        CACHE_ENTRIES
            .with_label_values(&["file"])
            .set(files.len() as i64);
        Ok(Some(file))
    }

    pub fn materialize_package(
        &self,
        id: PackageId,
    ) -> Result<Option<Arc<LivePackage>>, StoreError> {
        if let Some(package) = self.live_package(id) {
            return Ok(Some(package));
        }

        let Some(record) = self
            .executor
            .submit_sync("get_package", move |store| store.get_package(id))?
        else {
            return Ok(None);
        };

        let mut packages = self.packages.lock();
        let package = packages
            .entry(id)
            .or_insert_with(|| Arc::new(LivePackage::new(record)))
            .clone();
        CACHE_ENTRIES
            .with_label_values(&["package"])
            .set(packages.len() as i64);
        Ok(Some(package))
    }

    // ---------------------------------------------------------------------
    // Write-through
    // ---------------------------------------------------------------------

    /// Queue a write of the file's current values. The file stays live.
    pub fn sync_file(&self, file: &LiveFile) {
        let record = file.snapshot();
        self.executor
            .submit_async("update_file", move |store| store.update_file(&record));
    }

    pub fn sync_package(&self, package: &LivePackage) {
        let record = package.snapshot();
        self.executor
            .submit_async("update_package", move |store| store.update_package(&record));
    }

    /// Sync the file and evict it.
    ///
    /// The write is queued before the entry disappears, so any later store
    /// lookup runs after it.
    pub fn release_file(&self, id: FileId) -> Option<Arc<LiveFile>> {
        let mut files = self.files.lock();
        let file = files.remove(&id)?;
        self.sync_file(&file);
        CACHE_ENTRIES
            .with_label_values(&["file"])
            .set(files.len() as i64);
        debug!(file_id = id, "Released live file");
        Some(file)
    }

    pub fn release_package(&self, id: PackageId) -> Option<Arc<LivePackage>> {
        let mut packages = self.packages.lock();
        let package = packages.remove(&id)?;
        self.sync_package(&package);
        CACHE_ENTRIES
            .with_label_values(&["package"])
            .set(packages.len() as i64);
        debug!(package_id = id, "Released live package");
        Some(package)
    }

    /// Drop a file from the cache without writing it back.
    pub fn evict_file(&self, id: FileId) -> Option<Arc<LiveFile>> {
        let mut files = self.files.lock();
        let file = files.remove(&id);
        CACHE_ENTRIES
            .with_label_values(&["file"])
            .set(files.len() as i64);
        file
    }

    pub fn evict_package(&self, id: PackageId) -> Option<Arc<LivePackage>> {
        let mut packages = self.packages.lock();
        let package = packages.remove(&id);
        CACHE_ENTRIES
            .with_label_values(&["package"])
            .set(packages.len() as i64);
        package
    }

    /// Queue a write of every live entity.
    pub fn sync_all(&self) {
        for package in self.live_packages() {
            self.sync_package(&package);
        }
        for file in self.live_files() {
            self.sync_file(&file);
        }
    }

    // ---------------------------------------------------------------------
    // Positions
    // ---------------------------------------------------------------------

    /// Copy renumbered file positions onto live files.
    pub fn refresh_file_positions(&self, positions: &[(FileId, i64)]) {
        let files = self.files.lock();
        for (id, position) in positions {
            if let Some(file) = files.get(id) {
                file.set_position(*position);
            }
        }
    }

    /// Copy renumbered package positions of `list` onto live packages.
    pub fn refresh_package_positions(
        &self,
        list: ListKind,
        positions: &[(PackageId, i64)],
    ) {
        let packages = self.packages.lock();
        for (id, position) in positions {
            if let Some(package) = packages.get(id) {
                package.place(list, *position);
            }
        }
    }

    pub fn file_entries(&self) -> usize {
        self.files.lock().len()
    }

    pub fn package_entries(&self) -> usize {
        self.packages.lock().len()
    }
}
