use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use tracing::{debug, info};

use super::ManagerError;
use crate::cache::{EntityCache, LiveFile, LivePackage};
use crate::config::Config;
use crate::dispatch::{JobDispatcher, Occupied};
use crate::events::{ChangeEvent, EntityKind, EventSink};
use crate::executor::{Executor, ExecutorHandle};
use crate::model::{
    FileId, FileRecord, FileStatus, FileView, ListKind, NewFile, NewPackage, PackageId,
    PackageRecord, PackageView, Position,
};
use crate::plugin::{PluginResolver, TransferPlugin};
use crate::store::{check_version, FileStore, StoreError, CURRENT_SCHEMA_VERSION};
use crate::workers::WorkerRegistry;

/// Memoized queue file count, tagged with the change generation it was
/// read under.
#[derive(Debug, Default)]
struct CountMemo {
    generation: u64,
    value: Option<i64>,
}

impl CountMemo {
    fn invalidate(&mut self) {
        self.generation += 1;
        self.value = None;
    }

    /// Keep `value` only if nothing changed since `generation` was read.
    fn store(&mut self, generation: u64, value: i64) {
        if self.generation == generation {
            self.value = Some(value);
        }
    }
}

/// External collaborators the manager talks to.
pub struct Collaborators {
    pub resolver: Arc<dyn PluginResolver>,
    pub workers: Arc<dyn WorkerRegistry>,
    pub events: Arc<dyn EventSink>,
}

/// Entry point for file and package lifecycle operations.
///
/// All methods block the calling thread on the store executor and must not be
/// called from inside an async runtime worker; use `spawn_blocking` there.
pub struct FileManager {
    executor: Executor,
    store: ExecutorHandle,
    cache: EntityCache,
    dispatcher: JobDispatcher,
    resolver: Arc<dyn PluginResolver>,
    workers: Arc<dyn WorkerRegistry>,
    events: Arc<dyn EventSink>,
    /// Held across multi-step structural changes.
    structure: ReentrantMutex<()>,
    file_count: Mutex<CountMemo>,
}

impl FileManager {
    /// Check the schema marker, open the database and start the executor.
    pub fn open(config: &Config, collaborators: Collaborators) -> Result<Self, ManagerError> {
        let check = check_version(&config.store.version_paths(), CURRENT_SCHEMA_VERSION)?;
        debug!(?check, "Checked file database version");

        let store = FileStore::open(&config.store.path)?;
        info!("Opened file database at {:?}", config.store.path);
        Self::with_store(store, config.dispatch.batch_size, collaborators)
    }

    /// Start a manager on an already opened store.
    pub fn with_store(
        store: FileStore,
        batch_size: usize,
        collaborators: Collaborators,
    ) -> Result<Self, ManagerError> {
        let executor = Executor::spawn(store)?;
        let handle = executor.handle().clone();

        Ok(Self {
            cache: EntityCache::new(handle.clone()),
            dispatcher: JobDispatcher::new(handle.clone(), batch_size),
            store: handle,
            executor,
            resolver: collaborators.resolver,
            workers: collaborators.workers,
            events: collaborators.events,
            structure: ReentrantMutex::new(()),
            file_count: Mutex::new(CountMemo::default()),
        })
    }

    /// Handle to the store executor, for callers that need raw store access
    /// or the async `submit` API.
    pub fn executor(&self) -> &ExecutorHandle {
        &self.store
    }

    fn changed(&self) {
        self.file_count.lock().invalidate();
        self.dispatcher.invalidate();
    }

    fn emit(&self, event: ChangeEvent) {
        self.events.push(event);
    }

    fn require_file(&self, id: FileId) -> Result<FileRecord, ManagerError> {
        self.cache
            .get_file(id)?
            .ok_or(ManagerError::FileNotFound(id))
    }

    fn require_package(&self, id: PackageId) -> Result<PackageRecord, ManagerError> {
        self.cache
            .get_package(id)?
            .ok_or(ManagerError::PackageNotFound(id))
    }

    fn package_list(&self, id: PackageId) -> Result<ListKind, ManagerError> {
        Ok(self.require_package(id)?.list)
    }

    /// Raise the abort flag of a file some worker holds and wait for the
    /// worker to let go of it.
    fn abort_live(&self, file: &LiveFile) {
        if !self.workers.is_processing(file.id()) {
            return;
        }
        debug!(file_id = file.id(), "Waiting for worker to abort file");
        file.request_abort();
        self.workers.wait_idle(file.id());
        file.clear_abort();
    }

    // ---------------------------------------------------------------------
    // Inserts
    // ---------------------------------------------------------------------

    /// Add urls to the tail of a package, one file per url.
    pub fn add_links(
        &self,
        urls: &[String],
        package: PackageId,
    ) -> Result<Vec<FileId>, ManagerError> {
        let list = self.package_list(package)?;
        let files: Vec<NewFile> = self
            .resolver
            .resolve_urls(urls)
            .into_iter()
            .map(|resolved| NewFile::from_url(resolved.url, resolved.plugin))
            .collect();
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.structure.lock();
        let added = self.store.submit_sync("add_links", move |store| {
            let ids = store.add_files(&files, package)?;
            let positions: HashMap<FileId, i64> =
                store.file_positions(package)?.into_iter().collect();
            Ok(ids
                .into_iter()
                .filter_map(|id| positions.get(&id).map(|position| (id, *position)))
                .collect::<Vec<_>>())
        })?;
        self.changed();

        for (id, position) in &added {
            self.emit(ChangeEvent::Insert {
                kind: EntityKind::File,
                id: *id,
                list,
                position: *position,
            });
        }
        info!(package_id = package, count = added.len(), "Added links");
        Ok(added.into_iter().map(|(id, _)| id).collect())
    }

    /// Add an empty package to the tail of `list`.
    pub fn add_package(
        &self,
        name: impl Into<String>,
        folder: impl Into<String>,
        list: ListKind,
    ) -> Result<PackageId, ManagerError> {
        let package = NewPackage::new(name, folder).in_list(list);

        let _guard = self.structure.lock();
        let (id, position) = self.store.submit_sync("add_package", move |store| {
            let id = store.add_package(&package)?;
            let stored = store
                .get_package(id)?
                .ok_or(StoreError::PackageNotFound(id))?;
            Ok((id, stored.position))
        })?;
        self.changed();

        self.emit(ChangeEvent::Insert {
            kind: EntityKind::Package,
            id,
            list,
            position,
        });
        info!(package_id = id, list = list.as_str(), "Added package");
        Ok(id)
    }

    // ---------------------------------------------------------------------
    // Deletes
    // ---------------------------------------------------------------------

    /// Delete a package and every file in it.
    ///
    /// Live children are aborted and evicted first; the rows go away in a
    /// single store operation, so no reader sees a partly deleted package.
    pub fn delete_package(&self, id: PackageId) -> Result<(), ManagerError> {
        let _guard = self.structure.lock();
        let list = self.package_list(id)?;

        for file in self.cache.live_files_in_package(id) {
            self.abort_live(&file);
            self.cache.evict_file(file.id());
        }
        self.cache.evict_package(id);

        let positions = self.store.submit_sync("delete_package", move |store| {
            store.delete_package(id)?;
            store.package_positions(list)
        })?;
        self.cache.refresh_package_positions(list, &positions);
        self.changed();

        self.emit(ChangeEvent::Remove {
            kind: EntityKind::Package,
            id,
            list,
        });
        info!(package_id = id, "Deleted package");
        Ok(())
    }

    /// Delete a file, aborting it first if a worker holds it.
    pub fn delete_file(&self, id: FileId) -> Result<(), ManagerError> {
        let _guard = self.structure.lock();
        let file = self.require_file(id)?;
        let list = self.package_list(file.package_id)?;

        if let Some(live) = self.cache.live_file(id) {
            self.abort_live(&live);
            self.cache.evict_file(id);
        }

        let positions = self.store.submit_sync("delete_file", move |store| {
            let deleted = store.delete_file(id)?;
            store.file_positions(deleted.package_id)
        })?;
        self.cache.refresh_file_positions(&positions);
        self.changed();

        self.emit(ChangeEvent::Remove {
            kind: EntityKind::File,
            id,
            list,
        });
        debug!(file_id = id, "Deleted file");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Updates
    // ---------------------------------------------------------------------

    /// Write a live file through to the store.
    pub fn update_file(&self, file: &LiveFile) -> Result<(), ManagerError> {
        let list = self.package_list(file.package_id())?;
        self.cache.sync_file(file);
        self.dispatcher.invalidate();

        self.emit(ChangeEvent::Update {
            kind: EntityKind::File,
            id: file.id(),
            list,
        });
        Ok(())
    }

    /// Write a live package's metadata through to the store.
    pub fn update_package(&self, package: &LivePackage) -> Result<(), ManagerError> {
        self.cache.sync_package(package);
        self.dispatcher.invalidate();

        self.emit(ChangeEvent::Update {
            kind: EntityKind::Package,
            id: package.id(),
            list: package.list(),
        });
        Ok(())
    }

    /// Setting an eligible status puts a handed out file back in the job pool.
    pub fn set_file_status(&self, file: &LiveFile, status: FileStatus) -> Result<(), ManagerError> {
        file.set_status(status);
        if status.is_eligible() {
            file.unclaim();
        }
        self.update_file(file)
    }

    /// Put a file back to `queued`, aborting it if a worker holds it.
    pub fn restart_file(&self, id: FileId) -> Result<(), ManagerError> {
        let file = self.require_file(id)?;
        let list = self.package_list(file.package_id)?;

        if let Some(live) = self.cache.live_file(id) {
            self.abort_live(&live);
            live.update(|record| {
                record.status = FileStatus::Queued;
                record.name = record.url.clone();
            });
            live.clear_wait();
            live.unclaim();
            self.cache.sync_file(&live);
        } else {
            self.store
                .submit_async("restart_file", move |store| store.restart_file(id));
        }
        self.dispatcher.invalidate();

        self.emit(ChangeEvent::Update {
            kind: EntityKind::File,
            id,
            list,
        });
        Ok(())
    }

    /// Put every file of a package back to `queued`.
    pub fn restart_package(&self, id: PackageId) -> Result<(), ManagerError> {
        let list = self.package_list(id)?;

        for file in self.cache.live_files_in_package(id) {
            self.restart_file(file.id())?;
        }
        self.store.submit_async("restart_package", move |store| {
            store.restart_package(id).map(|_| ())
        });
        self.dispatcher.invalidate();

        self.emit(ChangeEvent::Update {
            kind: EntityKind::Package,
            id,
            list,
        });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Ordering
    // ---------------------------------------------------------------------

    /// Move a package to the tail of `list`. Moving to its current list does
    /// nothing.
    pub fn move_package(&self, id: PackageId, list: ListKind) -> Result<(), ManagerError> {
        let _guard = self.structure.lock();
        let current = self.require_package(id)?;
        if current.list == list {
            return Ok(());
        }
        let old = current.list;

        let (moved, old_positions, new_positions) =
            self.store.submit_sync("move_package", move |store| {
                let moved = store.move_package(id, list)?;
                let old_positions = store.package_positions(old)?;
                let new_positions = store.package_positions(list)?;
                Ok((moved, old_positions, new_positions))
            })?;
        self.cache.refresh_package_positions(old, &old_positions);
        self.cache.refresh_package_positions(list, &new_positions);
        self.store.flush();
        self.changed();

        self.emit(ChangeEvent::Remove {
            kind: EntityKind::Package,
            id,
            list: old,
        });
        self.emit(ChangeEvent::Insert {
            kind: EntityKind::Package,
            id,
            list,
            position: moved.position,
        });
        info!(
            package_id = id,
            from = old.as_str(),
            to = list.as_str(),
            "Moved package"
        );
        Ok(())
    }

    /// Move a package to `target` within its list.
    pub fn reorder_package(
        &self,
        id: PackageId,
        target: impl Into<Position>,
    ) -> Result<(), ManagerError> {
        let target = target.into();
        let _guard = self.structure.lock();
        let list = self.package_list(id)?;

        let positions = self.store.submit_sync("reorder_package", move |store| {
            store.reorder_package(id, target)?;
            store.package_positions(list)
        })?;
        self.cache.refresh_package_positions(list, &positions);
        self.store.flush();
        self.changed();

        self.emit(ChangeEvent::Remove {
            kind: EntityKind::Package,
            id,
            list,
        });
        self.emit(ChangeEvent::ReloadAll { list });
        Ok(())
    }

    /// Move a file to `target` within its package.
    pub fn reorder_file(&self, id: FileId, target: impl Into<Position>) -> Result<(), ManagerError> {
        let target = target.into();
        let _guard = self.structure.lock();
        let file = self.require_file(id)?;
        let list = self.package_list(file.package_id)?;

        let positions = self.store.submit_sync("reorder_file", move |store| {
            let moved = store.reorder_file(id, target)?;
            store.file_positions(moved.package_id)
        })?;
        self.cache.refresh_file_positions(&positions);
        self.store.flush();
        self.changed();

        self.emit(ChangeEvent::Remove {
            kind: EntityKind::File,
            id,
            list,
        });
        self.emit(ChangeEvent::ReloadAll { list });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Lookups
    // ---------------------------------------------------------------------

    pub fn get_file(&self, id: FileId) -> Result<Option<FileRecord>, ManagerError> {
        Ok(self.cache.get_file(id)?)
    }

    pub fn get_package(&self, id: PackageId) -> Result<Option<PackageRecord>, ManagerError> {
        Ok(self.cache.get_package(id)?)
    }

    pub fn live_file(&self, id: FileId) -> Option<Arc<LiveFile>> {
        self.cache.live_file(id)
    }

    /// Keep a file live for long-lived work on it.
    pub fn materialize_file(&self, id: FileId) -> Result<Option<Arc<LiveFile>>, ManagerError> {
        Ok(self.cache.materialize_file(id)?)
    }

    /// Keep a package live, e.g. while its metadata is being edited.
    pub fn materialize_package(
        &self,
        id: PackageId,
    ) -> Result<Option<Arc<LivePackage>>, ManagerError> {
        Ok(self.cache.materialize_package(id)?)
    }

    fn merge_live(&self, records: Vec<FileRecord>) -> Vec<FileView> {
        records
            .into_iter()
            .map(|file| match self.cache.live_file(file.id) {
                Some(live) => live.view(),
                None => FileView { file, live: false },
            })
            .collect()
    }

    pub fn get_file_data(&self, id: FileId) -> Result<Option<FileView>, ManagerError> {
        if let Some(live) = self.cache.live_file(id) {
            return Ok(Some(live.view()));
        }
        let file = self
            .store
            .submit_sync("get_file", move |store| store.get_file(id))?;
        Ok(file.map(|file| FileView { file, live: false }))
    }

    /// A package with its files in position order.
    pub fn get_package_data(&self, id: PackageId) -> Result<Option<PackageView>, ManagerError> {
        // Row and children in one operation so a concurrent delete is seen
        // entirely or not at all
        let (stored, files) = self.store.submit_sync("package_data", move |store| {
            Ok((store.get_package(id)?, store.files_in_package(id)?))
        })?;
        let package = match (self.cache.live_package(id), stored) {
            (Some(live), _) => live.snapshot(),
            (None, Some(package)) => package,
            (None, None) => return Ok(None),
        };

        let mut files = self.merge_live(files);
        files.sort_by_key(|view| view.file.position);
        Ok(Some(PackageView { package, files }))
    }

    /// Every package of `list` with its files, live values merged in.
    pub fn get_complete_data(&self, list: ListKind) -> Result<Vec<PackageView>, ManagerError> {
        let (packages, files) = self.store.submit_sync("complete_data", move |store| {
            Ok((store.packages_in_list(list)?, store.files_in_list(list)?))
        })?;

        let mut by_package: HashMap<PackageId, Vec<FileView>> = HashMap::new();
        for view in self.merge_live(files) {
            by_package
                .entry(view.file.package_id)
                .or_default()
                .push(view);
        }

        let mut views: Vec<PackageView> = packages
            .into_iter()
            .map(|record| {
                let package = match self.cache.live_package(record.id) {
                    Some(live) => live.snapshot(),
                    None => record,
                };
                let mut files = by_package.remove(&package.id).unwrap_or_default();
                files.sort_by_key(|view| view.file.position);
                PackageView { package, files }
            })
            .collect();
        views.sort_by_key(|view| view.package.position);
        Ok(views)
    }

    /// Number of files in the queue list.
    pub fn file_count(&self) -> Result<i64, ManagerError> {
        let generation = {
            let memo = self.file_count.lock();
            if let Some(count) = memo.value {
                return Ok(count);
            }
            memo.generation
        };

        let count = self
            .store
            .submit_sync("file_count", |store| store.file_count(ListKind::Queue))?;
        self.file_count.lock().store(generation, count);
        Ok(count)
    }

    // ---------------------------------------------------------------------
    // Jobs
    // ---------------------------------------------------------------------

    /// Hand out a file for a worker that must avoid `occupied`.
    ///
    /// The file is made live and claimed: it is not handed out again until it
    /// is released, restarted, reconnected or put back to an eligible status.
    /// Candidates that went stale since their batch was fetched are skipped.
    pub fn get_job(&self, occupied: &Occupied) -> Result<Option<Arc<LiveFile>>, ManagerError> {
        let _guard = self.structure.lock();
        while let Some(id) = self.dispatcher.acquire(occupied)? {
            let accept = |file: &FileRecord| {
                file.status.is_eligible()
                    && !occupied.contains(&file.plugin)
                    && !self.workers.is_processing(file.id)
            };
            match self.cache.materialize_file_if(id, accept)? {
                Some(file) if file.claim() => return Ok(Some(file)),
                Some(_) => debug!(file_id = id, "Skipping file already handed out"),
                None => debug!(file_id = id, "Skipping stale job candidate"),
            }
        }
        Ok(None)
    }

    /// Build the transfer plugin of a live file.
    pub fn init_plugin(&self, file: &LiveFile) -> Result<Arc<dyn TransferPlugin>, ManagerError> {
        Ok(file.init_plugin(self.resolver.as_ref())?)
    }

    /// Abort a file some worker holds and wait until it has stopped.
    /// Returns whether the file was live.
    pub fn abort_file(&self, id: FileId) -> bool {
        match self.cache.live_file(id) {
            Some(live) => {
                self.abort_live(&live);
                true
            }
            None => false,
        }
    }

    /// Mark a file finished and release it, unless a worker still holds it.
    pub fn finish_if_done(&self, file: &LiveFile) -> Result<bool, ManagerError> {
        if self.workers.is_processing(file.id()) {
            return Ok(false);
        }
        self.set_file_status(file, FileStatus::Finished)?;
        self.cache.release_file(file.id());
        Ok(true)
    }

    /// Sync a live file and drop it from the cache.
    pub fn release_file(&self, id: FileId) -> bool {
        self.cache.release_file(id).is_some()
    }

    pub fn release_package(&self, id: PackageId) -> bool {
        self.cache.release_package(id).is_some()
    }

    // ---------------------------------------------------------------------
    // Durability
    // ---------------------------------------------------------------------

    /// Queue a commit.
    pub fn save(&self) {
        self.store.flush();
    }

    /// Commit and wait until every earlier write is durable.
    pub fn sync_save(&self) -> Result<(), ManagerError> {
        Ok(self.store.sync_flush()?)
    }

    /// Write back every live entity, then stop the executor after a final
    /// commit. Later calls do nothing.
    pub fn shutdown(&self) {
        if !self.store.is_running() {
            return;
        }
        self.cache.sync_all();
        self.executor.shutdown();
        info!("File manager shut down");
    }
}

impl Drop for FileManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockResolver, RecordingSink};
    use crate::workers::ActiveWorkers;

    struct Harness {
        manager: FileManager,
        resolver: Arc<MockResolver>,
        workers: Arc<ActiveWorkers>,
        sink: Arc<RecordingSink>,
    }

    fn harness() -> Harness {
        let resolver = Arc::new(MockResolver::new().with_route("rapid", "RapidPlugin"));
        let workers = ActiveWorkers::new();
        let sink = Arc::new(RecordingSink::new());
        let manager = FileManager::with_store(
            FileStore::in_memory().unwrap(),
            5,
            Collaborators {
                resolver: resolver.clone(),
                workers: workers.clone(),
                events: sink.clone(),
            },
        )
        .unwrap();
        Harness {
            manager,
            resolver,
            workers,
            sink,
        }
    }

    fn file_positions(h: &Harness, package: PackageId) -> Vec<(FileId, i64)> {
        h.manager
            .executor()
            .submit_sync("positions", move |store| store.file_positions(package))
            .unwrap()
    }

    #[test]
    fn test_add_package_emits_insert() {
        let h = harness();
        let a = h.manager.add_package("A", "a", ListKind::Collector).unwrap();
        let b = h.manager.add_package("B", "b", ListKind::Collector).unwrap();

        assert_eq!(
            h.sink.events(),
            vec![
                ChangeEvent::Insert {
                    kind: EntityKind::Package,
                    id: a,
                    list: ListKind::Collector,
                    position: 0,
                },
                ChangeEvent::Insert {
                    kind: EntityKind::Package,
                    id: b,
                    list: ListKind::Collector,
                    position: 1,
                },
            ]
        );
    }

    #[test]
    fn test_add_links_resolves_plugins() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        h.sink.clear();

        let urls = vec![
            "http://rapid.example/1".to_string(),
            "http://other.example/2".to_string(),
        ];
        let ids = h.manager.add_links(&urls, package).unwrap();
        assert_eq!(ids.len(), 2);

        let first = h.manager.get_file(ids[0]).unwrap().unwrap();
        let second = h.manager.get_file(ids[1]).unwrap().unwrap();
        assert_eq!(first.plugin, "RapidPlugin");
        assert_eq!(first.name, first.url);
        assert_eq!(second.plugin, fixtures::MOCK_PLUGIN);
        assert_eq!(second.position, 1);

        let events = h.sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            ChangeEvent::Insert { kind: EntityKind::File, list: ListKind::Queue, position: 1, .. }
        ));
    }

    #[test]
    fn test_add_links_to_missing_package() {
        let h = harness();
        let result = h.manager.add_links(&fixtures::urls("host", 1), 42);
        assert!(matches!(result, Err(ManagerError::PackageNotFound(42))));
    }

    #[test]
    fn test_delete_file_renumbers_and_evicts() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 3), package).unwrap();
        let last = h.manager.materialize_file(ids[2]).unwrap().unwrap();

        h.manager.delete_file(ids[0]).unwrap();

        assert_eq!(file_positions(&h, package), vec![(ids[1], 0), (ids[2], 1)]);
        assert_eq!(last.position(), 1);
        assert!(h.manager.get_file(ids[0]).unwrap().is_none());
        assert!(matches!(
            h.sink.events().last(),
            Some(ChangeEvent::Remove { kind: EntityKind::File, .. })
        ));
    }

    #[test]
    fn test_delete_missing_entities() {
        let h = harness();
        assert!(matches!(
            h.manager.delete_file(9),
            Err(ManagerError::FileNotFound(9))
        ));
        assert!(matches!(
            h.manager.delete_package(9),
            Err(ManagerError::PackageNotFound(9))
        ));
    }

    #[test]
    fn test_delete_package_evicts_children() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 2), package).unwrap();
        h.manager.materialize_file(ids[0]).unwrap();
        h.manager.materialize_package(package).unwrap();

        h.manager.delete_package(package).unwrap();

        assert!(h.manager.live_file(ids[0]).is_none());
        assert!(h.manager.get_package(package).unwrap().is_none());
        assert!(h.manager.get_file(ids[1]).unwrap().is_none());
    }

    #[test]
    fn test_update_file_writes_through() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Collector).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 1), package).unwrap();
        let live = h.manager.materialize_file(ids[0]).unwrap().unwrap();
        h.sink.clear();

        live.update(|r| r.size = 4096);
        h.manager.set_file_status(&live, FileStatus::Offline).unwrap();
        h.manager.release_file(ids[0]);

        let stored = h.manager.get_file(ids[0]).unwrap().unwrap();
        assert_eq!(stored.size, 4096);
        assert_eq!(stored.status, FileStatus::Offline);
        assert_eq!(
            h.sink.events(),
            vec![ChangeEvent::Update {
                kind: EntityKind::File,
                id: ids[0],
                list: ListKind::Collector,
            }]
        );
    }

    #[test]
    fn test_update_package_metadata() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Collector).unwrap();
        let live = h.manager.materialize_package(package).unwrap().unwrap();

        live.update(|r| r.password = "hunter2".to_string());
        h.manager.update_package(&live).unwrap();
        assert!(h.manager.release_package(package));

        let stored = h.manager.get_package(package).unwrap().unwrap();
        assert_eq!(stored.password, "hunter2");
    }

    #[test]
    fn test_move_package_between_lists() {
        let h = harness();
        let a = h.manager.add_package("A", "", ListKind::Collector).unwrap();
        let b = h.manager.add_package("B", "", ListKind::Collector).unwrap();
        let q = h.manager.add_package("Q", "", ListKind::Queue).unwrap();
        let live_b = h.manager.materialize_package(b).unwrap().unwrap();
        h.sink.clear();

        h.manager.move_package(a, ListKind::Queue).unwrap();

        assert_eq!(live_b.position(), 0);
        let moved = h.manager.get_package(a).unwrap().unwrap();
        assert_eq!(moved.list, ListKind::Queue);
        assert_eq!(moved.position, 1);
        assert_eq!(h.manager.get_package(q).unwrap().unwrap().position, 0);
        assert_eq!(
            h.sink.events(),
            vec![
                ChangeEvent::Remove {
                    kind: EntityKind::Package,
                    id: a,
                    list: ListKind::Collector,
                },
                ChangeEvent::Insert {
                    kind: EntityKind::Package,
                    id: a,
                    list: ListKind::Queue,
                    position: 1,
                },
            ]
        );
    }

    #[test]
    fn test_move_package_to_same_list_is_silent() {
        let h = harness();
        let a = h.manager.add_package("A", "", ListKind::Queue).unwrap();
        h.sink.clear();

        h.manager.move_package(a, ListKind::Queue).unwrap();
        assert!(h.sink.events().is_empty());
    }

    #[test]
    fn test_reorder_file_emits_reload() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 3), package).unwrap();
        h.sink.clear();

        h.manager.reorder_file(ids[2], Position::At(0)).unwrap();

        assert_eq!(
            file_positions(&h, package),
            vec![(ids[2], 0), (ids[0], 1), (ids[1], 2)]
        );
        assert_eq!(
            h.sink.events(),
            vec![
                ChangeEvent::Remove {
                    kind: EntityKind::File,
                    id: ids[2],
                    list: ListKind::Queue,
                },
                ChangeEvent::ReloadAll {
                    list: ListKind::Queue
                },
            ]
        );
    }

    #[test]
    fn test_reorder_package_to_last() {
        let h = harness();
        let a = h.manager.add_package("A", "", ListKind::Collector).unwrap();
        let b = h.manager.add_package("B", "", ListKind::Collector).unwrap();
        let c = h.manager.add_package("C", "", ListKind::Collector).unwrap();

        h.manager.reorder_package(a, Position::Last).unwrap();

        let names: Vec<String> = h
            .manager
            .get_complete_data(ListKind::Collector)
            .unwrap()
            .into_iter()
            .map(|view| view.package.name)
            .collect();
        assert_eq!(names, vec!["B", "C", "A"]);
        assert_eq!(h.manager.get_package(b).unwrap().unwrap().position, 0);
        assert_eq!(h.manager.get_package(c).unwrap().unwrap().position, 1);
    }

    #[test]
    fn test_get_job_materializes_file() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 2), package).unwrap();

        let job = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert_eq!(job.id(), ids[0]);
        assert!(Arc::ptr_eq(&job, &h.manager.live_file(ids[0]).unwrap()));
    }

    #[test]
    fn test_get_job_skips_stale_candidates() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 3), package).unwrap();

        let first = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert_eq!(first.id(), ids[0]);

        // Finished behind the dispatcher's back, without invalidation
        let stale = ids[1];
        h.manager
            .executor()
            .submit_sync("finish", move |store| {
                let mut file = store.get_file(stale)?.ok_or(StoreError::FileNotFound(stale))?;
                file.status = FileStatus::Finished;
                store.update_file(&file)
            })
            .unwrap();

        let next = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert_eq!(next.id(), ids[2]);
        assert!(h.manager.live_file(stale).is_none());
    }

    #[test]
    fn test_get_job_ignores_collector() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Collector).unwrap();
        h.manager.add_links(&fixtures::urls("host", 2), package).unwrap();

        assert!(h.manager.get_job(&Occupied::new()).unwrap().is_none());
    }

    #[test]
    fn test_status_change_invalidates_batches() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 1), package).unwrap();

        let job = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert!(h.manager.get_job(&Occupied::new()).unwrap().is_none());

        h.manager.set_file_status(&job, FileStatus::Failed).unwrap();
        h.manager.restart_file(ids[0]).unwrap();

        let again = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert_eq!(again.id(), ids[0]);
    }

    #[test]
    fn test_handed_out_file_survives_batch_invalidation() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 2), package).unwrap();

        let first = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert_eq!(first.id(), ids[0]);

        // The worker has not registered yet; an unrelated insert refills the batch
        let other = h.manager.add_package("c", "", ListKind::Collector).unwrap();
        h.manager.add_links(&fixtures::urls("later", 1), other).unwrap();

        let second = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert_eq!(second.id(), ids[1]);
        assert!(h.manager.get_job(&Occupied::new()).unwrap().is_none());
    }

    #[test]
    fn test_requeued_file_is_handed_out_again() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 1), package).unwrap();

        let job = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert!(job.is_dispatched());
        h.manager.set_file_status(&job, FileStatus::Queued).unwrap();
        assert!(!job.is_dispatched());

        let again = h.manager.get_job(&Occupied::new()).unwrap().unwrap();
        assert_eq!(again.id(), ids[0]);
    }

    #[test]
    fn test_count_memo_drops_value_read_before_change() {
        let mut memo = CountMemo::default();
        let generation = memo.generation;

        memo.invalidate();
        memo.store(generation, 3);
        assert_eq!(memo.value, None);

        memo.store(memo.generation, 4);
        assert_eq!(memo.value, Some(4));
    }

    #[test]
    fn test_file_count_is_memoized_until_change() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        assert_eq!(h.manager.file_count().unwrap(), 0);

        h.manager.add_links(&fixtures::urls("host", 3), package).unwrap();
        assert_eq!(h.manager.file_count().unwrap(), 3);

        let other = h.manager.add_package("c", "", ListKind::Collector).unwrap();
        h.manager.add_links(&fixtures::urls("host", 2), other).unwrap();
        assert_eq!(h.manager.file_count().unwrap(), 3);

        h.manager.move_package(other, ListKind::Queue).unwrap();
        assert_eq!(h.manager.file_count().unwrap(), 5);
    }

    #[test]
    fn test_restart_live_file_resets_name() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 1), package).unwrap();
        let live = h.manager.materialize_file(ids[0]).unwrap().unwrap();
        live.update(|r| {
            r.name = "resolved-name.bin".to_string();
            r.status = FileStatus::Failed;
        });

        h.manager.restart_file(ids[0]).unwrap();

        let snapshot = live.snapshot();
        assert_eq!(snapshot.status, FileStatus::Queued);
        assert_eq!(snapshot.name, snapshot.url);
    }

    #[test]
    fn test_restart_package_requeues_stored_files() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 2), package).unwrap();
        let live = h.manager.materialize_file(ids[1]).unwrap().unwrap();
        h.manager.set_file_status(&live, FileStatus::Offline).unwrap();
        h.manager.release_file(ids[1]);

        h.manager.restart_package(package).unwrap();

        let stored = h.manager.get_file(ids[1]).unwrap().unwrap();
        assert_eq!(stored.status, FileStatus::Queued);
        assert!(matches!(
            h.sink.events().last(),
            Some(ChangeEvent::Update { kind: EntityKind::Package, .. })
        ));
    }

    #[test]
    fn test_finish_if_done() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 1), package).unwrap();
        let live = h.manager.materialize_file(ids[0]).unwrap().unwrap();

        let guard = h.workers.begin(ids[0]);
        assert!(!h.manager.finish_if_done(&live).unwrap());
        drop(guard);

        assert!(h.manager.finish_if_done(&live).unwrap());
        assert!(h.manager.live_file(ids[0]).is_none());
        assert_eq!(
            h.manager.get_file(ids[0]).unwrap().unwrap().status,
            FileStatus::Finished
        );
    }

    #[test]
    fn test_get_file_data_prefers_live_values() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h.manager.add_links(&fixtures::urls("host", 2), package).unwrap();
        let live = h.manager.materialize_file(ids[0]).unwrap().unwrap();
        live.set_status(FileStatus::Downloading);

        let view = h.manager.get_file_data(ids[0]).unwrap().unwrap();
        assert!(view.live);
        assert_eq!(view.file.status, FileStatus::Downloading);

        let cold = h.manager.get_file_data(ids[1]).unwrap().unwrap();
        assert!(!cold.live);

        let package_view = h.manager.get_package_data(package).unwrap().unwrap();
        let statuses: Vec<FileStatus> =
            package_view.files.iter().map(|f| f.file.status).collect();
        assert_eq!(statuses, vec![FileStatus::Downloading, FileStatus::Queued]);
        assert!(h.manager.get_package_data(99).unwrap().is_none());
    }

    #[test]
    fn test_init_plugin_through_resolver() {
        let h = harness();
        let package = h.manager.add_package("p", "", ListKind::Queue).unwrap();
        let ids = h
            .manager
            .add_links(&["http://rapid.example/x".to_string()], package)
            .unwrap();
        let job = h.manager.get_job(&Occupied::new()).unwrap().unwrap();

        let plugin = h.manager.init_plugin(&job).unwrap();
        assert_eq!(plugin.name(), "RapidPlugin");
        assert!(h.resolver.created(ids[0]).is_some());
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let h = harness();
        h.manager.add_package("p", "", ListKind::Queue).unwrap();
        h.manager.shutdown();
        h.manager.shutdown();
        assert!(!h.manager.executor().is_running());
        assert!(matches!(
            h.manager.sync_save(),
            Err(ManagerError::Store(StoreError::ExecutorStopped))
        ));
    }
}
