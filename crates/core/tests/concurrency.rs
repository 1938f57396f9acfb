//! Concurrent access to a single file manager.

use std::sync::Arc;
use std::thread;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linkhoard_core::{
    testing::{fixtures, MockResolver, RecordingSink},
    ActiveWorkers, Collaborators, FileManager, FileStore, ListKind, ManagerError, Occupied,
    Position,
};

/// Route store and manager logs to the test output. Set `RUST_LOG` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

struct TestHarness {
    manager: Arc<FileManager>,
    resolver: Arc<MockResolver>,
    workers: Arc<ActiveWorkers>,
}

impl TestHarness {
    fn new(resolver: MockResolver) -> Self {
        init_tracing();
        let resolver = Arc::new(resolver);
        let workers = ActiveWorkers::new();
        let store = FileStore::in_memory().expect("Failed to open store");
        let manager = FileManager::with_store(
            store,
            5,
            Collaborators {
                resolver: resolver.clone(),
                workers: workers.clone(),
                events: Arc::new(RecordingSink::new()),
            },
        )
        .expect("Failed to start file manager");

        Self {
            manager: Arc::new(manager),
            resolver,
            workers,
        }
    }
}

fn assert_dense(manager: &FileManager, list: ListKind) {
    let data = manager.get_complete_data(list).unwrap();
    for (expected, view) in data.iter().enumerate() {
        assert_eq!(view.package.position, expected as i64);
        for (expected, file) in view.files.iter().enumerate() {
            assert_eq!(file.file.position, expected as i64);
        }
    }
}

#[test]
fn test_concurrent_structural_ops_keep_positions_dense() {
    let harness = TestHarness::new(MockResolver::new());
    let shared = harness
        .manager
        .add_package("shared", "", ListKind::Queue)
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let manager = Arc::clone(&harness.manager);
            thread::spawn(move || {
                let own = manager
                    .add_package(format!("own-{worker}"), "", ListKind::Queue)
                    .unwrap();
                for round in 0..5 {
                    let ids = manager
                        .add_links(&fixtures::urls(&format!("w{worker}r{round}"), 2), shared)
                        .unwrap();
                    manager.reorder_file(ids[1], Position::At(0)).unwrap();
                    manager.delete_file(ids[0]).unwrap();
                    manager.reorder_package(own, Position::At(0)).unwrap();
                }
                manager.move_package(own, ListKind::Collector).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_dense(&harness.manager, ListKind::Queue);
    assert_dense(&harness.manager, ListKind::Collector);
    let view = harness.manager.get_package_data(shared).unwrap().unwrap();
    assert_eq!(view.files.len(), 20);
    assert_eq!(
        harness
            .manager
            .get_complete_data(ListKind::Collector)
            .unwrap()
            .len(),
        4
    );
}

#[test]
fn test_concurrent_readers_get_their_own_results() {
    let harness = TestHarness::new(MockResolver::new());
    let packages: Vec<_> = (0..4)
        .map(|i| {
            let id = harness
                .manager
                .add_package(format!("p{i}"), "", ListKind::Queue)
                .unwrap();
            harness
                .manager
                .add_links(&fixtures::urls(&format!("host{i}"), i + 1), id)
                .unwrap();
            id
        })
        .collect();

    let handles: Vec<_> = packages
        .iter()
        .enumerate()
        .map(|(i, &id)| {
            let manager = Arc::clone(&harness.manager);
            thread::spawn(move || {
                for _ in 0..20 {
                    let view = manager.get_package_data(id).unwrap().unwrap();
                    assert_eq!(view.package.id, id);
                    assert_eq!(view.files.len(), i + 1);
                    assert!(view.files.iter().all(|f| f.file.package_id == id));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_cascade_delete_is_atomic_for_readers() {
    const FILES: usize = 30;

    let harness = TestHarness::new(MockResolver::new());
    let package = harness
        .manager
        .add_package("doomed", "", ListKind::Queue)
        .unwrap();
    harness
        .manager
        .add_links(&fixtures::urls("host", FILES), package)
        .unwrap();

    let reader = {
        let manager = Arc::clone(&harness.manager);
        thread::spawn(move || loop {
            match manager.get_package_data(package).unwrap() {
                Some(view) => assert_eq!(view.files.len(), FILES),
                None => break,
            }
        })
    };

    harness.manager.delete_package(package).unwrap();
    reader.join().unwrap();

    assert!(harness.manager.get_package(package).unwrap().is_none());
    assert_eq!(harness.manager.file_count().unwrap(), 0);
}

#[test]
fn test_delete_waits_for_worker_abort() {
    let harness = TestHarness::new(MockResolver::new().blocking());
    let package = harness
        .manager
        .add_package("p", "", ListKind::Queue)
        .unwrap();
    let ids = harness
        .manager
        .add_links(&fixtures::urls("host", 1), package)
        .unwrap();

    let job = harness
        .manager
        .get_job(&Occupied::new())
        .unwrap()
        .unwrap();
    assert_eq!(job.id(), ids[0]);
    let plugin = harness.manager.init_plugin(&job).unwrap();

    let guard = harness.workers.begin(job.id());
    let worker = thread::spawn(move || {
        let result = plugin.start();
        drop(guard);
        result
    });

    // Blocks until the worker has observed the abort and let go
    harness.manager.delete_file(ids[0]).unwrap();

    let result = worker.join().unwrap();
    assert!(result.is_err());
    assert!(harness.workers.is_empty());
    assert!(harness.manager.live_file(ids[0]).is_none());
    assert!(harness.manager.get_file(ids[0]).unwrap().is_none());
    assert_eq!(harness.resolver.created_count(), 1);
}

#[test]
fn test_get_job_skips_processed_files() {
    let harness = TestHarness::new(MockResolver::new());
    let package = harness
        .manager
        .add_package("p", "", ListKind::Queue)
        .unwrap();
    let ids = harness
        .manager
        .add_links(&fixtures::urls("host", 2), package)
        .unwrap();

    let first = harness
        .manager
        .get_job(&Occupied::new())
        .unwrap()
        .unwrap();
    let _guard = harness.workers.begin(first.id());

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let manager = Arc::clone(&harness.manager);
            thread::spawn(move || {
                manager
                    .get_job(&Occupied::new())
                    .unwrap()
                    .map(|file| file.id())
            })
        })
        .collect();
    let handed: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert!(handed.iter().all(|id| *id != Some(ids[0])));
    assert_eq!(handed.iter().filter(|id| id.is_some()).count(), 1);
}

#[test]
fn test_missing_entities_are_reported() {
    let harness = TestHarness::new(MockResolver::new());

    assert!(matches!(
        harness.manager.delete_package(404),
        Err(ManagerError::PackageNotFound(404))
    ));
    assert!(matches!(
        harness.manager.reorder_file(404, Position::Last),
        Err(ManagerError::FileNotFound(404))
    ));
}
