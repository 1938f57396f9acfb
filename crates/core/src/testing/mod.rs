//! Testing utilities and mock collaborators.
//!
//! This module provides mock implementations of the plugin resolver, transfer
//! plugins and event sink, so the manager can be exercised without real
//! transfers.
//!
//! # Example
//!
//! ```rust,ignore
//! use linkhoard_core::testing::{MockResolver, RecordingSink};
//!
//! let resolver = MockResolver::new().with_route("rapid", "RapidPlugin");
//! let sink = RecordingSink::new();
//!
//! // Build a FileManager with them, then inspect what happened
//! let events = sink.events();
//! let plugin = resolver.created(file_id).unwrap();
//! plugin.finish();
//! ```

mod mock_plugin;
mod mock_resolver;
mod recording_sink;

pub use mock_plugin::MockPlugin;
pub use mock_resolver::MockResolver;
pub use recording_sink::RecordingSink;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::model::{
        FileId, FileRecord, FileStatus, ListKind, PackageId, PackageRecord,
    };

    /// Plugin name used by fixtures and by [`super::MockResolver`] by default.
    pub const MOCK_PLUGIN: &str = "MockPlugin";

    /// Create a queued file record with reasonable defaults.
    pub fn file_record(id: FileId, package_id: PackageId, position: i64) -> FileRecord {
        let url = format!("http://example.com/file{}", id);
        FileRecord {
            id,
            name: url.clone(),
            url,
            size: 0,
            status: FileStatus::Queued,
            plugin: MOCK_PLUGIN.to_string(),
            error: String::new(),
            position,
            package_id,
        }
    }

    /// Create a package record in `list`.
    pub fn package_record(id: PackageId, list: ListKind, position: i64) -> PackageRecord {
        PackageRecord {
            id,
            name: format!("package{}", id),
            folder: format!("downloads/package{}", id),
            site: String::new(),
            password: String::new(),
            list,
            position,
            priority: 0,
        }
    }

    /// `count` distinct urls on a host.
    pub fn urls(host: &str, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("http://{}/file{}", host, i))
            .collect()
    }
}
