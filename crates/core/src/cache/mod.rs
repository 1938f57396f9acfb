//! Write-through cache of live files and packages.
//!
//! An entity becomes live when a caller starts long-lived work on it (a
//! dispatched job, an edit in progress). While live, the cached copy is the
//! source of truth; [`EntityCache::sync_file`] pushes it to the store and
//! [`EntityCache::release_file`] pushes it and evicts it. Lookups for entities
//! that are not live fall through to the store without populating the cache.

mod entity_cache;
mod live;

pub use entity_cache::EntityCache;
pub use live::{LiveFile, LivePackage};
