pub mod cache;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod executor;
pub mod manager;
pub mod metrics;
pub mod model;
pub mod plugin;
pub mod store;
pub mod testing;
pub mod workers;

pub use cache::{EntityCache, LiveFile, LivePackage};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DispatchConfig,
    EventsConfig, StoreConfig,
};
pub use dispatch::{JobDispatcher, Occupied};
pub use events::{ChangeEvent, EntityKind, EventBroadcaster, EventSink, NullSink};
pub use executor::{Executor, ExecutorHandle};
pub use manager::{Collaborators, FileManager, ManagerError};
pub use model::{
    FileId, FileRecord, FileStatus, FileView, ListKind, NewFile, NewPackage, PackageId,
    PackageRecord, PackageView, Position,
};
pub use plugin::{PluginError, PluginResolver, ResolvedUrl, TransferPlugin, TransferProgress};
pub use store::{FileStore, StoreError};
pub use workers::{ActiveWorkers, WorkGuard, WorkerRegistry};
