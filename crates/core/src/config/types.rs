use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::dispatch::DEFAULT_BATCH_SIZE;
use crate::store::VersionPaths;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

/// File database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Schema version marker kept next to the database.
    #[serde(default = "default_version_file")]
    pub version_file: PathBuf,
    /// Where an outdated database is moved before a fresh one is created.
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            version_file: default_version_file(),
            backup_path: default_backup_path(),
        }
    }
}

impl StoreConfig {
    pub fn version_paths(&self) -> VersionPaths {
        VersionPaths {
            marker: self.version_file.clone(),
            database: self.path.clone(),
            backup: self.backup_path.clone(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("files.db")
}

fn default_version_file() -> PathBuf {
    PathBuf::from("files.version")
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("files.backup.db")
}

/// Job dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Candidates fetched per query.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Change event configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slower subscribers lag.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

fn default_capacity() -> usize {
    256
}
