//! Schema version marker kept next to the database file.
//!
//! When the marker is behind [`CURRENT_SCHEMA_VERSION`] the old database is
//! renamed to the backup path and a fresh one is created on open. Nothing is
//! migrated.

use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use super::StoreError;

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Locations involved in the version check.
#[derive(Debug, Clone)]
pub struct VersionPaths {
    pub marker: PathBuf,
    pub database: PathBuf,
    pub backup: PathBuf,
}

/// Outcome of [`check_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheck {
    /// No marker existed; one was written.
    Fresh,
    /// Marker is at or ahead of the current version.
    Current,
    /// The database was archived to the backup path.
    Archived { found: u32 },
}

/// Compare the stored marker against `current` and archive an outdated store.
pub fn check_version(paths: &VersionPaths, current: u32) -> Result<VersionCheck, StoreError> {
    if !paths.marker.exists() {
        fs::write(&paths.marker, current.to_string())?;
        return Ok(VersionCheck::Fresh);
    }

    let raw = fs::read_to_string(&paths.marker)?;
    let found = match raw.trim().parse::<u32>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Unreadable schema version marker {:?}: {:?}", paths.marker, raw);
            0
        }
    };

    if found >= current {
        return Ok(VersionCheck::Current);
    }

    warn!(
        "File database schema {} is older than {}; archiving {:?} to {:?}",
        found, current, paths.database, paths.backup
    );
    if paths.database.exists() {
        fs::rename(&paths.database, &paths.backup)?;
    } else {
        info!("No database at {:?} to archive", paths.database);
    }
    fs::write(&paths.marker, current.to_string())?;

    Ok(VersionCheck::Archived { found })
}
