//! Types for plugin resolution and transfers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::FileRecord;

/// Errors raised by plugin collaborators.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),
}

/// A url paired with the name of the plugin that handles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUrl {
    pub url: String,
    pub plugin: String,
}

impl ResolvedUrl {
    pub fn new(url: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            plugin: plugin.into(),
        }
    }
}

/// Snapshot of a running transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Bytes received so far.
    pub arrived: i64,
    /// Expected total in bytes, 0 when unknown.
    pub total: i64,
    /// Current speed in bytes/second.
    pub speed: i64,
}

impl TransferProgress {
    /// Bytes still to receive.
    pub fn bytes_left(&self) -> i64 {
        (self.total - self.arrived).max(0)
    }

    /// Completion as a whole percentage, 0 when the total is unknown.
    pub fn percent(&self) -> u8 {
        if self.total <= 0 {
            return 0;
        }
        let percent = self.arrived.saturating_mul(100) / self.total;
        percent.clamp(0, 100) as u8
    }
}

/// A pluggable transfer strategy attached to a live file.
///
/// Instances are shared between the worker running the transfer and callers
/// that abort it or read its progress, so every method takes `&self`.
pub trait TransferPlugin: Send + Sync {
    /// Handler name, as stored on the file.
    fn name(&self) -> &str;

    /// Run the transfer to completion on the calling thread.
    fn start(&self) -> Result<(), PluginError>;

    /// Ask a running transfer to stop as soon as it can.
    fn abort(&self);

    /// Clear a previous abort request so the transfer can be retried.
    fn reset_abort(&self) {}

    fn progress(&self) -> TransferProgress;
}

/// Maps urls to plugins and instantiates them.
pub trait PluginResolver: Send + Sync {
    /// Pair every url with the name of its handler, keeping input order.
    fn resolve_urls(&self, urls: &[String]) -> Vec<ResolvedUrl>;

    /// Build a transfer instance of `plugin` for `file`.
    fn create(
        &self,
        plugin: &str,
        file: &FileRecord,
    ) -> Result<Arc<dyn TransferPlugin>, PluginError>;
}
