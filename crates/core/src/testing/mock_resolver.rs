//! Mock plugin resolver for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::fixtures::MOCK_PLUGIN;
use super::MockPlugin;
use crate::model::{FileId, FileRecord};
use crate::plugin::{PluginError, PluginResolver, ResolvedUrl, TransferPlugin};

/// Mock implementation of the PluginResolver trait.
///
/// Urls are matched against substring routes in insertion order; anything
/// unmatched resolves to [`MOCK_PLUGIN`]. Every created plugin is recorded by
/// file id for later inspection.
#[derive(Debug)]
pub struct MockResolver {
    /// (url substring, plugin name)
    routes: Vec<(String, String)>,
    blocking: bool,
    rejected: Mutex<HashSet<String>>,
    created: Mutex<HashMap<FileId, Arc<MockPlugin>>>,
}

impl Default for MockResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResolver {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            blocking: false,
            rejected: Mutex::new(HashSet::new()),
            created: Mutex::new(HashMap::new()),
        }
    }

    /// Route urls containing `pattern` to `plugin`.
    pub fn with_route(mut self, pattern: impl Into<String>, plugin: impl Into<String>) -> Self {
        self.routes.push((pattern.into(), plugin.into()));
        self
    }

    /// Create blocking plugins, see [`MockPlugin::blocking`].
    pub fn blocking(mut self) -> Self {
        self.blocking = true;
        self
    }

    /// Make `create` fail for `plugin`.
    pub fn reject_plugin(&self, plugin: impl Into<String>) {
        self.rejected.lock().insert(plugin.into());
    }

    /// The plugin created most recently for `file`.
    pub fn created(&self, file: FileId) -> Option<Arc<MockPlugin>> {
        self.created.lock().get(&file).cloned()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl PluginResolver for MockResolver {
    fn resolve_urls(&self, urls: &[String]) -> Vec<ResolvedUrl> {
        urls.iter()
            .map(|url| {
                let plugin = self
                    .routes
                    .iter()
                    .find(|(pattern, _)| url.contains(pattern.as_str()))
                    .map(|(_, plugin)| plugin.as_str())
                    .unwrap_or(MOCK_PLUGIN);
                ResolvedUrl::new(url.clone(), plugin)
            })
            .collect()
    }

    fn create(
        &self,
        plugin: &str,
        file: &FileRecord,
    ) -> Result<Arc<dyn TransferPlugin>, PluginError> {
        if self.rejected.lock().contains(plugin) {
            return Err(PluginError::UnknownPlugin(plugin.to_string()));
        }

        let instance = Arc::new(if self.blocking {
            MockPlugin::blocking(plugin)
        } else {
            MockPlugin::new(plugin)
        });
        self.created.lock().insert(file.id, Arc::clone(&instance));
        Ok(instance)
    }
}
