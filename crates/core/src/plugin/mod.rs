//! Plugin collaborators.
//!
//! The core never performs transfers itself. A [`PluginResolver`] maps raw
//! urls to handler names and builds a [`TransferPlugin`] for a file on demand.

mod types;

pub use types::*;
