//! Entity model shared by the store, cache, dispatcher and manager.

mod types;

pub use types::*;
