//! Job dispatch.
//!
//! Workers ask for a file to process while naming the plugins that other
//! workers already occupy. Candidates are fetched a small batch at a time and
//! handed out from memory until the batch runs dry or a mutation invalidates
//! it.

mod dispatcher;

pub use dispatcher::{JobDispatcher, Occupied, DEFAULT_BATCH_SIZE};
