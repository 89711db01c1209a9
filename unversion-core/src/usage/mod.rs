//! # Usage tracking
//!
//! Records every use of a prompt in a local SQLite database and answers the
//! aggregate questions reporting tools ask: per-key stats, the recent feed,
//! and the most used prompts.

pub mod log;
pub mod schema;
pub mod store;

pub use log::*;
pub use store::*;
