//! # Errors
//!
//! Error types for the three stateful pieces of the crate. Prompt store errors
//! never escape a load (they are logged and reported through
//! [`LoadOutcome`](crate::store::LoadOutcome)), usage errors propagate from
//! queries, and trace errors are only ever logged.

use thiserror::Error;

/// Failure while reading or parsing a prompts file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid prompts file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure while writing to or querying the usage database.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid usage entry: {0}")]
    InvalidEntry(String),

    #[error("Could not resolve a home directory for the default usage database")]
    NoHomeDir,
}

/// Failure while forwarding a usage event to the external trace sink.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Trace sink rejected the event with status {status}: {body}")]
    Rejected { status: u16, body: String },
}
