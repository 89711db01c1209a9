//! # unversion Core
//!
//! This crate provides the core functionality for unversion, a prompt registry
//! with usage tracking.
//!
//! Prompts live in a single JSON file, are loaded once into an in-memory
//! store, and are formatted by name at runtime. Every invocation can be
//! recorded to a local SQLite usage log, and optionally forwarded to Langfuse.
//!
//! # Modules
//!
//! - [`parser`] - Tolerant `{name}` placeholder scanning
//! - [`prompt`] - Prompt templates and formatting
//! - [`registry`] - The prompts file format and its validator
//! - [`store`] - The in-memory prompt store
//! - [`usage`] - Usage events, the SQLite usage log and its queries
//! - [`trace`] - Optional forwarding of usage events
//! - [`facade`] - The [`Unversion`] handle and process-wide helpers
//!
//! # Examples
//!
//! ```rust
//! use unversion_core::{Unversion, UsageEvent};
//! use tempfile::TempDir;
//!
//! let temp_dir = TempDir::new().unwrap();
//! let prompts = temp_dir.path().join("prompts.json");
//! std::fs::write(&prompts, r#"{"prompts": {"greeting": {"text": "Hello {name}!"}}}"#).unwrap();
//!
//! let unversion = Unversion::with_usage_path(temp_dir.path().join("usage.db"));
//! unversion.init_store(&prompts);
//!
//! assert_eq!("Hello Alice!", unversion.get_prompt("greeting", [("name", "Alice")]));
//!
//! unversion.log_usage(UsageEvent::new("greeting", "chat").latency_ms(120.0));
//! assert_eq!(1, unversion.get_stats("greeting").unwrap().total_usage);
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod parser;
pub mod prompt;
pub mod registry;
pub mod runtime;
pub mod store;
pub mod trace;
pub mod usage;

pub use config::UnversionConfig;
pub use error::{StoreError, TraceError, UsageError};
pub use facade::{
    Unversion, get_prompt, get_recent_logs, get_stats, get_store, get_top_prompts, global,
    has_prompt, init_store, init_usage_store, list_prompts, log_usage, reload_prompts,
};
pub use prompt::{Prompt, PromptValue};
pub use registry::{PromptEntry, PromptsFile, ValidationReport};
pub use store::{LoadOutcome, PromptStore};
pub use usage::{RecentFilter, TopPrompt, UsageEvent, UsageLog, UsageStats, UsageStore};
