//! # Facade
//!
//! [`Unversion`] ties one active [`PromptStore`] to one [`UsageStore`] and an
//! optional [`TraceSink`]. Applications can hold their own handle, or use the
//! free functions at the bottom of this module, which share a process-wide
//! handle configured from the environment on first use.
//!
//! Informational calls never fail here: a missing prompt formats to an empty
//! string and [`Unversion::log_usage`] logs its own errors. Queries against the
//! usage log return errors, since the caller asked for data it did not get.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::config::UnversionConfig;
use crate::error::UsageError;
use crate::prompt::PromptValue;
use crate::store::{LoadOutcome, PromptStore};
use crate::trace::{self, LangfuseSink, TraceSink};
use crate::usage::{
    RecentFilter, TopPrompt, UNKNOWN_HASH, UsageEvent, UsageLog, UsageStats, UsageStore,
    hash_prompt,
};

pub struct Unversion {
    prompts: RwLock<Arc<PromptStore>>,
    usage_path: Option<PathBuf>,
    usage: RwLock<Option<Arc<UsageStore>>>,
    sink: Option<Arc<dyn TraceSink>>,
}

impl Unversion {
    /// Builds a handle with an empty prompt store. The usage database is not
    /// touched until the first usage call.
    pub fn new(config: UnversionConfig) -> Unversion {
        let sink = config.langfuse.and_then(|langfuse| match LangfuseSink::new(langfuse) {
            Ok(sink) => {
                info!("langfuse tracing enabled");
                Some(Arc::new(sink) as Arc<dyn TraceSink>)
            }
            Err(e) => {
                warn!(error = %e, "failed to initialize langfuse, tracing disabled");
                None
            }
        });

        Unversion {
            prompts: RwLock::new(Arc::new(PromptStore::new())),
            usage_path: config.db_path,
            usage: RwLock::new(None),
            sink,
        }
    }

    pub fn from_env() -> Unversion {
        Unversion::new(UnversionConfig::from_env())
    }

    /// A handle that records usage at `path` and forwards nowhere.
    pub fn with_usage_path(path: impl Into<PathBuf>) -> Unversion {
        Unversion::new(UnversionConfig {
            db_path: Some(path.into()),
            langfuse: None,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Unversion {
        self.sink = Some(sink);
        self
    }

    /// Loads `path` into a fresh store and makes it the active one.
    ///
    /// Callers still holding the previous store keep a consistent view of it.
    pub fn init_store(&self, path: impl Into<PathBuf>) -> Arc<PromptStore> {
        let store = Arc::new(PromptStore::open(path));
        let mut active = self.prompts.write().unwrap_or_else(PoisonError::into_inner);
        *active = Arc::clone(&store);
        store
    }

    pub fn store(&self) -> Arc<PromptStore> {
        Arc::clone(&self.prompts.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Formats the prompt at `key`, or returns an empty string if it is unknown.
    pub fn get_prompt<I, K, V>(&self, key: &str, variables: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: PromptValue,
    {
        match self.store().get(key) {
            Some(prompt) => prompt.format(variables),
            None => {
                warn!(key, "prompt not found");
                String::new()
            }
        }
    }

    pub fn list_prompts(&self) -> Vec<String> {
        self.store().list_keys()
    }

    pub fn has_prompt(&self, key: &str) -> bool {
        self.store().has(key)
    }

    pub fn reload_prompts(&self) -> LoadOutcome {
        self.store().reload()
    }

    /// Opens the usage database at `path` and makes it the active one.
    pub fn init_usage_store(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<Arc<UsageStore>, UsageError> {
        let store = Arc::new(UsageStore::open(path)?);
        let mut active = self.usage.write().unwrap_or_else(PoisonError::into_inner);
        *active = Some(Arc::clone(&store));
        Ok(store)
    }

    /// The active usage store, opening the configured database on first use.
    pub fn usage(&self) -> Result<Arc<UsageStore>, UsageError> {
        if let Some(store) = self.usage.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(store));
        }

        let mut active = self.usage.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(store) = active.as_ref() {
            return Ok(Arc::clone(store));
        }

        let path = self.usage_path.clone().ok_or(UsageError::NoHomeDir)?;
        let store = Arc::new(UsageStore::open(path)?);
        *active = Some(Arc::clone(&store));
        Ok(store)
    }

    /// Records one prompt invocation and returns its id.
    ///
    /// Never fails: storage errors are logged and the id is still returned.
    /// When the event carries no prompt text, the active store's unformatted
    /// template is hashed instead. A configured trace sink receives a copy in
    /// the background.
    pub fn log_usage(&self, mut event: UsageEvent) -> String {
        let prompt_text = event
            .prompt_text
            .take()
            .or_else(|| self.store().get(&event.prompt_key).map(|p| p.text().to_string()));

        let prompt_hash = match prompt_text.as_deref() {
            Some(text) if !text.is_empty() => hash_prompt(text),
            _ => UNKNOWN_HASH.to_string(),
        };

        let entry = UsageLog::from_event(event, prompt_hash);
        let id = entry.id.clone();

        match self.usage().and_then(|store| store.log(&entry)) {
            Ok(()) => {
                if let Some(sink) = &self.sink {
                    trace::forward(Arc::clone(sink), entry);
                }
            }
            Err(e) => {
                warn!(prompt_key = %entry.prompt_key, error = %e, "failed to log usage");
            }
        }

        id
    }

    pub fn get_stats(&self, prompt_key: &str) -> Result<UsageStats, UsageError> {
        self.usage()?.get_stats(prompt_key)
    }

    pub fn get_recent_logs(&self, filter: &RecentFilter) -> Result<Vec<UsageLog>, UsageError> {
        self.usage()?.get_recent(filter)
    }

    pub fn get_top_prompts(&self, limit: usize) -> Result<Vec<TopPrompt>, UsageError> {
        self.usage()?.get_top_prompts(limit)
    }
}

static GLOBAL: Lazy<Unversion> = Lazy::new(Unversion::from_env);

/// The process-wide handle behind the free functions.
pub fn global() -> &'static Unversion {
    &GLOBAL
}

/// Loads `path` as the process-wide prompt store.
///
/// ```rust,no_run
/// unversion_core::init_store("prompts/bundled.json");
/// let prompt = unversion_core::get_prompt("greeting", [("name", "Alice")]);
/// ```
pub fn init_store(path: impl Into<PathBuf>) -> Arc<PromptStore> {
    GLOBAL.init_store(path)
}

pub fn get_store() -> Arc<PromptStore> {
    GLOBAL.store()
}

pub fn get_prompt<I, K, V>(key: &str, variables: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: PromptValue,
{
    GLOBAL.get_prompt(key, variables)
}

pub fn list_prompts() -> Vec<String> {
    GLOBAL.list_prompts()
}

pub fn has_prompt(key: &str) -> bool {
    GLOBAL.has_prompt(key)
}

pub fn reload_prompts() -> LoadOutcome {
    GLOBAL.reload_prompts()
}

/// Points the process-wide usage log at `path` instead of the default.
pub fn init_usage_store(path: impl Into<PathBuf>) -> Result<Arc<UsageStore>, UsageError> {
    GLOBAL.init_usage_store(path)
}

pub fn log_usage(event: UsageEvent) -> String {
    GLOBAL.log_usage(event)
}

pub fn get_stats(prompt_key: &str) -> Result<UsageStats, UsageError> {
    GLOBAL.get_stats(prompt_key)
}

pub fn get_recent_logs(filter: &RecentFilter) -> Result<Vec<UsageLog>, UsageError> {
    GLOBAL.get_recent_logs(filter)
}

pub fn get_top_prompts(limit: usize) -> Result<Vec<TopPrompt>, UsageError> {
    GLOBAL.get_top_prompts(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;
    use crate::trace::BoxFuture;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "version": "1.0",
        "prompts": {
            "greeting": {"text": "Hello {name}!", "variables": ["name"]},
            "analysis.sentiment": {"text": "Analyze: {text}", "variables": ["text"]}
        }
    }"#;

    fn write_prompts(dir: &Path) -> PathBuf {
        let path = dir.join("prompts.json");
        fs::write(&path, SAMPLE).unwrap();
        path
    }

    fn handle(dir: &Path) -> Unversion {
        let unversion = Unversion::with_usage_path(dir.join("usage.db"));
        unversion.init_store(write_prompts(dir));
        unversion
    }

    struct ChannelSink {
        sent: Mutex<mpsc::Sender<UsageLog>>,
    }

    impl TraceSink for ChannelSink {
        fn name(&self) -> &'static str {
            "channel"
        }

        fn record<'a>(&'a self, entry: &'a UsageLog) -> BoxFuture<'a, Result<(), TraceError>> {
            Box::pin(async move {
                let _ = self.sent.lock().unwrap().send(entry.clone());
                Ok(())
            })
        }
    }

    #[test]
    fn test_prompt_functions() {
        let temp_dir = TempDir::new().unwrap();
        let unversion = handle(temp_dir.path());

        assert!(unversion.has_prompt("greeting"));
        assert!(!unversion.has_prompt("nonexistent"));
        assert_eq!(vec!["analysis.sentiment", "greeting"], unversion.list_prompts());
        assert_eq!("Hello Bob!", unversion.get_prompt("greeting", [("name", "Bob")]));
        assert_eq!("", unversion.get_prompt("nonexistent", [("name", "Bob")]));
        assert!(unversion.reload_prompts().is_loaded());
    }

    #[test]
    fn test_empty_handle() {
        let temp_dir = TempDir::new().unwrap();
        let unversion = Unversion::with_usage_path(temp_dir.path().join("usage.db"));
        assert!(unversion.list_prompts().is_empty());
        assert!(matches!(unversion.reload_prompts(), LoadOutcome::Unbound));
        assert!(!temp_dir.path().join("usage.db").exists());
    }

    #[test]
    fn test_init_store_swaps_whole_store() {
        let temp_dir = TempDir::new().unwrap();
        let unversion = handle(temp_dir.path());
        let previous = unversion.store();

        let other = temp_dir.path().join("other.json");
        fs::write(&other, r#"{"prompts": {"farewell": {"text": "Bye"}}}"#).unwrap();
        let current = unversion.init_store(&other);

        assert_eq!(vec!["farewell"], unversion.list_prompts());
        assert_eq!(Some(other.as_path()), current.path());
        assert_eq!(2, previous.len());
    }

    #[test]
    fn test_log_usage_hashes_store_template() {
        let temp_dir = TempDir::new().unwrap();
        let unversion = handle(temp_dir.path());

        let id = unversion.log_usage(
            UsageEvent::new("greeting", "chat")
                .model("gpt-4")
                .variable("name", "Alice")
                .latency_ms(150.0),
        );

        let recent = unversion.get_recent_logs(&RecentFilter::default()).unwrap();
        assert_eq!(1, recent.len());
        assert_eq!(id, recent[0].id);
        assert_eq!(hash_prompt("Hello {name}!"), recent[0].prompt_hash);
        assert_eq!("Alice", recent[0].variables_used["name"]);
        assert_eq!(Some("gpt-4".to_string()), recent[0].model);
    }

    #[test]
    fn test_log_usage_prefers_supplied_text() {
        let temp_dir = TempDir::new().unwrap();
        let unversion = handle(temp_dir.path());

        unversion.log_usage(UsageEvent::new("greeting", "chat").prompt_text("Hello Alice!"));
        unversion.log_usage(UsageEvent::new("nonexistent", "chat"));

        let greeting = unversion
            .get_recent_logs(&RecentFilter::default().prompt_key("greeting"))
            .unwrap();
        assert_eq!(hash_prompt("Hello Alice!"), greeting[0].prompt_hash);

        let missing = unversion
            .get_recent_logs(&RecentFilter::default().prompt_key("nonexistent"))
            .unwrap();
        assert_eq!(UNKNOWN_HASH, missing[0].prompt_hash);
    }

    #[test]
    fn test_log_usage_and_stats() {
        let temp_dir = TempDir::new().unwrap();
        let unversion = handle(temp_dir.path());

        for i in 0..5 {
            unversion.log_usage(UsageEvent::new("greeting", "chat").success(i != 0));
        }

        let stats = unversion.get_stats("greeting").unwrap();
        assert_eq!(5, stats.total_usage);
        assert_eq!(80.0, stats.success_rate);

        let top = unversion.get_top_prompts(10).unwrap();
        assert_eq!("greeting", top[0].prompt_key);
    }

    #[test]
    fn test_log_usage_never_fails() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let unversion = Unversion::with_usage_path(blocker.join("usage.db"));
        let id = unversion.log_usage(UsageEvent::new("greeting", "chat"));

        assert!(!id.is_empty());
        assert!(unversion.get_stats("greeting").is_err());
    }

    #[test]
    fn test_missing_db_path_fails_queries_only() {
        let unversion = Unversion::new(UnversionConfig {
            db_path: None,
            langfuse: None,
        });
        assert!(!unversion.log_usage(UsageEvent::new("k", "s")).is_empty());
        assert!(matches!(unversion.get_top_prompts(5), Err(UsageError::NoHomeDir)));
    }

    #[test]
    fn test_init_usage_store_redirects_log() {
        let temp_dir = TempDir::new().unwrap();
        let unversion = handle(temp_dir.path());
        unversion.log_usage(UsageEvent::new("greeting", "chat"));

        let store = unversion
            .init_usage_store(temp_dir.path().join("other.db"))
            .unwrap();
        assert_eq!(0, store.count().unwrap());

        unversion.log_usage(UsageEvent::new("greeting", "chat"));
        assert_eq!(1, store.count().unwrap());
    }

    #[test]
    fn test_log_usage_forwards_to_sink() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let unversion = handle(temp_dir.path()).with_sink(Arc::new(ChannelSink {
            sent: Mutex::new(tx),
        }));

        let id = unversion.log_usage(UsageEvent::new("greeting", "chat").session("s-1"));

        let forwarded = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("Expected forwarded entry");
        assert_eq!(id, forwarded.id);
        assert_eq!(Some("s-1".to_string()), forwarded.session_id);
    }

    struct GatedSink {
        release: tokio::sync::Notify,
        sent: Mutex<mpsc::Sender<String>>,
    }

    impl TraceSink for GatedSink {
        fn name(&self) -> &'static str {
            "gated"
        }

        fn record<'a>(&'a self, entry: &'a UsageLog) -> BoxFuture<'a, Result<(), TraceError>> {
            Box::pin(async move {
                self.release.notified().await;
                let _ = self.sent.lock().unwrap().send(entry.id.clone());
                Ok(())
            })
        }
    }

    #[test]
    fn test_log_usage_does_not_wait_for_sink() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let sink = Arc::new(GatedSink {
            release: tokio::sync::Notify::new(),
            sent: Mutex::new(tx),
        });
        let unversion = handle(temp_dir.path()).with_sink(sink.clone());

        let started = Instant::now();
        let id = unversion.log_usage(UsageEvent::new("greeting", "chat"));
        assert!(started.elapsed() < Duration::from_secs(2));

        // The sink is still parked, yet the entry is already stored
        assert!(rx.try_recv().is_err());
        let recent = unversion.get_recent_logs(&RecentFilter::default()).unwrap();
        assert_eq!(id, recent[0].id);

        sink.release.notify_one();
        assert_eq!(id, rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn test_global_prompt_functions() {
        let temp_dir = TempDir::new().unwrap();
        init_store(write_prompts(temp_dir.path()));

        assert!(has_prompt("greeting"));
        assert!(!has_prompt("nonexistent"));
        assert!(list_prompts().contains(&"greeting".to_string()));
        assert_eq!("Hello Bob!", get_prompt("greeting", [("name", "Bob")]));
        assert_eq!("", get_prompt("nonexistent", Vec::<(&str, &str)>::new()));
        assert_eq!(2, get_store().len());
        assert!(reload_prompts().is_loaded());
    }
}
