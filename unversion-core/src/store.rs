//! # Prompt Store
//!
//! This module provides the in-memory prompt catalog loaded from a JSON prompts
//! file (see [`registry`](crate::registry) for the format).
//!
//! Loading is best-effort: a missing or malformed file is logged and the
//! previously loaded prompts stay in place. Every load parses the whole file
//! first and then publishes the new catalog with a single swap, so concurrent
//! readers see either the old prompts or the new ones, never a mix.
//!
//! # Examples
//!
//! ```rust
//! use unversion_core::store::PromptStore;
//! use tempfile::TempDir;
//!
//! let temp_dir = TempDir::new().unwrap();
//! let path = temp_dir.path().join("prompts.json");
//! std::fs::write(&path, r#"{"prompts": {"greeting": {"text": "Hello {name}!"}}}"#).unwrap();
//!
//! let store = PromptStore::open(&path);
//! let prompt = store.get("greeting").unwrap();
//! assert_eq!(prompt.format([("name", "Alice")]), "Hello Alice!");
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{error, info, warn};

use crate::error::StoreError;
use crate::prompt::Prompt;
use crate::registry::{DEFAULT_VERSION, PromptEntry, PromptsFile};

#[derive(Debug)]
struct Catalog {
    version: String,
    prompts: HashMap<String, Prompt>,
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog {
            version: DEFAULT_VERSION.to_string(),
            prompts: HashMap::new(),
        }
    }
}

impl From<PromptsFile> for Catalog {
    fn from(file: PromptsFile) -> Self {
        let prompts = file
            .prompts
            .into_iter()
            .map(|(key, entry)| (key.clone(), Prompt::from_entry(key, entry)))
            .collect();
        Catalog {
            version: file.version,
            prompts,
        }
    }
}

/// What a load or reload did to the store.
#[derive(Debug)]
pub enum LoadOutcome {
    /// The file was parsed and its prompts replaced the previous ones.
    Loaded { count: usize },
    /// The bound file does not exist; the store is unchanged.
    NotFound,
    /// Reading or parsing failed; the store is unchanged.
    Failed(StoreError),
    /// The store has no path to load from.
    Unbound,
}

impl LoadOutcome {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// A thread-safe catalog of prompts backed by one JSON file.
#[derive(Debug, Default)]
pub struct PromptStore {
    path: Option<PathBuf>,
    catalog: RwLock<Arc<Catalog>>,
    // Held from read to publish so an older read never replaces a newer one
    loading: Mutex<()>,
}

impl PromptStore {
    /// Creates an empty store that is not bound to any file.
    pub fn new() -> PromptStore {
        PromptStore::default()
    }

    /// Creates a store bound to `path` and performs the initial load.
    ///
    /// A missing or malformed file leaves the store empty; check
    /// [`reload`](Self::reload) or the logs if that matters to the caller.
    pub fn open(path: impl Into<PathBuf>) -> PromptStore {
        let mut store = PromptStore::new();
        store.init(path);
        store
    }

    /// Binds the store to `path` and loads it.
    pub fn init(&mut self, path: impl Into<PathBuf>) -> LoadOutcome {
        self.path = Some(path.into());
        self.load()
    }

    fn load(&self) -> LoadOutcome {
        let Some(path) = self.path.as_deref() else {
            return LoadOutcome::Unbound;
        };

        let _loading = self.loading.lock().unwrap_or_else(PoisonError::into_inner);

        if !path.exists() {
            warn!(path = %path.display(), "prompts file not found");
            return LoadOutcome::NotFound;
        }

        match PromptsFile::read(path) {
            Ok(file) => {
                let catalog = Catalog::from(file);
                let count = catalog.prompts.len();
                self.publish(catalog);
                info!(count, path = %path.display(), "loaded prompts");
                LoadOutcome::Loaded { count }
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load prompts");
                LoadOutcome::Failed(e)
            }
        }
    }

    fn publish(&self, catalog: Catalog) {
        let mut current = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        *current = Arc::new(catalog);
    }

    fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Re-reads the bound file. Does nothing when the store is unbound.
    pub fn reload(&self) -> LoadOutcome {
        self.load()
    }

    pub fn get(&self, key: &str) -> Option<Prompt> {
        self.snapshot().prompts.get(key).cloned()
    }

    /// All prompt keys, sorted lexicographically.
    pub fn list_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.snapshot().prompts.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn has(&self, key: &str) -> bool {
        self.snapshot().prompts.contains_key(key)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn version(&self) -> String {
        self.snapshot().version.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().prompts.is_empty()
    }

    /// All prompts, sorted by key.
    pub fn prompts(&self) -> Vec<Prompt> {
        let mut prompts: Vec<Prompt> = self.snapshot().prompts.values().cloned().collect();
        prompts.sort_by(|a, b| a.key().cmp(b.key()));
        prompts
    }

    /// Keys of prompts whose key, text, or notes contain `query`, ignoring case.
    pub fn search(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        self.prompts()
            .into_iter()
            .filter(|prompt| {
                prompt.key().to_lowercase().contains(&query)
                    || prompt.text().to_lowercase().contains(&query)
                    || prompt.notes().to_lowercase().contains(&query)
            })
            .map(|prompt| prompt.key().to_string())
            .collect()
    }

    /// Builds a prompts document from the current catalog, optionally keeping
    /// only keys that start with `prefix`.
    pub fn export(&self, prefix: Option<&str>) -> PromptsFile {
        let snapshot = self.snapshot();
        let prompts = snapshot
            .prompts
            .values()
            .filter(|prompt| prefix.is_none_or(|p| prompt.key().starts_with(p)))
            .map(|prompt| {
                (
                    prompt.key().to_string(),
                    PromptEntry {
                        text: prompt.text().to_string(),
                        variables: prompt.variables().to_vec(),
                        source: prompt.source().to_string(),
                        notes: prompt.notes().to_string(),
                    },
                )
            })
            .collect();

        PromptsFile {
            version: snapshot.version.clone(),
            prompts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{
        "version": "1.0",
        "prompts": {
            "greeting": {
                "text": "Hello {name}!",
                "variables": ["name"],
                "source": "test",
                "notes": "A greeting prompt"
            },
            "analysis.sentiment": {
                "text": "Analyze: {text}",
                "variables": ["text"],
                "source": "test",
                "notes": "Sentiment analysis"
            }
        }
    }"#;

    fn sample_store() -> (TempDir, PathBuf, PromptStore) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prompts.json");
        fs::write(&path, SAMPLE).unwrap();
        let store = PromptStore::open(&path);
        (temp_dir, path, store)
    }

    #[test]
    fn test_store_open() {
        let (_dir, path, store) = sample_store();
        assert_eq!(2, store.len());
        assert!(store.has("greeting"));
        assert!(store.has("analysis.sentiment"));
        assert_eq!(Some(path.as_path()), store.path());
        assert_eq!("1.0", store.version());
    }

    #[test]
    fn test_store_get() {
        let (_dir, _path, store) = sample_store();
        let prompt = store.get("greeting").expect("Expected greeting prompt");
        assert_eq!("greeting", prompt.key());
        assert_eq!("Hello {name}!", prompt.text());
        assert_eq!(vec!["name".to_string()], prompt.variables());
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn test_store_list_keys_sorted() {
        let (_dir, _path, store) = sample_store();
        assert_eq!(vec!["analysis.sentiment", "greeting"], store.list_keys());
    }

    #[test]
    fn test_store_has() {
        let (_dir, _path, store) = sample_store();
        assert!(store.has("greeting"));
        assert!(!store.has("nonexistent"));
    }

    #[test]
    fn test_unbound_store() {
        let store = PromptStore::new();
        assert!(store.is_empty());
        assert!(store.path().is_none());
        assert_eq!(DEFAULT_VERSION, store.version());
        assert!(matches!(store.reload(), LoadOutcome::Unbound));
    }

    #[test]
    fn test_missing_file_leaves_store_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = PromptStore::new();
        let outcome = store.init(temp_dir.path().join("missing.json"));
        assert!(matches!(outcome, LoadOutcome::NotFound));
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_version_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("prompts.json");
        fs::write(&path, r#"{"prompts": {"a": {"text": "x"}}}"#).unwrap();
        let store = PromptStore::open(&path);
        assert_eq!("1.0", store.version());
        assert_eq!(1, store.len());
    }

    #[test]
    fn test_reload_is_idempotent() {
        let (_dir, _path, store) = sample_store();
        assert!(store.reload().is_loaded());
        let first = store.prompts();
        assert!(store.reload().is_loaded());
        let second = store.prompts();
        assert_eq!(first, second);
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let (_dir, path, store) = sample_store();
        fs::write(&path, r#"{"version": "2.0", "prompts": {"only": {"text": "x"}}}"#).unwrap();

        let outcome = store.reload();
        assert!(matches!(outcome, LoadOutcome::Loaded { count: 1 }));
        assert_eq!(vec!["only"], store.list_keys());
        assert_eq!("2.0", store.version());
        assert!(!store.has("greeting"));
    }

    #[test]
    fn test_failed_reload_preserves_state() {
        let (_dir, path, store) = sample_store();
        fs::write(&path, "{ this is not json").unwrap();

        let outcome = store.reload();
        assert!(matches!(outcome, LoadOutcome::Failed(StoreError::Parse(_))));
        assert_eq!(2, store.len());
        assert!(store.has("greeting"));
    }

    #[test]
    fn test_deleted_file_preserves_state() {
        let (_dir, path, store) = sample_store();
        fs::remove_file(&path).unwrap();

        assert!(matches!(store.reload(), LoadOutcome::NotFound));
        assert_eq!(2, store.len());
    }

    #[test]
    fn test_search() {
        let (_dir, _path, store) = sample_store();
        assert_eq!(vec!["analysis.sentiment"], store.search("SENTIMENT"));
        assert_eq!(vec!["greeting"], store.search("hello"));
        assert_eq!(vec!["analysis.sentiment", "greeting"], store.search("A"));
        assert!(store.search("zzz").is_empty());
    }

    #[test]
    fn test_export_with_prefix() {
        let (_dir, _path, store) = sample_store();

        let all = store.export(None);
        assert_eq!(2, all.prompts.len());
        assert_eq!("1.0", all.version);

        let filtered = store.export(Some("analysis."));
        assert_eq!(1, filtered.prompts.len());
        assert_eq!("Analyze: {text}", filtered.prompts["analysis.sentiment"].text);
        assert_eq!("Sentiment analysis", filtered.prompts["analysis.sentiment"].notes);
    }

    #[test]
    fn test_concurrent_readers_during_reload() {
        let (_dir, _path, store) = sample_store();
        let store = Arc::new(store);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let keys = store.list_keys();
                        assert_eq!(2, keys.len());
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            assert!(store.reload().is_loaded());
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_overlapping_reloads_end_on_latest_file() {
        let (dir, path, store) = sample_store();
        let store = Arc::new(store);
        let staging = dir.path().join("prompts.json.tmp");

        let reloaders: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store.reload();
                    }
                })
            })
            .collect();

        for version in 1..=50 {
            let document = format!(
                r#"{{"version": "{}", "prompts": {{"greeting": {{"text": "v{}"}}}}}}"#,
                version, version
            );
            fs::write(&staging, document).unwrap();
            fs::rename(&staging, &path).unwrap();
            assert!(store.reload().is_loaded());
        }

        for reloader in reloaders {
            reloader.join().unwrap();
        }

        assert_eq!("50", store.version());
        assert_eq!("v50", store.get("greeting").unwrap().text());
    }
}
