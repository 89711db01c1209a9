use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Variables a caller passed to a prompt, kept as a JSON object.
pub type Variables = Map<String, Value>;

/// Hash recorded when no prompt text could be found.
pub const UNKNOWN_HASH: &str = "unknown";

const HASH_LEN: usize = 12;

/// One recorded use of a prompt. Rows are only ever inserted, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLog {
    pub id: String,
    pub timestamp: String,
    pub prompt_key: String,
    pub prompt_hash: String,
    pub stage: String,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub variables_used: Variables,
    pub success: bool,
    pub latency_ms: f64,
    pub notes: Option<String>,
}

impl UsageLog {
    /// Builds an entry from a caller's event, stamping it with a fresh id and
    /// the current UTC time.
    pub fn from_event(event: UsageEvent, prompt_hash: String) -> UsageLog {
        UsageLog {
            id: new_id(),
            timestamp: now_timestamp(),
            prompt_key: event.prompt_key,
            prompt_hash,
            stage: event.stage,
            model: event.model,
            session_id: event.session_id,
            variables_used: event.variables_used,
            success: event.success,
            latency_ms: event.latency_ms,
            notes: event.notes,
        }
    }
}

/// What a caller reports about one prompt invocation.
///
/// ```rust
/// use unversion_core::usage::UsageEvent;
///
/// let event = UsageEvent::new("greeting", "chat")
///     .model("gpt-4")
///     .variable("name", "Alice")
///     .latency_ms(150.0);
/// assert!(event.success);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEvent {
    pub prompt_key: String,
    pub stage: String,
    /// Full prompt text used for the hash. When absent the facade hashes the
    /// template from the active prompt store instead.
    pub prompt_text: Option<String>,
    pub model: Option<String>,
    pub session_id: Option<String>,
    pub variables_used: Variables,
    pub success: bool,
    pub latency_ms: f64,
    pub notes: Option<String>,
}

impl UsageEvent {
    pub fn new(prompt_key: impl Into<String>, stage: impl Into<String>) -> UsageEvent {
        UsageEvent {
            prompt_key: prompt_key.into(),
            stage: stage.into(),
            prompt_text: None,
            model: None,
            session_id: None,
            variables_used: Variables::new(),
            success: true,
            latency_ms: 0.0,
            notes: None,
        }
    }

    pub fn prompt_text(mut self, text: impl Into<String>) -> Self {
        self.prompt_text = Some(text.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables_used.insert(name.into(), value.into());
        self
    }

    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables_used = variables;
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Aggregate view of one prompt key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub prompt_key: String,
    pub total_usage: u64,
    /// Percentage of successful calls, `0.0` when there are none.
    pub success_rate: f64,
    /// Mean over calls with a measured (non-zero) latency.
    pub avg_latency_ms: f64,
    /// Calls per stage, most used first.
    pub by_stage: Vec<StageCount>,
    pub recent: Vec<RecentUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCount {
    pub stage: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentUsage {
    pub timestamp: String,
    pub stage: String,
    pub model: Option<String>,
    pub success: bool,
}

/// One row of the most-used prompts report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopPrompt {
    pub prompt_key: String,
    pub usage_count: u64,
    pub success_count: u64,
    /// Mean over every call, including ones recorded with zero latency.
    pub avg_latency: f64,
    pub last_used: String,
}

impl TopPrompt {
    pub fn success_rate(&self) -> f64 {
        if self.usage_count == 0 {
            0.0
        } else {
            self.success_count as f64 * 100.0 / self.usage_count as f64
        }
    }
}

/// Filters for [`UsageStore::get_recent`](super::UsageStore::get_recent).
/// Unset filters match everything; set filters must all match.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentFilter {
    pub limit: usize,
    pub prompt_key: Option<String>,
    pub stage: Option<String>,
    pub session_id: Option<String>,
}

pub const DEFAULT_RECENT_LIMIT: usize = 50;

impl Default for RecentFilter {
    fn default() -> Self {
        RecentFilter {
            limit: DEFAULT_RECENT_LIMIT,
            prompt_key: None,
            stage: None,
            session_id: None,
        }
    }
}

impl RecentFilter {
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn prompt_key(mut self, prompt_key: impl Into<String>) -> Self {
        self.prompt_key = Some(prompt_key.into());
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time as RFC 3339 with microseconds, e.g.
/// `2025-01-31T09:15:02.123456Z`. Fixed width, so it sorts chronologically.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Short fingerprint of prompt text, used to tell template revisions apart.
pub fn hash_prompt(text: &str) -> String {
    let digest = blake3::hash(text.as_bytes());
    digest.to_hex().as_str()[..HASH_LEN].to_string()
}
