//! Configuration for the process-wide facade.
//!
//! Everything comes from environment variables, so an application only has to
//! export credentials to turn on trace forwarding.

use std::path::PathBuf;

use crate::error::UsageError;

pub const DB_PATH_ENV: &str = "UNVERSION_DB_PATH";
pub const LANGFUSE_PUBLIC_KEY_ENV: &str = "LANGFUSE_PUBLIC_KEY";
pub const LANGFUSE_SECRET_KEY_ENV: &str = "LANGFUSE_SECRET_KEY";
pub const LANGFUSE_HOST_ENV: &str = "LANGFUSE_HOST";

pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

/// Settings the facade needs before its first call.
#[derive(Debug, Clone, PartialEq)]
pub struct UnversionConfig {
    /// Where the usage database lives. `None` means the home directory could
    /// not be resolved and no override was given.
    pub db_path: Option<PathBuf>,
    /// Present only when both Langfuse keys are set.
    pub langfuse: Option<LangfuseConfig>,
}

#[derive(Clone, PartialEq)]
pub struct LangfuseConfig {
    pub public_key: String,
    pub secret_key: String,
    pub host: String,
}

// Keeps the secret out of logs
impl std::fmt::Debug for LangfuseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LangfuseConfig")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .field("host", &self.host)
            .finish()
    }
}

impl UnversionConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional variables:
    /// - `UNVERSION_DB_PATH` -- usage database file (default `~/.unversion/usage.db`)
    /// - `LANGFUSE_PUBLIC_KEY`, `LANGFUSE_SECRET_KEY` -- enable trace forwarding
    /// - `LANGFUSE_HOST` -- Langfuse base URL (default `https://cloud.langfuse.com`)
    pub fn from_env() -> UnversionConfig {
        UnversionConfig::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> UnversionConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let db_path = non_empty(DB_PATH_ENV)
            .map(PathBuf::from)
            .or_else(default_db_path);

        let langfuse = match (
            non_empty(LANGFUSE_PUBLIC_KEY_ENV),
            non_empty(LANGFUSE_SECRET_KEY_ENV),
        ) {
            (Some(public_key), Some(secret_key)) => Some(LangfuseConfig {
                public_key,
                secret_key,
                host: non_empty(LANGFUSE_HOST_ENV)
                    .map(|h| h.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_LANGFUSE_HOST.to_string()),
            }),
            _ => None,
        };

        UnversionConfig { db_path, langfuse }
    }

    pub fn db_path(&self) -> Result<PathBuf, UsageError> {
        self.db_path.clone().ok_or(UsageError::NoHomeDir)
    }
}

/// `~/.unversion/usage.db`
pub fn default_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".unversion").join("usage.db"))
}
