use confy::ConfyError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use unversion_core::UnversionConfig;
use unversion_core::error::UsageError;

pub const UNVERSION_CLI: &str = "unversion";

/// Where `unversion` looks for a prompts file when none is given, relative to
/// the working directory.
pub const PROMPTS_CANDIDATES: [&str; 4] = [
    "prompts/bundled.json",
    "prompts.json",
    "bundled.json",
    ".prompts/bundled.json",
];

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
pub struct CliConfig {
    pub prompts_file: Option<String>,
    pub usage_db: Option<String>,
}

pub fn load_config() -> Result<CliConfig, ConfyError> {
    confy::load(UNVERSION_CLI, None)
}

pub fn find_prompts_file(dir: &Path) -> Option<PathBuf> {
    PROMPTS_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.exists())
}

/// `--file`, then the configured file, then the first candidate found in `dir`.
pub fn resolve_prompts_file(
    flag: Option<PathBuf>,
    config: &CliConfig,
    dir: &Path,
) -> Option<PathBuf> {
    flag.or_else(|| config.prompts_file.as_ref().map(PathBuf::from))
        .or_else(|| find_prompts_file(dir))
}

/// `--db`, then the configured database, then the environment default.
pub fn resolve_usage_db(flag: Option<PathBuf>, config: &CliConfig) -> Result<PathBuf, UsageError> {
    match flag.or_else(|| config.usage_db.as_ref().map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => UnversionConfig::from_env().db_path(),
    }
}
