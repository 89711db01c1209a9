//! One function per subcommand. Each writes its report to `out` and returns
//! the process exit code; failures the user cannot fix by changing input come
//! back as errors.

use anyhow::{Context, Result};
use exitcode::ExitCode;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;
use unversion_core::registry;
use unversion_core::{LoadOutcome, PromptStore, RecentFilter, UsageStore};

/// Loads `path` into a fresh store, failing instead of starting empty.
pub fn load_store(path: &Path) -> Result<PromptStore> {
    let mut store = PromptStore::new();
    match store.init(path) {
        LoadOutcome::Loaded { .. } => Ok(store),
        LoadOutcome::Failed(e) => {
            Err(e).with_context(|| format!("failed to load prompts from {}", path.display()))
        }
        LoadOutcome::NotFound | LoadOutcome::Unbound => Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("prompts file not found: {}", path.display()),
        )
        .into()),
    }
}

pub fn list(
    store: &PromptStore,
    filter: Option<&str>,
    stats: bool,
    out: &mut impl Write,
) -> Result<ExitCode> {
    let keys: Vec<String> = store
        .list_keys()
        .into_iter()
        .filter(|key| filter.is_none_or(|prefix| key.starts_with(prefix)))
        .collect();

    if !stats {
        for key in &keys {
            writeln!(out, "{}", key)?;
        }
        return Ok(exitcode::OK);
    }

    let mut prefixes: HashMap<&str, usize> = HashMap::new();
    for key in &keys {
        let prefix = key.split('.').next().unwrap_or(key);
        *prefixes.entry(prefix).or_default() += 1;
    }
    let mut prefixes: Vec<(&str, usize)> = prefixes.into_iter().collect();
    prefixes.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    writeln!(out, "Total prompts: {}", keys.len())?;
    writeln!(out)?;
    writeln!(out, "By prefix:")?;
    for (prefix, count) in prefixes {
        writeln!(out, "  {}: {}", prefix, count)?;
    }
    Ok(exitcode::OK)
}

pub fn view(store: &PromptStore, key: &str, out: &mut impl Write) -> Result<ExitCode> {
    let Some(prompt) = store.get(key) else {
        eprintln!("Error: Prompt '{}' not found", key);
        return Ok(exitcode::DATAERR);
    };

    let variables = if prompt.variables().is_empty() {
        "none".to_string()
    } else {
        prompt.variables().join(", ")
    };
    let notes = if prompt.notes().is_empty() { "none" } else { prompt.notes() };

    writeln!(out, "=== {} ===", key)?;
    writeln!(out, "Source: {}", prompt.source())?;
    writeln!(out, "Variables: {}", variables)?;
    writeln!(out, "Notes: {}", notes)?;
    writeln!(out)?;
    writeln!(out, "--- Text ({} chars) ---", prompt.text().chars().count())?;
    writeln!(out, "{}", prompt.text())?;
    writeln!(out, "---")?;
    Ok(exitcode::OK)
}

pub fn search(store: &PromptStore, query: &str, out: &mut impl Write) -> Result<ExitCode> {
    let matches = store.search(query);
    writeln!(out, "Found {} matches for '{}':", matches.len(), query)?;
    for key in matches {
        writeln!(out, "  {}", key)?;
    }
    Ok(exitcode::OK)
}

pub fn validate(path: &Path, out: &mut impl Write) -> Result<ExitCode> {
    if !path.exists() {
        eprintln!("Error: File not found: {}", path.display());
        return Ok(exitcode::NOINPUT);
    }

    let report = registry::validate_file(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if !report.errors.is_empty() {
        writeln!(out, "Errors:")?;
        for error in &report.errors {
            writeln!(out, "  - {}", error)?;
        }
    }
    if !report.warnings.is_empty() {
        writeln!(out, "Warnings:")?;
        for warning in &report.warnings {
            writeln!(out, "  - {}", warning)?;
        }
    }

    if report.is_clean() {
        writeln!(out, "Valid! {} prompts found.", report.prompt_count)?;
    }
    Ok(if report.is_valid() { exitcode::OK } else { exitcode::DATAERR })
}

pub fn stats(
    usage: &UsageStore,
    key: Option<&str>,
    limit: usize,
    out: &mut impl Write,
) -> Result<ExitCode> {
    if let Some(key) = key {
        return key_stats(usage, key, out);
    }

    let top = usage.get_top_prompts(limit).context("failed to query usage")?;
    if top.is_empty() {
        writeln!(out, "No usage data yet.")?;
        return Ok(exitcode::OK);
    }

    writeln!(out, "=== Top Prompts by Usage ===")?;
    writeln!(out)?;
    for prompt in top {
        writeln!(out, "{}", prompt.prompt_key)?;
        writeln!(
            out,
            "  Used: {} times ({:.0}% success)",
            prompt.usage_count,
            prompt.success_rate()
        )?;
        writeln!(out, "  Last: {}", prompt.last_used)?;
        writeln!(out, "  Avg Latency: {:.0}ms", prompt.avg_latency)?;
        writeln!(out)?;
    }
    Ok(exitcode::OK)
}

fn key_stats(usage: &UsageStore, key: &str, out: &mut impl Write) -> Result<ExitCode> {
    let stats = usage
        .get_stats(key)
        .with_context(|| format!("failed to query usage for {}", key))?;

    writeln!(out, "=== {} ===", stats.prompt_key)?;
    if stats.total_usage == 0 {
        writeln!(out, "No usage data yet.")?;
        return Ok(exitcode::OK);
    }

    writeln!(
        out,
        "Used: {} times ({:.0}% success)",
        stats.total_usage, stats.success_rate
    )?;
    writeln!(out, "Avg Latency: {:.0}ms", stats.avg_latency_ms)?;
    writeln!(out)?;
    writeln!(out, "By stage:")?;
    for stage in &stats.by_stage {
        writeln!(out, "  {}: {}", stage.stage, stage.count)?;
    }
    writeln!(out)?;
    writeln!(out, "Recent:")?;
    for recent in &stats.recent {
        writeln!(
            out,
            "  {}  {}  {}  {}",
            recent.timestamp,
            recent.stage,
            recent.model.as_deref().unwrap_or("-"),
            outcome(recent.success)
        )?;
    }
    Ok(exitcode::OK)
}

pub fn recent(usage: &UsageStore, filter: &RecentFilter, out: &mut impl Write) -> Result<ExitCode> {
    let entries = usage.get_recent(filter).context("failed to query usage")?;
    if entries.is_empty() {
        writeln!(out, "No usage data yet.")?;
        return Ok(exitcode::OK);
    }

    for entry in entries {
        writeln!(
            out,
            "{}  {}  {}  {}  {}  {:.0}ms",
            entry.timestamp,
            entry.prompt_key,
            entry.stage,
            entry.model.as_deref().unwrap_or("-"),
            outcome(entry.success),
            entry.latency_ms
        )?;
    }
    Ok(exitcode::OK)
}

pub fn export(
    store: &PromptStore,
    output: &Path,
    filter: Option<&str>,
    out: &mut impl Write,
) -> Result<ExitCode> {
    let document = store.export(filter);
    document
        .write(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    writeln!(out, "Exported {} prompts to {}", document.prompts.len(), output.display())?;
    Ok(exitcode::OK)
}

fn outcome(success: bool) -> &'static str {
    if success { "ok" } else { "FAILED" }
}
