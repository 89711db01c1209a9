use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter};
use tracing::debug;

use super::log::{
    RecentFilter, RecentUsage, StageCount, TopPrompt, UsageLog, UsageStats, Variables,
};
use super::schema;
use crate::error::UsageError;

/// How long a writer waits on another connection's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Recent entries included in [`UsageStats`].
const STATS_RECENT_LIMIT: i64 = 10;

pub const DEFAULT_TOP_LIMIT: usize = 20;

const USAGE_COLUMNS: &str = "id, timestamp, prompt_key, prompt_hash, stage, model, session_id, variables_used, success, latency_ms, notes";

/// Durable, append-only log of [`UsageLog`] entries in a SQLite file.
///
/// Every operation opens its own connection, so each insert commits as its own
/// transaction and any number of threads or processes can share one file.
#[derive(Debug, Clone)]
pub struct UsageStore {
    path: PathBuf,
}

impl UsageStore {
    /// Opens (creating if needed) the database at `path` and its schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<UsageStore, UsageError> {
        let store = UsageStore { path: path.into() };

        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = store.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        schema::create_schema(&conn)?;

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, UsageError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Appends one entry. The row is committed before this returns.
    pub fn log(&self, entry: &UsageLog) -> Result<(), UsageError> {
        if entry.latency_ms.is_nan() || entry.latency_ms < 0.0 {
            return Err(UsageError::InvalidEntry(format!(
                "latency_ms must be a non-negative number, got {}",
                entry.latency_ms
            )));
        }

        let variables = serde_json::to_string(&entry.variables_used)?;
        let conn = self.connect()?;
        conn.execute(
            &format!(
                "INSERT INTO usage ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                USAGE_COLUMNS
            ),
            params![
                entry.id,
                entry.timestamp,
                entry.prompt_key,
                entry.prompt_hash,
                entry.stage,
                entry.model,
                entry.session_id,
                variables,
                if entry.success { 1 } else { 0 },
                entry.latency_ms,
                entry.notes,
            ],
        )?;

        debug!(
            id = %entry.id,
            prompt_key = %entry.prompt_key,
            stage = %entry.stage,
            "usage logged"
        );
        Ok(())
    }

    /// Totals, success rate, latency, stage breakdown and the latest calls for
    /// one prompt key. Entries with zero latency count towards the totals but
    /// not towards the average latency.
    pub fn get_stats(&self, prompt_key: &str) -> Result<UsageStats, UsageError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let (total, success_count, avg_latency): (i64, i64, Option<f64>) = tx.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                    AVG(CASE WHEN latency_ms > 0 THEN latency_ms END)
             FROM usage WHERE prompt_key = ?1",
            params![prompt_key],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        let by_stage = {
            let mut stmt = tx.prepare(
                "SELECT stage, COUNT(*) AS count FROM usage
                 WHERE prompt_key = ?1
                 GROUP BY stage
                 ORDER BY count DESC, stage ASC",
            )?;
            let rows = stmt.query_map(params![prompt_key], |r| {
                Ok(StageCount {
                    stage: r.get(0)?,
                    count: r.get::<_, i64>(1)? as u64,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let recent = {
            let mut stmt = tx.prepare(
                "SELECT timestamp, stage, model, success FROM usage
                 WHERE prompt_key = ?1
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![prompt_key, STATS_RECENT_LIMIT], |r| {
                Ok(RecentUsage {
                    timestamp: r.get(0)?,
                    stage: r.get(1)?,
                    model: r.get(2)?,
                    success: r.get::<_, i64>(3)? != 0,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        tx.commit()?;

        let success_rate = if total > 0 {
            success_count as f64 * 100.0 / total as f64
        } else {
            0.0
        };

        Ok(UsageStats {
            prompt_key: prompt_key.to_string(),
            total_usage: total as u64,
            success_rate,
            avg_latency_ms: avg_latency.unwrap_or(0.0),
            by_stage,
            recent,
        })
    }

    /// Newest entries first, restricted by every filter that is set.
    pub fn get_recent(&self, filter: &RecentFilter) -> Result<Vec<UsageLog>, UsageError> {
        let mut where_clauses: Vec<&str> = Vec::new();
        let mut values: Vec<rusqlite::types::Value> = Vec::new();

        let filters = [
            ("prompt_key = ?", &filter.prompt_key),
            ("stage = ?", &filter.stage),
            ("session_id = ?", &filter.session_id),
        ];
        for (clause, value) in filters {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                where_clauses.push(clause);
                values.push(value.to_string().into());
            }
        }
        values.push(i64::try_from(filter.limit).unwrap_or(i64::MAX).into());

        let sql = format!(
            "SELECT {} FROM usage {} ORDER BY timestamp DESC, rowid DESC LIMIT ?",
            USAGE_COLUMNS,
            if where_clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", where_clauses.join(" AND "))
            }
        );

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), usage_from_row)?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Prompt keys by number of uses, most used first.
    pub fn get_top_prompts(&self, limit: usize) -> Result<Vec<TopPrompt>, UsageError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT prompt_key,
                    COUNT(*) AS usage_count,
                    SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END) AS success_count,
                    AVG(latency_ms) AS avg_latency,
                    MAX(timestamp) AS last_used
             FROM usage
             GROUP BY prompt_key
             ORDER BY usage_count DESC, prompt_key ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(
            params![i64::try_from(limit).unwrap_or(i64::MAX)],
            |r| {
                Ok(TopPrompt {
                    prompt_key: r.get(0)?,
                    usage_count: r.get::<_, i64>(1)? as u64,
                    success_count: r.get::<_, i64>(2)? as u64,
                    avg_latency: r.get::<_, Option<f64>>(3)?.unwrap_or(0.0),
                    last_used: r.get(4)?,
                })
            },
        )?;
        let top = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(top)
    }

    /// Number of entries in the log.
    pub fn count(&self) -> Result<u64, UsageError> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM usage", [], |r| r.get(0))?;
        Ok(count as u64)
    }
}

fn usage_from_row(r: &Row<'_>) -> rusqlite::Result<UsageLog> {
    let variables: Option<String> = r.get(7)?;
    Ok(UsageLog {
        id: r.get(0)?,
        timestamp: r.get(1)?,
        prompt_key: r.get(2)?,
        prompt_hash: r.get(3)?,
        stage: r.get(4)?,
        model: r.get(5)?,
        session_id: r.get(6)?,
        variables_used: decode_variables(variables.as_deref()),
        success: r.get::<_, i64>(8)? != 0,
        latency_ms: r.get::<_, Option<f64>>(9)?.unwrap_or(0.0),
        notes: r.get(10)?,
    })
}

fn decode_variables(raw: Option<&str>) -> Variables {
    raw.and_then(|raw| serde_json::from_str::<Variables>(raw).ok())
        .unwrap_or_default()
}
