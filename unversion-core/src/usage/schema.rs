use rusqlite::Connection;

pub const SCHEMA: &str = "
-- Append-only prompt usage log
CREATE TABLE IF NOT EXISTS usage (
    id TEXT PRIMARY KEY,           -- UUID v4 string
    timestamp TEXT NOT NULL,       -- RFC 3339 UTC, microsecond precision
    prompt_key TEXT NOT NULL,
    prompt_hash TEXT NOT NULL,     -- 12 hex chars, or 'unknown'
    stage TEXT NOT NULL,
    model TEXT,
    session_id TEXT,
    variables_used TEXT,           -- JSON object
    success INTEGER DEFAULT 1,
    latency_ms REAL DEFAULT 0,
    notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_usage_key ON usage(prompt_key);
CREATE INDEX IF NOT EXISTS idx_usage_stage ON usage(stage);
CREATE INDEX IF NOT EXISTS idx_usage_timestamp ON usage(timestamp);
CREATE INDEX IF NOT EXISTS idx_usage_session ON usage(session_id);
";

/// Creates the usage table and its indexes. Safe to call on every open.
pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}
