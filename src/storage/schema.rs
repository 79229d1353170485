//! Database schema definitions
//!
//! This module contains the SQL schema for the Frontier-Relay checkpoint database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- One row per URL in the frontier
CREATE TABLE IF NOT EXISTS url_records (
    url TEXT PRIMARY KEY,
    seq INTEGER NOT NULL,
    status TEXT NOT NULL,
    level INTEGER NOT NULL,
    parent_url TEXT,
    attempt_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    started_at TEXT,
    finished_at TEXT,
    content_digest TEXT,
    artifact_ref TEXT,
    fetched_via TEXT,
    content_len INTEGER
);

CREATE INDEX IF NOT EXISTS idx_url_records_status ON url_records(status);
CREATE INDEX IF NOT EXISTS idx_url_records_seq ON url_records(seq);

-- Pending queue order at checkpoint time
CREATE TABLE IF NOT EXISTS pending_queue (
    position INTEGER PRIMARY KEY,
    url TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// Checkpoints written before `content_len` existed get the column added.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;

    if conn
        .prepare("SELECT content_len FROM url_records LIMIT 0")
        .is_err()
    {
        conn.execute("ALTER TABLE url_records ADD COLUMN content_len INTEGER", [])?;
    }
    Ok(())
}
