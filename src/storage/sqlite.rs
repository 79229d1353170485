//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::frontier::FrontierSnapshot;
use crate::state::{FetchPath, UrlRecord, UrlStatus};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens or creates a checkpoint database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

/// Column values as stored, before conversion back into a record
struct RawRecord {
    url: String,
    seq: i64,
    status: String,
    level: i64,
    parent_url: Option<String>,
    attempt_count: i64,
    last_error: Option<String>,
    started_at: Option<String>,
    finished_at: Option<String>,
    content_digest: Option<String>,
    artifact_ref: Option<String>,
    fetched_via: Option<String>,
    content_len: Option<i64>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            url: row.get(0)?,
            seq: row.get(1)?,
            status: row.get(2)?,
            level: row.get(3)?,
            parent_url: row.get(4)?,
            attempt_count: row.get(5)?,
            last_error: row.get(6)?,
            started_at: row.get(7)?,
            finished_at: row.get(8)?,
            content_digest: row.get(9)?,
            artifact_ref: row.get(10)?,
            fetched_via: row.get(11)?,
            content_len: row.get(12)?,
        })
    }

    fn into_record(self) -> StorageResult<UrlRecord> {
        let status = UrlStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Corrupt(format!("unknown status '{}' for {}", self.status, self.url))
        })?;

        let fetched_via = match self.fetched_via.as_deref() {
            Some(s) => Some(FetchPath::from_db_string(s).ok_or_else(|| {
                StorageError::Corrupt(format!("unknown fetch path '{}' for {}", s, self.url))
            })?),
            None => None,
        };

        Ok(UrlRecord {
            status,
            level: to_u32(self.level, "level", &self.url)?,
            attempt_count: to_u32(self.attempt_count, "attempt_count", &self.url)?,
            seq: u64::try_from(self.seq)
                .map_err(|_| StorageError::Corrupt(format!("negative seq for {}", self.url)))?,
            content_len: self
                .content_len
                .map(u64::try_from)
                .transpose()
                .map_err(|_| StorageError::Corrupt(format!("negative content_len for {}", self.url)))?,
            started_at: parse_timestamp(self.started_at.as_deref(), &self.url)?,
            finished_at: parse_timestamp(self.finished_at.as_deref(), &self.url)?,
            parent_url: self.parent_url,
            last_error: self.last_error,
            content_digest: self.content_digest,
            artifact_ref: self.artifact_ref,
            fetched_via,
            url: self.url,
        })
    }
}

fn to_u32(value: i64, column: &str, url: &str) -> StorageResult<u32> {
    u32::try_from(value)
        .map_err(|_| StorageError::Corrupt(format!("{} out of range for {}", column, url)))
}

fn parse_timestamp(value: Option<&str>, url: &str) -> StorageResult<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StorageError::Corrupt(format!("bad timestamp for {}: {}", url, e)))
        })
        .transpose()
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
    })
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let finished_at = status.is_finished().then(|| Utc::now().to_rfc3339());
        let changed = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), finished_at, run_id],
        )?;
        if changed == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Frontier Checkpoints =====

    fn save_snapshot(&mut self, snapshot: &FrontierSnapshot) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM url_records", [])?;
        tx.execute("DELETE FROM pending_queue", [])?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO url_records (url, seq, status, level, parent_url, attempt_count,
                 last_error, started_at, finished_at, content_digest, artifact_ref, fetched_via,
                 content_len)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for record in &snapshot.records {
                let seq = i64::try_from(record.seq).map_err(|_| {
                    StorageError::Database(format!("seq overflow for {}", record.url))
                })?;
                let content_len = record
                    .content_len
                    .map(i64::try_from)
                    .transpose()
                    .map_err(|_| {
                        StorageError::Database(format!("content_len overflow for {}", record.url))
                    })?;
                insert.execute(params![
                    record.url,
                    seq,
                    record.status.to_db_string(),
                    record.level,
                    record.parent_url,
                    record.attempt_count,
                    record.last_error,
                    record.started_at.map(|t| t.to_rfc3339()),
                    record.finished_at.map(|t| t.to_rfc3339()),
                    record.content_digest,
                    record.artifact_ref,
                    record.fetched_via.map(|p| p.to_db_string()),
                    content_len,
                ])?;
            }

            let mut enqueue =
                tx.prepare("INSERT INTO pending_queue (position, url) VALUES (?1, ?2)")?;
            for (position, url) in snapshot.queue.iter().enumerate() {
                enqueue.execute(params![position as i64, url])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn load_snapshot(&self) -> StorageResult<Option<FrontierSnapshot>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, seq, status, level, parent_url, attempt_count, last_error,
             started_at, finished_at, content_digest, artifact_ref, fetched_via, content_len
             FROM url_records ORDER BY seq",
        )?;
        let raw = stmt
            .query_map([], RawRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        if raw.is_empty() {
            return Ok(None);
        }

        let records = raw
            .into_iter()
            .map(RawRecord::into_record)
            .collect::<StorageResult<Vec<_>>>()?;

        let mut stmt = self
            .conn
            .prepare("SELECT url FROM pending_queue ORDER BY position")?;
        let queue = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(FrontierSnapshot { records, queue }))
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.conn.execute_batch(
            "
            DELETE FROM url_records;
            DELETE FROM pending_queue;
            DELETE FROM runs;
        ",
        )?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_by_status(&self) -> StorageResult<BTreeMap<UrlStatus, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM url_records GROUP BY status")?;

        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (status, count) = row?;
            let status = UrlStatus::from_db_string(&status)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown status '{}'", status)))?;
            counts.insert(status, count as u64);
        }

        Ok(counts)
    }
}
