//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::frontier::FrontierSnapshot;
use crate::storage::{RunRecord, RunStatus};
use crate::state::UrlStatus;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt checkpoint row: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint backend implementations
///
/// A backend stores whole frontier snapshots plus a log of runs. Saving a
/// snapshot replaces the previous one atomically.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new run and returns its ID
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run, setting its finish time for terminal statuses
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()> {
        self.update_run_status(run_id, RunStatus::Completed)
    }

    // ===== Frontier Checkpoints =====

    /// Replaces the stored frontier with `snapshot` in one transaction
    fn save_snapshot(&mut self, snapshot: &FrontierSnapshot) -> StorageResult<()>;

    /// Loads the stored frontier, or `None` if nothing was ever saved
    fn load_snapshot(&self) -> StorageResult<Option<FrontierSnapshot>>;

    /// Removes all frontier data and run history
    fn clear(&mut self) -> StorageResult<()>;

    // ===== Statistics =====

    /// Counts stored records by status
    fn count_by_status(&self) -> StorageResult<BTreeMap<UrlStatus, u64>>;
}
