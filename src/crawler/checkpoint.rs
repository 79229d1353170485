//! Writes frontier snapshots to the checkpoint database
//!
//! SQLite calls block, so every write runs on tokio's blocking pool. Periodic
//! checkpoints are fire-and-forget with at most one in flight; the final
//! checkpoint is awaited.

use crate::frontier::FrontierSnapshot;
use crate::storage::{RunStatus, SqliteStorage, Storage, StorageResult};
use crate::{RelayError, Result};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct Checkpointer {
    storage: Arc<Mutex<SqliteStorage>>,
    pending: Option<JoinHandle<StorageResult<usize>>>,
    run_id: Option<i64>,
    written: u64,
}

impl Checkpointer {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            pending: None,
            run_id: None,
            written: 0,
        }
    }

    /// Records the start of a run
    pub async fn begin_run(&mut self, config_hash: &str) -> Result<i64> {
        let hash = config_hash.to_string();
        let run_id = self
            .with_storage(move |storage| storage.create_run(&hash))
            .await?;
        self.run_id = Some(run_id);
        Ok(run_id)
    }

    pub fn run_id(&self) -> Option<i64> {
        self.run_id
    }

    /// Number of checkpoints written successfully
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Starts a checkpoint unless one is still running
    ///
    /// Returns `false` if the trigger was skipped.
    pub async fn checkpoint_in_background(&mut self, snapshot: FrontierSnapshot) -> bool {
        if let Some(handle) = &self.pending {
            if !handle.is_finished() {
                debug!("Checkpoint still running, skipping this one");
                return false;
            }
        }
        self.reap().await;

        let storage = Arc::clone(&self.storage);
        self.pending = Some(tokio::task::spawn_blocking(move || -> StorageResult<usize> {
            let mut storage = storage.lock().unwrap_or_else(|e| e.into_inner());
            storage.save_snapshot(&snapshot)?;
            Ok(snapshot.records.len())
        }));
        true
    }

    /// Writes a checkpoint and waits for it
    pub async fn checkpoint_now(&mut self, snapshot: FrontierSnapshot) -> Result<()> {
        self.reap().await;

        let count = snapshot.records.len();
        self.with_storage(move |storage| storage.save_snapshot(&snapshot))
            .await?;
        self.written += 1;
        debug!("Checkpoint written ({} records)", count);
        Ok(())
    }

    /// Marks the current run finished with `status`
    pub async fn finish_run(&mut self, status: RunStatus) -> Result<()> {
        let Some(run_id) = self.run_id else {
            return Ok(());
        };
        self.with_storage(move |storage| storage.update_run_status(run_id, status))
            .await
    }

    /// Waits for the background checkpoint, if any, and logs its outcome
    async fn reap(&mut self) {
        let Some(handle) = self.pending.take() else {
            return;
        };
        match handle.await {
            Ok(Ok(count)) => {
                self.written += 1;
                debug!("Background checkpoint written ({} records)", count);
            }
            Ok(Err(e)) => warn!("Background checkpoint failed: {}", e),
            Err(e) => warn!("Background checkpoint task failed: {}", e),
        }
    }

    async fn with_storage<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteStorage) -> StorageResult<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        let result = tokio::task::spawn_blocking(move || {
            let mut storage = storage.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut *storage)
        })
        .await
        .map_err(|e| RelayError::Task(e.to_string()))?;
        Ok(result?)
    }
}
