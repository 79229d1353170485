//! Dispatcher - the crawl control loop
//!
//! The dispatcher is the only code that mutates the frontier during a run.
//! It:
//! - Admits pending URLs up to the concurrency budget
//! - Runs each one as a unit of work on a tokio `JoinSet`
//! - Applies unit outcomes: children, completion, retry or failure
//! - Checkpoints periodically and once more at the end
//! - Handles interrupts with a bounded grace period

use crate::artifact::ArtifactStore;
use crate::classifier::{EscalationPolicy, PhraseClassifier};
use crate::config::{RunConfig, DEFAULT_TRIGGER_PHRASES};
use crate::crawler::backoff::RetryBackoff;
use crate::crawler::checkpoint::Checkpointer;
use crate::crawler::unit::{panic_message, run_unit, UnitContext, UnitError, UnitRequest, UnitSuccess};
use crate::fetch::FetchStrategy;
use crate::frontier::FrontierStore;
use crate::state::FetchPath;
use crate::storage::RunStatus;
use crate::Result;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

type UnitOutcome = (String, std::result::Result<UnitSuccess, UnitError>);

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing pending and nothing in flight
    Completed,

    /// Stopped by a shutdown signal; state was flushed
    Interrupted,
}

impl RunOutcome {
    pub fn run_status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::Interrupted => RunStatus::Interrupted,
        }
    }
}

/// Counters for progress logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunProgress {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
    pub escalated: u64,
    pub degraded: u64,
    pub discovered: u64,
}

/// Drives the frontier to completion or interruption
pub struct Dispatcher {
    run: RunConfig,
    store: FrontierStore,
    local: Arc<dyn FetchStrategy>,
    remote: Option<Arc<dyn FetchStrategy>>,
    classifier: Arc<dyn EscalationPolicy>,
    artifacts: Arc<dyn ArtifactStore>,
    checkpointer: Option<Checkpointer>,
    progress: RunProgress,
}

impl Dispatcher {
    /// Creates a dispatcher with the default trigger phrases and no remote path
    pub fn new(
        run: RunConfig,
        store: FrontierStore,
        local: Arc<dyn FetchStrategy>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            run,
            store,
            local,
            remote: None,
            classifier: Arc::new(PhraseClassifier::new(DEFAULT_TRIGGER_PHRASES)),
            artifacts,
            checkpointer: None,
            progress: RunProgress::default(),
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn FetchStrategy>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn EscalationPolicy>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_checkpointer(mut self, checkpointer: Checkpointer) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn store(&self) -> &FrontierStore {
        &self.store
    }

    pub fn into_store(self) -> FrontierStore {
        self.store
    }

    pub fn progress(&self) -> RunProgress {
        self.progress
    }

    /// Runs until the frontier is drained or `shutdown` flips to `true`
    ///
    /// On interrupt, in-flight units get `shutdown_grace` to finish; the rest
    /// are aborted and their URLs go back to Pending. A final checkpoint is
    /// written either way, so after this returns no record is InProgress.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<RunOutcome> {
        let ctx = Arc::new(UnitContext {
            run: self.run.clone(),
            local: Arc::clone(&self.local),
            remote: self.remote.clone(),
            classifier: Arc::clone(&self.classifier),
            artifacts: Arc::clone(&self.artifacts),
            backoff: RetryBackoff::from_run(&self.run),
        });

        info!(
            "Dispatching: {} known URLs, {} pending, concurrency {}",
            self.store.len(),
            self.store.pending_len(),
            self.run.max_concurrency
        );

        let started = Instant::now();
        let mut units: JoinSet<UnitOutcome> = JoinSet::new();
        let mut in_flight: HashMap<String, u32> = HashMap::new();
        let mut since_checkpoint: u32 = 0;
        let mut signal_closed = false;

        let outcome = loop {
            // A drained frontier wins over a late interrupt
            if in_flight.is_empty() && self.store.pending_len() == 0 {
                break RunOutcome::Completed;
            }

            if *shutdown.borrow() {
                break RunOutcome::Interrupted;
            }

            let free = self.run.max_concurrency.saturating_sub(in_flight.len());
            if free > 0 {
                for record in self.store.pop_batch(free) {
                    debug!(
                        "Dispatching {} (level {}, attempt {})",
                        record.url, record.level, record.attempt_count
                    );
                    in_flight.insert(record.url.clone(), record.level);
                    self.progress.dispatched += 1;
                    spawn_unit(&mut units, Arc::clone(&ctx), UnitRequest::from(&record));
                }
            }

            tokio::select! {
                joined = units.join_next(), if !units.is_empty() => {
                    if let Some(joined) = joined {
                        self.apply(joined, &mut in_flight)?;
                        since_checkpoint += 1;
                    }
                }
                changed = shutdown.changed(), if !signal_closed => {
                    if changed.is_err() {
                        // Sender dropped: no interrupt can arrive any more
                        signal_closed = true;
                    }
                }
                _ = tokio::time::sleep(self.run.poll_interval) => {}
            }

            if units.is_empty() && !in_flight.is_empty() {
                self.reclaim_orphans(&mut in_flight)?;
            }

            if since_checkpoint >= self.run.checkpoint_interval {
                since_checkpoint = 0;
                self.log_progress(in_flight.len(), started);
                if let Some(checkpointer) = self.checkpointer.as_mut() {
                    checkpointer
                        .checkpoint_in_background(self.store.snapshot())
                        .await;
                }
            }
        };

        if outcome == RunOutcome::Interrupted {
            self.drain_after_interrupt(&mut units, &mut in_flight).await?;
        }

        if let Some(checkpointer) = self.checkpointer.as_mut() {
            checkpointer.checkpoint_now(self.store.snapshot()).await?;
            checkpointer.finish_run(outcome.run_status()).await?;
        }

        self.log_progress(0, started);
        info!("Run {:?} after {:?}", outcome, started.elapsed());
        Ok(outcome)
    }

    /// Gives in-flight units the grace period, then aborts the rest
    async fn drain_after_interrupt(
        &mut self,
        units: &mut JoinSet<UnitOutcome>,
        in_flight: &mut HashMap<String, u32>,
    ) -> Result<()> {
        info!(
            "Interrupted: waiting up to {:?} for {} in-flight units",
            self.run.shutdown_grace,
            in_flight.len()
        );

        let deadline = tokio::time::Instant::now() + self.run.shutdown_grace;
        while !units.is_empty() {
            match tokio::time::timeout_at(deadline, units.join_next()).await {
                Ok(Some(joined)) => self.apply(joined, in_flight)?,
                Ok(None) | Err(_) => break,
            }
        }

        units.abort_all();
        while units.join_next().await.is_some() {}

        for url in in_flight.keys() {
            warn!("Abandoning {} after grace period", url);
            self.store.requeue_abandoned(url)?;
        }
        in_flight.clear();
        Ok(())
    }

    /// Applies one finished unit to the store
    fn apply(
        &mut self,
        joined: std::result::Result<UnitOutcome, JoinError>,
        in_flight: &mut HashMap<String, u32>,
    ) -> Result<()> {
        let (url, outcome) = match joined {
            Ok(finished) => finished,
            Err(e) => {
                // The URL is unknown here; reclaim_orphans settles it once
                // the join set is empty
                warn!("Unit task ended without an outcome: {}", e);
                return Ok(());
            }
        };

        let Some(level) = in_flight.remove(&url) else {
            warn!("Outcome for {} which is not in flight", url);
            return Ok(());
        };

        self.apply_outcome(&url, level, outcome)
    }

    /// Settles in-flight URLs whose task is gone without reporting back
    ///
    /// Only valid when the join set is empty. Each orphan is charged one
    /// attempt as a panic, so it is retried or failed instead of staying
    /// InProgress.
    fn reclaim_orphans(&mut self, in_flight: &mut HashMap<String, u32>) -> Result<()> {
        let orphans: Vec<(String, u32)> = in_flight.drain().collect();
        for (url, level) in orphans {
            warn!("Reclaiming {} whose unit ended without an outcome", url);
            let err = UnitError::Panicked("unit task ended without an outcome".to_string());
            self.apply_outcome(&url, level, Err(err))?;
        }
        Ok(())
    }

    fn apply_outcome(
        &mut self,
        url: &str,
        level: u32,
        outcome: std::result::Result<UnitSuccess, UnitError>,
    ) -> Result<()> {
        match outcome {
            Ok(success) => {
                if self.run.expands_children(level) {
                    for child in &success.children {
                        if self.store.enqueue(child, level + 1, Some(url)) {
                            self.progress.discovered += 1;
                        }
                    }
                }

                match success.fetched_via {
                    FetchPath::Remote => self.progress.escalated += 1,
                    FetchPath::LocalDegraded => self.progress.degraded += 1,
                    FetchPath::Local => {}
                }
                self.progress.completed += 1;

                self.store.mark_completed(
                    url,
                    success.content_digest,
                    success.artifact_ref,
                    success.content_len,
                    success.fetched_via,
                )?;
                debug!("Completed {}", url);
            }
            Err(err) => {
                let budget = err.attempt_budget(self.run.retry_attempts);
                let message = err.to_string();
                if self.store.mark_failed_or_retry(url, &message, budget)? {
                    self.progress.retried += 1;
                    warn!("Retrying {}: {}", url, message);
                } else {
                    self.progress.failed += 1;
                    error!("Giving up on {}: {}", url, message);
                }
            }
        }

        Ok(())
    }

    fn log_progress(&self, in_flight: usize, started: Instant) {
        let p = &self.progress;
        let elapsed = started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            (p.completed + p.failed) as f64 / elapsed
        } else {
            0.0
        };
        info!(
            "Progress: {} completed, {} failed, {} retried, {} escalated, {} degraded, {} pending, {} in flight, {:.2} urls/sec",
            p.completed,
            p.failed,
            p.retried,
            p.escalated,
            p.degraded,
            self.store.pending_len(),
            in_flight,
            rate
        );
    }
}

fn spawn_unit(units: &mut JoinSet<UnitOutcome>, ctx: Arc<UnitContext>, request: UnitRequest) {
    units.spawn(async move {
        let url = request.url.clone();
        let outcome = AssertUnwindSafe(run_unit(&ctx, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(UnitError::Panicked(panic_message(payload))));
        (url, outcome)
    });
}
