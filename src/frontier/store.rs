use crate::frontier::{FrontierSnapshot, StoreError, StoreResult};
use crate::state::{FetchPath, UrlRecord, UrlStatus};
use chrono::Utc;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct FrontierState {
    records: HashMap<String, UrlRecord>,
    queue: VecDeque<String>,
    next_seq: u64,
}

/// Thread-safe URL lifecycle store
///
/// Every method takes `&self` and holds the internal mutex for the duration of
/// the transition, so the store can be shared behind an `Arc` or borrowed by a
/// single control loop without further locking.
#[derive(Debug, Default)]
pub struct FrontierStore {
    inner: Mutex<FrontierState>,
}

impl FrontierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a checkpoint snapshot
    pub fn from_snapshot(snapshot: FrontierSnapshot) -> Self {
        let store = Self::new();
        store.restore(snapshot);
        store
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        // Poisoning is ignored: no transition panics while holding the guard.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a URL as Pending at the back of the queue
    ///
    /// Returns `false` if the URL is already known, in which case nothing
    /// changes and the first-seen level is kept.
    pub fn enqueue(&self, url: &str, level: u32, parent_url: Option<&str>) -> bool {
        let mut state = self.lock();
        if state.records.contains_key(url) {
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.records.insert(
            url.to_string(),
            UrlRecord::pending(url.to_string(), level, parent_url.map(str::to_string), seq),
        );
        state.queue.push_back(url.to_string());
        true
    }

    /// Claims up to `n` URLs from the front of the queue
    ///
    /// Each claimed record becomes InProgress, gets a fresh `started_at` and
    /// has its attempt count incremented. The returned records are copies.
    pub fn pop_batch(&self, n: usize) -> Vec<UrlRecord> {
        let mut state = self.lock();
        let mut claimed = Vec::with_capacity(n.min(state.queue.len()));

        while claimed.len() < n {
            let Some(url) = state.queue.pop_front() else {
                break;
            };
            let Some(record) = state.records.get_mut(&url) else {
                continue;
            };
            if record.status != UrlStatus::Pending {
                continue;
            }

            record.status = UrlStatus::InProgress;
            record.started_at = Some(Utc::now());
            record.attempt_count += 1;
            claimed.push(record.clone());
        }

        claimed
    }

    /// InProgress -> Completed
    pub fn mark_completed(
        &self,
        url: &str,
        content_digest: String,
        artifact_ref: String,
        content_len: u64,
        fetched_via: FetchPath,
    ) -> StoreResult<()> {
        let mut state = self.lock();
        let record = in_progress(&mut state, url, UrlStatus::Completed)?;

        record.status = UrlStatus::Completed;
        record.content_digest = Some(content_digest);
        record.artifact_ref = Some(artifact_ref);
        record.content_len = Some(content_len);
        record.fetched_via = Some(fetched_via);
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Applies the retry policy to a failed attempt
    ///
    /// With attempts left the record goes back to Pending at the tail of the
    /// queue and `true` is returned. Otherwise it becomes Failed. `last_error`
    /// is recorded either way.
    pub fn mark_failed_or_retry(
        &self,
        url: &str,
        error: &str,
        retry_attempts: u32,
    ) -> StoreResult<bool> {
        let mut state = self.lock();
        let retry = {
            let record = in_progress(&mut state, url, UrlStatus::Failed)?;
            record.last_error = Some(error.to_string());

            if record.attempt_count < retry_attempts {
                record.status = UrlStatus::Pending;
                true
            } else {
                record.status = UrlStatus::Failed;
                record.finished_at = Some(Utc::now());
                false
            }
        };

        if retry {
            state.queue.push_back(url.to_string());
        }
        Ok(retry)
    }

    /// InProgress -> Pending at the tail, without touching the error
    ///
    /// Used for units that were cancelled before producing an outcome.
    pub fn requeue_abandoned(&self, url: &str) -> StoreResult<()> {
        let mut state = self.lock();
        let record = in_progress(&mut state, url, UrlStatus::Pending)?;
        record.status = UrlStatus::Pending;
        state.queue.push_back(url.to_string());
        Ok(())
    }

    /// True if any record still needs work
    pub fn is_resumable(&self) -> bool {
        self.lock().records.values().any(|r| !r.is_terminal())
    }

    /// Consistent copy of every record and the queue order
    pub fn snapshot(&self) -> FrontierSnapshot {
        let state = self.lock();
        let mut records: Vec<UrlRecord> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.seq);

        FrontierSnapshot {
            records,
            queue: state.queue.iter().cloned().collect(),
        }
    }

    /// Replaces the store contents with a snapshot
    ///
    /// InProgress records are reset to Pending. The queue keeps its saved
    /// order with duplicates and non-pending entries dropped, and any Pending
    /// record missing from it is appended in discovery order.
    pub fn restore(&self, snapshot: FrontierSnapshot) {
        let mut records: HashMap<String, UrlRecord> = HashMap::with_capacity(snapshot.records.len());
        let mut next_seq = 0;
        let mut ordered = Vec::with_capacity(snapshot.records.len());

        for mut record in snapshot.records {
            if record.status == UrlStatus::InProgress {
                record.status = UrlStatus::Pending;
            }
            next_seq = next_seq.max(record.seq + 1);
            ordered.push((record.seq, record.url.clone()));
            records.insert(record.url.clone(), record);
        }
        ordered.sort();

        let mut queued = HashSet::new();
        let mut queue = VecDeque::new();
        for url in snapshot.queue {
            let pending = records
                .get(&url)
                .is_some_and(|r| r.status == UrlStatus::Pending);
            if pending && queued.insert(url.clone()) {
                queue.push_back(url);
            }
        }
        for (_, url) in ordered {
            let pending = records
                .get(&url)
                .is_some_and(|r| r.status == UrlStatus::Pending);
            if pending && queued.insert(url.clone()) {
                queue.push_back(url);
            }
        }

        let mut state = self.lock();
        state.records = records;
        state.queue = queue;
        state.next_seq = next_seq;
    }

    pub fn get(&self, url: &str) -> Option<UrlRecord> {
        self.lock().records.get(url).cloned()
    }

    /// All records in discovery order
    pub fn records(&self) -> Vec<UrlRecord> {
        self.snapshot().records
    }

    pub fn pending_len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}

fn in_progress<'a>(
    state: &'a mut FrontierState,
    url: &str,
    to: UrlStatus,
) -> StoreResult<&'a mut UrlRecord> {
    let record = state
        .records
        .get_mut(url)
        .ok_or_else(|| StoreError::UnknownUrl(url.to_string()))?;

    if record.status != UrlStatus::InProgress {
        return Err(StoreError::InvalidTransition {
            url: url.to_string(),
            from: record.status,
            to,
        });
    }
    Ok(record)
}
