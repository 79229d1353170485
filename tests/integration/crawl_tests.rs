//! Integration tests for the dispatcher and the HTTP fetch strategies
//!
//! Dispatcher scenarios run against scripted in-process fetch strategies so
//! call counts and failures are fully controlled. The HTTP adapters are
//! tested against wiremock servers.

use async_trait::async_trait;
use frontier_relay::artifact::{ArtifactError, ArtifactStore, MemoryArtifactStore};
use frontier_relay::config::{RunConfig, UserAgentConfig};
use frontier_relay::crawler::{Checkpointer, Dispatcher, RunOutcome};
use frontier_relay::fetch::{
    build_http_client, FetchError, FetchRequest, FetchStrategy, FetchedPage, LocalFetcher,
    RemoteFetcher,
};
use frontier_relay::frontier::FrontierStore;
use frontier_relay::output::CrawlSummary;
use frontier_relay::storage::{RunStatus, SqliteStorage, Storage};
use frontier_relay::{FetchPath, UrlStatus};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEED: &str = "https://site.test/";

type Script = dyn Fn(&str, u32) -> Result<FetchedPage, FetchError> + Send + Sync;

/// Fetch strategy driven by a closure of (url, call number for that url)
struct ScriptedFetch {
    script: Box<Script>,
    delay: Option<(String, Duration)>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedFetch {
    fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&str, u32) -> Result<FetchedPage, FetchError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            delay: None,
            calls: Mutex::new(HashMap::new()),
        })
    }

    /// Like `new`, but fetches of URLs starting with `prefix` sleep first
    fn slow<F>(prefix: &str, delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(&str, u32) -> Result<FetchedPage, FetchError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            delay: Some((prefix.to_string(), delay)),
            calls: Mutex::new(HashMap::new()),
        })
    }

    fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl FetchStrategy for ScriptedFetch {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let url = req.url.to_string();
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(url.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some((prefix, delay)) = &self.delay {
            if url.starts_with(prefix.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }

        (self.script)(&url, call)
    }
}

/// Fetch strategy that records how many fetches overlap
///
/// Every fetch sleeps for `delay`. The first call for each URL in `flaky`
/// times out so retries run alongside fresh work.
struct TrackingFetch {
    delay: Duration,
    flaky: HashSet<String>,
    current: AtomicUsize,
    peak: AtomicUsize,
    active: Mutex<HashSet<String>>,
    seen: Mutex<HashSet<String>>,
    same_url_overlaps: AtomicUsize,
}

impl TrackingFetch {
    fn new(delay: Duration, flaky: &[String]) -> Arc<Self> {
        Arc::new(Self {
            delay,
            flaky: flaky.iter().cloned().collect(),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            active: Mutex::new(HashSet::new()),
            seen: Mutex::new(HashSet::new()),
            same_url_overlaps: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl FetchStrategy for TrackingFetch {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let url = req.url.to_string();
        if !self.active.lock().unwrap().insert(url.clone()) {
            self.same_url_overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        let first_call = self.seen.lock().unwrap().insert(url.clone());
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.active.lock().unwrap().remove(&url);

        if first_call && self.flaky.contains(&url) {
            return Err(timeout(&url));
        }
        Ok(page(&url, "tracked", &[]))
    }
}

/// Artifact store that always fails
struct BrokenArtifacts;

#[async_trait]
impl ArtifactStore for BrokenArtifacts {
    async fn put(&self, digest: &str, _content: &str) -> Result<String, ArtifactError> {
        Err(ArtifactError::Write {
            path: format!("/nowhere/{}.md", digest).into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        })
    }
}

fn page(url: &str, text: &str, links: &[&str]) -> FetchedPage {
    FetchedPage {
        url: url.to_string(),
        text: text.to_string(),
        links: links.iter().map(|l| l.to_string()).collect(),
        status_code: Some(200),
    }
}

fn timeout(url: &str) -> FetchError {
    FetchError::Timeout {
        url: url.to_string(),
        after: Duration::from_millis(5),
    }
}

fn test_run(max_levels: u32) -> RunConfig {
    RunConfig {
        max_levels,
        max_concurrency: 4,
        retry_attempts: 3,
        per_fetch_timeout: Duration::from_secs(60),
        checkpoint_interval: 2,
        poll_interval: Duration::from_millis(10),
        shutdown_grace: Duration::from_millis(50),
        retry_backoff: Duration::ZERO,
        retry_backoff_max: Duration::ZERO,
        ..RunConfig::default()
    }
}

fn seeded_store(urls: &[&str]) -> FrontierStore {
    let store = FrontierStore::new();
    for url in urls {
        store.enqueue(url, 0, None);
    }
    store
}

async fn run_to_end(dispatcher: &mut Dispatcher) -> RunOutcome {
    let (_tx, rx) = watch::channel(false);
    dispatcher.run(rx).await.unwrap()
}

#[tokio::test]
async fn test_two_levels_with_two_links() {
    let local = ScriptedFetch::new(|url, _| match url {
        SEED => Ok(page(url, "home", &["/a", "https://site.test/b#frag"])),
        _ => Ok(page(url, "leaf", &["/c", "/d"])),
    });

    let mut dispatcher = Dispatcher::new(
        test_run(2),
        seeded_store(&[SEED]),
        local.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );

    assert_eq!(run_to_end(&mut dispatcher).await, RunOutcome::Completed);

    let store = dispatcher.store();
    assert_eq!(store.len(), 3);

    let seed = store.get(SEED).unwrap();
    assert_eq!(seed.status, UrlStatus::Completed);
    assert_eq!(seed.level, 0);

    for child in ["https://site.test/a", "https://site.test/b"] {
        let record = store.get(child).unwrap();
        assert_eq!(record.status, UrlStatus::Completed);
        assert_eq!(record.level, 1);
        assert_eq!(record.parent_url.as_deref(), Some(SEED));
    }

    assert!(store.get("https://site.test/c").is_none());
    assert_eq!(local.total_calls(), 3);
}

#[tokio::test]
async fn test_depth_bound_holds() {
    // Every page links to two fresh pages one level deeper
    let local = ScriptedFetch::new(|url, _| {
        let next_a = format!("{}a/", url);
        let next_b = format!("{}b/", url);
        Ok(page(url, url, &[next_a.as_str(), next_b.as_str()]))
    });

    let mut dispatcher = Dispatcher::new(
        test_run(3),
        seeded_store(&[SEED]),
        local,
        Arc::new(MemoryArtifactStore::new()),
    );

    assert_eq!(run_to_end(&mut dispatcher).await, RunOutcome::Completed);

    let records = dispatcher.store().records();
    assert_eq!(records.len(), 1 + 2 + 4);
    assert!(records.iter().all(|r| r.level < 3));
    assert!(records.iter().all(|r| r.status == UrlStatus::Completed));
}

#[tokio::test]
async fn test_no_duplicate_dispatch() {
    // A dense graph where every page links to every other page
    let urls: Vec<String> = (0..12).map(|i| format!("https://site.test/p{}", i)).collect();
    let links = urls.clone();
    let local = ScriptedFetch::new(move |url, _| {
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        Ok(page(url, url, &refs))
    });

    let mut run = test_run(4);
    run.max_concurrency = 8;
    run.max_links_per_page = 20;

    let mut dispatcher = Dispatcher::new(
        run,
        seeded_store(&[SEED]),
        local.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );

    assert_eq!(run_to_end(&mut dispatcher).await, RunOutcome::Completed);

    let records = dispatcher.store().records();
    assert_eq!(records.len(), 13);
    for record in &records {
        assert_eq!(record.status, UrlStatus::Completed);
        assert_eq!(record.attempt_count, 1);
        assert_eq!(local.calls(&record.url), record.attempt_count);
    }
}

#[tokio::test]
async fn test_always_timing_out_fails_after_three_attempts() {
    let local = ScriptedFetch::new(|url, _| Err(timeout(url)));

    let mut dispatcher = Dispatcher::new(
        test_run(1),
        seeded_store(&[SEED]),
        local.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );

    assert_eq!(run_to_end(&mut dispatcher).await, RunOutcome::Completed);

    let record = dispatcher.store().get(SEED).unwrap();
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.attempt_count, 3);
    assert_eq!(local.calls(SEED), 3);
    assert!(record.last_error.unwrap().starts_with("FetchError"));
    assert!(record.content_digest.is_none());
}

#[tokio::test]
async fn test_retry_recovers_after_transient_failure() {
    let local = ScriptedFetch::new(|url, call| {
        if call == 1 {
            Err(timeout(url))
        } else {
            Ok(page(url, "ok", &[]))
        }
    });

    let mut dispatcher = Dispatcher::new(
        test_run(1),
        seeded_store(&[SEED]),
        local,
        Arc::new(MemoryArtifactStore::new()),
    );
    run_to_end(&mut dispatcher).await;

    let record = dispatcher.store().get(SEED).unwrap();
    assert_eq!(record.status, UrlStatus::Completed);
    assert_eq!(record.attempt_count, 2);
    assert!(record.last_error.unwrap().starts_with("FetchError"));
    assert_eq!(dispatcher.progress().retried, 1);
}

#[tokio::test]
async fn test_extraction_errors_capped_at_two_attempts() {
    let local = ScriptedFetch::new(|url, _| {
        Err(FetchError::Extraction {
            url: url.to_string(),
            message: "unsupported content type 'application/pdf'".to_string(),
        })
    });

    let mut run = test_run(1);
    run.retry_attempts = 5;

    let mut dispatcher = Dispatcher::new(
        run,
        seeded_store(&[SEED]),
        local.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );
    run_to_end(&mut dispatcher).await;

    let record = dispatcher.store().get(SEED).unwrap();
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.attempt_count, 2);
    assert_eq!(local.calls(SEED), 2);
    assert!(record.last_error.unwrap().starts_with("ExtractionError"));
}

#[tokio::test]
async fn test_persistence_failure_is_not_retried() {
    let local = ScriptedFetch::new(|url, _| Ok(page(url, "content", &[])));

    let mut dispatcher = Dispatcher::new(
        test_run(1),
        seeded_store(&[SEED]),
        local.clone(),
        Arc::new(BrokenArtifacts),
    );
    run_to_end(&mut dispatcher).await;

    let record = dispatcher.store().get(SEED).unwrap();
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.attempt_count, 1);
    assert_eq!(local.calls(SEED), 1);
    assert!(record.last_error.unwrap().starts_with("PersistenceError"));
}

#[tokio::test]
async fn test_panicking_unit_counts_as_failure() {
    let bad = "https://site.test/bad";
    let local = ScriptedFetch::new(move |url, _| {
        if url == bad {
            panic!("parser blew up");
        }
        Ok(page(url, "fine", &["/bad", "/good"]))
    });

    let mut dispatcher = Dispatcher::new(
        test_run(2),
        seeded_store(&[SEED]),
        local.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );
    assert_eq!(run_to_end(&mut dispatcher).await, RunOutcome::Completed);

    let store = dispatcher.store();
    let record = store.get(bad).unwrap();
    assert_eq!(record.status, UrlStatus::Failed);
    assert_eq!(record.attempt_count, 3);
    assert_eq!(local.calls(bad), 3);
    let error = record.last_error.unwrap();
    assert!(error.starts_with("PanicError"));
    assert!(error.contains("parser blew up"));

    assert_eq!(
        store.get("https://site.test/good").unwrap().status,
        UrlStatus::Completed
    );
}

#[tokio::test]
async fn test_trigger_phrase_with_failing_remote_degrades() {
    let local = ScriptedFetch::new(|url, _| {
        Ok(page(url, "Sorry, this page is Geo-Blocked for you", &[]))
    });
    let remote = ScriptedFetch::new(|url, _| {
        Err(FetchError::Remote {
            url: url.to_string(),
            message: "service unavailable".to_string(),
        })
    });
    let artifacts = Arc::new(MemoryArtifactStore::new());

    let mut dispatcher = Dispatcher::new(
        test_run(1),
        seeded_store(&[SEED]),
        local.clone(),
        artifacts.clone(),
    )
    .with_remote(remote.clone());
    run_to_end(&mut dispatcher).await;

    let record = dispatcher.store().get(SEED).unwrap();
    assert_eq!(record.status, UrlStatus::Completed);
    assert_eq!(record.fetched_via, Some(FetchPath::LocalDegraded));
    assert_eq!(record.attempt_count, 1);
    assert_eq!(remote.calls(SEED), 1);

    let stored = artifacts.get(record.content_digest.as_deref().unwrap()).unwrap();
    assert!(stored.contains("Geo-Blocked"));
    assert_eq!(dispatcher.progress().degraded, 1);
}

#[tokio::test]
async fn test_escalation_uses_remote_content_and_links() {
    let local = ScriptedFetch::new(|url, _| match url {
        SEED => Ok(page(url, "VPN detected, go away", &["/local-only"])),
        _ => Ok(page(url, "child", &[])),
    });
    let remote = ScriptedFetch::new(|url, _| Ok(page(url, "the real page", &["/remote-child"])));
    let artifacts = Arc::new(MemoryArtifactStore::new());

    let mut dispatcher = Dispatcher::new(
        test_run(2),
        seeded_store(&[SEED]),
        local.clone(),
        artifacts.clone(),
    )
    .with_remote(remote.clone());
    run_to_end(&mut dispatcher).await;

    let store = dispatcher.store();
    let seed = store.get(SEED).unwrap();
    assert_eq!(seed.fetched_via, Some(FetchPath::Remote));
    assert_eq!(
        artifacts.get(seed.content_digest.as_deref().unwrap()).as_deref(),
        Some("the real page")
    );

    assert!(store.get("https://site.test/remote-child").is_some());
    assert!(store.get("https://site.test/local-only").is_none());

    // The child page is clean, so only the seed was escalated
    assert_eq!(remote.total_calls(), 1);
}

#[tokio::test]
async fn test_disabled_escalation_never_calls_remote() {
    let local = ScriptedFetch::new(|url, _| Ok(page(url, "geo-blocked", &[])));
    let remote = ScriptedFetch::new(|url, _| Ok(page(url, "remote", &[])));

    let mut run = test_run(1);
    run.escalation_enabled = false;

    let mut dispatcher = Dispatcher::new(
        run,
        seeded_store(&[SEED, "https://site.test/other"]),
        local,
        Arc::new(MemoryArtifactStore::new()),
    )
    .with_remote(remote.clone());
    run_to_end(&mut dispatcher).await;

    assert_eq!(remote.total_calls(), 0);
    for record in dispatcher.store().records() {
        assert_eq!(record.status, UrlStatus::Completed);
        assert_eq!(record.fetched_via, Some(FetchPath::Local));
    }
}

#[tokio::test]
async fn test_flagged_page_without_remote_completes_locally() {
    let local = ScriptedFetch::new(|url, _| Ok(page(url, "proxy detected", &[])));

    let mut dispatcher = Dispatcher::new(
        test_run(1),
        seeded_store(&[SEED]),
        local,
        Arc::new(MemoryArtifactStore::new()),
    );
    run_to_end(&mut dispatcher).await;

    let record = dispatcher.store().get(SEED).unwrap();
    assert_eq!(record.status, UrlStatus::Completed);
    assert_eq!(record.fetched_via, Some(FetchPath::Local));
}

#[tokio::test]
async fn test_interrupt_flushes_state_and_resume_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("relay.db");

    // Children hang long enough to be caught by the interrupt
    let slow = ScriptedFetch::slow("https://site.test/slow", Duration::from_secs(30), |url, _| {
        Ok(page(url, url, &["/slow1", "/slow2"]))
    });

    let mut checkpointer = Checkpointer::new(SqliteStorage::new(&db_path).unwrap());
    checkpointer.begin_run("hash-1").await.unwrap();

    let mut dispatcher = Dispatcher::new(
        test_run(2),
        seeded_store(&[SEED]),
        slow.clone(),
        Arc::new(MemoryArtifactStore::new()),
    )
    .with_checkpointer(checkpointer);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        // Keep the sender alive until the run is over
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let outcome = dispatcher.run(rx).await.unwrap();
    assert_eq!(outcome, RunOutcome::Interrupted);

    let first = dispatcher.into_store();
    assert!(first
        .records()
        .iter()
        .all(|r| r.status != UrlStatus::InProgress));
    assert_eq!(first.get(SEED).unwrap().status, UrlStatus::Completed);
    assert_eq!(
        first.get("https://site.test/slow1").unwrap().status,
        UrlStatus::Pending
    );

    // The final checkpoint matches the in-memory state
    let storage = SqliteStorage::new(&db_path).unwrap();
    let snapshot = storage.load_snapshot().unwrap().unwrap();
    assert_eq!(snapshot, first.snapshot());
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Interrupted
    );

    // Resume with a fast fetcher; the completed seed is not fetched again
    let fast = ScriptedFetch::new(|url, _| Ok(page(url, "done", &[])));
    let mut checkpointer = Checkpointer::new(storage);
    checkpointer.begin_run("hash-1").await.unwrap();

    let mut resumed = Dispatcher::new(
        test_run(2),
        FrontierStore::from_snapshot(snapshot),
        fast.clone(),
        Arc::new(MemoryArtifactStore::new()),
    )
    .with_checkpointer(checkpointer);
    assert_eq!(run_to_end(&mut resumed).await, RunOutcome::Completed);

    assert_eq!(fast.calls(SEED), 0);
    assert_eq!(fast.total_calls(), 2);

    let store = resumed.store();
    assert_eq!(store.len(), 3);
    for url in ["https://site.test/slow1", "https://site.test/slow2"] {
        let record = store.get(url).unwrap();
        assert_eq!(record.status, UrlStatus::Completed);
        assert_eq!(record.attempt_count, 2);
    }

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
    let counts = storage.count_by_status().unwrap();
    assert_eq!(counts.get(&UrlStatus::Completed), Some(&3));
}

#[tokio::test]
async fn test_concurrency_budget_holds_on_wide_frontier() {
    let seeds: Vec<String> = (0..30)
        .map(|i| format!("https://wide.test/{}", i))
        .collect();
    let flaky: Vec<String> = seeds.iter().step_by(5).cloned().collect();
    let tracking = TrackingFetch::new(Duration::from_millis(20), &flaky);

    let store = FrontierStore::new();
    for seed in &seeds {
        store.enqueue(seed, 0, None);
    }

    let mut dispatcher = Dispatcher::new(
        test_run(1),
        store,
        tracking.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );
    assert_eq!(run_to_end(&mut dispatcher).await, RunOutcome::Completed);

    assert_eq!(tracking.peak.load(Ordering::SeqCst), 4);
    assert_eq!(tracking.same_url_overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(tracking.current.load(Ordering::SeqCst), 0);

    let store = dispatcher.store();
    for seed in &seeds {
        let record = store.get(seed).unwrap();
        assert_eq!(record.status, UrlStatus::Completed);
        let expected_attempts = if flaky.contains(seed) { 2 } else { 1 };
        assert_eq!(record.attempt_count, expected_attempts, "{}", seed);
    }
}

/// Site used by the resume comparison: one branch is slow, one URL always fails
fn branching_site(url: &str, _call: u32) -> Result<FetchedPage, FetchError> {
    match url {
        SEED => Ok(page(url, "home", &["/a", "/b", "/bad"])),
        "https://site.test/a" => Ok(page(url, "a", &["/a/1", "/a/2"])),
        "https://site.test/b" => Ok(page(url, "b", &["/b/1"])),
        "https://site.test/bad" => Err(timeout(url)),
        _ => Ok(page(url, "leaf", &[])),
    }
}

fn final_states(store: &FrontierStore) -> BTreeMap<String, (UrlStatus, u32, Option<String>)> {
    store
        .records()
        .into_iter()
        .map(|r| (r.url, (r.status, r.level, r.content_digest)))
        .collect()
}

#[tokio::test]
async fn test_interrupted_and_resumed_run_matches_uninterrupted_run() {
    // Reference: one uninterrupted run
    let mut reference = Dispatcher::new(
        test_run(3),
        seeded_store(&[SEED]),
        ScriptedFetch::new(branching_site),
        Arc::new(MemoryArtifactStore::new()),
    );
    assert_eq!(run_to_end(&mut reference).await, RunOutcome::Completed);
    let expected = final_states(reference.store());
    let expected_summary = CrawlSummary::from_records(&reference.store().records());
    assert_eq!(expected.len(), 7);

    // Same site, but the /a branch hangs until the interrupt lands
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("relay.db");
    let mut checkpointer = Checkpointer::new(SqliteStorage::new(&db_path).unwrap());
    checkpointer.begin_run("hash-1").await.unwrap();

    let mut first = Dispatcher::new(
        test_run(3),
        seeded_store(&[SEED]),
        ScriptedFetch::slow("https://site.test/a", Duration::from_secs(30), branching_site),
        Arc::new(MemoryArtifactStore::new()),
    )
    .with_checkpointer(checkpointer);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });
    assert_eq!(first.run(rx).await.unwrap(), RunOutcome::Interrupted);
    assert_eq!(
        first.store().get("https://site.test/a").unwrap().status,
        UrlStatus::Pending
    );

    // Resume from the checkpoint alone
    let storage = SqliteStorage::new(&db_path).unwrap();
    let snapshot = storage.load_snapshot().unwrap().unwrap();
    let fast = ScriptedFetch::new(branching_site);
    let mut checkpointer = Checkpointer::new(storage);
    checkpointer.begin_run("hash-1").await.unwrap();

    let mut resumed = Dispatcher::new(
        test_run(3),
        FrontierStore::from_snapshot(snapshot),
        fast.clone(),
        Arc::new(MemoryArtifactStore::new()),
    )
    .with_checkpointer(checkpointer);
    assert_eq!(run_to_end(&mut resumed).await, RunOutcome::Completed);

    // Work finished before the interrupt is not repeated
    for done in [SEED, "https://site.test/b", "https://site.test/b/1", "https://site.test/bad"] {
        assert_eq!(fast.calls(done), 0, "{}", done);
    }

    assert_eq!(final_states(resumed.store()), expected);

    let summary = CrawlSummary::from_records(&resumed.store().records());
    assert_eq!(summary.by_status, expected_summary.by_status);
    assert_eq!(summary.by_level, expected_summary.by_level);
    assert_eq!(summary.errors_by_category, expected_summary.errors_by_category);
    assert_eq!(summary.content, expected_summary.content);
}

#[tokio::test]
async fn test_resuming_a_finished_frontier_does_nothing() {
    let local = ScriptedFetch::new(|url, _| Ok(page(url, "x", &["/a"])));
    let mut dispatcher = Dispatcher::new(
        test_run(2),
        seeded_store(&[SEED]),
        local.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );
    run_to_end(&mut dispatcher).await;
    let snapshot = dispatcher.store().snapshot();

    let again = ScriptedFetch::new(|url, _| Ok(page(url, "x", &["/a"])));
    let mut resumed = Dispatcher::new(
        test_run(2),
        FrontierStore::from_snapshot(snapshot.clone()),
        again.clone(),
        Arc::new(MemoryArtifactStore::new()),
    );
    assert_eq!(run_to_end(&mut resumed).await, RunOutcome::Completed);

    assert_eq!(again.total_calls(), 0);
    assert_eq!(resumed.store().snapshot(), snapshot);
}

#[tokio::test]
async fn test_summary_reflects_run() {
    let local = ScriptedFetch::new(|url, _| match url {
        SEED => Ok(page(url, "home", &["/ok", "/broken"])),
        "https://site.test/broken" => Err(timeout(url)),
        _ => Ok(page(url, "fine", &[])),
    });

    let mut dispatcher = Dispatcher::new(
        test_run(2),
        seeded_store(&[SEED]),
        local,
        Arc::new(MemoryArtifactStore::new()),
    );
    run_to_end(&mut dispatcher).await;

    let summary = CrawlSummary::from_records(&dispatcher.store().records());
    assert_eq!(summary.total, 3);
    assert_eq!(summary.count(UrlStatus::Completed), 2);
    assert_eq!(summary.count(UrlStatus::Failed), 1);
    assert_eq!(summary.failures[0].url, "https://site.test/broken");
    assert_eq!(summary.failures[0].attempts, 3);
    assert_eq!(summary.by_level.get(&1).map(|l| l.failed), Some(1));
}

// ===== HTTP fetch strategies =====

fn test_client() -> reqwest::Client {
    build_http_client(&UserAgentConfig {
        name: "TestRelay".to_string(),
        version: "1.0".to_string(),
        contact_url: None,
    })
    .unwrap()
}

fn request(url: &str, extract_links: bool) -> FetchRequest {
    FetchRequest {
        url: Url::parse(url).unwrap(),
        timeout: Duration::from_secs(5),
        extract_links,
        max_links: 10,
    }
}

#[tokio::test]
async fn test_local_fetch_html() {
    let server = MockServer::start().await;
    let html = r##"<html><head><title>Welcome</title><style>p{}</style></head>
        <body><p>Hello there</p><script>var x = 1;</script>
        <a href="/next">next</a><a href="mailto:a@b.c">mail</a><a href="#top">top</a>
        </body></html>"##;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
        .mount(&server)
        .await;

    let fetcher = LocalFetcher::new(test_client());
    let fetched = fetcher
        .fetch(&request(&format!("{}/", server.uri()), true))
        .await
        .unwrap();

    assert!(fetched.text.starts_with("# Welcome"));
    assert!(fetched.text.contains("Hello there"));
    assert!(!fetched.text.contains("var x"));
    assert_eq!(fetched.links, vec![format!("{}/next", server.uri())]);
    assert_eq!(fetched.status_code, Some(200));
}

#[tokio::test]
async fn test_local_fetch_http_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetcher = LocalFetcher::new(test_client());
    let err = fetcher
        .fetch(&request(&format!("{}/missing", server.uri()), false))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_local_fetch_rejects_binary_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8, 1, 2], "application/pdf"))
        .mount(&server)
        .await;

    let fetcher = LocalFetcher::new(test_client());
    let err = fetcher
        .fetch(&request(&format!("{}/doc.pdf", server.uri()), false))
        .await
        .unwrap_err();

    assert!(err.is_extraction());
}

#[tokio::test]
async fn test_local_fetch_rejects_oversized_body() {
    let server = MockServer::start().await;
    let big = format!("<html><body><p>{}</p></body></html>", "x".repeat(500));
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(big, "text/html"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/small"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html><body><p>ok</p></body></html>", "text/html"),
        )
        .mount(&server)
        .await;

    let fetcher = LocalFetcher::new(test_client()).with_max_body_bytes(256);

    let err = fetcher
        .fetch(&request(&format!("{}/big", server.uri()), false))
        .await
        .unwrap_err();
    assert!(err.is_extraction());
    assert!(err.to_string().contains("256 byte limit"));

    let small = fetcher
        .fetch(&request(&format!("{}/small", server.uri()), false))
        .await
        .unwrap();
    assert!(small.text.contains("ok"));
}

#[tokio::test]
async fn test_remote_fetch_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crawl"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": true,
            "markdown": "# Unblocked",
            "extracted_links": ["https://site.test/x"],
            "status_code": 200
        })))
        .mount(&server)
        .await;

    let endpoint = Url::parse(&format!("{}/crawl", server.uri())).unwrap();
    let fetcher = RemoteFetcher::new(test_client(), endpoint, Some("secret".to_string()));
    let fetched = fetcher.fetch(&request(SEED, true)).await.unwrap();

    assert_eq!(fetched.text, "# Unblocked");
    assert_eq!(fetched.links, vec!["https://site.test/x".to_string()]);
    assert_eq!(fetched.status_code, Some(200));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(body["url"], SEED);
    assert_eq!(body["config"]["extract_links"], true);
    assert_eq!(body["config"]["max_links"], 10);
    assert_eq!(body["config"]["timeout"], 5);
}

#[tokio::test]
async fn test_remote_fetch_reported_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "success": false,
            "error": "browser crashed"
        })))
        .mount(&server)
        .await;

    let endpoint = Url::parse(&format!("{}/crawl", server.uri())).unwrap();
    let fetcher = RemoteFetcher::new(test_client(), endpoint, None);
    let err = fetcher.fetch(&request(SEED, false)).await.unwrap_err();

    match err {
        FetchError::Remote { message, .. } => assert_eq!(message, "browser crashed"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_end_to_end_against_http_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            r#"<html><body><a href="/one">1</a><a href="/two">2</a></body></html>"#,
            "text/html",
        ))
        .mount(&server)
        .await;
    for page_path in ["/one", "/two"] {
        Mock::given(method("GET"))
            .and(path(page_path))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<p>leaf</p><a href=\"/three\">3</a>", "text/html"),
            )
            .mount(&server)
            .await;
    }

    let seed = format!("{}/", server.uri());
    let artifacts = Arc::new(MemoryArtifactStore::new());
    let mut dispatcher = Dispatcher::new(
        test_run(2),
        seeded_store(&[seed.as_str()]),
        Arc::new(LocalFetcher::new(test_client())),
        artifacts.clone(),
    );

    assert_eq!(run_to_end(&mut dispatcher).await, RunOutcome::Completed);

    let records = dispatcher.store().records();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == UrlStatus::Completed));
    assert!(dispatcher
        .store()
        .get(&format!("{}/three", server.uri()))
        .is_none());
    // The two leaves share content, so only two distinct artifacts exist
    assert_eq!(artifacts.len(), 2);
}
