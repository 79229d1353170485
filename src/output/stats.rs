//! Run statistics built from frontier records
//!
//! This module aggregates terminal-state counts into a [`CrawlSummary`] and
//! prints it to stdout.

use crate::output::OutputResult;
use crate::state::{FetchPath, UrlRecord, UrlStatus};
use crate::storage::{RunRecord, Storage};
use std::collections::BTreeMap;

/// Per-level record counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub total: u64,
    pub completed: u64,
    pub failed: u64,
}

/// A URL that ran out of attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedUrl {
    pub url: String,
    pub level: u32,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Size statistics over completed pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentStats {
    pub pages: u64,
    pub total_bytes: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
}

impl ContentStats {
    fn add(&mut self, len: u64) {
        if self.pages == 0 {
            self.min_bytes = len;
            self.max_bytes = len;
        } else {
            self.min_bytes = self.min_bytes.min(len);
            self.max_bytes = self.max_bytes.max(len);
        }
        self.pages += 1;
        self.total_bytes += len;
    }

    pub fn average_bytes(&self) -> f64 {
        if self.pages == 0 {
            return 0.0;
        }
        self.total_bytes as f64 / self.pages as f64
    }
}

/// Error category of a stored `last_error`, e.g. `FetchError`
///
/// Errors without a category prefix are reported as `Unknown`.
pub fn error_category(last_error: &str) -> &str {
    match last_error.split_once(':') {
        Some((category, _)) if category.ends_with("Error") && !category.contains(' ') => category,
        _ => "Unknown",
    }
}

/// Aggregated view of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSummary {
    /// Run metadata, when read from a checkpoint database
    pub run: Option<RunInfo>,

    pub total: u64,
    pub by_status: BTreeMap<UrlStatus, u64>,
    pub by_level: BTreeMap<u32, LevelCounts>,

    /// Completed via the local path without escalation
    pub fetched_local: u64,

    /// Completed via the remote path
    pub escalated: u64,

    /// Completed with flagged local content after the remote path failed
    pub degraded: u64,

    /// Failed URLs in discovery order
    pub failures: Vec<FailedUrl>,

    /// Failed URLs grouped by the category of their last error
    pub errors_by_category: BTreeMap<String, u64>,

    /// Sizes of completed pages that recorded one
    pub content: ContentStats,
}

/// Run metadata shown in reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: String,
    pub config_hash: String,
}

impl From<RunRecord> for RunInfo {
    fn from(run: RunRecord) -> Self {
        Self {
            id: run.id,
            started_at: run.started_at,
            finished_at: run.finished_at,
            status: run.status.to_db_string().to_string(),
            config_hash: run.config_hash,
        }
    }
}

impl CrawlSummary {
    /// Builds a summary from records in discovery order
    pub fn from_records(records: &[UrlRecord]) -> Self {
        let mut summary = Self {
            total: records.len() as u64,
            ..Self::default()
        };

        for record in records {
            *summary.by_status.entry(record.status).or_insert(0) += 1;

            let level = summary.by_level.entry(record.level).or_default();
            level.total += 1;

            match record.status {
                UrlStatus::Completed => {
                    level.completed += 1;
                    if let Some(len) = record.content_len {
                        summary.content.add(len);
                    }
                    match record.fetched_via {
                        Some(FetchPath::Remote) => summary.escalated += 1,
                        Some(FetchPath::LocalDegraded) => summary.degraded += 1,
                        Some(FetchPath::Local) | None => summary.fetched_local += 1,
                    }
                }
                UrlStatus::Failed => {
                    level.failed += 1;
                    let category = error_category(record.last_error.as_deref().unwrap_or(""));
                    *summary
                        .errors_by_category
                        .entry(category.to_string())
                        .or_insert(0) += 1;
                    summary.failures.push(FailedUrl {
                        url: record.url.clone(),
                        level: record.level,
                        attempts: record.attempt_count,
                        last_error: record.last_error.clone(),
                    });
                }
                UrlStatus::Pending | UrlStatus::InProgress => {}
            }
        }

        summary
    }

    pub fn with_run(mut self, run: RunRecord) -> Self {
        self.run = Some(run.into());
        self
    }

    pub fn count(&self, status: UrlStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Percentage of all known URLs that completed
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(UrlStatus::Completed) as f64 / self.total as f64 * 100.0
    }

    /// URLs that still need work
    pub fn unfinished(&self) -> u64 {
        self.count(UrlStatus::Pending) + self.count(UrlStatus::InProgress)
    }
}

/// Loads a summary from the checkpoint database
///
/// Returns `None` if no snapshot has been saved yet.
pub fn load_statistics(storage: &dyn Storage) -> OutputResult<Option<CrawlSummary>> {
    let Some(snapshot) = storage.load_snapshot()? else {
        return Ok(None);
    };

    let mut summary = CrawlSummary::from_records(&snapshot.records);
    if let Some(run) = storage.get_latest_run()? {
        summary = summary.with_run(run);
    }
    Ok(Some(summary))
}

/// Prints a summary to stdout
pub fn print_statistics(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    if let Some(run) = &summary.run {
        println!("Run {} ({})", run.id, run.status);
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        println!();
    }

    println!("URLs by Status:");
    for status in UrlStatus::all() {
        let count = summary.count(status);
        let percentage = if summary.total > 0 {
            count as f64 / summary.total as f64 * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!("  Total: {}", summary.total);
    println!();

    println!("By Level:");
    for (level, counts) in &summary.by_level {
        println!(
            "  Level {}: {} URLs, {} completed, {} failed",
            level, counts.total, counts.completed, counts.failed
        );
    }
    println!();

    println!("Fetch Paths:");
    println!("  Local: {}", summary.fetched_local);
    println!("  Remote (escalated): {}", summary.escalated);
    println!("  Local after failed escalation: {}", summary.degraded);
    println!();

    if summary.content.pages > 0 {
        println!("Content Size:");
        println!("  Pages: {}", summary.content.pages);
        println!("  Total: {} bytes", summary.content.total_bytes);
        println!("  Average: {:.0} bytes", summary.content.average_bytes());
        println!(
            "  Min/Max: {} / {} bytes",
            summary.content.min_bytes, summary.content.max_bytes
        );
        println!();
    }

    if !summary.errors_by_category.is_empty() {
        println!("Errors by Category:");
        for (category, count) in &summary.errors_by_category {
            println!("  {}: {}", category, count);
        }
        println!();
    }

    if !summary.failures.is_empty() {
        println!("Failed URLs ({}):", summary.failures.len());
        for failure in &summary.failures {
            println!(
                "  - {} (level {}, {} attempts): {}",
                failure.url,
                failure.level,
                failure.attempts,
                failure.last_error.as_deref().unwrap_or("unknown error")
            );
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} URLs completed)",
        summary.success_rate(),
        summary.count(UrlStatus::Completed),
        summary.total
    );
}
