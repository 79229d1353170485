use crate::state::{FetchPath, UrlStatus};
use chrono::{DateTime, Utc};

/// Lifecycle record for one URL in the frontier
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRecord {
    /// Normalized URL, unique across the run
    pub url: String,

    pub status: UrlStatus,

    /// Crawl depth; seeds are level 0
    pub level: u32,

    /// The URL that discovered this one (None for seeds)
    pub parent_url: Option<String>,

    /// Number of times this URL has been dispatched
    pub attempt_count: u32,

    pub last_error: Option<String>,

    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    /// SHA-256 hex digest of the finalized content
    pub content_digest: Option<String>,

    /// Locator returned by the artifact store
    pub artifact_ref: Option<String>,

    /// Size of the finalized text in bytes
    pub content_len: Option<u64>,

    pub fetched_via: Option<FetchPath>,

    /// Discovery order within the frontier
    pub seq: u64,
}

impl UrlRecord {
    /// Creates a fresh pending record
    pub fn pending(url: String, level: u32, parent_url: Option<String>, seq: u64) -> Self {
        Self {
            url,
            status: UrlStatus::Pending,
            level,
            parent_url,
            attempt_count: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
            content_digest: None,
            artifact_ref: None,
            content_len: None,
            fetched_via: None,
            seq,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
