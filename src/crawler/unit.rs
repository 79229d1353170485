//! One unit of work: fetch a URL, maybe escalate, then finalize it
//!
//! A unit runs on a worker task and never touches the frontier. It gets a
//! [`UnitRequest`] and hands back either a [`UnitSuccess`] or a [`UnitError`];
//! the control loop applies that outcome to the store.

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::classifier::EscalationPolicy;
use crate::config::RunConfig;
use crate::crawler::backoff::RetryBackoff;
use crate::fetch::{FetchError, FetchRequest, FetchStrategy, FetchedPage};
use crate::state::{FetchPath, UrlRecord};
use crate::url::normalize_link;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Extraction failures are retried at most this many attempts in total
pub const EXTRACTION_ATTEMPT_CAP: u32 = 2;

/// What a worker is told about the URL it was assigned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRequest {
    pub url: String,
    pub level: u32,
    pub attempt: u32,
}

impl From<&UrlRecord> for UnitRequest {
    fn from(record: &UrlRecord) -> Self {
        Self {
            url: record.url.clone(),
            level: record.level,
            attempt: record.attempt_count,
        }
    }
}

/// Result of a finalized unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSuccess {
    pub content_digest: String,
    pub artifact_ref: String,

    /// Size of the finalized text in bytes
    pub content_len: u64,

    /// Normalized, distinct child URLs, already capped
    pub children: Vec<String>,

    pub fetched_via: FetchPath,
}

/// Why a unit failed
#[derive(Debug, Error)]
pub enum UnitError {
    #[error("FetchError: {0}")]
    Fetch(FetchError),

    #[error("ExtractionError: {0}")]
    Extraction(String),

    #[error("PersistenceError: {0}")]
    Persistence(#[from] ArtifactError),

    #[error("PanicError: {0}")]
    Panicked(String),
}

impl From<FetchError> for UnitError {
    fn from(err: FetchError) -> Self {
        if err.is_extraction() {
            Self::Extraction(err.to_string())
        } else {
            Self::Fetch(err)
        }
    }
}

impl UnitError {
    /// Total attempts allowed for a URL that failed this way
    pub fn attempt_budget(&self, retry_attempts: u32) -> u32 {
        match self {
            Self::Fetch(_) | Self::Panicked(_) => retry_attempts,
            Self::Extraction(_) => retry_attempts.min(EXTRACTION_ATTEMPT_CAP),
            Self::Persistence(_) => 0,
        }
    }
}

/// Shared, read-only collaborators for every unit in a run
pub struct UnitContext {
    pub run: RunConfig,
    pub local: Arc<dyn FetchStrategy>,
    pub remote: Option<Arc<dyn FetchStrategy>>,
    pub classifier: Arc<dyn EscalationPolicy>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub backoff: RetryBackoff,
}

impl UnitContext {
    fn escalation_available(&self) -> bool {
        self.run.escalation_enabled && self.remote.is_some()
    }
}

/// Runs one unit of work end to end
pub async fn run_unit(ctx: &UnitContext, req: UnitRequest) -> Result<UnitSuccess, UnitError> {
    let delay = ctx.backoff.delay(req.attempt);
    if !delay.is_zero() {
        debug!(
            "Backing off {:?} before attempt {} of {}",
            delay, req.attempt, req.url
        );
        tokio::time::sleep(delay).await;
    }

    let url = Url::parse(&req.url)
        .map_err(|e| UnitError::Extraction(format!("invalid frontier URL {}: {}", req.url, e)))?;
    let expands = ctx.run.expands_children(req.level);

    let local_req = FetchRequest {
        url,
        timeout: ctx.run.per_fetch_timeout,
        extract_links: expands,
        max_links: ctx.run.max_links_per_page,
    };
    let local_page = bounded_fetch(ctx.local.as_ref(), &local_req).await?;

    let (page, fetched_via) = if ctx.classifier.needs_escalation(&local_page) {
        escalate(ctx, &local_req, local_page).await
    } else {
        (local_page, FetchPath::Local)
    };

    let content_digest = digest(&page.text);
    let artifact_ref = ctx.artifacts.put(&content_digest, &page.text).await?;

    let children = if expands {
        select_children(&req.url, &page, ctx.run.max_links_per_page)
    } else {
        Vec::new()
    };

    debug!(
        "Finalized {} via {} ({} children)",
        req.url,
        fetched_via,
        children.len()
    );

    Ok(UnitSuccess {
        content_digest,
        artifact_ref,
        content_len: page.text.len() as u64,
        children,
        fetched_via,
    })
}

/// Tries the remote path for a page the classifier flagged
///
/// Falls back to the local page when escalation is unavailable or the
/// remote fetch fails.
async fn escalate(
    ctx: &UnitContext,
    local_req: &FetchRequest,
    local_page: FetchedPage,
) -> (FetchedPage, FetchPath) {
    let remote = match &ctx.remote {
        Some(remote) if ctx.escalation_available() => remote,
        _ => {
            debug!(
                "{} flagged for escalation but no remote path is enabled",
                local_req.url
            );
            return (local_page, FetchPath::Local);
        }
    };

    let remote_req = FetchRequest {
        timeout: ctx.run.remote_timeout,
        ..local_req.clone()
    };

    debug!("Escalating {} to remote fetch", local_req.url);
    match bounded_fetch(remote.as_ref(), &remote_req).await {
        Ok(page) => (page, FetchPath::Remote),
        Err(e) => {
            warn!(
                "Remote fetch failed for {}, keeping local content: {}",
                local_req.url, e
            );
            (local_page, FetchPath::LocalDegraded)
        }
    }
}

async fn bounded_fetch(
    strategy: &dyn FetchStrategy,
    req: &FetchRequest,
) -> Result<FetchedPage, FetchError> {
    match tokio::time::timeout(req.timeout, strategy.fetch(req)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: req.url.to_string(),
            after: req.timeout,
        }),
    }
}

/// SHA-256 hex digest of finalized text
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalizes, de-duplicates and caps a page's links
///
/// Relative links resolve against the URL the page was served from. Links
/// back to the page itself are dropped.
fn select_children(url: &str, page: &FetchedPage, max_links: usize) -> Vec<String> {
    let base = Url::parse(&page.url).or_else(|_| Url::parse(url));
    let Ok(base) = base else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    seen.insert(url.to_string());

    let mut children = Vec::new();
    for link in &page.links {
        if children.len() >= max_links {
            break;
        }
        match normalize_link(link, &base) {
            Ok(child) => {
                let child = child.to_string();
                if seen.insert(child.clone()) {
                    children.push(child);
                }
            }
            Err(e) => debug!("Skipping link {} on {}: {}", link, url, e),
        }
    }
    children
}

/// Describes a panic payload caught from a unit
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unit panicked".to_string()
    }
}
