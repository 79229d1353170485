//! Fetch strategies
//!
//! A [`FetchStrategy`] turns a URL into page text plus outgoing links. The
//! relay ships two: [`LocalFetcher`] for direct HTTP fetches and
//! [`RemoteFetcher`] for the remote crawl service used on escalation.

mod extract;
mod local;
mod remote;
mod types;

pub use extract::{clean_text, extract_html, ExtractedHtml};
pub use local::{build_http_client, LocalFetcher, MAX_BODY_BYTES};
pub use remote::RemoteFetcher;
pub use types::{FetchError, FetchRequest, FetchedPage};

use async_trait::async_trait;

/// A way of fetching one URL
///
/// Implementations must be cheap to share across tasks; the dispatcher holds
/// them behind an `Arc` and calls `fetch` from many units at once.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError>;
}
