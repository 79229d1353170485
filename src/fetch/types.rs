use std::time::Duration;
use thiserror::Error;
use url::Url;

/// One fetch to perform
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,

    /// Upper bound the strategy should apply to its own I/O
    pub timeout: Duration,

    /// Whether links should be returned with the page
    pub extract_links: bool,

    /// Hint for strategies that can limit links at the source
    pub max_links: usize,
}

/// Text and links produced by a fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    /// URL the content was served from, after redirects
    pub url: String,

    pub text: String,

    /// Links in document order, absolute but not yet normalized
    pub links: Vec<String>,

    pub status_code: Option<u16>,
}

/// Failures a fetch strategy can report
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {}ms fetching {url}", .after.as_millis())]
    Timeout { url: String, after: Duration },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("cannot extract content from {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("remote fetch of {url} failed: {message}")]
    Remote { url: String, message: String },
}

impl FetchError {
    /// Classifies a reqwest error for `url`
    pub fn from_reqwest(url: &Url, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                after: timeout,
            }
        } else if let Some(status) = err.status() {
            Self::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else if err.is_decode() || err.is_body() {
            Self::Extraction {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    pub fn is_extraction(&self) -> bool {
        matches!(self, Self::Extraction { .. })
    }
}
