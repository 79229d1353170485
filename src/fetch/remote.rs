//! Remote fetch path
//!
//! Delegates a fetch to a separately deployed crawl service over HTTP/JSON.
//! The service renders the page on its side and returns markdown plus the
//! links it found.

use crate::fetch::{FetchError, FetchRequest, FetchStrategy, FetchedPage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

#[derive(Debug, Serialize)]
struct CrawlRequest<'a> {
    url: &'a str,
    config: CrawlOptions,
}

#[derive(Debug, Serialize)]
struct CrawlOptions {
    extract_links: bool,
    max_links: usize,
    /// Seconds
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct CrawlResponse {
    success: bool,
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    extracted_links: Vec<String>,
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the remote crawl service
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl RemoteFetcher {
    pub fn new(client: Client, endpoint: Url, api_key: Option<String>) -> Self {
        Self {
            client,
            endpoint,
            api_key,
        }
    }

    fn remote_error(req: &FetchRequest, message: impl Into<String>) -> FetchError {
        FetchError::Remote {
            url: req.url.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl FetchStrategy for RemoteFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let body = CrawlRequest {
            url: req.url.as_str(),
            config: CrawlOptions {
                extract_links: req.extract_links,
                max_links: req.max_links,
                timeout: req.timeout.as_secs().max(1),
            },
        };

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .timeout(req.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: req.url.to_string(),
                    after: req.timeout,
                }
            } else {
                Self::remote_error(req, e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::remote_error(
                req,
                format!("service responded with HTTP {}", status.as_u16()),
            ));
        }

        let payload: CrawlResponse = response
            .json()
            .await
            .map_err(|e| Self::remote_error(req, format!("malformed response: {}", e)))?;

        if !payload.success {
            return Err(Self::remote_error(
                req,
                payload
                    .error
                    .unwrap_or_else(|| "service reported failure".to_string()),
            ));
        }

        let text = payload.markdown.unwrap_or_default();
        debug!(
            "Remote fetch of {} returned {} chars, {} links",
            req.url,
            text.len(),
            payload.extracted_links.len()
        );

        let links = if req.extract_links {
            payload.extracted_links
        } else {
            Vec::new()
        };

        Ok(FetchedPage {
            url: req.url.to_string(),
            text,
            links,
            status_code: payload.status_code,
        })
    }
}
