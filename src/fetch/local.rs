//! Direct HTTP fetch path
//!
//! Fetches a page with a plain GET and extracts text and links in-process.

use crate::config::UserAgentConfig;
use crate::fetch::extract::{clean_text, extract_html};
use crate::fetch::{FetchError, FetchRequest, FetchStrategy, FetchedPage};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Builds the HTTP client shared by the fetch strategies
///
/// # Example
///
/// ```no_run
/// use frontier_relay::config::UserAgentConfig;
/// use frontier_relay::fetch::build_http_client;
///
/// let config = UserAgentConfig {
///     name: "frontier-relay".to_string(),
///     version: "0.1".to_string(),
///     contact_url: Some("https://example.com/bot".to_string()),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Largest response body the local path will buffer
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Fetches pages directly from their origin
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl LocalFetcher {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    fn too_large(&self, req: &FetchRequest, size: u64) -> FetchError {
        FetchError::Extraction {
            url: req.url.to_string(),
            message: format!(
                "body of {} bytes exceeds the {} byte limit",
                size, self.max_body_bytes
            ),
        }
    }

    /// Reads the body in chunks, stopping as soon as it passes the limit
    async fn read_body(
        &self,
        req: &FetchRequest,
        mut response: reqwest::Response,
    ) -> Result<String, FetchError> {
        if let Some(len) = response.content_length() {
            if len > self.max_body_bytes as u64 {
                return Err(self.too_large(req, len));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::from_reqwest(&req.url, req.timeout, e))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(self.too_large(req, (body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[async_trait]
impl FetchStrategy for LocalFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(req.url.clone())
            .timeout(req.timeout)
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(&req.url, req.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: req.url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let kind = ContentKind::from_header(&content_type).ok_or_else(|| {
            FetchError::Extraction {
                url: req.url.to_string(),
                message: format!("unsupported content type '{}'", content_type),
            }
        })?;

        let body = self.read_body(req, response).await?;

        debug!(
            "Fetched {} ({} bytes, {})",
            final_url,
            body.len(),
            content_type
        );

        let (text, links) = match kind {
            ContentKind::Html => {
                let page = extract_html(&body, &final_url);
                let text = match page.title {
                    Some(title) if !page.text.is_empty() => format!("# {}\n\n{}", title, page.text),
                    Some(title) => format!("# {}", title),
                    None => page.text,
                };
                let links = if req.extract_links { page.links } else { Vec::new() };
                (text, links)
            }
            ContentKind::PlainText => (clean_text(&body), Vec::new()),
        };

        Ok(FetchedPage {
            url: final_url.to_string(),
            text,
            links,
            status_code: Some(status.as_u16()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Html,
    PlainText,
}

impl ContentKind {
    fn from_header(content_type: &str) -> Option<Self> {
        let mime = content_type.split(';').next().unwrap_or("").trim();
        match mime {
            "" | "text/html" | "application/xhtml+xml" => Some(Self::Html),
            m if m.starts_with("text/") => Some(Self::PlainText),
            _ => None,
        }
    }
}
