use crate::UrlError;
use url::Url;

/// Normalizes a URL into the key used by the frontier
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Accept only `http` and `https`
/// 3. Require a host (the parser lowercases it)
/// 4. Resolve dot segments in the path (done by the parser; empty path becomes /)
/// 5. Remove the fragment
/// 6. Remove an empty query string (trailing ?)
///
/// Scheme, host, port, path and query are otherwise kept as given.
///
/// # Examples
///
/// ```
/// use frontier_relay::url::normalize_url;
///
/// let url = normalize_url("https://A.TEST/docs/../guide?page=2#intro").unwrap();
/// assert_eq!(url.as_str(), "https://a.test/guide?page=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    finish(url)
}

/// Resolves a link found on `base` and normalizes it
///
/// Relative links are joined against the base URL first.
pub fn normalize_link(href: &str, base: &Url) -> Result<Url, UrlError> {
    let url = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(e.to_string()))?;
    finish(url)
}

fn finish(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}
