//! HTML text and link extraction
//!
//! Turns a fetched HTML document into plain text lines plus the links it
//! contains. Script-like elements are skipped entirely.

use scraper::{Html, Node, Selector};
use url::Url;

/// Elements whose text never reaches the output
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Extracted content of an HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedHtml {
    pub title: Option<String>,

    /// Visible text, one trimmed non-empty line per text run
    pub text: String,

    /// Absolute http(s) links in document order
    pub links: Vec<String>,
}

/// Parses `html` and extracts text and links, resolving links against `base_url`
///
/// # Example
///
/// ```
/// use frontier_relay::fetch::extract_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><p>Hi</p><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let page = extract_html(html, &base_url);
/// assert_eq!(page.title.as_deref(), Some("Test"));
/// assert_eq!(page.links, vec!["https://example.com/page"]);
/// ```
pub fn extract_html(html: &str, base_url: &Url) -> ExtractedHtml {
    let document = Html::parse_document(html);

    ExtractedHtml {
        title: extract_title(&document),
        text: extract_text(&document),
        links: extract_links(&document, base_url),
    }
}

/// Collapses arbitrary text into trimmed non-empty lines
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .flat_map(|line| line.split("  "))
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_text(document: &Html) -> String {
    let body_selector = match Selector::parse("body") {
        Ok(selector) => selector,
        Err(_) => return String::new(),
    };
    let Some(body) = document.select(&body_selector).next() else {
        return String::new();
    };

    let mut raw = String::new();
    for node in body.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !hidden {
            raw.push_str(text);
            raw.push('\n');
        }
    }

    clean_text(&raw)
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.push(absolute_url);
                }
            }
        }
    }

    links
}

/// Resolves an href to an absolute http(s) URL
///
/// Returns None for empty and fragment-only hrefs, non-web schemes and
/// anything that fails to parse.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
        Some(absolute_url.to_string())
    } else {
        None
    }
}
