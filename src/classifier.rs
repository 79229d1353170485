//! Content classifier deciding when to escalate to the remote fetch path

use crate::fetch::FetchedPage;

/// Decides from locally fetched content whether the remote path should be tried
pub trait EscalationPolicy: Send + Sync {
    fn needs_escalation(&self, page: &FetchedPage) -> bool;
}

/// Case-insensitive trigger phrase matcher
///
/// # Example
///
/// ```
/// use frontier_relay::classifier::PhraseClassifier;
///
/// let classifier = PhraseClassifier::new(["Geo-Blocked"]);
/// assert!(classifier.needs_escalation_text("This page is GEO-BLOCKED here"));
/// assert!(!classifier.needs_escalation_text("Welcome"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct PhraseClassifier {
    phrases: Vec<String>,
}

impl PhraseClassifier {
    /// Builds a classifier; phrases are lowercased and empty ones dropped
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    pub fn needs_escalation_text(&self, text: &str) -> bool {
        if self.phrases.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }
}

impl EscalationPolicy for PhraseClassifier {
    fn needs_escalation(&self, page: &FetchedPage) -> bool {
        self.needs_escalation_text(&page.text)
    }
}
