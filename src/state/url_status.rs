/// URL lifecycle states and fetch path tags
///
/// Both enums are stored as short strings in the checkpoint database.
use std::fmt;

/// Represents the current state of a URL in the crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UrlStatus {
    // ===== Active States =====
    /// Known and waiting in the pending queue
    Pending,

    /// Claimed by the dispatcher and being fetched
    InProgress,

    // ===== Terminal States =====
    /// Fetched, digested and persisted
    Completed,

    /// Retries exhausted or a non-retryable error occurred
    Failed,
}

impl UrlStatus {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if this is an active state (the URL may still be dispatched)
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 4] {
        [Self::Pending, Self::InProgress, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Which fetch path produced the content of a completed URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPath {
    /// Local content, no escalation needed
    Local,

    /// Escalated and served by the remote path
    Remote,

    /// Escalation was needed but the remote path failed; local content kept
    LocalDegraded,
}

impl FetchPath {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
            Self::LocalDegraded => "local_degraded",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            "local_degraded" => Some(Self::LocalDegraded),
            _ => None,
        }
    }
}

impl fmt::Display for FetchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
