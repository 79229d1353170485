use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trigger phrases used when the config does not list its own
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &[
    "your location not permitted",
    "not available in your region",
    "geo-blocked",
    "location not supported",
    "access denied from your location",
    "content not available in your country",
    "vpn detected",
    "proxy detected",
];

/// Main configuration structure for Frontier-Relay
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Level-0 URLs
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Optional file with one seed URL per line, relative to the config file
    #[serde(default)]
    pub seeds_file: Option<String>,

    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Remote fetch service; absent means no remote path
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    pub user_agent: UserAgentConfig,

    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Number of levels to crawl; 1 means seeds only
    pub max_levels: u32,

    /// Maximum number of units of work in flight
    pub max_concurrency: u32,

    /// Total dispatch attempts per URL before it is marked failed
    pub retry_attempts: u32,

    /// Timeout for one local fetch (milliseconds)
    #[serde(default = "default_fetch_timeout_ms")]
    pub per_fetch_timeout_ms: u64,

    /// Checkpoint after this many finished units
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: u32,

    /// Child links taken from one page at most
    #[serde(default = "default_max_links")]
    pub max_links_per_page: u32,

    /// Only the first N seeds are used; unset means all
    #[serde(default)]
    pub max_seeds: Option<u32>,

    /// Upper bound on how long the dispatcher sleeps between ticks (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long in-flight units may run after an interrupt (milliseconds)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Base delay before a retry attempt (milliseconds, 0 disables)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Cap on the retry delay (milliseconds)
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
}

/// Escalation classifier options
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EscalationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_trigger_phrases")]
    pub trigger_phrases: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_phrases: default_trigger_phrases(),
        }
    }
}

/// Remote fetch service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RemoteConfig {
    /// Endpoint that accepts crawl requests
    pub endpoint: String,

    /// Timeout for one remote fetch (milliseconds)
    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,

    /// Environment variable holding a bearer token
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    pub name: String,

    pub version: String,

    /// URL with information about the crawler
    #[serde(default)]
    pub contact_url: Option<String>,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!("{}/{} (+{})", self.name, self.version, contact),
            None => format!("{}/{}", self.name, self.version),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite checkpoint database
    pub checkpoint_path: String,

    /// Directory for fetched content
    pub artifact_dir: String,

    /// Path to the markdown summary file
    pub summary_path: String,

    /// Path to the per-URL CSV export; defaults to the summary path with a
    /// `.csv` extension
    #[serde(default)]
    pub results_path: Option<String>,
}

impl OutputConfig {
    pub fn results_path(&self) -> PathBuf {
        match &self.results_path {
            Some(path) => PathBuf::from(path),
            None => Path::new(&self.summary_path).with_extension("csv"),
        }
    }
}

/// Immutable per-run settings handed to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub max_levels: u32,
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub per_fetch_timeout: Duration,
    pub checkpoint_interval: u32,
    pub escalation_enabled: bool,
    pub max_links_per_page: usize,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
    pub retry_backoff: Duration,
    pub retry_backoff_max: Duration,
    pub remote_timeout: Duration,
}

impl RunConfig {
    /// Builds the run settings from a validated configuration
    pub fn from_config(config: &Config) -> Self {
        let crawler = &config.crawler;
        Self {
            max_levels: crawler.max_levels,
            max_concurrency: crawler.max_concurrency as usize,
            retry_attempts: crawler.retry_attempts,
            per_fetch_timeout: Duration::from_millis(crawler.per_fetch_timeout_ms),
            checkpoint_interval: crawler.checkpoint_interval,
            escalation_enabled: config.escalation.enabled,
            max_links_per_page: crawler.max_links_per_page as usize,
            poll_interval: Duration::from_millis(crawler.poll_interval_ms),
            shutdown_grace: Duration::from_millis(crawler.shutdown_grace_ms),
            retry_backoff: Duration::from_millis(crawler.retry_backoff_ms),
            retry_backoff_max: Duration::from_millis(crawler.retry_backoff_max_ms),
            remote_timeout: Duration::from_millis(
                config
                    .remote
                    .as_ref()
                    .map_or(default_remote_timeout_ms(), |r| r.timeout_ms),
            ),
        }
    }

    /// True if a record at `level` may enqueue children
    pub fn expands_children(&self, level: u32) -> bool {
        level + 1 < self.max_levels
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_levels: 1,
            max_concurrency: 5,
            retry_attempts: 3,
            per_fetch_timeout: Duration::from_millis(default_fetch_timeout_ms()),
            checkpoint_interval: default_checkpoint_interval(),
            escalation_enabled: true,
            max_links_per_page: default_max_links() as usize,
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            shutdown_grace: Duration::from_millis(default_shutdown_grace_ms()),
            retry_backoff: Duration::from_millis(default_retry_backoff_ms()),
            retry_backoff_max: Duration::from_millis(default_retry_backoff_max_ms()),
            remote_timeout: Duration::from_millis(default_remote_timeout_ms()),
        }
    }
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_checkpoint_interval() -> u32 {
    10
}

fn default_max_links() -> u32 {
    10
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_shutdown_grace_ms() -> u64 {
    10_000
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_retry_backoff_max_ms() -> u64 {
    10_000
}

fn default_remote_timeout_ms() -> u64 {
    300_000
}

fn default_true() -> bool {
    true
}

fn default_trigger_phrases() -> Vec<String> {
    DEFAULT_TRIGGER_PHRASES
        .iter()
        .map(|phrase| phrase.to_string())
        .collect()
}
