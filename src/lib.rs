//! Frontier-Relay: a resumable two-tier crawl dispatcher
//!
//! This crate drives a frontier of URLs through a cheap local fetch path and,
//! when the fetched content looks blocked, a costlier remote fetch path. It
//! bounds concurrency, expands links level by level, retries failures and
//! checkpoints its state so an interrupted run can pick up where it stopped.

pub mod artifact;
pub mod classifier;
pub mod config;
pub mod crawler;
pub mod fetch;
pub mod frontier;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Frontier-Relay operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Frontier store error: {0}")]
    Store(#[from] frontier::StoreError),

    #[error("Artifact store error: {0}")]
    Artifact(#[from] artifact::ArtifactError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Frontier-Relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, RunConfig};
pub use crawler::{Dispatcher, RunOutcome};
pub use frontier::FrontierStore;
pub use state::{FetchPath, UrlRecord, UrlStatus};
pub use url::normalize_url;
