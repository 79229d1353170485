//! Configuration module for Frontier-Relay
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and turns a validated file into the immutable [`RunConfig`] a
//! dispatcher runs with.
//!
//! # Example
//!
//! ```no_run
//! use frontier_relay::config::{load_config, RunConfig};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("relay.toml")).unwrap();
//! let run = RunConfig::from_config(&config);
//! println!("Crawling {} levels", run.max_levels);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlerConfig, EscalationConfig, OutputConfig, RemoteConfig, RunConfig,
    UserAgentConfig, DEFAULT_TRIGGER_PHRASES,
};

pub use parser::{collect_seeds, compute_config_hash, load_config, load_config_with_hash};
