use crate::config::types::Config;
use crate::config::validation::{validate, validate_seeds};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use frontier_relay::config::load_config;
///
/// let config = load_config(Path::new("relay.toml")).unwrap();
/// println!("Max levels: {}", config.crawler.max_levels);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// This is recorded with every run so a resumed crawl can be traced back to
/// the configuration it was started with.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Collects the seed URLs from the config and its optional seeds file
///
/// The seeds file is resolved relative to `config_dir`. Blank lines and
/// lines starting with `#` are skipped. Duplicates are kept; the frontier
/// ignores them on enqueue. With `max-seeds` set, only that many seeds are
/// returned, inline seeds first.
pub fn collect_seeds(config: &Config, config_dir: &Path) -> Result<Vec<String>, ConfigError> {
    let mut seeds = config.seeds.clone();

    if let Some(file) = &config.seeds_file {
        let content = std::fs::read_to_string(config_dir.join(file))?;
        let from_file: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        validate_seeds(&from_file)?;
        seeds.extend(from_file);
    }

    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "at least one seed URL is required".to_string(),
        ));
    }

    if let Some(cap) = config.crawler.max_seeds {
        seeds.truncate(cap as usize);
    }

    Ok(seeds)
}
