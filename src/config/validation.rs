use crate::config::types::{Config, CrawlerConfig, OutputConfig, RemoteConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Upper bound on the concurrency budget
const MAX_CONCURRENCY: u32 = 256;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    if let Some(remote) = &config.remote {
        validate_remote_config(remote)?;
    }
    validate_seeds(&config.seeds)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_levels < 1 {
        return Err(ConfigError::Validation(format!(
            "max_levels must be >= 1, got {}",
            config.max_levels
        )));
    }

    if config.max_concurrency < 1 || config.max_concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "max_concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.max_concurrency
        )));
    }

    if config.retry_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_attempts must be >= 1, got {}",
            config.retry_attempts
        )));
    }

    if config.per_fetch_timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "per_fetch_timeout_ms must be >= 1".to_string(),
        ));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_interval must be >= 1, got {}",
            config.checkpoint_interval
        )));
    }

    if config.max_links_per_page < 1 {
        return Err(ConfigError::Validation(format!(
            "max_links_per_page must be >= 1, got {}",
            config.max_links_per_page
        )));
    }

    if config.max_seeds == Some(0) {
        return Err(ConfigError::Validation(
            "max_seeds must be >= 1 when set".to_string(),
        ));
    }

    if config.poll_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "poll_interval_ms must be >= 1".to_string(),
        ));
    }

    if config.retry_backoff_max_ms < config.retry_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "retry_backoff_max_ms ({}) must be >= retry_backoff_ms ({})",
            config.retry_backoff_max_ms, config.retry_backoff_ms
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent name cannot be empty".to_string(),
        ));
    }

    if let Some(contact) = &config.contact_url {
        Url::parse(contact)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("checkpoint_path", &config.checkpoint_path),
        ("artifact_dir", &config.artifact_dir),
        ("summary_path", &config.summary_path),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}

/// Validates the remote fetch service settings
fn validate_remote_config(config: &RemoteConfig) -> Result<(), ConfigError> {
    validate_http_url(&config.endpoint, "remote endpoint")?;

    if config.timeout_ms < 1 {
        return Err(ConfigError::Validation(
            "remote timeout_ms must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates inline seed URLs
pub(crate) fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        validate_http_url(seed, "seed URL")?;
    }
    Ok(())
}

fn validate_http_url(value: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value.trim())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, value
        )));
    }

    Ok(())
}
