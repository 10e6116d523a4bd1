// Configuration loader with environment variable substitution

use super::types::*;
use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ProducerConfig> {
        let content = std::fs::read_to_string(path.as_ref())
            .context("Failed to read config file")?;

        Self::load_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn load_str(content: &str) -> Result<ProducerConfig> {
        let content = Self::substitute_env_vars(content)?;

        let config: ProducerConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML configuration")?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Substitute ${VAR} and ${VAR:-default} patterns with environment variables
    ///
    /// Examples:
    /// - ${HOME} -> /home/user
    /// - ${REST_URL:-http://localhost:8082} -> http://localhost:8082 (if REST_URL not set)
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]+))?\}")
            .context("Invalid substitution pattern")?;

        let substituted = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default_value = caps.get(2).map(|m| m.as_str());

            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => match default_value {
                    Some(default) => default.to_string(),
                    // Keep original if no default and var not found
                    None => format!("${{{}}}", var_name),
                },
            }
        });

        Ok(substituted.into_owned())
    }

    /// Validate configuration
    pub fn validate(config: &ProducerConfig) -> Result<()> {
        Self::validate_url("rest.url", &config.rest.url)?;
        Self::validate_url("schema_registry.url", &config.schema_registry.url)?;

        if config.rest.timeout_seconds == 0 {
            bail!("rest.timeout_seconds must be > 0");
        }

        if config.schema_registry.timeout_seconds == 0 {
            bail!("schema_registry.timeout_seconds must be > 0");
        }

        if config.schema_registry.cache_validity_seconds == 0 {
            bail!("schema_registry.cache_validity_seconds must be > 0");
        }

        if config.connection.timeout_seconds == 0 {
            bail!("connection.timeout_seconds must be > 0");
        }

        if config.batching.max_batch_size == 0 {
            bail!("batching.max_batch_size must be > 0");
        }

        if config.batching.max_batch_age_seconds == 0 {
            bail!("batching.max_batch_age_seconds must be > 0");
        }

        match config.logging.format.as_str() {
            "text" | "json" => {}
            unknown => bail!("Unknown logging.format: '{}'. Supported: text, json", unknown),
        }

        Ok(())
    }

    fn validate_url(field: &str, url: &str) -> Result<()> {
        if url.is_empty() {
            bail!("{} cannot be empty", field);
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("{} must be an http(s) URL, got '{}'", field, url);
        }
        Ok(())
    }
}
