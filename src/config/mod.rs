// Configuration module for the REST producer
//
// Provides:
// - YAML configuration file loading
// - Environment variable substitution
// - Configuration validation
// - Default values

pub mod types;
mod loader;

pub use types::*;
pub use loader::ConfigLoader;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ProducerConfig> {
    ConfigLoader::load(path).context("Failed to load configuration")
}

/// Load configuration with environment variable overrides
pub fn load_config_with_env<P: AsRef<Path>>(path: P) -> Result<ProducerConfig> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config);
    ConfigLoader::validate(&config)?;
    Ok(config)
}

/// Allow environment variables to override config values
pub fn apply_env_overrides(config: &mut ProducerConfig) {
    if let Ok(rest_url) = std::env::var("PRODUCER_REST_URL") {
        config.rest.url = rest_url;
    }

    if let Ok(registry_url) = std::env::var("SCHEMA_REGISTRY_URL") {
        config.schema_registry.url = registry_url;
    }

    if let Ok(token) = std::env::var("PRODUCER_AUTH_TOKEN") {
        config
            .rest
            .headers
            .insert("Authorization".to_string(), format!("Bearer {}", token));
    }
}
