// Copyright 2025 RADAR-base
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration types for the REST producer

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProducerConfig {
    pub rest: RestConfig,
    pub schema_registry: SchemaRegistryConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TLS trust mode for outgoing connections
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Trust the system certificate store
    #[default]
    System,
    /// Accept any certificate. Only for test environments.
    Unsafe,
}

/// REST proxy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RestConfig {
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Gzip request bodies
    #[serde(default)]
    pub compression: bool,

    /// Prefer the binary encoding when the topic supports it
    #[serde(default)]
    pub binary: bool,

    #[serde(default)]
    pub tls: TlsMode,

    /// Additional headers sent with every proxy request
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8082".to_string(),
            timeout_seconds: default_timeout(),
            compression: false,
            binary: false,
            tls: TlsMode::default(),
            headers: HashMap::new(),
        }
    }
}

impl RestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchemaRegistryConfig {
    pub url: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// How long a looked-up schema stays valid in the cache
    #[serde(default = "default_cache_validity")]
    pub cache_validity_seconds: u64,
}

impl Default for SchemaRegistryConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8081".to_string(),
            timeout_seconds: default_timeout(),
            cache_validity_seconds: default_cache_validity(),
        }
    }
}

impl SchemaRegistryConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn cache_validity(&self) -> Duration {
        Duration::from_secs(self.cache_validity_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Time after a success before the state decays to unknown
    #[serde(default = "default_connection_timeout")]
    pub timeout_seconds: u64,

    /// Connection check interval; 0 disables the heartbeat
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_connection_timeout(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        match self.heartbeat_interval_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchingConfig {
    /// Maximum number of queued records per topic before flush
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Maximum age in seconds of the oldest queued record before flush
    #[serde(default = "default_max_batch_age")]
    pub max_batch_age_seconds: u64,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_batch_age_seconds: default_max_batch_age(),
        }
    }
}

impl BatchingConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_batch_age_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"

    #[serde(default = "default_log_format")]
    pub format: String, // "text", "json"
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_timeout() -> u64 { 30 }
fn default_cache_validity() -> u64 { 86_400 }
fn default_connection_timeout() -> u64 { 30 }
fn default_heartbeat_interval() -> u64 { 60 }
fn default_max_batch_size() -> usize { 1000 }
fn default_max_batch_age() -> u64 { 10 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
