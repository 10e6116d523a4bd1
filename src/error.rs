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

// Error types for the producer pipeline

use std::time::Duration;

/// Maximum number of body bytes carried in an error for diagnostics
pub const MAX_ERROR_BODY_LEN: usize = 256;

pub type Result<T, E = ProducerError> = std::result::Result<T, E>;

/// Errors raised while talking to the schema registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("HTTP request to schema registry failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Schema not found: subject={subject}, version={version:?}")]
    NotFound {
        subject: String,
        /// `None` refers to the latest version
        version: Option<i32>,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Schema registry unavailable: {0}")]
    Unavailable(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

/// Errors surfaced by the producer pipeline
#[derive(Debug, thiserror::Error)]
pub enum ProducerError {
    /// I/O failure reaching the proxy; the caller may retry
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Authentication rejected with status {status}: {body}")]
    Authentication { status: u16, body: String },

    #[error("Schema incompatible: {0}")]
    SchemaIncompatible(String),

    #[error("Server does not support any request encoding (last tried {content_type})")]
    ProtocolUnsupported { content_type: String },

    #[error("Schema registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Publish request rejected with a non-2xx status
    #[error("Request to {url} failed with status {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Failed to encode records: {0}")]
    Encoding(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ProducerError {
    /// Whether the caller can reasonably retry the failed operation
    pub fn is_retryable(&self) -> bool {
        match self {
            ProducerError::Transport(_) | ProducerError::Timeout(_) => true,
            ProducerError::Http { status, .. } => *status >= 500,
            ProducerError::Registry(RegistryError::Http(_))
            | ProducerError::Registry(RegistryError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProducerError {
    fn from(e: reqwest::Error) -> Self {
        ProducerError::Transport(e.to_string())
    }
}

impl From<apache_avro::Error> for ProducerError {
    fn from(e: apache_avro::Error) -> Self {
        ProducerError::Encoding(e.to_string())
    }
}

impl From<serde_json::Error> for ProducerError {
    fn from(e: serde_json::Error) -> Self {
        ProducerError::Encoding(e.to_string())
    }
}

impl From<std::io::Error> for ProducerError {
    fn from(e: std::io::Error) -> Self {
        ProducerError::Encoding(e.to_string())
    }
}

/// Truncate a response or request body for inclusion in an error message
pub fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
