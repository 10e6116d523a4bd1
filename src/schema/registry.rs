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

// Schema registry HTTP client

use apache_avro::Schema;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{schema_to_json, SchemaMetadata};
use crate::config::SchemaRegistryConfig;
use crate::error::{truncate_body, RegistryError};
use crate::pool::{ConnectionPool, PooledClient};

pub const SCHEMA_REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";

/// Lookup and registration operations of a schema registry
///
/// Versions of zero or below refer to the latest version of a subject.
#[async_trait]
pub trait SchemaRegistryClient: Send + Sync {
    /// Fetch the schema registered under `subject` at `version`
    async fn get_schema_metadata(
        &self,
        subject: &str,
        version: i32,
    ) -> Result<SchemaMetadata, RegistryError>;

    /// Fetch a schema by its global registry id
    async fn get_schema_by_id(&self, id: i32) -> Result<Schema, RegistryError>;

    /// Register `schema` under `subject`, returning its id
    async fn register_schema(&self, subject: &str, schema: &Schema) -> Result<i32, RegistryError>;
}

#[derive(Debug, Serialize)]
struct RegisterSchemaRequest<'a> {
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterSchemaResponse {
    id: i32,
}

#[derive(Debug, Deserialize)]
struct SchemaVersionResponse {
    id: i32,
    version: i32,
    schema: String,
}

#[derive(Debug, Deserialize)]
struct SchemaByIdResponse {
    schema: String,
}

/// Schema registry client speaking the Confluent REST API
pub struct HttpSchemaRegistryClient {
    http: PooledClient,
    base_url: String,
    timeout: Duration,
}

impl HttpSchemaRegistryClient {
    pub fn new(
        config: &SchemaRegistryConfig,
        pool: &Arc<ConnectionPool>,
    ) -> Result<Self, RegistryError> {
        let http = pool
            .handle()
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Map HTTP status codes to registry errors
    ///
    /// - 404 -> `NotFound`
    /// - other 4xx/5xx -> `Unavailable`
    async fn check_response(
        response: reqwest::Response,
        subject: Option<&str>,
        version: Option<i32>,
    ) -> Result<reqwest::Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound {
                subject: subject.unwrap_or("unknown").to_string(),
                version,
            });
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        error!("Schema registry returned error {}: {}", status, body);
        Err(RegistryError::Unavailable(format!(
            "status={}, body={}",
            status,
            truncate_body(&body)
        )))
    }

    fn parse_schema(raw: &str) -> Result<Schema, RegistryError> {
        Schema::parse_str(raw).map_err(|e| RegistryError::InvalidSchema(e.to_string()))
    }
}

#[async_trait]
impl SchemaRegistryClient for HttpSchemaRegistryClient {
    async fn get_schema_metadata(
        &self,
        subject: &str,
        version: i32,
    ) -> Result<SchemaMetadata, RegistryError> {
        let (path_version, requested) = if version > 0 {
            (version.to_string(), Some(version))
        } else {
            ("latest".to_string(), None)
        };
        let url = format!(
            "{}/subjects/{}/versions/{}",
            self.base_url, subject, path_version
        );

        debug!("Fetching schema: subject={}, version={}", subject, path_version);

        let response = self
            .http
            .client()
            .get(&url)
            .header(ACCEPT, SCHEMA_REGISTRY_CONTENT_TYPE)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = Self::check_response(response, Some(subject), requested).await?;
        let data: SchemaVersionResponse = response.json().await?;

        let schema = Self::parse_schema(&data.schema)?;
        Ok(SchemaMetadata::new(Some(data.id), Some(data.version), schema))
    }

    async fn get_schema_by_id(&self, id: i32) -> Result<Schema, RegistryError> {
        let url = format!("{}/schemas/ids/{}", self.base_url, id);

        debug!("Fetching schema by id={}", id);

        let response = self
            .http
            .client()
            .get(&url)
            .header(ACCEPT, SCHEMA_REGISTRY_CONTENT_TYPE)
            .timeout(self.timeout)
            .send()
            .await?;
        let response = Self::check_response(response, None, Some(id)).await?;
        let data: SchemaByIdResponse = response.json().await?;

        Self::parse_schema(&data.schema)
    }

    async fn register_schema(&self, subject: &str, schema: &Schema) -> Result<i32, RegistryError> {
        let url = format!("{}/subjects/{}/versions", self.base_url, subject);
        let schema_json =
            schema_to_json(schema).map_err(|e| RegistryError::InvalidSchema(e.to_string()))?;
        let body = serde_json::to_vec(&RegisterSchemaRequest {
            schema: &schema_json,
        })
        .map_err(|e| RegistryError::InvalidSchema(e.to_string()))?;

        debug!("Registering schema: subject={}", subject);

        let response = self
            .http
            .client()
            .post(&url)
            .header(CONTENT_TYPE, SCHEMA_REGISTRY_CONTENT_TYPE)
            .header(ACCEPT, SCHEMA_REGISTRY_CONTENT_TYPE)
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;
        let response = Self::check_response(response, Some(subject), None).await?;
        let registered: RegisterSchemaResponse = response.json().await?;

        info!("Registered schema for subject {} with id {}", subject, registered.id);
        Ok(registered.id)
    }
}
