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

// REST proxy sender with encoding negotiation

use apache_avro::Schema;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::TopicSender;
use crate::config::{RestConfig, TlsMode};
use crate::connection::{ConnectionState, State};
use crate::error::{truncate_body, ProducerError, Result};
use crate::pool::{ConnectionPool, PooledClient};
use crate::request::{binary, WireFormat, WireRequestBuilder};
use crate::schema::{schema_to_json, EvolutionMapping, SchemaMetadata, SchemaRetriever};
use crate::topic::{AvroTopic, RecordBatch};

/// Latest schema version, as passed to the schema retriever
const LATEST_VERSION: i32 = -1;

/// Shared connection to a REST proxy
///
/// One `RestSender` serves any number of [`RestTopicSender`]s. It owns the
/// HTTP client handle and the connection state they all report into.
pub struct RestSender {
    http: PooledClient,
    base_url: String,
    headers: HeaderMap,
    timeout: Duration,
    compression: bool,
    binary: bool,
    schemas: Arc<SchemaRetriever>,
    state: Arc<ConnectionState>,
}

impl RestSender {
    /// Create a sender on the given pool
    pub fn new(
        config: &RestConfig,
        pool: &Arc<ConnectionPool>,
        schemas: Arc<SchemaRetriever>,
        state: Arc<ConnectionState>,
    ) -> Result<Arc<Self>> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ProducerError::InvalidArgument(format!("Invalid header name {}: {}", name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ProducerError::InvalidArgument(format!("Invalid value for header {}: {}", name, e))
            })?;
            headers.insert(name, value);
        }

        info!(
            "REST sender for {} (binary={}, compression={})",
            config.url, config.binary, config.compression
        );

        Ok(Arc::new(Self {
            http: pool.handle()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            headers,
            timeout: config.timeout(),
            compression: config.compression,
            binary: config.binary,
            schemas,
            state,
        }))
    }

    /// Create a sender on the shared pool, or a private one for unsafe TLS
    pub fn from_config(
        config: &RestConfig,
        schemas: Arc<SchemaRetriever>,
        state: Arc<ConnectionState>,
    ) -> Result<Arc<Self>> {
        let pool = match config.tls {
            TlsMode::System => ConnectionPool::shared(),
            TlsMode::Unsafe => Arc::new(ConnectionPool::new(TlsMode::Unsafe)),
        };
        Self::new(config, &pool, schemas, state)
    }

    /// Sender for a single topic
    pub fn sender(self: &Arc<Self>, topic: Arc<AvroTopic>) -> RestTopicSender {
        let preferred = WireFormat::preferred(self.binary);
        RestTopicSender {
            sender: Arc::clone(self),
            preferred,
            builder: WireRequestBuilder::new(preferred, self.compression),
            topic,
            key_mapping: None,
            value_mapping: None,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn connection_state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    pub fn schemas(&self) -> &Arc<SchemaRetriever> {
        &self.schemas
    }

    /// Whether the proxy is reachable, probing it if the state is unknown
    ///
    /// Fails with `Authentication` while the credentials are rejected.
    pub async fn is_connected(&self) -> Result<bool> {
        match self.state.current_state() {
            State::Connected => Ok(true),
            State::Disconnected => Ok(false),
            State::Unauthorized => Err(ProducerError::Authentication {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                body: "credentials were rejected by the server".to_string(),
            }),
            State::Unknown => self.reset_connection().await,
        }
    }

    /// Check the proxy with `HEAD /` and record the outcome
    pub async fn reset_connection(&self) -> Result<bool> {
        let url = format!("{}/", self.base_url);
        let response = self
            .http
            .client()
            .head(&url)
            .headers(self.headers.clone())
            .timeout(self.timeout)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                debug!("Connection check of {} succeeded", url);
                self.state.record_success();
                Ok(true)
            }
            Ok(response)
                if matches!(
                    response.status(),
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
                ) =>
            {
                let status = response.status().as_u16();
                warn!("Connection check of {} rejected with status {}", url, status);
                self.state.record_unauthorized();
                Err(ProducerError::Authentication {
                    status,
                    body: String::new(),
                })
            }
            Ok(response) => {
                warn!("Connection check of {} failed with status {}", url, response.status());
                self.state.record_failure();
                Ok(false)
            }
            Err(e) => {
                warn!("Connection check of {} failed: {}", url, e);
                self.state.record_failure();
                Ok(false)
            }
        }
    }

    /// Check the proxy every `interval` until the returned task is aborted
    pub fn spawn_heartbeat(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let sender = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = sender.state.current_state();
            loop {
                ticker.tick().await;
                if let Err(e) = sender.reset_connection().await {
                    warn!("Heartbeat connection check failed: {}", e);
                }
                let current = sender.state.current_state();
                if current != last {
                    info!("Connection state changed from {} to {}", last, current);
                    last = current;
                }
            }
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{}", self.base_url, topic)
    }

    async fn post(
        &self,
        url: &str,
        format: WireFormat,
        compressed: bool,
        body: Bytes,
    ) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .client()
            .post(url)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, format.content_type())
            .header(ACCEPT, format.accept())
            .timeout(self.timeout);
        if compressed {
            request = request.header(CONTENT_ENCODING, "gzip");
        }

        request.body(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProducerError::Timeout(self.timeout)
            } else {
                ProducerError::Transport(e.to_string())
            }
        })
    }
}

/// Identity of a destination schema for mapping reuse
///
/// Canonical forms drop defaults and aliases, which the mapping depends on,
/// so unregistered schemas are compared by their full JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
enum MappingKey {
    Registered(i32),
    Local(String),
}

impl MappingKey {
    fn of(destination: &SchemaMetadata) -> Result<Self> {
        match destination.id() {
            Some(id) => Ok(MappingKey::Registered(id)),
            None => Ok(MappingKey::Local(schema_to_json(destination.schema())?)),
        }
    }
}

#[derive(Debug)]
struct CachedMapping {
    key: MappingKey,
    mapping: EvolutionMapping,
}

/// Mapping from `source` to the destination schema, rebuilt only when the
/// destination changes
fn cached_mapping<'m>(
    slot: &'m mut Option<CachedMapping>,
    source: &Schema,
    destination: &SchemaMetadata,
) -> Result<&'m EvolutionMapping> {
    let key = MappingKey::of(destination)?;
    let stale = slot.as_ref().map_or(true, |cached| cached.key != key);
    if stale {
        debug!("Building schema mapping for destination id {:?}", destination.id());
        *slot = Some(CachedMapping {
            mapping: EvolutionMapping::build(source, destination.schema())?,
            key,
        });
    }
    slot.as_ref()
        .map(|cached| &cached.mapping)
        .ok_or_else(|| ProducerError::IllegalState("schema mapping missing".to_string()))
}

/// Publishes batches of one topic through a [`RestSender`]
///
/// The preferred encoding starts as binary when enabled and only ever
/// moves down: to JSON when the topic key cannot be encoded in binary or the
/// server rejects it, and to legacy JSON when the server rejects JSON. A
/// batch whose schemas have no registry version yet is sent as JSON without
/// changing the preference.
pub struct RestTopicSender {
    sender: Arc<RestSender>,
    preferred: WireFormat,
    topic: Arc<AvroTopic>,
    builder: WireRequestBuilder,
    key_mapping: Option<CachedMapping>,
    value_mapping: Option<CachedMapping>,
}

impl RestTopicSender {
    /// Preferred encoding for the next batch
    pub fn format(&self) -> WireFormat {
        self.preferred
    }

    /// Publish a batch, giving up once `deadline` has passed
    ///
    /// On expiry the request is dropped, the connection is marked
    /// disconnected and `Timeout` is returned.
    pub async fn send_with_deadline(&mut self, batch: RecordBatch, deadline: Duration) -> Result<()> {
        let outcome = tokio::time::timeout(deadline, self.publish(batch)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                self.builder.reset();
                self.sender.state.record_failure();
                warn!(
                    "Publish to topic {} did not finish within {:?}",
                    self.topic, deadline
                );
                Err(ProducerError::Timeout(deadline))
            }
        }
    }

    async fn publish(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.topic().name() != self.topic.name() {
            return Err(ProducerError::InvalidArgument(format!(
                "batch for topic {} sent to sender of topic {}",
                batch.topic(),
                self.topic
            )));
        }
        let (topic, key, values) = batch.into_parts();
        let schemas = Arc::clone(&self.sender.schemas);

        let key_schema = schemas
            .get_or_register(topic.name(), false, topic.key_schema(), LATEST_VERSION)
            .await?;
        let value_schema = schemas
            .get_or_register(topic.name(), true, topic.value_schema(), LATEST_VERSION)
            .await?;

        let key = cached_mapping(&mut self.key_mapping, topic.key_schema(), &key_schema)?
            .apply(key)?;
        let value_mapping =
            cached_mapping(&mut self.value_mapping, topic.value_schema(), &value_schema)?;
        let values = values
            .into_iter()
            .map(|value| value_mapping.apply(value))
            .collect::<Result<Vec<_>>>()?;

        self.builder.set_format(self.preferred);
        if self.preferred == WireFormat::Binary {
            if let Err(e) = binary::validate_key(&key_schema, &key) {
                info!(
                    "Topic {} cannot use binary encoding ({}), using JSON from now on",
                    self.topic, e
                );
                self.preferred = WireFormat::Json;
                self.builder.set_format(WireFormat::Json);
            } else if let Err(e) = binary::validate_versions(&key_schema, &value_schema) {
                debug!("Sending batch of topic {} as JSON: {}", self.topic, e);
                self.builder.set_format(WireFormat::Json);
            }
        }

        let result = match self.builder.prepare(&key_schema, &value_schema, key, values) {
            Ok(()) => self.execute().await,
            Err(e) => Err(e),
        };
        self.builder.reset();
        result
    }

    /// Send the prepared batch, downgrading once on 415
    async fn execute(&mut self) -> Result<()> {
        let url = self.sender.topic_url(self.topic.name());
        let state = Arc::clone(&self.sender.state);
        let mut downgraded = false;

        loop {
            let format = self.builder.format();
            let body = self.builder.encode()?;
            let response = match self
                .sender
                .post(&url, format, self.builder.compression(), body)
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    state.record_failure();
                    return Err(e);
                }
            };

            let status = response.status();
            if status.is_success() {
                debug!("Published batch to {} as {}", self.topic, format);
                state.record_success();
                return Ok(());
            }

            match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let body = response.text().await.unwrap_or_default();
                    state.record_unauthorized();
                    error!("Publish to {} rejected with status {}", self.topic, status);
                    return Err(ProducerError::Authentication {
                        status: status.as_u16(),
                        body: truncate_body(&body),
                    });
                }
                StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                    let next = if downgraded { None } else { format.downgrade() };
                    match next {
                        Some(next) => {
                            info!(
                                "Server does not accept {} for topic {}, switching to {}",
                                format, self.topic, next
                            );
                            self.builder.set_format(next);
                            self.preferred = next;
                            downgraded = true;
                        }
                        None => {
                            state.record_failure();
                            error!(
                                "Server rejected every request encoding for topic {}",
                                self.topic
                            );
                            return Err(ProducerError::ProtocolUnsupported {
                                content_type: format.content_type().to_string(),
                            });
                        }
                    }
                }
                _ => {
                    let body = response.text().await.unwrap_or_default();
                    state.record_failure();
                    warn!("Publish to {} failed with status {}: {}", url, status, body);
                    return Err(ProducerError::Http {
                        url,
                        status: status.as_u16(),
                        body: truncate_body(&body),
                    });
                }
            }
        }
    }
}

#[async_trait]
impl TopicSender for RestTopicSender {
    fn topic(&self) -> &Arc<AvroTopic> {
        &self.topic
    }

    async fn send(&mut self, batch: RecordBatch) -> Result<()> {
        self.publish(batch).await
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.builder.reset();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::types::Value;

    fn destination(id: Option<i32>, default: i32) -> SchemaMetadata {
        let schema = Schema::parse_str(&format!(
            r#"{{"type":"record","name":"R","fields":[
                {{"name":"a","type":"int"}},
                {{"name":"n","type":"int","default":{}}}
            ]}}"#,
            default
        ))
        .unwrap();
        SchemaMetadata::new(id, Some(1), schema)
    }

    fn map_value(slot: &mut Option<CachedMapping>, source: &Schema, dest: &SchemaMetadata) -> Value {
        cached_mapping(slot, source, dest)
            .unwrap()
            .apply(Value::Record(vec![("a".to_string(), Value::Int(7))]))
            .unwrap()
    }

    fn field_n(value: Value) -> Value {
        match value {
            Value::Record(fields) => fields.into_iter().find(|(n, _)| n == "n").unwrap().1,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_mapping_rebuilt_when_only_default_changes() {
        let source = Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#,
        )
        .unwrap();
        let first = destination(Some(1), 1);
        let second = destination(Some(2), 2);
        assert_eq!(first.schema().canonical_form(), second.schema().canonical_form());

        let mut slot = None;
        assert_eq!(field_n(map_value(&mut slot, &source, &first)), Value::Int(1));
        assert_eq!(field_n(map_value(&mut slot, &source, &second)), Value::Int(2));

        // Unregistered schemas are told apart by their full JSON
        assert_eq!(
            field_n(map_value(&mut slot, &source, &destination(None, 3))),
            Value::Int(3)
        );
        assert_eq!(
            field_n(map_value(&mut slot, &source, &destination(None, 4))),
            Value::Int(4)
        );
    }

    #[test]
    fn test_mapping_reused_for_same_registry_id() {
        let source = Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int"}]}"#,
        )
        .unwrap();
        let mut slot = None;
        cached_mapping(&mut slot, &source, &destination(Some(9), 1)).unwrap();
        cached_mapping(&mut slot, &source, &destination(Some(9), 1)).unwrap();
        assert_eq!(slot.as_ref().unwrap().key, MappingKey::Registered(9));
    }
}
