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

// Wire request construction for the REST proxy
//
// A WireRequestBuilder turns a batch of already-mapped records into the
// body of one `POST /topics/{topic}` call. Encodings, in order of preference:
// - Binary: compact source-scoped record set
// - Json: Avro-JSON, application/vnd.kafka.avro.v2+json
// - LegacyJson: the same body under the v1 media type
//
// The builder keeps its output buffer and JSON encoders across batches and
// holds the pending batch until reset, so a rejected request can be
// re-encoded in a downgraded format without rebuilding the batch.

pub mod binary;
pub mod json;

use apache_avro::types::Value;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

use self::json::AvroJsonEncoder;

use crate::error::{ProducerError, Result};
use crate::schema::SchemaMetadata;

pub const BINARY_CONTENT_TYPE: &str = "application/vnd.radarbase.avro.v1+binary";
pub const JSON_CONTENT_TYPE: &str = "application/vnd.kafka.avro.v2+json";
pub const LEGACY_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.avro.v1+json";

const ACCEPT_V2: &str = "application/vnd.kafka.v2+json, application/vnd.kafka+json; q=0.9, application/json; q=0.5";
const ACCEPT_V1: &str = "application/vnd.kafka.v1+json, application/vnd.kafka+json; q=0.9, application/json; q=0.5";

/// Encoding of a proxy request body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    Binary,
    Json,
    LegacyJson,
}

impl WireFormat {
    /// Initial format of a sender
    pub fn preferred(binary: bool) -> Self {
        if binary {
            WireFormat::Binary
        } else {
            WireFormat::Json
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            WireFormat::Binary => BINARY_CONTENT_TYPE,
            WireFormat::Json => JSON_CONTENT_TYPE,
            WireFormat::LegacyJson => LEGACY_JSON_CONTENT_TYPE,
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            WireFormat::Binary | WireFormat::Json => ACCEPT_V2,
            WireFormat::LegacyJson => ACCEPT_V1,
        }
    }

    /// Next format to try after the server rejected this one
    pub fn downgrade(&self) -> Option<WireFormat> {
        match self {
            WireFormat::Binary => Some(WireFormat::Json),
            WireFormat::Json => Some(WireFormat::LegacyJson),
            WireFormat::LegacyJson => None,
        }
    }

    pub fn is_json(&self) -> bool {
        !matches!(self, WireFormat::Binary)
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireFormat::Binary => write!(f, "binary"),
            WireFormat::Json => write!(f, "json"),
            WireFormat::LegacyJson => write!(f, "legacy-json"),
        }
    }
}

/// Batch waiting to be encoded
#[derive(Debug)]
struct PendingBatch {
    key_schema: SchemaMetadata,
    value_schema: SchemaMetadata,
    key: Value,
    values: Vec<Value>,
}

/// JSON encoder kept while the schema it was built for stays current
#[derive(Debug)]
struct CachedEncoder {
    id: Option<i32>,
    encoder: AvroJsonEncoder,
}

/// Encoder for `metadata`, rebuilt only when the schema changes
///
/// A registry id identifies a schema for good, so equal ids reuse the
/// encoder even when the metadata was looked up again.
fn json_encoder<'e>(
    slot: &'e mut Option<CachedEncoder>,
    metadata: &SchemaMetadata,
) -> Result<&'e AvroJsonEncoder> {
    let reusable = slot.as_ref().is_some_and(|cached| {
        Arc::ptr_eq(cached.encoder.schema(), metadata.schema_arc())
            || (cached.id.is_some() && cached.id == metadata.id())
    });
    if !reusable {
        debug!("Building JSON encoder for schema id {:?}", metadata.id());
        *slot = Some(CachedEncoder {
            id: metadata.id(),
            encoder: AvroJsonEncoder::shared(Arc::clone(metadata.schema_arc()))?,
        });
    }
    slot.as_ref()
        .map(|cached| &cached.encoder)
        .ok_or_else(|| ProducerError::IllegalState("JSON encoder missing".to_string()))
}

/// Encodes record batches for one topic sender
///
/// Not shared between tasks: each topic sender owns exactly one builder.
#[derive(Debug)]
pub struct WireRequestBuilder {
    format: WireFormat,
    compression: bool,
    buffer: Vec<u8>,
    pending: Option<PendingBatch>,
    key_encoder: Option<CachedEncoder>,
    value_encoder: Option<CachedEncoder>,
}

impl WireRequestBuilder {
    pub fn new(format: WireFormat, compression: bool) -> Self {
        Self {
            format,
            compression,
            buffer: Vec::with_capacity(4096),
            pending: None,
            key_encoder: None,
            value_encoder: None,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn set_format(&mut self, format: WireFormat) {
        self.format = format;
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    /// Whether a batch is held for encoding
    pub fn is_prepared(&self) -> bool {
        self.pending.is_some()
    }

    /// Hold a mapped batch for encoding in the current format
    ///
    /// Binary requests are checked up front: the key must carry a string
    /// `sourceId` and both schemas need a registry version. A failed check
    /// leaves nothing pending.
    pub fn prepare(
        &mut self,
        key_schema: &SchemaMetadata,
        value_schema: &SchemaMetadata,
        key: Value,
        values: Vec<Value>,
    ) -> Result<()> {
        self.pending = None;
        if values.is_empty() {
            return Err(ProducerError::InvalidArgument(
                "cannot prepare an empty batch".to_string(),
            ));
        }
        if self.format == WireFormat::Binary {
            binary::validate(key_schema, value_schema, &key)?;
        }
        self.pending = Some(PendingBatch {
            key_schema: key_schema.clone(),
            value_schema: value_schema.clone(),
            key,
            values,
        });
        Ok(())
    }

    /// Encode the pending batch, gzip-compressed if enabled
    pub fn encode(&mut self) -> Result<Bytes> {
        let pending = self.pending.as_ref().ok_or_else(|| {
            ProducerError::IllegalState("no batch prepared for encoding".to_string())
        })?;

        self.buffer.clear();
        match self.format {
            WireFormat::Binary => binary::encode(
                &mut self.buffer,
                &pending.key_schema,
                &pending.value_schema,
                &pending.key,
                &pending.values,
            )?,
            WireFormat::Json | WireFormat::LegacyJson => {
                let key_encoder = json_encoder(&mut self.key_encoder, &pending.key_schema)?;
                let value_encoder = json_encoder(&mut self.value_encoder, &pending.value_schema)?;
                json::encode(
                    &mut self.buffer,
                    &pending.key_schema,
                    &pending.value_schema,
                    key_encoder,
                    value_encoder,
                    &pending.key,
                    &pending.values,
                )?
            }
        }

        debug!(
            "Encoded {} records as {} ({} bytes)",
            pending.values.len(),
            self.format,
            self.buffer.len()
        );

        if self.compression {
            let mut encoder = GzEncoder::new(Vec::with_capacity(self.buffer.len() / 2), Compression::default());
            encoder.write_all(&self.buffer)?;
            let compressed = encoder.finish()?;
            debug!(
                "Compressed request body from {} to {} bytes",
                self.buffer.len(),
                compressed.len()
            );
            return Ok(Bytes::from(compressed));
        }

        Ok(Bytes::copy_from_slice(&self.buffer))
    }

    /// Drop the pending batch, keeping the output buffer and encoders for reuse
    pub fn reset(&mut self) {
        self.pending = None;
        self.buffer.clear();
    }

    /// Capacity of the reusable output buffer
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgrade_chain() {
        assert_eq!(WireFormat::Binary.downgrade(), Some(WireFormat::Json));
        assert_eq!(WireFormat::Json.downgrade(), Some(WireFormat::LegacyJson));
        assert_eq!(WireFormat::LegacyJson.downgrade(), None);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(WireFormat::preferred(true), WireFormat::Binary);
        assert_eq!(WireFormat::preferred(false), WireFormat::Json);
        assert_eq!(WireFormat::Json.content_type(), "application/vnd.kafka.avro.v2+json");
        assert_eq!(WireFormat::LegacyJson.content_type(), "application/vnd.kafka.avro.v1+json");
        assert!(WireFormat::LegacyJson.accept().starts_with("application/vnd.kafka.v1+json"));
        assert!(WireFormat::Json.accept().starts_with("application/vnd.kafka.v2+json"));
    }

    fn value_metadata(id: Option<i32>) -> SchemaMetadata {
        let schema = apache_avro::Schema::parse_str(
            r#"{"type":"record","name":"Battery","fields":[{"name":"level","type":"float"}]}"#,
        )
        .unwrap();
        SchemaMetadata::new(id, Some(1), schema)
    }

    fn level(v: f32) -> Value {
        Value::Record(vec![("level".to_string(), Value::Float(v))])
    }

    #[test]
    fn test_json_encoders_survive_reset() {
        let key = SchemaMetadata::new(Some(1), Some(1), apache_avro::Schema::String);
        let first = value_metadata(Some(5));
        let mut builder = WireRequestBuilder::new(WireFormat::Json, false);

        builder
            .prepare(&key, &first, Value::String("k".to_string()), vec![level(0.5)])
            .unwrap();
        builder.encode().unwrap();
        builder.reset();

        // Same registry id, looked up again into a new allocation
        let again = value_metadata(Some(5));
        builder
            .prepare(&key, &again, Value::String("k".to_string()), vec![level(0.7)])
            .unwrap();
        builder.encode().unwrap();
        let cached = builder.value_encoder.as_ref().unwrap();
        assert!(Arc::ptr_eq(cached.encoder.schema(), first.schema_arc()));

        // A different id builds a new encoder
        let other = value_metadata(Some(6));
        builder
            .prepare(&key, &other, Value::String("k".to_string()), vec![level(0.9)])
            .unwrap();
        builder.encode().unwrap();
        let cached = builder.value_encoder.as_ref().unwrap();
        assert!(Arc::ptr_eq(cached.encoder.schema(), other.schema_arc()));
    }

    #[test]
    fn test_encode_without_prepare() {
        let mut builder = WireRequestBuilder::new(WireFormat::Json, false);
        assert!(matches!(builder.encode(), Err(ProducerError::IllegalState(_))));
    }
}
