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

// Binary record set encoding
//
// The body is a single Avro datum of the record set schema:
//
//   keySchemaVersion: int
//   valueSchemaVersion: int
//   sourceId: string
//   data: array<bytes>     (each item is one binary-encoded value)
//
// Only keys that identify a data source (a record with a string sourceId
// field) can be sent this way.

use apache_avro::types::Value;
use apache_avro::{to_avro_datum, Schema};
use std::sync::OnceLock;

use crate::error::{ProducerError, Result};
use crate::schema::SchemaMetadata;

pub const SOURCE_ID_FIELD: &str = "sourceId";

const RECORD_SET_SCHEMA: &str = r#"{
  "type": "record",
  "name": "RecordSet",
  "namespace": "org.radarbase.producer.rest",
  "fields": [
    {"name": "keySchemaVersion", "type": "int"},
    {"name": "valueSchemaVersion", "type": "int"},
    {"name": "sourceId", "type": "string"},
    {"name": "data", "type": {"type": "array", "items": "bytes"}}
  ]
}"#;

fn record_set_schema() -> &'static Schema {
    static SCHEMA: OnceLock<Schema> = OnceLock::new();
    SCHEMA.get_or_init(|| Schema::parse_str(RECORD_SET_SCHEMA).expect("valid record set schema"))
}

/// Check that a batch can be sent in binary form
pub(crate) fn validate(
    key_schema: &SchemaMetadata,
    value_schema: &SchemaMetadata,
    key: &Value,
) -> Result<()> {
    validate_key(key_schema, key)?;
    validate_versions(key_schema, value_schema)
}

/// Check that the key identifies a data source
///
/// This depends only on the topic's key shape, so a failure holds for every
/// later batch of the topic.
pub(crate) fn validate_key(key_schema: &SchemaMetadata, key: &Value) -> Result<()> {
    let has_source_field = match key_schema.schema() {
        Schema::Record(record) => record.fields.iter().any(|f| f.name == SOURCE_ID_FIELD),
        _ => false,
    };
    if !has_source_field {
        return Err(ProducerError::SchemaIncompatible(format!(
            "binary encoding requires a record key with a {} field",
            SOURCE_ID_FIELD
        )));
    }
    source_id(key)?;
    Ok(())
}

/// Check that both schemas carry a registry version
///
/// Schemas that were only just registered have no known version until
/// they are looked up again.
pub(crate) fn validate_versions(
    key_schema: &SchemaMetadata,
    value_schema: &SchemaMetadata,
) -> Result<()> {
    schema_version(key_schema, "key")?;
    schema_version(value_schema, "value")?;
    Ok(())
}

pub(crate) fn encode(
    buffer: &mut Vec<u8>,
    key_schema: &SchemaMetadata,
    value_schema: &SchemaMetadata,
    key: &Value,
    values: &[Value],
) -> Result<()> {
    validate(key_schema, value_schema, key)?;

    let data = values
        .iter()
        .map(|value| to_avro_datum(value_schema.schema(), value.clone()).map(Value::Bytes))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let record_set = Value::Record(vec![
        (
            "keySchemaVersion".to_string(),
            Value::Int(schema_version(key_schema, "key")?),
        ),
        (
            "valueSchemaVersion".to_string(),
            Value::Int(schema_version(value_schema, "value")?),
        ),
        (SOURCE_ID_FIELD.to_string(), Value::String(source_id(key)?.to_string())),
        ("data".to_string(), Value::Array(data)),
    ]);

    buffer.extend_from_slice(&to_avro_datum(record_set_schema(), record_set)?);
    Ok(())
}

fn source_id(key: &Value) -> Result<&str> {
    let fields = match key {
        Value::Record(fields) => fields,
        _ => {
            return Err(ProducerError::SchemaIncompatible(
                "binary encoding requires a record key".to_string(),
            ))
        }
    };
    match fields.iter().find(|(name, _)| name == SOURCE_ID_FIELD) {
        Some((_, Value::String(id))) => Ok(id),
        Some((_, Value::Union(_, inner))) => match inner.as_ref() {
            Value::String(id) => Ok(id),
            _ => Err(ProducerError::SchemaIncompatible(
                "key sourceId is null".to_string(),
            )),
        },
        _ => Err(ProducerError::SchemaIncompatible(
            "key has no string sourceId".to_string(),
        )),
    }
}

fn schema_version(metadata: &SchemaMetadata, role: &str) -> Result<i32> {
    metadata.version().ok_or_else(|| {
        ProducerError::SchemaIncompatible(format!(
            "binary encoding requires a registered {} schema version",
            role
        ))
    })
}
