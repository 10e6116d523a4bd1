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

// Avro-JSON request bodies
//
// Body layout:
//
//   {"key_schema_id": 1, "value_schema_id": 2, "records": [{"key": .., "value": ..}, ..]}
//
// Unregistered schemas are sent inline as `key_schema` / `value_schema`
// strings instead of ids.

use apache_avro::schema::{Name, ResolvedSchema};
use apache_avro::types::Value;
use apache_avro::Schema;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::io::Write;

use crate::error::{ProducerError, Result};
use crate::schema::{schema_to_json, SchemaMetadata};

pub(crate) fn encode(
    buffer: &mut Vec<u8>,
    key_schema: &SchemaMetadata,
    value_schema: &SchemaMetadata,
    key_encoder: &AvroJsonEncoder,
    value_encoder: &AvroJsonEncoder,
    key: &Value,
    values: &[Value],
) -> Result<()> {
    buffer.push(b'{');
    write_schema_reference(buffer, "key", key_schema)?;
    buffer.push(b',');
    write_schema_reference(buffer, "value", value_schema)?;
    buffer.extend_from_slice(b",\"records\":[");

    // The key is identical for every record of the batch
    let key_json = serde_json::to_vec(&key_encoder.encode(key)?)?;

    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            buffer.push(b',');
        }
        buffer.extend_from_slice(b"{\"key\":");
        buffer.extend_from_slice(&key_json);
        buffer.extend_from_slice(b",\"value\":");
        serde_json::to_writer(&mut *buffer, &value_encoder.encode(value)?)?;
        buffer.push(b'}');
    }

    buffer.extend_from_slice(b"]}");
    Ok(())
}

fn write_schema_reference(buffer: &mut Vec<u8>, prefix: &str, metadata: &SchemaMetadata) -> Result<()> {
    match metadata.id() {
        Some(id) => write!(buffer, "\"{}_schema_id\":{}", prefix, id)?,
        None => {
            let schema = schema_to_json(metadata.schema())?;
            write!(buffer, "\"{}_schema\":", prefix)?;
            serde_json::to_writer(&mut *buffer, &schema)?;
        }
    }
    Ok(())
}

/// Converts Avro values to their Avro-JSON representation
///
/// Non-null union values are wrapped as `{"<branch type>": value}`; bytes
/// and fixed values become strings with one ISO-8859-1 character per byte.
#[derive(Debug)]
pub struct AvroJsonEncoder {
    schema: Arc<Schema>,
    names: HashMap<Name, Schema>,
}

impl AvroJsonEncoder {
    pub fn new(schema: &Schema) -> Result<Self> {
        Self::shared(Arc::new(schema.clone()))
    }

    /// Encoder for a schema shared with its registry metadata
    pub fn shared(schema: Arc<Schema>) -> Result<Self> {
        let names = ResolvedSchema::try_from(schema.as_ref())?
            .get_names()
            .iter()
            .map(|(name, named)| (name.clone(), (*named).clone()))
            .collect();
        Ok(Self { schema, names })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn encode(&self, value: &Value) -> Result<JsonValue> {
        self.encode_with(value, &self.schema)
    }

    fn resolve<'a>(&'a self, schema: &'a Schema) -> &'a Schema {
        match schema {
            Schema::Ref { name } => self.names.get(name).unwrap_or(schema),
            other => other,
        }
    }

    fn encode_with(&self, value: &Value, schema: &Schema) -> Result<JsonValue> {
        let schema = self.resolve(schema);
        let json = match value {
            Value::Null => JsonValue::Null,
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Int(v) | Value::Date(v) | Value::TimeMillis(v) => JsonValue::from(*v),
            Value::Long(v)
            | Value::TimeMicros(v)
            | Value::TimestampMillis(v)
            | Value::TimestampMicros(v) => JsonValue::from(*v),
            Value::Float(v) => float_to_json(f64::from(*v)),
            Value::Double(v) => float_to_json(*v),
            Value::Bytes(bytes) | Value::Fixed(_, bytes) => JsonValue::String(latin1(bytes)),
            Value::String(s) | Value::Enum(_, s) => JsonValue::String(s.clone()),
            Value::Uuid(uuid) => JsonValue::String(uuid.to_string()),
            Value::Union(index, inner) => self.encode_union(*index, inner, schema)?,
            Value::Array(items) => {
                let item_schema = match schema {
                    Schema::Array(array) => &*array.items,
                    other => return Err(mismatch("array", other)),
                };
                JsonValue::Array(
                    items
                        .iter()
                        .map(|item| self.encode_with(item, item_schema))
                        .collect::<Result<Vec<_>>>()?,
                )
            }
            Value::Map(entries) => {
                let value_schema = match schema {
                    Schema::Map(map) => &*map.types,
                    other => return Err(mismatch("map", other)),
                };
                let mut object = Map::with_capacity(entries.len());
                for (k, v) in entries {
                    object.insert(k.clone(), self.encode_with(v, value_schema)?);
                }
                JsonValue::Object(object)
            }
            Value::Record(fields) => {
                let record = match schema {
                    Schema::Record(record) => record,
                    other => return Err(mismatch("record", other)),
                };
                let mut object = Map::with_capacity(fields.len());
                for field in &record.fields {
                    let value = fields
                        .iter()
                        .find(|(name, _)| *name == field.name)
                        .map(|(_, v)| v)
                        .ok_or_else(|| {
                            ProducerError::Encoding(format!("record is missing field {}", field.name))
                        })?;
                    object.insert(field.name.clone(), self.encode_with(value, &field.schema)?);
                }
                JsonValue::Object(object)
            }
            other => {
                return Err(ProducerError::Encoding(format!(
                    "unsupported value for JSON encoding: {:?}",
                    other
                )))
            }
        };
        Ok(json)
    }

    fn encode_union(&self, index: u32, inner: &Value, schema: &Schema) -> Result<JsonValue> {
        if matches!(inner, Value::Null) {
            return Ok(JsonValue::Null);
        }
        let union = match schema {
            Schema::Union(union) => union,
            other => return Err(mismatch("union", other)),
        };
        let branch = union.variants().get(index as usize).ok_or_else(|| {
            ProducerError::Encoding(format!("union branch {} does not exist", index))
        })?;

        let mut object = Map::with_capacity(1);
        object.insert(branch_name(branch)?, self.encode_with(inner, branch)?);
        Ok(JsonValue::Object(object))
    }
}

/// Type name of a union branch as used in Avro-JSON
fn branch_name(schema: &Schema) -> Result<String> {
    let name = match schema {
        Schema::Record(record) => full_name(&record.name),
        Schema::Enum(e) => full_name(&e.name),
        Schema::Fixed(f) => full_name(&f.name),
        Schema::Ref { name } => full_name(name),
        other => match serde_json::to_value(other)? {
            JsonValue::String(name) => name,
            JsonValue::Object(object) => match object.get("type") {
                Some(JsonValue::String(name)) => name.clone(),
                _ => return Err(mismatch("named union branch", other)),
            },
            _ => return Err(mismatch("named union branch", other)),
        },
    };
    Ok(name)
}

fn full_name(name: &Name) -> String {
    match &name.namespace {
        Some(namespace) if !namespace.is_empty() => format!("{}.{}", namespace, name.name),
        _ => name.name.clone(),
    }
}

fn float_to_json(v: f64) -> JsonValue {
    match Number::from_f64(v) {
        Some(number) => JsonValue::Number(number),
        None if v.is_nan() => JsonValue::String("NaN".to_string()),
        None if v > 0.0 => JsonValue::String("Infinity".to_string()),
        None => JsonValue::String("-Infinity".to_string()),
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

fn mismatch(expected: &str, schema: &Schema) -> ProducerError {
    ProducerError::Encoding(format!(
        "expected {} schema, found {}",
        expected,
        schema.canonical_form()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nullable_record() -> Schema {
        Schema::parse_str(
            r#"{"type":"record","name":"Measurement","namespace":"org.radarcns","fields":[
                {"name":"time","type":"double"},
                {"name":"label","type":["null","string"],"default":null},
                {"name":"raw","type":"bytes"}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_union_wrapping() {
        let schema = nullable_record();
        let encoder = AvroJsonEncoder::new(&schema).unwrap();
        let value = Value::Record(vec![
            ("time".to_string(), Value::Double(1.5)),
            (
                "label".to_string(),
                Value::Union(1, Box::new(Value::String("a".to_string()))),
            ),
            ("raw".to_string(), Value::Bytes(vec![0x41, 0xe9])),
        ]);
        let json = encoder.encode(&value).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"time": 1.5, "label": {"string": "a"}, "raw": "A\u{e9}"})
        );
    }

    #[test]
    fn test_null_union_is_bare() {
        let schema = nullable_record();
        let encoder = AvroJsonEncoder::new(&schema).unwrap();
        let value = Value::Record(vec![
            ("time".to_string(), Value::Double(0.0)),
            ("label".to_string(), Value::Union(0, Box::new(Value::Null))),
            ("raw".to_string(), Value::Bytes(vec![])),
        ]);
        let json = encoder.encode(&value).unwrap();
        assert_eq!(json["label"], JsonValue::Null);
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(float_to_json(f64::NAN), JsonValue::String("NaN".to_string()));
        assert_eq!(float_to_json(f64::INFINITY), JsonValue::String("Infinity".to_string()));
        assert_eq!(
            float_to_json(f64::NEG_INFINITY),
            JsonValue::String("-Infinity".to_string())
        );
    }

    #[test]
    fn test_schema_reference_by_id_or_inline() {
        let mut buffer = Vec::new();
        write_schema_reference(&mut buffer, "key", &SchemaMetadata::new(Some(7), Some(1), Schema::String))
            .unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "\"key_schema_id\":7");

        let mut buffer = Vec::new();
        write_schema_reference(&mut buffer, "value", &SchemaMetadata::local(Schema::Long)).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "\"value_schema\":\"\\\"long\\\"\"");
    }
}
