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

// Topics and record batches

use apache_avro::types::Value;
use apache_avro::Schema;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{ProducerError, Result};

fn topic_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("valid topic pattern"))
}

/// Topic with the Avro schemas of its keys and values
///
/// Identity is by name. Schemas are fixed for the lifetime of the topic.
#[derive(Debug, Clone)]
pub struct AvroTopic {
    name: String,
    key_schema: Schema,
    value_schema: Schema,
}

impl AvroTopic {
    pub fn new(name: impl Into<String>, key_schema: Schema, value_schema: Schema) -> Result<Self> {
        let name = name.into();
        if !topic_name_pattern().is_match(&name) {
            return Err(ProducerError::InvalidArgument(format!(
                "topic name '{}' must match [a-zA-Z][a-zA-Z0-9_]*",
                name
            )));
        }
        Ok(Self {
            name,
            key_schema,
            value_schema,
        })
    }

    /// Create a topic from key and value schema JSON
    pub fn parse(name: impl Into<String>, key_schema: &str, value_schema: &str) -> Result<Self> {
        let key_schema = Schema::parse_str(key_schema)
            .map_err(|e| ProducerError::InvalidArgument(format!("invalid key schema: {}", e)))?;
        let value_schema = Schema::parse_str(value_schema)
            .map_err(|e| ProducerError::InvalidArgument(format!("invalid value schema: {}", e)))?;
        Self::new(name, key_schema, value_schema)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_schema(&self) -> &Schema {
        &self.key_schema
    }

    pub fn value_schema(&self) -> &Schema {
        &self.value_schema
    }

    /// Schema of keys (`is_value == false`) or values (`is_value == true`)
    pub fn schema(&self, is_value: bool) -> &Schema {
        if is_value {
            &self.value_schema
        } else {
            &self.key_schema
        }
    }
}

impl PartialEq for AvroTopic {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for AvroTopic {}

impl std::hash::Hash for AvroTopic {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for AvroTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Non-empty, ordered values sharing one key on one topic
#[derive(Debug, Clone)]
pub struct RecordBatch {
    topic: Arc<AvroTopic>,
    key: Value,
    values: Vec<Value>,
}

impl RecordBatch {
    /// Fails with `InvalidArgument` when `values` is empty
    pub fn new(topic: Arc<AvroTopic>, key: Value, values: Vec<Value>) -> Result<Self> {
        if values.is_empty() {
            return Err(ProducerError::InvalidArgument(format!(
                "record batch for topic {} must contain at least one value",
                topic
            )));
        }
        Ok(Self { topic, key, values })
    }

    pub fn single(topic: Arc<AvroTopic>, key: Value, value: Value) -> Self {
        Self {
            topic,
            key,
            values: vec![value],
        }
    }

    pub fn topic(&self) -> &Arc<AvroTopic> {
        &self.topic
    }

    pub fn key(&self) -> &Value {
        &self.key
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Always false; kept for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn into_parts(self) -> (Arc<AvroTopic>, Value, Vec<Value>) {
        (self.topic, self.key, self.values)
    }
}
