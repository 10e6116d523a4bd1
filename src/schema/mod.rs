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

// Schema registry access and schema evolution
//
// - registry: HTTP client for the schema registry endpoints
// - cache: time-expiring cache in front of the registry
// - evolution: value mapping between a local and a registered schema

pub mod cache;
pub mod evolution;
pub mod registry;

pub use cache::SchemaRetriever;
pub use evolution::{EvolutionMapping, MappingBuilder};
pub use registry::{HttpSchemaRegistryClient, SchemaRegistryClient};

use apache_avro::Schema;
use std::sync::Arc;

use crate::error::{ProducerError, Result};

/// Registry subject for the key or value schema of a topic
pub fn subject_name(topic: &str, is_value: bool) -> String {
    if is_value {
        format!("{}-value", topic)
    } else {
        format!("{}-key", topic)
    }
}

/// Full JSON representation of a schema, including defaults and docs
pub fn schema_to_json(schema: &Schema) -> Result<String> {
    serde_json::to_string(schema)
        .map_err(|e| ProducerError::Encoding(format!("Cannot serialize schema: {}", e)))
}

/// Schema together with its registry identity
///
/// An `id` of `None` means the schema was only used locally and is not
/// confirmed to be registered.
#[derive(Debug, Clone)]
pub struct SchemaMetadata {
    id: Option<i32>,
    version: Option<i32>,
    schema: Arc<Schema>,
}

impl SchemaMetadata {
    pub fn new(id: Option<i32>, version: Option<i32>, schema: Schema) -> Self {
        Self {
            id,
            version,
            schema: Arc::new(schema),
        }
    }

    /// Metadata for a schema that has not been registered
    pub fn local(schema: Schema) -> Self {
        Self::new(None, None, schema)
    }

    pub fn id(&self) -> Option<i32> {
        self.id
    }

    pub fn version(&self) -> Option<i32> {
        self.version
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }
}

impl PartialEq for SchemaMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.version == other.version
            && self.schema.canonical_form() == other.schema.canonical_form()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_names() {
        assert_eq!(subject_name("android_phone_battery", true), "android_phone_battery-value");
        assert_eq!(subject_name("android_phone_battery", false), "android_phone_battery-key");
    }

    #[test]
    fn test_schema_json_keeps_defaults() {
        let schema = Schema::parse_str(
            r#"{"type":"record","name":"R","fields":[{"name":"a","type":"int","default":3}]}"#,
        )
        .unwrap();
        let json = schema_to_json(&schema).unwrap();
        assert!(json.contains("\"default\":3"));
    }

    #[test]
    fn test_metadata_equality() {
        let a = SchemaMetadata::new(Some(1), Some(2), Schema::Long);
        let b = SchemaMetadata::new(Some(1), Some(2), Schema::Long);
        let c = SchemaMetadata::new(Some(1), Some(3), Schema::Long);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(SchemaMetadata::local(Schema::Long).id().is_none());
    }
}
