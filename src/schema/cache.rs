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

// Time-expiring schema cache in front of the schema registry

use apache_avro::Schema;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::registry::SchemaRegistryClient;
use super::{subject_name, SchemaMetadata};
use crate::error::{ProducerError, RegistryError, Result};

/// Default validity window of cached schemas
pub const DEFAULT_CACHE_VALIDITY: Duration = Duration::from_secs(24 * 60 * 60);

/// Cache key version that stands for "latest"
const LATEST_VERSION: i32 = 0;

#[derive(Debug, Clone)]
struct CachedValue<T> {
    value: T,
    inserted: Instant,
}

impl<T: Clone> CachedValue<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            inserted: Instant::now(),
        }
    }

    fn is_expired(&self, validity: Duration) -> bool {
        self.inserted.elapsed() > validity
    }
}

/// Retrieves schema metadata from the registry and caches it
///
/// Entries are keyed by `(subject, version)` and by registry id. Version 0
/// is an alias for the latest version. Expiry is checked lazily on lookup;
/// [`SchemaRetriever::prune_expired`] removes stale entries on demand.
pub struct SchemaRetriever {
    client: Arc<dyn SchemaRegistryClient>,
    by_version: DashMap<(String, i32), CachedValue<SchemaMetadata>>,
    by_id: DashMap<i32, CachedValue<Arc<Schema>>>,
    validity: Duration,
}

impl SchemaRetriever {
    pub fn new(client: Arc<dyn SchemaRegistryClient>) -> Self {
        Self::with_validity(client, DEFAULT_CACHE_VALIDITY)
    }

    pub fn with_validity(client: Arc<dyn SchemaRegistryClient>, validity: Duration) -> Self {
        Self {
            client,
            by_version: DashMap::new(),
            by_id: DashMap::new(),
            validity,
        }
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    fn cached_version(&self, key: &(String, i32)) -> Option<SchemaMetadata> {
        let entry = self.by_version.get(key)?;
        if entry.is_expired(self.validity) {
            drop(entry);
            self.by_version
                .remove_if(key, |_, cached| cached.is_expired(self.validity));
            return None;
        }
        Some(entry.value.clone())
    }

    fn cached_id(&self, id: i32) -> Option<Arc<Schema>> {
        let entry = self.by_id.get(&id)?;
        if entry.is_expired(self.validity) {
            drop(entry);
            self.by_id
                .remove_if(&id, |_, cached| cached.is_expired(self.validity));
            return None;
        }
        Some(entry.value.clone())
    }

    fn cache_metadata(&self, subject: &str, key_version: i32, metadata: &SchemaMetadata) {
        self.by_version.insert(
            (subject.to_string(), key_version),
            CachedValue::new(metadata.clone()),
        );
        if let Some(version) = metadata.version() {
            if version != key_version {
                self.by_version.insert(
                    (subject.to_string(), version),
                    CachedValue::new(metadata.clone()),
                );
            }
        }
        if let Some(id) = metadata.id() {
            self.by_id
                .insert(id, CachedValue::new(metadata.schema_arc().clone()));
        }
    }

    /// Schema metadata of a topic key or value at `version`
    ///
    /// A version of zero or below looks up the latest version.
    pub async fn get_by_version(
        &self,
        topic: &str,
        is_value: bool,
        version: i32,
    ) -> Result<SchemaMetadata> {
        let subject = subject_name(topic, is_value);
        let key_version = version.max(LATEST_VERSION);
        let key = (subject, key_version);

        if let Some(metadata) = self.cached_version(&key) {
            debug!("Schema cache hit: subject={}, version={}", key.0, key_version);
            return Ok(metadata);
        }

        debug!("Schema cache miss: subject={}, version={}", key.0, key_version);
        let metadata = self.client.get_schema_metadata(&key.0, key_version).await?;
        self.cache_metadata(&key.0, key_version, &metadata);
        Ok(metadata)
    }

    /// Schema registered under a global registry id
    pub async fn get_by_id(&self, topic: &str, is_value: bool, id: i32) -> Result<Arc<Schema>> {
        if let Some(schema) = self.cached_id(id) {
            debug!("Schema cache hit: id={}", id);
            return Ok(schema);
        }

        debug!(
            "Schema cache miss: id={} (subject {})",
            id,
            subject_name(topic, is_value)
        );
        let schema = Arc::new(self.client.get_schema_by_id(id).await?);
        self.by_id.insert(id, CachedValue::new(schema.clone()));
        Ok(schema)
    }

    /// Register a schema and cache it as the latest version of its subject
    pub async fn register(
        &self,
        topic: &str,
        is_value: bool,
        schema: &Schema,
    ) -> Result<SchemaMetadata> {
        let subject = subject_name(topic, is_value);
        let id = self.client.register_schema(&subject, schema).await?;
        let metadata = SchemaMetadata::new(Some(id), None, schema.clone());
        self.cache_metadata(&subject, LATEST_VERSION, &metadata);
        info!("Schema for subject {} registered with id {}", subject, id);
        Ok(metadata)
    }

    /// Look up a schema version, registering `schema` if the lookup fails
    ///
    /// This lets the first publish to a new topic create its subjects.
    pub async fn get_or_register(
        &self,
        topic: &str,
        is_value: bool,
        schema: &Schema,
        version: i32,
    ) -> Result<SchemaMetadata> {
        match self.get_by_version(topic, is_value, version).await {
            Ok(metadata) => Ok(metadata),
            Err(ProducerError::Registry(e)) if Self::should_register(&e) => {
                warn!(
                    "Schema lookup for subject {} failed ({}), registering local schema",
                    subject_name(topic, is_value),
                    e
                );
                self.register(topic, is_value, schema).await
            }
            Err(e) => Err(e),
        }
    }

    fn should_register(error: &RegistryError) -> bool {
        matches!(
            error,
            RegistryError::NotFound { .. } | RegistryError::Unavailable(_) | RegistryError::Http(_)
        )
    }

    /// Remove all entries older than the validity window
    pub fn prune_expired(&self) {
        let validity = self.validity;
        let versions_before = self.by_version.len();
        let ids_before = self.by_id.len();
        self.by_version.retain(|_, cached| !cached.is_expired(validity));
        self.by_id.retain(|_, cached| !cached.is_expired(validity));
        debug!(
            "Pruned {} version entries and {} id entries from schema cache",
            versions_before.saturating_sub(self.by_version.len()),
            ids_before.saturating_sub(self.by_id.len())
        );
    }

    /// Number of cached (subject, version) entries, including expired ones
    pub fn cached_versions(&self) -> usize {
        self.by_version.len()
    }

    /// Number of cached id entries, including expired ones
    pub fn cached_ids(&self) -> usize {
        self.by_id.len()
    }
}
