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

use apache_avro::Schema;
use async_trait::async_trait;
use radar_rest_producer::schema::{SchemaMetadata, SchemaRegistryClient, SchemaRetriever};
use radar_rest_producer::{ProducerError, RegistryError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory registry counting the requests it receives
#[derive(Default)]
struct FakeRegistry {
    subjects: Mutex<HashMap<String, Vec<(i32, Schema)>>>,
    next_id: AtomicUsize,
    lookups: AtomicUsize,
    id_lookups: AtomicUsize,
    registrations: AtomicUsize,
    unavailable: std::sync::atomic::AtomicBool,
}

impl FakeRegistry {
    fn with_subject(subject: &str, schema: Schema) -> Self {
        let registry = FakeRegistry::default();
        registry.next_id.store(10, Ordering::SeqCst);
        registry
            .subjects
            .lock()
            .unwrap()
            .insert(subject.to_string(), vec![(10, schema)]);
        registry.next_id.fetch_add(1, Ordering::SeqCst);
        registry
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SchemaRegistryClient for FakeRegistry {
    async fn get_schema_metadata(
        &self,
        subject: &str,
        version: i32,
    ) -> Result<SchemaMetadata, RegistryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("status=503".to_string()));
        }
        let subjects = self.subjects.lock().unwrap();
        let versions = subjects.get(subject).ok_or_else(|| RegistryError::NotFound {
            subject: subject.to_string(),
            version: (version > 0).then_some(version),
        })?;
        let index = if version > 0 {
            version as usize - 1
        } else {
            versions.len() - 1
        };
        let (id, schema) = versions.get(index).ok_or_else(|| RegistryError::NotFound {
            subject: subject.to_string(),
            version: Some(version),
        })?;
        Ok(SchemaMetadata::new(
            Some(*id),
            Some(index as i32 + 1),
            schema.clone(),
        ))
    }

    async fn get_schema_by_id(&self, id: i32) -> Result<Schema, RegistryError> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        let subjects = self.subjects.lock().unwrap();
        subjects
            .values()
            .flatten()
            .find(|(schema_id, _)| *schema_id == id)
            .map(|(_, schema)| schema.clone())
            .ok_or_else(|| RegistryError::NotFound {
                subject: format!("id {}", id),
                version: None,
            })
    }

    async fn register_schema(&self, subject: &str, schema: &Schema) -> Result<i32, RegistryError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as i32;
        self.subjects
            .lock()
            .unwrap()
            .entry(subject.to_string())
            .or_default()
            .push((id, schema.clone()));
        Ok(id)
    }
}

fn retriever(registry: &Arc<FakeRegistry>) -> SchemaRetriever {
    SchemaRetriever::with_validity(registry.clone(), Duration::from_secs(60))
}

#[tokio::test(start_paused = true)]
async fn test_lookup_is_cached_within_validity() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    let first = retriever.get_by_version("test", true, 0).await.unwrap();
    tokio::time::advance(Duration::from_secs(30)).await;
    let second = retriever.get_by_version("test", true, 0).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.id(), Some(10));
    assert_eq!(first.version(), Some(1));
    assert_eq!(registry.lookups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_expired_entry_issues_exactly_one_request() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    retriever.get_by_version("test", true, 0).await.unwrap();
    tokio::time::advance(Duration::from_secs(61)).await;

    retriever.get_by_version("test", true, 0).await.unwrap();
    retriever.get_by_version("test", true, 0).await.unwrap();
    assert_eq!(registry.lookups(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_negative_version_means_latest() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    retriever.get_by_version("test", true, -1).await.unwrap();
    retriever.get_by_version("test", true, 0).await.unwrap();
    assert_eq!(registry.lookups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_latest_lookup_also_caches_concrete_version() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    retriever.get_by_version("test", true, 0).await.unwrap();
    let by_version = retriever.get_by_version("test", true, 1).await.unwrap();
    assert_eq!(by_version.id(), Some(10));
    assert_eq!(registry.lookups(), 1);

    // The id index is filled too
    let schema = retriever.get_by_id("test", true, 10).await.unwrap();
    assert_eq!(*schema, Schema::Long);
    assert_eq!(registry.id_lookups.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_key_and_value_subjects_are_separate() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    retriever.get_by_version("test", true, 0).await.unwrap();
    let key = retriever.get_by_version("test", false, 0).await;
    assert!(matches!(
        key,
        Err(ProducerError::Registry(RegistryError::NotFound { .. }))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_get_by_id_is_cached() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    retriever.get_by_id("test", true, 10).await.unwrap();
    retriever.get_by_id("test", true, 10).await.unwrap();
    assert_eq!(registry.id_lookups.load(Ordering::SeqCst), 1);

    tokio::time::advance(Duration::from_secs(61)).await;
    retriever.get_by_id("test", true, 10).await.unwrap();
    assert_eq!(registry.id_lookups.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_register_caches_as_latest() {
    let registry = Arc::new(FakeRegistry::default());
    let retriever = retriever(&registry);

    let registered = retriever.register("fresh", true, &Schema::Double).await.unwrap();
    assert!(registered.id().is_some());

    let latest = retriever.get_by_version("fresh", true, 0).await.unwrap();
    assert_eq!(latest, registered);
    assert_eq!(registry.lookups(), 0);
    assert_eq!(registry.registrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_or_register_creates_missing_subject() {
    let registry = Arc::new(FakeRegistry::default());
    let retriever = retriever(&registry);

    let metadata = retriever
        .get_or_register("fresh", false, &Schema::String, -1)
        .await
        .unwrap();
    assert_eq!(metadata.schema(), &Schema::String);
    assert_eq!(registry.lookups(), 1);
    assert_eq!(registry.registrations(), 1);

    // Second call is served from cache
    retriever
        .get_or_register("fresh", false, &Schema::String, -1)
        .await
        .unwrap();
    assert_eq!(registry.lookups(), 1);
    assert_eq!(registry.registrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_or_register_on_unavailable() {
    let registry = Arc::new(FakeRegistry::default());
    registry.unavailable.store(true, Ordering::SeqCst);
    let retriever = retriever(&registry);

    let metadata = retriever
        .get_or_register("flaky", true, &Schema::Int, 0)
        .await
        .unwrap();
    assert!(metadata.id().is_some());
    assert_eq!(registry.registrations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_or_register_uses_existing_schema() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    let metadata = retriever
        .get_or_register("test", true, &Schema::Int, -1)
        .await
        .unwrap();
    assert_eq!(metadata.schema(), &Schema::Long);
    assert_eq!(registry.registrations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_prune_expired_removes_stale_entries() {
    let registry = Arc::new(FakeRegistry::with_subject("test-value", Schema::Long));
    let retriever = retriever(&registry);

    retriever.get_by_version("test", true, 0).await.unwrap();
    assert_eq!(retriever.cached_versions(), 2);
    assert_eq!(retriever.cached_ids(), 1);

    retriever.prune_expired();
    assert_eq!(retriever.cached_versions(), 2);

    tokio::time::advance(Duration::from_secs(61)).await;
    retriever.prune_expired();
    assert_eq!(retriever.cached_versions(), 0);
    assert_eq!(retriever.cached_ids(), 0);
}
