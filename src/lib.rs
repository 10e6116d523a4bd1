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

// Avro producer for the Kafka REST proxy
//
// Publishes schema-typed records through an HTTP proxy:
// - Tracks connection health with time-based decay
// - Caches registry schemas and registers new ones on first use
// - Maps local record schemas onto whatever the registry lists
// - Encodes batches as binary record sets or Avro-JSON, downgrading on 415
// - Batches records by size and age per topic

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod request;
pub mod schema;
pub mod sender;
pub mod topic;

// Re-export main types
pub use config::{load_config, load_config_with_env, ProducerConfig};
pub use connection::{ConnectionState, State};
pub use error::{ProducerError, RegistryError, Result};
pub use pool::{ConnectionPool, PooledClient};
pub use request::{WireFormat, WireRequestBuilder};
pub use schema::{
    EvolutionMapping, HttpSchemaRegistryClient, SchemaMetadata, SchemaRegistryClient,
    SchemaRetriever,
};
pub use sender::{BatchedTopicSender, BatchingSender, RestSender, RestTopicSender, TopicSender};
pub use topic::{AvroTopic, RecordBatch};
