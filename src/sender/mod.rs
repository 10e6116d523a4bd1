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

// Topic senders
//
// - rest: publishes batches to the REST proxy with encoding negotiation
// - batched: queues records and publishes them through another sender

pub mod batched;
pub mod rest;

pub use batched::{BatchedTopicSender, BatchingSender};
pub use rest::{RestSender, RestTopicSender};

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::topic::{AvroTopic, RecordBatch};

/// Publishes record batches for a single topic
///
/// A topic sender is owned by one task at a time; `&mut self` serializes
/// its calls. Senders for different topics may run concurrently.
#[async_trait]
pub trait TopicSender: Send {
    /// Topic this sender publishes to
    fn topic(&self) -> &Arc<AvroTopic>;

    /// Publish a batch, or queue it if the sender batches records
    ///
    /// The batch must belong to [`TopicSender::topic`].
    async fn send(&mut self, batch: RecordBatch) -> Result<()>;

    /// Publish anything still queued; a no-op for unbuffered senders
    async fn flush(&mut self) -> Result<()>;

    /// Flush and release the sender
    async fn close(&mut self) -> Result<()> {
        self.flush().await
    }
}
