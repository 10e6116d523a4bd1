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

// Size and age bounded record batching

use apache_avro::types::Value;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::TopicSender;
use crate::config::BatchingConfig;
use crate::error::{ProducerError, Result};
use crate::topic::{AvroTopic, RecordBatch};

/// Flush thresholds shared by the topic senders it wraps
#[derive(Debug, Clone, Copy)]
pub struct BatchingSender {
    max_batch_size: usize,
    max_batch_age: Duration,
}

impl BatchingSender {
    pub fn new(max_batch_size: usize, max_batch_age: Duration) -> Result<Self> {
        if max_batch_size == 0 {
            return Err(ProducerError::InvalidArgument(
                "max batch size must be positive".to_string(),
            ));
        }
        if max_batch_age.is_zero() {
            return Err(ProducerError::InvalidArgument(
                "max batch age must be positive".to_string(),
            ));
        }
        Ok(Self {
            max_batch_size,
            max_batch_age,
        })
    }

    pub fn from_config(config: &BatchingConfig) -> Result<Self> {
        Self::new(config.max_batch_size, config.max_age())
    }

    /// Queue records for `sender` and publish them in batches
    pub fn wrap<S: TopicSender>(&self, sender: S) -> BatchedTopicSender<S> {
        BatchedTopicSender {
            inner: sender,
            queue: VecDeque::new(),
            max_batch_size: self.max_batch_size,
            max_batch_age: self.max_batch_age,
            stats: BatchStats::default(),
        }
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn max_batch_age(&self) -> Duration {
        self.max_batch_age
    }
}

#[derive(Debug)]
struct QueuedRecord {
    key: Value,
    value: Value,
    queued_at: Instant,
}

/// Counters of a batched topic sender
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Flushes that sent at least one record
    pub flushes: u64,
    /// Batches handed to the wrapped sender
    pub batches_sent: u64,
    pub records_sent: u64,
    pub records_dropped: u64,
}

/// Topic sender that queues records until a size or age threshold
///
/// Records leave the queue only after the wrapped sender accepted them, so
/// a failed flush keeps previously queued records for [`TopicSender::flush`]
/// to retry or [`BatchedTopicSender::clear`] to drop. Records whose send
/// returned an error are never kept. Send order is preserved.
pub struct BatchedTopicSender<S> {
    inner: S,
    queue: VecDeque<QueuedRecord>,
    max_batch_size: usize,
    max_batch_age: Duration,
    stats: BatchStats,
}

impl<S: TopicSender> BatchedTopicSender<S> {
    /// Queue one record, flushing when a threshold is reached
    ///
    /// An error means `value` was not queued: either the queue could not make
    /// room for it, or the flush that included it failed. Records queued
    /// earlier stay queued, so the queue never grows past the maximum batch
    /// size while the wrapped sender keeps failing.
    pub async fn send_record(&mut self, key: Value, value: Value) -> Result<()> {
        self.enqueue(key, vec![value]).await
    }

    /// Queue all `values` under `key`, or none of them on error
    async fn enqueue(&mut self, key: Value, values: Vec<Value>) -> Result<()> {
        let added = values.len();
        if added == 0 {
            return Ok(());
        }

        if self.oldest_expired() {
            debug!(
                "Oldest record of topic {} exceeded {:?}, flushing",
                self.inner.topic(),
                self.max_batch_age
            );
            self.flush_queue().await?;
        } else if !self.queue.is_empty() && self.queue.len() + added > self.max_batch_size {
            debug!(
                "No room for {} records in queue of topic {}, flushing",
                added,
                self.inner.topic()
            );
            self.flush_queue().await?;
        }

        let queued_at = Instant::now();
        self.queue.extend(values.into_iter().map(|value| QueuedRecord {
            key: key.clone(),
            value,
            queued_at,
        }));

        if self.queue.len() >= self.max_batch_size {
            debug!(
                "Batch size {} reached for topic {}, flushing",
                self.max_batch_size,
                self.inner.topic()
            );
            if let Err(e) = self.flush_queue().await {
                // the new records form the tail run, which was not sent
                let keep = self.queue.len().saturating_sub(added);
                self.queue.truncate(keep);
                return Err(e);
            }
        }
        Ok(())
    }

    fn oldest_expired(&self) -> bool {
        self.queue
            .front()
            .is_some_and(|record| record.queued_at.elapsed() > self.max_batch_age)
    }

    /// Send all queued records as batches of consecutive equal keys
    async fn flush_queue(&mut self) -> Result<()> {
        if self.queue.is_empty() {
            return Ok(());
        }
        let topic = Arc::clone(self.inner.topic());
        let mut sent = 0usize;

        while let Some(first) = self.queue.front() {
            let run = self
                .queue
                .iter()
                .take_while(|record| record.key == first.key)
                .count();
            let key = first.key.clone();
            let values = self
                .queue
                .iter()
                .take(run)
                .map(|record| record.value.clone())
                .collect();
            let batch = RecordBatch::new(Arc::clone(&topic), key, values)?;

            if let Err(e) = self.inner.send(batch).await {
                warn!(
                    "Flush of topic {} failed with {} records still queued: {}",
                    topic,
                    self.queue.len(),
                    e
                );
                if sent > 0 {
                    self.stats.flushes += 1;
                }
                return Err(e);
            }

            self.queue.drain(..run);
            sent += run;
            self.stats.batches_sent += 1;
            self.stats.records_sent += run as u64;
        }

        self.stats.flushes += 1;
        debug!("Flushed {} records of topic {}", sent, topic);
        Ok(())
    }

    /// Drop all queued records, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        if dropped > 0 {
            warn!(
                "Dropping {} queued records of topic {}",
                dropped,
                self.inner.topic()
            );
        }
        self.queue.clear();
        self.stats.records_dropped += dropped as u64;
        dropped
    }

    /// Number of queued records
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}

#[async_trait]
impl<S: TopicSender> TopicSender for BatchedTopicSender<S> {
    fn topic(&self) -> &Arc<AvroTopic> {
        self.inner.topic()
    }

    /// Queue every value of the batch in order, or none of them on error
    async fn send(&mut self, batch: RecordBatch) -> Result<()> {
        if batch.topic() != self.inner.topic() {
            return Err(ProducerError::InvalidArgument(format!(
                "batch for topic {} sent to sender of topic {}",
                batch.topic(),
                self.inner.topic()
            )));
        }
        let (_, key, values) = batch.into_parts();
        self.enqueue(key, values).await
    }

    async fn flush(&mut self) -> Result<()> {
        self.flush_queue().await?;
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<()> {
        self.flush_queue().await?;
        self.inner.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_zero_thresholds() {
        assert!(matches!(
            BatchingSender::new(0, Duration::from_secs(1)),
            Err(ProducerError::InvalidArgument(_))
        ));
        assert!(matches!(
            BatchingSender::new(10, Duration::ZERO),
            Err(ProducerError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let sender = BatchingSender::from_config(&BatchingConfig::default()).unwrap();
        assert_eq!(sender.max_batch_size(), 1000);
        assert_eq!(sender.max_batch_age(), Duration::from_secs(10));
    }
}
