use std::sync::Arc;

use queue_api::util::expires_at;
use queue_api::{
    BlobStore, Condition, DeliveredMessage, KvStore, Message, PublishReceipt, PublishRequest,
    QueueError, ScanRequest, StoreError, now_ms,
};

use crate::config::QueueLimits;
use crate::keys::{self, field};
use crate::record::{from_item, to_item};
use crate::registry::TopicRegistry;
use crate::validate;

/// Minimum page fetched per store scan when reading a range.
const READ_PAGE_SIZE: usize = 64;

/// Ordered per-topic message log.
///
/// Metadata rows live under `msg/{topicId}/{seq}`; payload bytes live in
/// the blob store. Sequence numbers come from a dedicated per-topic
/// counter (`seq/{topicId}`) advanced with an atomic increment, so N
/// concurrent publishers receive N distinct, contiguous numbers.
pub struct MessageLog {
    store: Arc<dyn KvStore>,
    blobs: Arc<dyn BlobStore>,
    registry: Arc<TopicRegistry>,
    limits: Arc<QueueLimits>,
}

impl MessageLog {
    pub fn new(
        store: Arc<dyn KvStore>,
        blobs: Arc<dyn BlobStore>,
        registry: Arc<TopicRegistry>,
        limits: Arc<QueueLimits>,
    ) -> Self {
        Self { store, blobs, registry, limits }
    }

    /// Publish one message.
    ///
    /// Steps: validate → topic lookup → blob write → sequence allocation →
    /// metadata write → topic counter. A sequence number allocated before a
    /// failed metadata write is never reissued; it stays a gap. Once the
    /// metadata row is written the publish succeeds even if the topic
    /// counter update fails.
    pub async fn append(
        &self,
        topic_id: &str,
        request: PublishRequest,
    ) -> Result<PublishReceipt, QueueError> {
        validate::publish(&request.payload, &request.content_type, &request.metadata, &self.limits)?;
        let topic = self.registry.get(topic_id).await?;

        let size = request.payload.len() as u64;
        let payload_key = self.blobs.put(request.payload).await?;

        let sequence_number = match self.allocate_sequence(topic_id).await {
            Ok(n) => n,
            Err(e) => {
                self.release_blob(&payload_key).await;
                return Err(e);
            }
        };

        let timestamp = now_ms();
        let message = Message {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic_id: topic_id.to_string(),
            sequence_number,
            timestamp,
            payload_key,
            content_type: request.content_type,
            size,
            metadata: request.metadata,
            expires_at: expires_at(timestamp, topic.retention_period_hours),
        };

        let key = keys::message(topic_id, sequence_number);
        let item = match to_item(&message) {
            Ok(item) => item,
            Err(e) => {
                self.release_blob(&message.payload_key).await;
                return Err(e);
            }
        };
        if let Err(e) = self.store.put(&key, item, Condition::NotExists).await {
            tracing::warn!(
                topic_id,
                sequence_number,
                error = %e,
                "message write failed, sequence number left unused"
            );
            self.release_blob(&message.payload_key).await;
            return Err(match e {
                StoreError::ConditionFailed => QueueError::internal(format!(
                    "sequence number {sequence_number} already written for topic '{topic_id}'"
                )),
                other => other.into(),
            });
        }

        // Message is stored; a counter failure does not fail the publish.
        if let Err(e) = self.registry.increment_message_count(topic_id, timestamp).await {
            tracing::warn!(topic_id, sequence_number, error = %e, "message count update failed");
        }

        tracing::debug!(topic_id, sequence_number, size, "message appended");
        Ok(PublishReceipt {
            message_id: message.message_id,
            topic_id: message.topic_id,
            sequence_number,
            timestamp,
        })
    }

    async fn allocate_sequence(&self, topic_id: &str) -> Result<u64, QueueError> {
        let key = keys::sequence(topic_id);
        let next = self.store.atomic_increment(&key, field::VALUE, 1).await?;
        match u64::try_from(next) {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(QueueError::internal(format!("sequence counter '{key}' is invalid: {next}"))),
        }
    }

    /// Up to `max_count` live messages with `sequenceNumber > after`, ascending.
    ///
    /// Messages expired at `now` are skipped even if the reaper has not
    /// removed them yet. Read-only.
    pub async fn read_range(
        &self,
        topic_id: &str,
        after: u64,
        max_count: usize,
        now: i64,
    ) -> Result<Vec<Message>, QueueError> {
        let mut out = Vec::new();
        if max_count == 0 {
            return Ok(out);
        }

        let page_size = READ_PAGE_SIZE.max(max_count);
        let mut cursor = after;
        loop {
            let page = self.page(topic_id, cursor, page_size).await?;
            let exhausted = page.len() < page_size;
            for message in page {
                cursor = message.sequence_number;
                if message.is_expired(now) {
                    continue;
                }
                out.push(message);
                if out.len() == max_count {
                    return Ok(out);
                }
            }
            if exhausted {
                return Ok(out);
            }
        }
    }

    /// Raw page of metadata rows after `after`, expired ones included.
    pub async fn page(
        &self,
        topic_id: &str,
        after: u64,
        limit: usize,
    ) -> Result<Vec<Message>, QueueError> {
        let request = ScanRequest::prefix(keys::messages(topic_id))
            .after(keys::message(topic_id, after))
            .limit(limit.max(1));
        self.store
            .scan(request)
            .await?
            .into_iter()
            .map(|(key, item)| from_item(&key, item))
            .collect()
    }

    /// Attach payload bytes. A message whose blob is already gone was
    /// reaped concurrently and is dropped from the result.
    pub async fn load_payloads(
        &self,
        messages: Vec<Message>,
    ) -> Result<Vec<DeliveredMessage>, QueueError> {
        let mut out = Vec::with_capacity(messages.len());
        for message in messages {
            match self.blobs.get(&message.payload_key).await? {
                Some(payload) => out.push(DeliveredMessage { message, payload }),
                None => {
                    tracing::debug!(
                        topic_id = %message.topic_id,
                        sequence_number = message.sequence_number,
                        "payload already released, skipping message"
                    );
                }
            }
        }
        Ok(out)
    }

    /// Release the payload, then the metadata row. Both deletes are
    /// delete-if-present, so a retry after partial failure is harmless.
    pub async fn remove(&self, message: &Message) -> Result<(), QueueError> {
        self.blobs.delete(&message.payload_key).await?;
        self.store
            .delete(&keys::message(&message.topic_id, message.sequence_number), Condition::Always)
            .await?;
        Ok(())
    }

    /// Remove every message of a topic and its sequence counter.
    /// Returns the number of messages removed.
    pub async fn purge(&self, topic_id: &str, page_size: usize) -> Result<usize, QueueError> {
        let mut removed = 0;
        let mut cursor = 0;
        loop {
            let page = self.page(topic_id, cursor, page_size).await?;
            let exhausted = page.len() < page_size.max(1);
            for message in &page {
                cursor = message.sequence_number;
                self.remove(message).await?;
                removed += 1;
            }
            if exhausted {
                break;
            }
        }
        self.store.delete(&keys::sequence(topic_id), Condition::Always).await?;
        Ok(removed)
    }

    async fn release_blob(&self, payload_key: &str) {
        if let Err(e) = self.blobs.delete(payload_key).await {
            tracing::warn!(payload_key, error = %e, "failed to release payload blob");
        }
    }
}
