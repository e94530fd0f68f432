use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use queue_api::{ConsumeRequest, ConsumeResponse, ConsumerGroup, QueueError, now_ms};

use crate::config::QueueLimits;
use crate::groups::ConsumerGroupManager;
use crate::log::MessageLog;
use crate::offsets::OffsetCursorStore;
use crate::registry::TopicRegistry;
use crate::validate;

/// Orchestrates a consume: cursor → read → deliver → advance.
///
/// Delivery is at-least-once. Messages are selected first and the cursor
/// is advanced afterwards; a failed advance means the next consume of the
/// group sees the same batch again. An advance never overwrites a cursor
/// that changed after the batch was read.
pub struct ConsumptionCoordinator {
    registry: Arc<TopicRegistry>,
    groups: Arc<ConsumerGroupManager>,
    offsets: Arc<OffsetCursorStore>,
    log: Arc<MessageLog>,
    limits: Arc<QueueLimits>,
    poll_interval: Duration,
}

impl ConsumptionCoordinator {
    pub fn new(
        registry: Arc<TopicRegistry>,
        groups: Arc<ConsumerGroupManager>,
        offsets: Arc<OffsetCursorStore>,
        log: Arc<MessageLog>,
        limits: Arc<QueueLimits>,
        poll_interval: Duration,
    ) -> Self {
        Self { registry, groups, offsets, log, limits, poll_interval }
    }

    /// Deliver up to `maxMessages` messages past the group's cursor.
    ///
    /// With `waitTimeSeconds > 0` and nothing available, re-polls every
    /// poll interval until data arrives or the wait budget runs out. The
    /// call never sleeps past its deadline.
    pub async fn consume(
        &self,
        topic_id: &str,
        group_id: &str,
        request: ConsumeRequest,
    ) -> Result<ConsumeResponse, QueueError> {
        let (max_messages, wait_seconds) = validate::consume(&request, &self.limits)?;
        let deadline = Instant::now() + Duration::from_secs(u64::from(wait_seconds));
        self.resolve_group(topic_id, group_id).await?;

        loop {
            let cursor = self.offsets.get(topic_id, group_id).await?;
            let now = now_ms();
            let batch = self
                .log
                .read_range(topic_id, cursor.last_sequence_number, max_messages, now)
                .await?;

            if let Some(last) = batch.last().map(|m| m.sequence_number) {
                let messages = self.log.load_payloads(batch).await?;
                // Guarded by the cursor the batch was read from, so a reset
                // issued meanwhile wins and the batch is delivered again later.
                self.offsets
                    .advance(topic_id, group_id, cursor.last_sequence_number, last, now)
                    .await?;
                if let Err(e) = self.groups.touch(topic_id, group_id, now).await {
                    tracing::warn!(topic_id, group_id, error = %e, "failed to record consume time");
                }
                tracing::debug!(topic_id, group_id, delivered = messages.len(), cursor = last, "messages consumed");
                return Ok(ConsumeResponse { messages, next_sequence_number: last });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(ConsumeResponse {
                    messages: Vec::new(),
                    next_sequence_number: cursor.last_sequence_number,
                });
            }
            tokio::time::sleep(self.poll_interval.min(remaining)).await;

            // Topic or group may have been deleted while we waited.
            self.resolve_group(topic_id, group_id).await?;
        }
    }

    /// A group of a deleted topic is reported as a missing group.
    async fn resolve_group(&self, topic_id: &str, group_id: &str) -> Result<ConsumerGroup, QueueError> {
        if self.registry.find(topic_id).await?.is_none() {
            return Err(QueueError::group_not_found(topic_id, group_id));
        }
        self.groups.get(topic_id, group_id).await
    }
}
