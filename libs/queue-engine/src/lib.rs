//! MicroQueue engine: topics, ordered append, consumer-group cursors and
//! retention, on top of a shared key-value store and a blob store.
//!
//! The engine keeps no authoritative in-process state. Any number of
//! `MicroQueue` instances may run against the same store.

pub mod config;
pub mod consume;
mod error;
pub mod groups;
mod index;
pub mod keys;
pub mod log;
pub mod offsets;
pub mod reaper;
mod record;
pub mod registry;
mod validate;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use queue_api::{
    BlobStore, ConsumeRequest, ConsumeResponse, ConsumerGroup, CreateConsumerGroupRequest,
    CreateTopicRequest, DeliveredMessage, KvStore, Offset, PublishReceipt, PublishRequest,
    QueueError, Topic, UpdateTopicRequest, now_ms,
};

pub use config::{EngineConfig, QueueLimits, ReaperConfig};
pub use consume::ConsumptionCoordinator;
pub use groups::ConsumerGroupManager;
pub use log::MessageLog;
pub use offsets::OffsetCursorStore;
pub use reaper::{ReapReport, RetentionReaper};
pub use registry::TopicRegistry;

/// Entry point wiring every component over one pair of stores.
pub struct MicroQueue {
    registry: Arc<TopicRegistry>,
    log: Arc<MessageLog>,
    groups: Arc<ConsumerGroupManager>,
    coordinator: ConsumptionCoordinator,
    reaper: Arc<RetentionReaper>,
    config: EngineConfig,
}

impl MicroQueue {
    pub fn new(
        store: Arc<dyn KvStore>,
        blobs: Arc<dyn BlobStore>,
        config: EngineConfig,
    ) -> Result<Self, QueueError> {
        config.validate()?;
        let limits = Arc::new(config.limits.clone());

        let registry = Arc::new(TopicRegistry::new(store.clone(), limits.clone()));
        let offsets = Arc::new(OffsetCursorStore::new(store.clone()));
        let log = Arc::new(MessageLog::new(store.clone(), blobs, registry.clone(), limits.clone()));
        let groups = Arc::new(ConsumerGroupManager::new(
            store.clone(),
            registry.clone(),
            offsets.clone(),
            limits.clone(),
        ));
        let coordinator = ConsumptionCoordinator::new(
            registry.clone(),
            groups.clone(),
            offsets,
            log.clone(),
            limits,
            config.poll_interval(),
        );
        let reaper = Arc::new(RetentionReaper::new(
            store,
            registry.clone(),
            groups.clone(),
            log.clone(),
            config.reaper.clone(),
        ));

        Ok(Self { registry, log, groups, coordinator, reaper, config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ═══════════════════════════════════════════════════════════
    //  Topics
    // ═══════════════════════════════════════════════════════════

    pub async fn create_topic(&self, request: CreateTopicRequest) -> Result<Topic, QueueError> {
        self.registry.create(request).await
    }

    pub async fn get_topic(&self, topic_id: &str) -> Result<Topic, QueueError> {
        self.registry.get(topic_id).await
    }

    pub async fn get_topic_by_name(&self, name: &str) -> Result<Option<Topic>, QueueError> {
        self.registry.get_by_name(name).await
    }

    /// All topics, oldest first.
    pub async fn list_topics(&self) -> Result<Vec<Topic>, QueueError> {
        let mut topics = self.registry.list().await?;
        topics.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(topics)
    }

    pub async fn update_topic(
        &self,
        topic_id: &str,
        request: UpdateTopicRequest,
    ) -> Result<Topic, QueueError> {
        self.registry.update(topic_id, request).await
    }

    /// Delete the topic record, then cascade to its messages, groups and
    /// cursors. The cascade is best-effort; the reaper finishes whatever
    /// is left behind.
    pub async fn delete_topic(&self, topic_id: &str) -> Result<Topic, QueueError> {
        let topic = self.registry.delete(topic_id).await?;
        match self.reaper.purge_topic(topic_id).await {
            Ok(removed) => tracing::debug!(topic_id, messages = removed, "topic data purged"),
            Err(e) => tracing::warn!(topic_id, error = %e, "topic purge incomplete, left to reaper"),
        }
        Ok(topic)
    }

    // ═══════════════════════════════════════════════════════════
    //  Messages
    // ═══════════════════════════════════════════════════════════

    pub async fn publish(
        &self,
        topic_id: &str,
        request: PublishRequest,
    ) -> Result<PublishReceipt, QueueError> {
        self.log.append(topic_id, request).await
    }

    /// Live messages after `after_sequence`, without touching any cursor.
    pub async fn list_messages(
        &self,
        topic_id: &str,
        after_sequence: Option<u64>,
        limit: Option<usize>,
    ) -> Result<Vec<DeliveredMessage>, QueueError> {
        let limit = validate::list_limit(limit, &self.config.limits)?;
        self.registry.get(topic_id).await?;
        let messages = self
            .log
            .read_range(topic_id, after_sequence.unwrap_or(0), limit, now_ms())
            .await?;
        self.log.load_payloads(messages).await
    }

    // ═══════════════════════════════════════════════════════════
    //  Consumer groups
    // ═══════════════════════════════════════════════════════════

    pub async fn create_consumer_group(
        &self,
        topic_id: &str,
        request: CreateConsumerGroupRequest,
    ) -> Result<ConsumerGroup, QueueError> {
        self.groups.create(topic_id, request).await
    }

    pub async fn get_consumer_group(
        &self,
        topic_id: &str,
        group_id: &str,
    ) -> Result<ConsumerGroup, QueueError> {
        self.groups.get(topic_id, group_id).await
    }

    pub async fn list_consumer_groups(&self, topic_id: &str) -> Result<Vec<ConsumerGroup>, QueueError> {
        self.groups.list(topic_id).await
    }

    pub async fn delete_consumer_group(
        &self,
        topic_id: &str,
        group_id: &str,
    ) -> Result<ConsumerGroup, QueueError> {
        self.groups.delete(topic_id, group_id).await
    }

    pub async fn consume(
        &self,
        topic_id: &str,
        group_id: &str,
        request: ConsumeRequest,
    ) -> Result<ConsumeResponse, QueueError> {
        self.coordinator.consume(topic_id, group_id, request).await
    }

    pub async fn reset_offset(&self, topic_id: &str, group_id: &str) -> Result<Offset, QueueError> {
        self.groups.reset_offset(topic_id, group_id).await
    }

    pub async fn get_offset(&self, topic_id: &str, group_id: &str) -> Result<Offset, QueueError> {
        self.groups.get_offset(topic_id, group_id).await
    }

    // ═══════════════════════════════════════════════════════════
    //  Retention
    // ═══════════════════════════════════════════════════════════

    /// One reaper pass as of `now` (Unix ms).
    pub async fn run_retention(&self, now: i64) -> Result<ReapReport, QueueError> {
        self.reaper.run_once(now).await
    }

    /// Start the periodic reaper. Stops when `token` is cancelled.
    pub fn spawn_reaper(&self, token: CancellationToken) -> JoinHandle<()> {
        self.reaper.clone().spawn(token)
    }
}
