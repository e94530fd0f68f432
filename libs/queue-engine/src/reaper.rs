use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use queue_api::{KvStore, QueueError, Topic, now_ms};

use crate::config::ReaperConfig;
use crate::groups::ConsumerGroupManager;
use crate::keys;
use crate::log::MessageLog;
use crate::record::scan_all;
use crate::registry::TopicRegistry;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReapReport {
    pub topics_scanned: usize,
    pub messages_reaped: usize,
    /// Deleted topics whose leftover rows were removed in this pass.
    pub orphaned_topics_purged: usize,
    /// Per-item failures; the pass continues past them.
    pub failures: usize,
}

/// Periodic retention enforcement.
///
/// Removes messages past `expiresAt` (payload first, then metadata) and
/// finishes cascades of deleted topics whose inline purge was cut short.
/// Every delete is delete-if-present, so racing with a concurrent purge
/// or another reaper instance is harmless.
pub struct RetentionReaper {
    store: Arc<dyn KvStore>,
    registry: Arc<TopicRegistry>,
    groups: Arc<ConsumerGroupManager>,
    log: Arc<MessageLog>,
    config: ReaperConfig,
}

impl RetentionReaper {
    pub fn new(
        store: Arc<dyn KvStore>,
        registry: Arc<TopicRegistry>,
        groups: Arc<ConsumerGroupManager>,
        log: Arc<MessageLog>,
        config: ReaperConfig,
    ) -> Self {
        Self { store, registry, groups, log, config }
    }

    /// One full pass: expire messages of every topic, then sweep orphans.
    pub async fn run_once(&self, now: i64) -> Result<ReapReport, QueueError> {
        let mut report = ReapReport::default();

        let topics = self.registry.list().await?;
        for topic in &topics {
            report.topics_scanned += 1;
            if let Err(e) = self.expire_topic(topic, now, &mut report).await {
                report.failures += 1;
                tracing::warn!(topic_id = %topic.topic_id, error = %e, "retention pass failed for topic");
            }
        }

        let live: BTreeSet<&str> = topics.iter().map(|t| t.topic_id.as_str()).collect();
        for topic_id in self.orphan_candidates(&live).await? {
            // Re-check: the topic may have been created after the listing.
            match self.registry.find(&topic_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(topic_id = %topic_id, error = %e, "orphan check failed");
                    continue;
                }
            }
            match self.purge_topic(&topic_id).await {
                Ok(removed) => {
                    report.orphaned_topics_purged += 1;
                    tracing::info!(topic_id = %topic_id, messages = removed, "purged leftovers of deleted topic");
                }
                Err(e) => {
                    report.failures += 1;
                    tracing::warn!(topic_id = %topic_id, error = %e, "orphan purge failed");
                }
            }
        }

        Ok(report)
    }

    async fn expire_topic(
        &self,
        topic: &Topic,
        now: i64,
        report: &mut ReapReport,
    ) -> Result<(), QueueError> {
        // Retention changes apply to new messages only, so expiry is not
        // monotonic in sequence order; walk the whole log.
        let page_size = self.config.page_size.max(1);
        let mut cursor = 0;
        loop {
            let page = self.log.page(&topic.topic_id, cursor, page_size).await?;
            let exhausted = page.len() < page_size;
            for message in &page {
                cursor = message.sequence_number;
                if !message.is_expired(now) {
                    continue;
                }
                match self.log.remove(message).await {
                    Ok(()) => report.messages_reaped += 1,
                    Err(e) => {
                        report.failures += 1;
                        tracing::warn!(
                            topic_id = %topic.topic_id,
                            sequence_number = message.sequence_number,
                            error = %e,
                            "failed to reap message"
                        );
                    }
                }
            }
            if exhausted {
                return Ok(());
            }
        }
    }

    /// Topic ids referenced by counter, group or cursor rows but absent
    /// from the topic listing.
    async fn orphan_candidates(&self, live: &BTreeSet<&str>) -> Result<BTreeSet<String>, QueueError> {
        let mut out = BTreeSet::new();
        for prefix in [keys::SEQUENCE_PREFIX, keys::GROUP_PREFIX, keys::OFFSET_PREFIX] {
            for (key, _) in scan_all(self.store.as_ref(), prefix, self.config.page_size).await? {
                if let Some(id) = keys::topic_id_of(&key, prefix) {
                    if !live.contains(id) {
                        out.insert(id.to_string());
                    }
                }
            }
        }
        Ok(out)
    }

    /// Remove messages, counter, groups and cursors of a topic.
    /// Returns the number of messages removed.
    pub async fn purge_topic(&self, topic_id: &str) -> Result<usize, QueueError> {
        let page_size = self.config.page_size;
        let removed = self.log.purge(topic_id, page_size).await?;
        self.groups.purge(topic_id, page_size).await?;
        Ok(removed)
    }

    /// Run `run_once` every configured interval until `token` is cancelled.
    pub fn spawn(self: Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!(interval_secs = self.config.interval_secs, "retention reaper started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.run_once(now_ms()).await {
                            Ok(report) if report.messages_reaped > 0 || report.orphaned_topics_purged > 0 => {
                                tracing::info!(
                                    reaped = report.messages_reaped,
                                    orphans = report.orphaned_topics_purged,
                                    failures = report.failures,
                                    "retention pass finished"
                                );
                            }
                            Ok(report) => {
                                tracing::debug!(topics = report.topics_scanned, "retention pass finished");
                            }
                            Err(e) => tracing::warn!(error = %e, "retention pass failed"),
                        }
                    }
                }
            }

            tracing::info!("retention reaper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use storage_memory::{MemoryBlobStore, MemoryKvStore, StoreOp};

    use super::*;
    use crate::config::QueueLimits;
    use crate::offsets::OffsetCursorStore;
    use queue_api::util::HOUR_MS;
    use queue_api::{
        CreateConsumerGroupRequest, CreateTopicRequest, PublishRequest, StoreError,
        UpdateTopicRequest,
    };

    struct Fixture {
        store: Arc<MemoryKvStore>,
        blobs: Arc<MemoryBlobStore>,
        registry: Arc<TopicRegistry>,
        groups: Arc<ConsumerGroupManager>,
        log: Arc<MessageLog>,
        reaper: Arc<RetentionReaper>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryKvStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let limits = Arc::new(QueueLimits::default());
        let registry = Arc::new(TopicRegistry::new(store.clone(), limits.clone()));
        let offsets = Arc::new(OffsetCursorStore::new(store.clone()));
        let groups = Arc::new(ConsumerGroupManager::new(
            store.clone(),
            registry.clone(),
            offsets,
            limits.clone(),
        ));
        let log = Arc::new(MessageLog::new(store.clone(), blobs.clone(), registry.clone(), limits));
        let config = ReaperConfig { page_size: 2, ..Default::default() };
        let reaper = Arc::new(RetentionReaper::new(
            store.clone(),
            registry.clone(),
            groups.clone(),
            log.clone(),
            config,
        ));
        Fixture { store, blobs, registry, groups, log, reaper }
    }

    async fn topic(f: &Fixture, name: &str, hours: u32) -> String {
        let request = CreateTopicRequest {
            name: name.to_string(),
            description: None,
            retention_period_hours: Some(hours),
        };
        f.registry.create(request).await.unwrap().topic_id
    }

    async fn publish(f: &Fixture, topic_id: &str) {
        f.log.append(topic_id, PublishRequest::new(&b"{}"[..], "application/json")).await.unwrap();
    }

    #[tokio::test]
    async fn removes_only_expired_messages() {
        let f = fixture();
        let short = topic(&f, "short", 1).await;
        let long = topic(&f, "long", 48).await;
        for _ in 0..3 {
            publish(&f, &short).await;
            publish(&f, &long).await;
        }

        let report = f.reaper.run_once(now_ms() + 2 * HOUR_MS).await.unwrap();
        assert_eq!(report.topics_scanned, 2);
        assert_eq!(report.messages_reaped, 3);
        assert_eq!(report.failures, 0);
        assert_eq!(f.store.count_prefix(&keys::messages(&short)).await, 0);
        assert_eq!(f.store.count_prefix(&keys::messages(&long)).await, 3);
        assert_eq!(f.blobs.len().await, 3);

        // Lifetime count is untouched by retention.
        assert_eq!(f.registry.get(&short).await.unwrap().message_count, 3);
    }

    #[tokio::test]
    async fn nothing_expired_is_a_no_op() {
        let f = fixture();
        let t = topic(&f, "orders", 24).await;
        publish(&f, &t).await;
        let report = f.reaper.run_once(now_ms()).await.unwrap();
        assert_eq!(report, ReapReport { topics_scanned: 1, ..Default::default() });
    }

    #[tokio::test]
    async fn retention_change_applies_to_new_messages_only() {
        let f = fixture();
        let t = topic(&f, "orders", 48).await;
        publish(&f, &t).await;
        let update = UpdateTopicRequest { retention_period_hours: Some(1), ..Default::default() };
        f.registry.update(&t, update).await.unwrap();
        publish(&f, &t).await;

        f.reaper.run_once(now_ms() + 2 * HOUR_MS).await.unwrap();
        let left = f.log.page(&t, 0, 10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].sequence_number, 1);
    }

    #[tokio::test]
    async fn failed_delete_is_counted_and_retried_next_pass() {
        let f = fixture();
        let t = topic(&f, "orders", 1).await;
        publish(&f, &t).await;
        publish(&f, &t).await;
        f.blobs
            .faults()
            .inject(StoreOp::BlobDelete, "", StoreError::Unavailable("down".into()));

        let later = now_ms() + 2 * HOUR_MS;
        let first = f.reaper.run_once(later).await.unwrap();
        assert_eq!(first.messages_reaped, 1);
        assert_eq!(first.failures, 1);

        let second = f.reaper.run_once(later).await.unwrap();
        assert_eq!(second.messages_reaped, 1);
        assert!(f.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn sweeps_leftovers_of_deleted_topics() {
        let f = fixture();
        let t = topic(&f, "orders", 24).await;
        publish(&f, &t).await;
        f.groups
            .create(&t, CreateConsumerGroupRequest { name: "billing".into(), description: None })
            .await
            .unwrap();
        // Topic row removed without the cascade.
        f.registry.delete(&t).await.unwrap();

        let report = f.reaper.run_once(now_ms()).await.unwrap();
        assert_eq!(report.orphaned_topics_purged, 1);
        assert_eq!(report.topics_scanned, 0);
        assert!(f.blobs.is_empty().await);
        assert!(f.store.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_reaper_runs_and_stops_on_cancel() {
        let f = fixture();
        f.store.atomic_increment("seq/ghost", "value", 1).await.unwrap();

        let token = CancellationToken::new();
        let handle = f.reaper.clone().spawn(token.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.store.count_prefix(keys::SEQUENCE_PREFIX).await, 0);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
