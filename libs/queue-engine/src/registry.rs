use std::sync::Arc;

use queue_api::{
    Condition, CreateTopicRequest, KvStore, QueueError, StoreError, Topic, Update,
    UpdateTopicRequest, now_ms,
};

use crate::config::QueueLimits;
use crate::error::StoreResultExt;
use crate::index;
use crate::keys::{self, field};
use crate::record::{from_item, load_all, to_item};
use crate::validate;

const LIST_PAGE_SIZE: usize = 100;

/// Topic records: creation, lookup, rename, deletion, publish counters.
///
/// Names are unique across all topics. Uniqueness is enforced by a
/// `topic-name/{name}` index row claimed with a create-if-absent write.
pub struct TopicRegistry {
    store: Arc<dyn KvStore>,
    limits: Arc<QueueLimits>,
}

impl TopicRegistry {
    pub fn new(store: Arc<dyn KvStore>, limits: Arc<QueueLimits>) -> Self {
        Self { store, limits }
    }

    pub async fn create(&self, request: CreateTopicRequest) -> Result<Topic, QueueError> {
        let limits = &self.limits;
        validate::name("topic", &request.name, limits)?;
        validate::description(request.description.as_deref(), limits)?;
        let retention = request.retention_period_hours.unwrap_or(limits.default_retention_hours);
        validate::retention(retention, limits)?;

        if self.get_by_name(&request.name).await?.is_some() {
            return Err(QueueError::topic_already_exists(&request.name));
        }
        let count = self.list().await?.len();
        if count >= limits.max_topics {
            return Err(QueueError::validation(format!(
                "topic quota reached ({count} of {})",
                limits.max_topics
            )));
        }

        let topic = Topic {
            topic_id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            description: request.description.filter(|d| !d.is_empty()),
            created_at: now_ms(),
            retention_period_hours: retention,
            message_count: 0,
            last_message_timestamp: None,
        };

        let name_key = keys::topic_name(&topic.name);
        index::claim(
            self.store.as_ref(),
            &name_key,
            &topic.name,
            &topic.topic_id,
            keys::topic,
            || QueueError::topic_already_exists(&topic.name),
        )
        .await?;

        let write = self
            .store
            .put(&keys::topic(&topic.topic_id), to_item(&topic)?, Condition::NotExists)
            .await;
        if let Err(e) = write {
            index::release(self.store.as_ref(), &name_key, &topic.topic_id).await;
            return Err(match e {
                StoreError::ConditionFailed => QueueError::topic_already_exists(&topic.topic_id),
                other => other.into(),
            });
        }

        tracing::info!(
            topic_id = %topic.topic_id,
            name = %topic.name,
            retention_hours = topic.retention_period_hours,
            "topic created"
        );
        Ok(topic)
    }

    pub async fn get(&self, topic_id: &str) -> Result<Topic, QueueError> {
        self.find(topic_id)
            .await?
            .ok_or_else(|| QueueError::topic_not_found(topic_id))
    }

    pub async fn find(&self, topic_id: &str) -> Result<Option<Topic>, QueueError> {
        let key = keys::topic(topic_id);
        match self.store.get(&key).await? {
            Some(item) => Ok(Some(from_item(&key, item)?)),
            None => Ok(None),
        }
    }

    /// Topic currently registered under `name`, if any. Never fails with not-found.
    pub async fn get_by_name(&self, name: &str) -> Result<Option<Topic>, QueueError> {
        let Some(topic_id) = index::owner(self.store.as_ref(), &keys::topic_name(name)).await? else {
            return Ok(None);
        };
        // A leftover index row may point at a deleted topic.
        Ok(self.find(&topic_id).await?.filter(|t| t.name == name))
    }

    /// All topics, unordered.
    pub async fn list(&self) -> Result<Vec<Topic>, QueueError> {
        load_all(self.store.as_ref(), keys::TOPIC_PREFIX, LIST_PAGE_SIZE).await
    }

    /// Remove the topic record and free its name. Messages, groups and
    /// offsets become unreachable; purging them is the caller's concern.
    pub async fn delete(&self, topic_id: &str) -> Result<Topic, QueueError> {
        let key = keys::topic(topic_id);
        let removed = self
            .store
            .delete(&key, Condition::Exists)
            .await
            .on_conflict(|| QueueError::topic_not_found(topic_id))?
            .ok_or_else(|| QueueError::topic_not_found(topic_id))?;
        let topic: Topic = from_item(&key, removed)?;

        index::release(self.store.as_ref(), &keys::topic_name(&topic.name), topic_id).await;
        tracing::info!(topic_id, name = %topic.name, "topic deleted");
        Ok(topic)
    }

    /// Bump the lifetime publish counter. Fails if the topic vanished
    /// after the publish was validated.
    pub async fn increment_message_count(
        &self,
        topic_id: &str,
        timestamp: i64,
    ) -> Result<Topic, QueueError> {
        let key = keys::topic(topic_id);
        let update = Update::new()
            .set(field::LAST_MESSAGE_TIMESTAMP, timestamp)
            .increment(field::MESSAGE_COUNT, 1);
        let item = self
            .store
            .update(&key, update, Condition::Exists)
            .await
            .on_conflict(|| QueueError::topic_not_found(topic_id))?;
        from_item(&key, item)
    }

    /// Apply the provided fields; absent fields stay unchanged.
    pub async fn update(
        &self,
        topic_id: &str,
        request: UpdateTopicRequest,
    ) -> Result<Topic, QueueError> {
        let limits = &self.limits;
        if let Some(name) = &request.name {
            validate::name("topic", name, limits)?;
        }
        validate::description(request.description.as_deref(), limits)?;
        if let Some(hours) = request.retention_period_hours {
            validate::retention(hours, limits)?;
        }

        let current = self.get(topic_id).await?;
        if request.is_empty() {
            return Ok(current);
        }

        let mut update = Update::new();
        let mut renamed_from = None;
        if let Some(name) = request.name.filter(|n| *n != current.name) {
            index::claim(
                self.store.as_ref(),
                &keys::topic_name(&name),
                &name,
                topic_id,
                keys::topic,
                || QueueError::topic_already_exists(&name),
            )
            .await?;
            update = update.set(field::NAME, name.as_str());
            renamed_from = Some((current.name.clone(), name));
        }
        match request.description {
            Some(d) if d.is_empty() => update = update.remove(field::DESCRIPTION),
            Some(d) => update = update.set(field::DESCRIPTION, d),
            None => {}
        }
        if let Some(hours) = request.retention_period_hours {
            update = update.set(field::RETENTION_PERIOD_HOURS, hours);
        }

        let key = keys::topic(topic_id);
        let result = self
            .store
            .update(&key, update, Condition::Exists)
            .await
            .on_conflict(|| QueueError::topic_not_found(topic_id));

        match result {
            Ok(item) => {
                if let Some((old, _)) = &renamed_from {
                    index::release(self.store.as_ref(), &keys::topic_name(old), topic_id).await;
                }
                let topic: Topic = from_item(&key, item)?;
                tracing::info!(topic_id, name = %topic.name, "topic updated");
                Ok(topic)
            }
            Err(e) => {
                if let Some((_, new)) = &renamed_from {
                    index::release(self.store.as_ref(), &keys::topic_name(new), topic_id).await;
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use storage_memory::MemoryKvStore;

    use super::*;
    use queue_api::ErrorCode;

    fn registry() -> (Arc<MemoryKvStore>, TopicRegistry) {
        registry_with(QueueLimits::default())
    }

    fn registry_with(limits: QueueLimits) -> (Arc<MemoryKvStore>, TopicRegistry) {
        let store = Arc::new(MemoryKvStore::new());
        (store.clone(), TopicRegistry::new(store, Arc::new(limits)))
    }

    fn named(name: &str) -> CreateTopicRequest {
        CreateTopicRequest { name: name.to_string(), ..Default::default() }
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let (_, registry) = registry();
        let topic = registry.create(named("orders")).await.unwrap();
        assert_eq!(topic.retention_period_hours, 24);
        assert_eq!(topic.message_count, 0);
        assert_eq!(topic.last_message_timestamp, None);
        assert_eq!(registry.get(&topic.topic_id).await.unwrap(), topic);
    }

    #[tokio::test]
    async fn duplicate_name_is_rejected() {
        let (_, registry) = registry();
        registry.create(named("orders")).await.unwrap();
        let err = registry.create(named("orders")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicAlreadyExists);
        assert_eq!(registry.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_input_is_rejected() {
        let (_, registry) = registry();
        let err = registry.create(named("")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let request = CreateTopicRequest { retention_period_hours: Some(169), ..named("a") };
        let err = registry.create(request).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let request = CreateTopicRequest { description: Some("d".repeat(1025)), ..named("a") };
        assert!(registry.create(request).await.is_err());
    }

    #[tokio::test]
    async fn quota_is_enforced() {
        let limits = QueueLimits { max_topics: 2, ..QueueLimits::default() };
        let (_, registry) = registry_with(limits);
        registry.create(named("a")).await.unwrap();
        registry.create(named("b")).await.unwrap();
        let err = registry.create(named("c")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn get_by_name_returns_none_for_unknown() {
        let (_, registry) = registry();
        assert!(registry.get_by_name("nope").await.unwrap().is_none());
        let topic = registry.create(named("orders")).await.unwrap();
        assert_eq!(registry.get_by_name("orders").await.unwrap(), Some(topic));
    }

    #[tokio::test]
    async fn delete_frees_the_name() {
        let (_, registry) = registry();
        let topic = registry.create(named("orders")).await.unwrap();
        registry.delete(&topic.topic_id).await.unwrap();

        let err = registry.get(&topic.topic_id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicNotFound);
        let err = registry.delete(&topic.topic_id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicNotFound);

        registry.create(named("orders")).await.unwrap();
    }

    #[tokio::test]
    async fn delete_unknown_topic_fails() {
        let (_, registry) = registry();
        let err = registry.delete("never-created").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicNotFound);
    }

    #[tokio::test]
    async fn increment_tracks_count_and_timestamp() {
        let (_, registry) = registry();
        let topic = registry.create(named("orders")).await.unwrap();
        registry.increment_message_count(&topic.topic_id, 10).await.unwrap();
        let topic = registry.increment_message_count(&topic.topic_id, 20).await.unwrap();
        assert_eq!(topic.message_count, 2);
        assert_eq!(topic.last_message_timestamp, Some(20));

        let err = registry.increment_message_count("gone", 30).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicNotFound);
    }

    #[tokio::test]
    async fn update_renames_and_clears_description() {
        let (_, registry) = registry();
        let request = CreateTopicRequest { description: Some("old".into()), ..named("orders") };
        let topic = registry.create(request).await.unwrap();

        let update = UpdateTopicRequest {
            name: Some("orders-v2".into()),
            description: Some(String::new()),
            retention_period_hours: Some(48),
        };
        let updated = registry.update(&topic.topic_id, update).await.unwrap();
        assert_eq!(updated.name, "orders-v2");
        assert_eq!(updated.description, None);
        assert_eq!(updated.retention_period_hours, 48);

        assert!(registry.get_by_name("orders").await.unwrap().is_none());
        assert_eq!(registry.get_by_name("orders-v2").await.unwrap(), Some(updated));
        // Old name is free again.
        registry.create(named("orders")).await.unwrap();
    }

    #[tokio::test]
    async fn old_name_is_reclaimable_after_a_failed_release() {
        let (store, registry) = registry();
        let topic = registry.create(named("orders")).await.unwrap();

        let old_key = keys::topic_name("orders");
        store.faults().inject(
            storage_memory::StoreOp::Delete,
            old_key.as_str(),
            StoreError::Unavailable("timeout".into()),
        );
        let rename = UpdateTopicRequest { name: Some("orders-v2".into()), ..Default::default() };
        registry.update(&topic.topic_id, rename).await.unwrap();
        assert!(index::owner(store.as_ref(), &old_key).await.unwrap().is_some());
        assert!(registry.get_by_name("orders").await.unwrap().is_none());

        // Age the leftover row past the abandonment window.
        store
            .update(&old_key, Update::new().set(field::CLAIMED_AT, 0), Condition::Always)
            .await
            .unwrap();
        let fresh = registry.create(named("orders")).await.unwrap();
        assert_ne!(fresh.topic_id, topic.topic_id);
        assert_eq!(registry.get_by_name("orders").await.unwrap().map(|t| t.topic_id), Some(fresh.topic_id));
    }

    #[tokio::test]
    async fn update_rejects_taken_name_and_keeps_state() {
        let (_, registry) = registry();
        let a = registry.create(named("a")).await.unwrap();
        registry.create(named("b")).await.unwrap();

        let update = UpdateTopicRequest { name: Some("b".into()), ..Default::default() };
        let err = registry.update(&a.topic_id, update).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicAlreadyExists);
        assert_eq!(registry.get(&a.topic_id).await.unwrap().name, "a");
    }

    #[tokio::test]
    async fn empty_update_is_a_no_op() {
        let (_, registry) = registry();
        let topic = registry.create(named("orders")).await.unwrap();
        let same = registry
            .update(&topic.topic_id, UpdateTopicRequest::default())
            .await
            .unwrap();
        assert_eq!(same, topic);

        let err = registry
            .update("missing", UpdateTopicRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TopicNotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_with_one_name_admit_one() {
        let (_, registry) = registry();
        let registry = Arc::new(registry);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.create(named("orders")).await }));
        }
        let mut created = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert_eq!(e.code(), ErrorCode::TopicAlreadyExists),
            }
        }
        assert_eq!(created, 1);
    }
}
