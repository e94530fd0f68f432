use std::sync::Arc;

use queue_api::{
    Condition, ConsumerGroup, CreateConsumerGroupRequest, KvStore, Offset, QueueError, StoreError,
    Update, now_ms,
};

use crate::config::QueueLimits;
use crate::error::StoreResultExt;
use crate::index;
use crate::keys::{self, field};
use crate::offsets::OffsetCursorStore;
use crate::record::{delete_prefix, from_item, load_all, to_item};
use crate::registry::TopicRegistry;
use crate::validate;

const LIST_PAGE_SIZE: usize = 100;

/// Consumer groups of a topic and their cursors.
///
/// Group names are unique per topic via a `group-name/{topicId}/{name}`
/// index row, the same scheme topics use.
pub struct ConsumerGroupManager {
    store: Arc<dyn KvStore>,
    registry: Arc<TopicRegistry>,
    offsets: Arc<OffsetCursorStore>,
    limits: Arc<QueueLimits>,
}

impl ConsumerGroupManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        registry: Arc<TopicRegistry>,
        offsets: Arc<OffsetCursorStore>,
        limits: Arc<QueueLimits>,
    ) -> Self {
        Self { store, registry, offsets, limits }
    }

    pub async fn create(
        &self,
        topic_id: &str,
        request: CreateConsumerGroupRequest,
    ) -> Result<ConsumerGroup, QueueError> {
        validate::name("consumer group", &request.name, &self.limits)?;
        validate::description(request.description.as_deref(), &self.limits)?;
        self.registry.get(topic_id).await?;

        let group = ConsumerGroup {
            group_id: uuid::Uuid::new_v4().to_string(),
            topic_id: topic_id.to_string(),
            name: request.name,
            description: request.description.filter(|d| !d.is_empty()),
            created_at: now_ms(),
            last_consumed_timestamp: None,
        };

        let name_key = keys::group_name(topic_id, &group.name);
        index::claim(
            self.store.as_ref(),
            &name_key,
            &group.name,
            &group.group_id,
            |owner| keys::group(topic_id, owner),
            || QueueError::group_already_exists(topic_id, &group.name),
        )
        .await?;

        let written = match to_item(&group) {
            Ok(item) => self
                .store
                .put(&keys::group(topic_id, &group.group_id), item, Condition::NotExists)
                .await
                .map_err(QueueError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            index::release(self.store.as_ref(), &name_key, &group.group_id).await;
            return Err(e);
        }

        tracing::info!(topic_id, group_id = %group.group_id, name = %group.name, "consumer group created");
        Ok(group)
    }

    pub async fn get(&self, topic_id: &str, group_id: &str) -> Result<ConsumerGroup, QueueError> {
        self.find(topic_id, group_id)
            .await?
            .ok_or_else(|| QueueError::group_not_found(topic_id, group_id))
    }

    pub async fn find(
        &self,
        topic_id: &str,
        group_id: &str,
    ) -> Result<Option<ConsumerGroup>, QueueError> {
        let key = keys::group(topic_id, group_id);
        match self.store.get(&key).await? {
            Some(item) => Ok(Some(from_item(&key, item)?)),
            None => Ok(None),
        }
    }

    /// Groups of an existing topic, oldest first.
    pub async fn list(&self, topic_id: &str) -> Result<Vec<ConsumerGroup>, QueueError> {
        self.registry.get(topic_id).await?;
        let mut groups: Vec<ConsumerGroup> =
            load_all(self.store.as_ref(), &keys::groups(topic_id), LIST_PAGE_SIZE).await?;
        groups.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(groups)
    }

    /// Remove a group together with its name row and cursor.
    pub async fn delete(&self, topic_id: &str, group_id: &str) -> Result<ConsumerGroup, QueueError> {
        let key = keys::group(topic_id, group_id);
        let item = self
            .store
            .delete(&key, Condition::Exists)
            .await
            .on_conflict(|| QueueError::group_not_found(topic_id, group_id))?
            .ok_or_else(|| QueueError::group_not_found(topic_id, group_id))?;
        let group: ConsumerGroup = from_item(&key, item)?;

        index::release(self.store.as_ref(), &keys::group_name(topic_id, &group.name), group_id).await;
        if let Err(e) = self.offsets.delete(topic_id, group_id).await {
            tracing::warn!(topic_id, group_id, error = %e, "failed to drop offset of deleted group");
        }

        tracing::info!(topic_id, group_id, name = %group.name, "consumer group deleted");
        Ok(group)
    }

    /// Record the time of the latest successful delivery.
    pub async fn touch(&self, topic_id: &str, group_id: &str, at: i64) -> Result<(), QueueError> {
        let update = Update::new().set(field::LAST_CONSUMED_TIMESTAMP, at);
        match self
            .store
            .update(&keys::group(topic_id, group_id), update, Condition::Exists)
            .await
        {
            Ok(_) => Ok(()),
            Err(StoreError::ConditionFailed) => Err(QueueError::group_not_found(topic_id, group_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_offset(&self, topic_id: &str, group_id: &str) -> Result<Offset, QueueError> {
        self.get(topic_id, group_id).await?;
        self.offsets.get(topic_id, group_id).await
    }

    /// Rewind the group to the beginning of the topic.
    pub async fn reset_offset(&self, topic_id: &str, group_id: &str) -> Result<Offset, QueueError> {
        self.registry.get(topic_id).await?;
        self.get(topic_id, group_id).await?;
        let offset = self.offsets.reset(topic_id, group_id).await?;
        tracing::info!(topic_id, group_id, "offset reset");
        Ok(offset)
    }

    /// Remove every group, name row and cursor of a topic.
    /// Returns the number of group records removed.
    pub async fn purge(&self, topic_id: &str, page_size: usize) -> Result<usize, QueueError> {
        let store = self.store.as_ref();
        let removed = delete_prefix(store, &keys::groups(topic_id), page_size).await?;
        delete_prefix(store, &keys::group_names(topic_id), page_size).await?;
        delete_prefix(store, &keys::offsets(topic_id), page_size).await?;
        Ok(removed)
    }
}
