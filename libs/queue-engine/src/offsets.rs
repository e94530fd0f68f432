use std::sync::Arc;

use queue_api::{Condition, KvStore, Offset, QueueError, StoreError, Update};

use crate::keys::{self, field};
use crate::record::{from_item, to_item};

/// Attempts before a contended cursor advance gives up.
const MAX_CAS_RETRIES: usize = 32;

/// Per (topic, group) cursor: last delivered sequence number and time.
pub struct OffsetCursorStore {
    store: Arc<dyn KvStore>,
}

impl OffsetCursorStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// Current cursor; a group without a row has consumed nothing.
    pub async fn get(&self, topic_id: &str, group_id: &str) -> Result<Offset, QueueError> {
        let key = keys::offset(topic_id, group_id);
        match self.store.get(&key).await? {
            Some(item) => from_item(&key, item),
            None => Ok(Offset::initial(topic_id, group_id)),
        }
    }

    /// Move the cursor from `read_from` forward to `sequence_number`.
    ///
    /// `read_from` is the cursor the delivered batch was selected against.
    /// The write only lands while the stored cursor still equals it; if a
    /// reset or another consume of the same group moved it in between, the
    /// stored cursor is returned unchanged. The row is created on first use.
    pub async fn advance(
        &self,
        topic_id: &str,
        group_id: &str,
        read_from: u64,
        sequence_number: u64,
        consumed_at: i64,
    ) -> Result<Offset, QueueError> {
        let key = keys::offset(topic_id, group_id);

        for attempt in 0..MAX_CAS_RETRIES {
            let current: Offset = match self.store.get(&key).await? {
                Some(item) => from_item(&key, item)?,
                None if read_from == 0 => {
                    let offset = Offset {
                        group_id: group_id.to_string(),
                        topic_id: topic_id.to_string(),
                        last_sequence_number: sequence_number,
                        last_consumed_timestamp: Some(consumed_at),
                    };
                    match self.store.put(&key, to_item(&offset)?, Condition::NotExists).await {
                        Ok(()) => return Ok(offset),
                        Err(StoreError::ConditionFailed) => {
                            tracing::debug!(topic_id, group_id, attempt, "offset row created concurrently");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                // Row dropped with its group; nothing to advance.
                None => return Ok(Offset::initial(topic_id, group_id)),
            };

            if current.last_sequence_number != read_from
                || current.last_sequence_number >= sequence_number
            {
                tracing::debug!(
                    topic_id,
                    group_id,
                    read_from,
                    stored = current.last_sequence_number,
                    "cursor moved since batch was read, leaving it"
                );
                return Ok(current);
            }

            let update = Update::new()
                .set(field::LAST_SEQUENCE_NUMBER, sequence_number)
                .set(field::LAST_CONSUMED_TIMESTAMP, consumed_at);
            let guard = Condition::field_equals(field::LAST_SEQUENCE_NUMBER, read_from);
            match self.store.update(&key, update, guard).await {
                Ok(item) => return from_item(&key, item),
                Err(StoreError::ConditionFailed) => {
                    tracing::debug!(topic_id, group_id, attempt, "offset advance raced, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(QueueError::unavailable(format!(
            "offset for group '{group_id}' is contended, retry later"
        )))
    }

    /// Rewind to "nothing consumed". Idempotent.
    pub async fn reset(&self, topic_id: &str, group_id: &str) -> Result<Offset, QueueError> {
        let key = keys::offset(topic_id, group_id);
        let offset = Offset::initial(topic_id, group_id);
        self.store.put(&key, to_item(&offset)?, Condition::Always).await?;
        Ok(offset)
    }

    /// Drop the cursor row. Idempotent.
    pub async fn delete(&self, topic_id: &str, group_id: &str) -> Result<(), QueueError> {
        self.store
            .delete(&keys::offset(topic_id, group_id), Condition::Always)
            .await?;
        Ok(())
    }
}
