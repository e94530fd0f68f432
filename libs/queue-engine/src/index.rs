//! Name-uniqueness index rows.
//!
//! A scan for an existing name followed by a write is not atomic: two
//! concurrent creates can both pass the scan. A name row written with
//! `NotExists` closes that window: only one owner can claim a name.

use serde_json::Value;

use queue_api::{Condition, Item, KvStore, QueueError, StoreError, now_ms};

use crate::error::StoreResultExt;
use crate::keys::field;

/// A claim whose owner record is still missing after this long is
/// considered abandoned (crash between claim and record write).
const ABANDONED_CLAIM_MS: i64 = 60_000;

struct Claim {
    owner: String,
    claimed_at: i64,
}

fn claim_item(owner_id: &str, claimed_at: i64) -> Item {
    let mut item = Item::new();
    item.insert(field::OWNER.to_string(), Value::from(owner_id));
    item.insert(field::CLAIMED_AT.to_string(), Value::from(claimed_at));
    item
}

async fn read_claim(store: &dyn KvStore, index_key: &str) -> Result<Option<Claim>, QueueError> {
    let Some(item) = store.get(index_key).await? else {
        return Ok(None);
    };
    let owner = item
        .get(field::OWNER)
        .and_then(Value::as_str)
        .ok_or_else(|| QueueError::internal(format!("index '{index_key}' has no owner")))?;
    Ok(Some(Claim {
        owner: owner.to_string(),
        claimed_at: item.get(field::CLAIMED_AT).and_then(Value::as_i64).unwrap_or(0),
    }))
}

/// Id currently holding the name row at `index_key`.
pub(crate) async fn owner(store: &dyn KvStore, index_key: &str) -> Result<Option<String>, QueueError> {
    Ok(read_claim(store, index_key).await?.map(|c| c.owner))
}

/// Whether the owner record still exists and still carries `name`.
async fn owner_holds_name(store: &dyn KvStore, record_key: &str, name: &str) -> Result<bool, QueueError> {
    Ok(store
        .get(record_key)
        .await?
        .is_some_and(|record| record.get(field::NAME).and_then(Value::as_str) == Some(name)))
}

/// Claim `index_key` (the row for `name`) for `owner_id`.
///
/// A row older than the abandonment window is taken over when its owner
/// record (`owner_record_key`) is missing or has since been renamed.
pub(crate) async fn claim(
    store: &dyn KvStore,
    index_key: &str,
    name: &str,
    owner_id: &str,
    owner_record_key: impl Fn(&str) -> String,
    conflict: impl Fn() -> QueueError,
) -> Result<(), QueueError> {
    let now = now_ms();
    match store.put(index_key, claim_item(owner_id, now), Condition::NotExists).await {
        Ok(()) => return Ok(()),
        Err(StoreError::ConditionFailed) => {}
        Err(e) => return Err(e.into()),
    }

    let Some(current) = read_claim(store, index_key).await? else {
        // Released between our put and get; one more create-if-absent attempt.
        return store
            .put(index_key, claim_item(owner_id, now), Condition::NotExists)
            .await
            .on_conflict(&conflict);
    };
    if current.owner == owner_id {
        return Ok(());
    }
    if now - current.claimed_at < ABANDONED_CLAIM_MS
        || owner_holds_name(store, &owner_record_key(&current.owner), name).await?
    {
        return Err(conflict());
    }

    tracing::warn!(index = %index_key, stale_owner = %current.owner, "taking over abandoned name index");
    store
        .put(
            index_key,
            claim_item(owner_id, now),
            Condition::field_equals(field::OWNER, current.owner.as_str()),
        )
        .await
        .on_conflict(&conflict)
}

/// Release `index_key` if `owner_id` still holds it. Best-effort.
pub(crate) async fn release(store: &dyn KvStore, index_key: &str, owner_id: &str) {
    match store
        .delete(index_key, Condition::field_equals(field::OWNER, owner_id))
        .await
    {
        Ok(_) | Err(StoreError::ConditionFailed) => {}
        Err(e) => {
            tracing::warn!(index = %index_key, error = %e, "failed to release name index");
        }
    }
}
