//! Record <-> store item conversion and paged scans.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use queue_api::{Condition, Item, KvStore, QueueError, ScanRequest};

pub(crate) fn to_item<T: Serialize>(record: &T) -> Result<Item, QueueError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(QueueError::internal(format!("record encoded as non-object: {other}"))),
        Err(e) => Err(QueueError::internal(format!("encode record: {e}"))),
    }
}

pub(crate) fn from_item<T: DeserializeOwned>(key: &str, item: Item) -> Result<T, QueueError> {
    serde_json::from_value(Value::Object(item))
        .map_err(|e| QueueError::internal(format!("decode '{key}': {e}")))
}

/// Every item under `prefix`, fetched `page_size` at a time.
pub(crate) async fn scan_all(
    store: &dyn KvStore,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<(String, Item)>, QueueError> {
    let page_size = page_size.max(1);
    let mut out = Vec::new();
    let mut after: Option<String> = None;
    loop {
        let mut request = ScanRequest::prefix(prefix).limit(page_size);
        request.start_after = after.take();
        let page = store.scan(request).await?;
        let exhausted = page.len() < page_size;
        after = page.last().map(|(k, _)| k.clone());
        out.extend(page);
        if exhausted || after.is_none() {
            return Ok(out);
        }
    }
}

/// Decode every item under `prefix`.
pub(crate) async fn load_all<T: DeserializeOwned>(
    store: &dyn KvStore,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<T>, QueueError> {
    scan_all(store, prefix, page_size)
        .await?
        .into_iter()
        .map(|(key, item)| from_item(&key, item))
        .collect()
}

/// Delete-if-present every key under `prefix`. Returns the number of keys removed.
pub(crate) async fn delete_prefix(
    store: &dyn KvStore,
    prefix: &str,
    page_size: usize,
) -> Result<usize, QueueError> {
    let mut removed = 0;
    for (key, _) in scan_all(store, prefix, page_size).await? {
        if store.delete(&key, Condition::Always).await?.is_some() {
            removed += 1;
        }
    }
    Ok(removed)
}
