mod blob;
mod faults;

use std::collections::BTreeMap;
use std::ops::Bound;

use serde_json::Value;
use tokio::sync::RwLock;

use queue_api::{Condition, Item, KvStore, ScanRequest, StoreError, StoreFuture, Update};

pub use blob::MemoryBlobStore;
pub use faults::{FaultPlan, StoreOp};

// ═══════════════════════════════════════════════════════════════
//  MemoryKvStore
// ═══════════════════════════════════════════════════════════════

/// In-memory ordered key-value store. For a single process and for
/// tests; every operation is atomic under one write lock.
#[derive(Default)]
pub struct MemoryKvStore {
    items: RwLock<BTreeMap<String, Item>>,
    faults: FaultPlan,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failure injection for tests.
    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    /// Number of keys under `prefix`.
    pub async fn count_prefix(&self, prefix: &str) -> usize {
        self.items
            .read()
            .await
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .count()
    }
}

fn check(condition: &Condition, current: Option<&Item>) -> Result<(), StoreError> {
    let holds = match condition {
        Condition::Always => true,
        Condition::Exists => current.is_some(),
        Condition::NotExists => current.is_none(),
        Condition::FieldEquals { field, value } => {
            current.and_then(|item| item.get(field)) == Some(value)
        }
    };
    if holds { Ok(()) } else { Err(StoreError::ConditionFailed) }
}

fn add(item: &mut Item, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
    let current = match item.get(field) {
        None | Some(Value::Null) => 0,
        Some(v) => v.as_i64().ok_or_else(|| StoreError::Corrupt {
            key: key.to_string(),
            detail: format!("field '{field}' is not an integer"),
        })?,
    };
    let next = current.checked_add(delta).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        detail: format!("field '{field}' overflow"),
    })?;
    item.insert(field.to_string(), Value::from(next));
    Ok(next)
}

impl KvStore for MemoryKvStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Item>> {
        Box::pin(async move {
            self.faults.take(StoreOp::Get, key)?;
            Ok(self.items.read().await.get(key).cloned())
        })
    }

    fn put<'a>(&'a self, key: &'a str, item: Item, condition: Condition) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.faults.take(StoreOp::Put, key)?;
            let mut items = self.items.write().await;
            check(&condition, items.get(key))?;
            items.insert(key.to_string(), item);
            Ok(())
        })
    }

    fn update<'a>(
        &'a self,
        key: &'a str,
        update: Update,
        condition: Condition,
    ) -> StoreFuture<'a, Item> {
        Box::pin(async move {
            self.faults.take(StoreOp::Update, key)?;
            let mut items = self.items.write().await;
            check(&condition, items.get(key))?;

            let mut item = items.get(key).cloned().unwrap_or_default();
            for (field, value) in update.set {
                item.insert(field, value);
            }
            for field in &update.remove {
                item.remove(field);
            }
            for (field, delta) in &update.increment {
                add(&mut item, key, field, *delta)?;
            }
            items.insert(key.to_string(), item.clone());
            Ok(item)
        })
    }

    fn delete<'a>(&'a self, key: &'a str, condition: Condition) -> StoreFuture<'a, Option<Item>> {
        Box::pin(async move {
            self.faults.take(StoreOp::Delete, key)?;
            let mut items = self.items.write().await;
            check(&condition, items.get(key))?;
            Ok(items.remove(key))
        })
    }

    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Vec<(String, Item)>> {
        Box::pin(async move {
            self.faults.take(StoreOp::Scan, &request.prefix)?;
            let items = self.items.read().await;
            let start = match &request.start_after {
                Some(after) if after.as_str() >= request.prefix.as_str() => {
                    Bound::Excluded(after.as_str())
                }
                _ => Bound::Included(request.prefix.as_str()),
            };
            let limit = request.limit.unwrap_or(usize::MAX);
            Ok(items
                .range::<str, _>((start, Bound::Unbounded))
                .take_while(|(k, _)| k.starts_with(&request.prefix))
                .take(limit)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        })
    }

    fn atomic_increment<'a>(
        &'a self,
        key: &'a str,
        field: &'a str,
        delta: i64,
    ) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            self.faults.take(StoreOp::Increment, key)?;
            let mut items = self.items.write().await;
            let item = items.entry(key.to_string()).or_default();
            add(item, key, field, delta)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn conditional_put() {
        let store = MemoryKvStore::new();
        store.put("a", item(json!({"v": 1})), Condition::NotExists).await.unwrap();
        let second = store.put("a", item(json!({"v": 2})), Condition::NotExists).await;
        assert_eq!(second, Err(StoreError::ConditionFailed));

        let missing = store.put("b", item(json!({"v": 1})), Condition::Exists).await;
        assert_eq!(missing, Err(StoreError::ConditionFailed));
        assert_eq!(store.get("a").await.unwrap(), Some(item(json!({"v": 1}))));
    }

    #[tokio::test]
    async fn update_applies_set_remove_increment() {
        let store = MemoryKvStore::new();
        store
            .put("t", item(json!({"count": 2, "desc": "x"})), Condition::Always)
            .await
            .unwrap();

        let updated = store
            .update(
                "t",
                Update::new().set("ts", 10).remove("desc").increment("count", 1),
                Condition::Exists,
            )
            .await
            .unwrap();
        assert_eq!(updated, item(json!({"count": 3, "ts": 10})));

        let gone = store.update("nope", Update::new().increment("count", 1), Condition::Exists).await;
        assert_eq!(gone, Err(StoreError::ConditionFailed));
    }

    #[tokio::test]
    async fn compare_and_set() {
        let store = MemoryKvStore::new();
        store.put("o", item(json!({"seq": 5})), Condition::Always).await.unwrap();

        let stale = store
            .update("o", Update::new().set("seq", 7), Condition::field_equals("seq", 4))
            .await;
        assert_eq!(stale, Err(StoreError::ConditionFailed));

        store
            .update("o", Update::new().set("seq", 7), Condition::field_equals("seq", 5))
            .await
            .unwrap();
        assert_eq!(store.get("o").await.unwrap(), Some(item(json!({"seq": 7}))));
    }

    #[tokio::test]
    async fn delete_conditions() {
        let store = MemoryKvStore::new();
        assert_eq!(store.delete("x", Condition::Always).await, Ok(None));
        assert_eq!(store.delete("x", Condition::Exists).await, Err(StoreError::ConditionFailed));

        store.put("x", item(json!({"v": 1})), Condition::Always).await.unwrap();
        let removed = store.delete("x", Condition::Exists).await.unwrap();
        assert_eq!(removed, Some(item(json!({"v": 1}))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn scan_is_ordered_and_paginated() {
        let store = MemoryKvStore::new();
        for k in ["m/b", "m/a", "m/c", "n/a", "l/z"] {
            store.put(k, Item::new(), Condition::Always).await.unwrap();
        }

        let all = store.scan(ScanRequest::prefix("m/")).await.unwrap();
        let keys: Vec<_> = all.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["m/a", "m/b", "m/c"]);

        let page = store.scan(ScanRequest::prefix("m/").after("m/a").limit(1)).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].0, "m/b");

        assert_eq!(store.count_prefix("m/").await, 3);
    }

    #[tokio::test]
    async fn injected_fault_fires_once() {
        let store = MemoryKvStore::new();
        store
            .faults()
            .inject(StoreOp::Put, "msg/", StoreError::Unavailable("down".into()));

        let first = store.put("msg/1", Item::new(), Condition::Always).await;
        assert_eq!(first, Err(StoreError::Unavailable("down".into())));
        store.put("msg/1", Item::new(), Condition::Always).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_distinct() {
        let store = Arc::new(MemoryKvStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.atomic_increment("seq/t", "value", 1).await.unwrap()
            }));
        }
        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=32).collect::<Vec<i64>>());
    }
}
