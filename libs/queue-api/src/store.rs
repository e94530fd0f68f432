use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

// ════════════════════════════════════════════════════════════════
//  Store Errors
// ════════════════════════════════════════════════════════════════

/// Failure reported by a store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The write condition did not hold (item exists / missing / field changed).
    #[error("condition check failed")]
    ConditionFailed,

    /// Request rejected by throttling (transient).
    #[error("throttled: {0}")]
    Throttled(String),

    /// Store unreachable (transient).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Stored item does not have the expected shape.
    #[error("corrupt item '{key}': {detail}")]
    Corrupt { key: String, detail: String },

    #[error("internal: {0}")]
    Internal(String),
}

/// Boxed future returned by every collaborator method.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

// ════════════════════════════════════════════════════════════════
//  Key-Value Store Contract
// ════════════════════════════════════════════════════════════════

/// A stored document: top-level JSON object.
pub type Item = serde_json::Map<String, Value>;

/// Precondition attached to a write. Failing it yields `StoreError::ConditionFailed`
/// and leaves the item untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Condition {
    #[default]
    Always,
    /// Item must already exist.
    Exists,
    /// Item must not exist (create-if-absent).
    NotExists,
    /// Item must exist and `field` must equal `value` (compare-and-set).
    FieldEquals { field: String, value: Value },
}

impl Condition {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::FieldEquals { field: field.into(), value: value.into() }
    }
}

/// Partial modification of an item, applied atomically.
///
/// Order of application: `set`, then `remove`, then `increment`.
/// Missing numeric fields are incremented from zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Item,
    pub remove: Vec<String>,
    pub increment: Vec<(String, i64)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn remove(mut self, field: impl Into<String>) -> Self {
        self.remove.push(field.into());
        self
    }

    pub fn increment(mut self, field: impl Into<String>, delta: i64) -> Self {
        self.increment.push((field.into(), delta));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty() && self.increment.is_empty()
    }
}

/// Range scan over the ordered key space.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanRequest {
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Resume strictly after this key (pagination cursor).
    pub start_after: Option<String>,
    /// Maximum number of items. None = no limit.
    pub limit: Option<usize>,
}

impl ScanRequest {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), start_after: None, limit: None }
    }

    pub fn after(mut self, key: impl Into<String>) -> Self {
        self.start_after = Some(key.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Transactional key-value store shared by all engine instances.
///
/// The engine keeps no authoritative state in-process; every invariant
/// (unique names, contiguous sequences, monotonic cursors) rests on the
/// atomicity of the single-item operations below.
pub trait KvStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Item>>;

    /// Write the whole item if `condition` holds.
    fn put<'a>(&'a self, key: &'a str, item: Item, condition: Condition) -> StoreFuture<'a, ()>;

    /// Apply a partial update if `condition` holds; returns the new item.
    /// With `Condition::Always` an absent item is created.
    fn update<'a>(&'a self, key: &'a str, update: Update, condition: Condition)
        -> StoreFuture<'a, Item>;

    /// Delete if `condition` holds; returns the removed item, if any.
    /// With `Condition::Always` deleting an absent key is a no-op.
    fn delete<'a>(&'a self, key: &'a str, condition: Condition) -> StoreFuture<'a, Option<Item>>;

    /// Items under `prefix` in ascending key order.
    fn scan(&self, request: ScanRequest) -> StoreFuture<'_, Vec<(String, Item)>>;

    /// Add `delta` to a numeric field and return the new value.
    /// Absent items and fields start at zero.
    fn atomic_increment<'a>(&'a self, key: &'a str, field: &'a str, delta: i64)
        -> StoreFuture<'a, i64>;
}

// ════════════════════════════════════════════════════════════════
//  Blob Store Contract
// ════════════════════════════════════════════════════════════════

/// Opaque storage for payload bytes. Message metadata references blobs
/// by key; the store never interprets them.
pub trait BlobStore: Send + Sync {
    /// Store bytes under a fresh key.
    fn put(&self, bytes: Vec<u8>) -> StoreFuture<'_, String>;

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

    /// Release a blob. Deleting an absent key succeeds.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}
