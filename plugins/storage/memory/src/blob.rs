use std::collections::HashMap;

use tokio::sync::RwLock;

use queue_api::{BlobStore, StoreFuture};

use crate::faults::{FaultPlan, StoreOp};

/// In-memory payload store. Keys are random UUIDs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    faults: FaultPlan,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultPlan {
        &self.faults
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.read().await.contains_key(key)
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, bytes: Vec<u8>) -> StoreFuture<'_, String> {
        Box::pin(async move {
            let key = format!("blob/{}", uuid::Uuid::new_v4());
            self.faults.take(StoreOp::BlobPut, &key)?;
            self.blobs.write().await.insert(key.clone(), bytes);
            Ok(key)
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            self.faults.take(StoreOp::BlobGet, key)?;
            Ok(self.blobs.read().await.get(key).cloned())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.faults.take(StoreOp::BlobDelete, key)?;
            self.blobs.write().await.remove(key);
            Ok(())
        })
    }
}
