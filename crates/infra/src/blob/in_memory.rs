use std::collections::HashMap;
use std::sync::RwLock;

use chambers_core::BlobRef;

use super::r#trait::{BlobStore, BlobStoreError};

/// In-memory blob store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<BlobRef, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, blob: BlobRef) -> bool {
        self.blobs
            .read()
            .map(|b| b.contains_key(&blob))
            .unwrap_or(false)
    }
}

fn poisoned() -> BlobStoreError {
    BlobStoreError::Storage("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn store(&self, bytes: Vec<u8>) -> Result<BlobRef, BlobStoreError> {
        let blob = BlobRef::new();
        self.blobs.write().map_err(|_| poisoned())?.insert(blob, bytes);
        Ok(blob)
    }

    async fn get(&self, blob: BlobRef) -> Result<Option<Vec<u8>>, BlobStoreError> {
        Ok(self.blobs.read().map_err(|_| poisoned())?.get(&blob).cloned())
    }

    async fn delete(&self, blob: BlobRef) -> Result<bool, BlobStoreError> {
        Ok(self
            .blobs
            .write()
            .map_err(|_| poisoned())?
            .remove(&blob)
            .is_some())
    }

    async fn list(&self) -> Result<Vec<BlobRef>, BlobStoreError> {
        Ok(self.blobs.read().map_err(|_| poisoned())?.keys().copied().collect())
    }
}
