use std::sync::Arc;

use thiserror::Error;

use chambers_core::BlobRef;

/// Blob store operation error.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Blob storage addressed by opaque handles the store assigns on write.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `bytes` and return the handle that now refers to them.
    async fn store(&self, bytes: Vec<u8>) -> Result<BlobRef, BlobStoreError>;

    /// Fetch a blob; `None` if the handle no longer resolves.
    async fn get(&self, blob: BlobRef) -> Result<Option<Vec<u8>>, BlobStoreError>;

    /// Delete a blob. Returns `false` if it was already gone.
    async fn delete(&self, blob: BlobRef) -> Result<bool, BlobStoreError>;

    /// Every live handle, in no particular order.
    async fn list(&self) -> Result<Vec<BlobRef>, BlobStoreError>;
}

#[async_trait::async_trait]
impl<S> BlobStore for Arc<S>
where
    S: BlobStore + ?Sized,
{
    async fn store(&self, bytes: Vec<u8>) -> Result<BlobRef, BlobStoreError> {
        (**self).store(bytes).await
    }

    async fn get(&self, blob: BlobRef) -> Result<Option<Vec<u8>>, BlobStoreError> {
        (**self).get(blob).await
    }

    async fn delete(&self, blob: BlobRef) -> Result<bool, BlobStoreError> {
        (**self).delete(blob).await
    }

    async fn list(&self) -> Result<Vec<BlobRef>, BlobStoreError> {
        (**self).list().await
    }
}
