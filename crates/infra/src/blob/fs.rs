//! Filesystem blob store: one file per blob under a root directory.
//!
//! Writes go to a `.tmp` sibling first and are renamed into place, so a blob
//! file either holds the complete payload or does not exist.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use chambers_core::BlobRef;

use super::r#trait::{BlobStore, BlobStoreError};

const BLOB_EXTENSION: &str = "blob";
const TMP_EXTENSION: &str = "tmp";

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, blob: BlobRef) -> PathBuf {
        self.root.join(format!("{blob}.{BLOB_EXTENSION}"))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn store(&self, bytes: Vec<u8>) -> Result<BlobRef, BlobStoreError> {
        tokio::fs::create_dir_all(&self.root).await?;

        let blob = BlobRef::new();
        let path = self.path_for(blob);
        let tmp = path.with_extension(TMP_EXTENSION);

        write_then_rename(&tmp, &path, &bytes).await?;

        debug!(blob = %blob, size_bytes = bytes.len(), "blob written");
        Ok(blob)
    }

    async fn get(&self, blob: BlobRef) -> Result<Option<Vec<u8>>, BlobStoreError> {
        match tokio::fs::read(self.path_for(blob)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, blob: BlobRef) -> Result<bool, BlobStoreError> {
        match tokio::fs::remove_file(self.path_for(blob)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<BlobRef>, BlobStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXTENSION) {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            if let Some(uuid) = parsed {
                blobs.push(BlobRef::from_uuid(uuid));
            }
        }
        Ok(blobs)
    }
}

/// Write `bytes` to `tmp` and move it to `path`. On any failure `tmp` is removed.
async fn write_then_rename(tmp: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let result = match tokio::fs::write(tmp, bytes).await {
        Ok(()) => tokio::fs::rename(tmp, path).await,
        Err(e) => Err(e),
    };
    if result.is_err() {
        let _ = tokio::fs::remove_file(tmp).await;
    }
    result
}
