//! Handle-addressed blob storage for snapshot payloads.

pub mod fs;
pub mod in_memory;
pub mod r#trait;

pub use fs::FsBlobStore;
pub use in_memory::InMemoryBlobStore;
pub use r#trait::{BlobStore, BlobStoreError};
