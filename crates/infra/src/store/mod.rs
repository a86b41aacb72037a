//! Transactional document store consumed by the backup job.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryDataStore;
pub use postgres::PostgresDataStore;
pub use r#trait::{DataStore, IndexDefinition, IndexPredicate, StoreError, StoredRow};
