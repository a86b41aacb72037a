use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::Utc;

use chambers_core::{Document, RecordId};

use super::r#trait::{DataStore, IndexDefinition, IndexPredicate, StoreError, StoredRow};

/// In-memory document store.
///
/// Intended for tests/dev. Tables keep insertion order; indexes are plain
/// field lookups evaluated by scanning.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    tables: RwLock<HashMap<String, Vec<StoredRow>>>,
    indexes: RwLock<HashMap<(String, String), String>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`define_index`](Self::define_index).
    pub fn with_index(self, index: IndexDefinition) -> Self {
        self.define_index(index);
        self
    }

    /// Register a secondary index. Redefining an index replaces its field.
    pub fn define_index(&self, index: IndexDefinition) {
        // The map holds no cross-entry invariant, so a poisoned lock is still usable.
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        indexes.insert((index.table, index.name), index.field);
    }

    /// Number of rows currently held in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .map(|t| t.get(table).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

#[async_trait::async_trait]
impl DataStore for InMemoryDataStore {
    async fn read_table(&self, table: &str) -> Result<Vec<StoredRow>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.get(table).cloned().unwrap_or_default())
    }

    async fn insert_row(&self, table: &str, document: Document) -> Result<RecordId, StoreError> {
        let row = StoredRow {
            id: RecordId::new(),
            creation_time: Utc::now(),
            body: document,
        };
        let id = row.id;

        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.entry(table.to_string()).or_default().push(row);
        Ok(id)
    }

    async fn query_by_index(
        &self,
        table: &str,
        index: &str,
        predicate: &IndexPredicate,
    ) -> Result<Vec<StoredRow>, StoreError> {
        let field = {
            let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
            indexes
                .get(&(table.to_string(), index.to_string()))
                .cloned()
                .ok_or_else(|| StoreError::UnknownIndex {
                    table: table.to_string(),
                    index: index.to_string(),
                })?
        };

        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| predicate.matches(r.body.get(&field)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_row(&self, id: RecordId) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        for rows in tables.values_mut() {
            if let Some(pos) = rows.iter().position(|r| r.id == id) {
                rows.remove(pos);
                return Ok(());
            }
        }
        Err(StoreError::NotFound(id))
    }
}
