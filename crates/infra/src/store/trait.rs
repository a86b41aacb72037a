use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use chambers_core::{CriticalTable, Document, RecordId};

/// A row as held by the store: store-assigned identity plus the document body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: RecordId,
    pub creation_time: DateTime<Utc>,
    pub body: Document,
}

impl StoredRow {
    /// Field carrying the store-assigned id in exported documents.
    pub const ID_FIELD: &'static str = "_id";
    /// Field carrying the creation time (epoch milliseconds) in exported documents.
    pub const CREATION_TIME_FIELD: &'static str = "_creationTime";

    /// The full field set as stored: body fields plus the system fields.
    pub fn into_document(self) -> Document {
        let mut doc = self.body;
        doc.insert(
            Self::ID_FIELD.to_string(),
            JsonValue::String(self.id.to_string()),
        );
        doc.insert(
            Self::CREATION_TIME_FIELD.to_string(),
            JsonValue::from(self.creation_time.timestamp_millis()),
        );
        doc
    }
}

/// A secondary index over one top-level document field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDefinition {
    pub table: String,
    pub name: String,
    pub field: String,
}

impl IndexDefinition {
    pub fn new(table: impl Into<String>, name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            field: field.into(),
        }
    }
}

/// Predicate applied to the indexed field.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexPredicate {
    /// Field equals the given value.
    Eq(JsonValue),
}

impl IndexPredicate {
    pub fn eq(value: impl Into<JsonValue>) -> Self {
        Self::Eq(value.into())
    }

    pub fn matches(&self, field_value: Option<&JsonValue>) -> bool {
        match self {
            IndexPredicate::Eq(expected) => field_value == Some(expected),
        }
    }
}

/// Data store operation error.
///
/// These are **infrastructure errors** (connectivity, missing tables or
/// indexes, storage faults) as opposed to domain errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("unknown index `{index}` on table `{table}`")]
    UnknownIndex { table: String, index: String },

    #[error("row not found: {0}")]
    NotFound(RecordId),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Transactional document store.
///
/// Rows are returned in creation order (oldest first). Implementations must
/// treat every [`CriticalTable`] as an existing, possibly empty, table.
#[async_trait::async_trait]
pub trait DataStore: Send + Sync {
    /// Unfiltered read of any table by name; a table never written reads as empty.
    async fn read_table(&self, table: &str) -> Result<Vec<StoredRow>, StoreError>;

    /// Unfiltered full-table read.
    async fn read_all_rows(&self, table: CriticalTable) -> Result<Vec<StoredRow>, StoreError> {
        self.read_table(table.as_str()).await
    }

    /// Insert a document and return the id the store assigned to it.
    async fn insert_row(&self, table: &str, document: Document) -> Result<RecordId, StoreError>;

    /// Rows of `table` whose indexed field satisfies `predicate`.
    async fn query_by_index(
        &self,
        table: &str,
        index: &str,
        predicate: &IndexPredicate,
    ) -> Result<Vec<StoredRow>, StoreError>;

    /// Delete a row by id. Deleting a missing row is `NotFound`.
    async fn delete_row(&self, id: RecordId) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> DataStore for Arc<S>
where
    S: DataStore + ?Sized,
{
    async fn read_table(&self, table: &str) -> Result<Vec<StoredRow>, StoreError> {
        (**self).read_table(table).await
    }

    async fn read_all_rows(&self, table: CriticalTable) -> Result<Vec<StoredRow>, StoreError> {
        (**self).read_all_rows(table).await
    }

    async fn insert_row(&self, table: &str, document: Document) -> Result<RecordId, StoreError> {
        (**self).insert_row(table, document).await
    }

    async fn query_by_index(
        &self,
        table: &str,
        index: &str,
        predicate: &IndexPredicate,
    ) -> Result<Vec<StoredRow>, StoreError> {
        (**self).query_by_index(table, index, predicate).await
    }

    async fn delete_row(&self, id: RecordId) -> Result<(), StoreError> {
        (**self).delete_row(id).await
    }
}
