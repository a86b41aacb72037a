//! Postgres-backed document store.
//!
//! Every table lives in a single `documents` relation keyed by row id, with
//! the logical table name as a column and the row body as JSONB. Secondary
//! indexes are registered by name and resolve to a top-level body field.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | `PoolClosed`, `PoolTimedOut`, `Io`, `Tls` | `Unavailable` |
//! | `Database` (undefined table `42P01`) | `Unavailable` |
//! | `ColumnDecode`, `Decode` | `InvalidDocument` |
//! | anything else | `Storage` |

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};
use uuid::Uuid;

use chambers_core::{Document, RecordId};

use super::r#trait::{DataStore, IndexDefinition, IndexPredicate, StoreError, StoredRow};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id            UUID PRIMARY KEY,
    table_name    TEXT NOT NULL,
    creation_time TIMESTAMPTZ NOT NULL DEFAULT now(),
    body          JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS documents_table_creation_idx
    ON documents (table_name, creation_time, id);
"#;

/// Postgres-backed implementation of [`DataStore`].
///
/// Uses the SQLx connection pool, which is `Send + Sync`; every operation is a
/// single statement so no explicit transactions are opened.
#[derive(Debug, Clone)]
pub struct PostgresDataStore {
    pool: Arc<PgPool>,
    indexes: Arc<RwLock<HashMap<(String, String), String>>>,
}

impl PostgresDataStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            indexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Builder-style index registration.
    pub fn with_index(self, index: IndexDefinition) -> Self {
        self.indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((index.table, index.name), index.field);
        self
    }

    /// Create the `documents` relation and its ordering index if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    fn index_field(&self, table: &str, index: &str) -> Result<String, StoreError> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        indexes
            .get(&(table.to_string(), index.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::UnknownIndex {
                table: table.to_string(),
                index: index.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl DataStore for PostgresDataStore {
    #[instrument(skip(self), fields(row_count = tracing::field::Empty), err)]
    async fn read_table(&self, table: &str) -> Result<Vec<StoredRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, creation_time, body
            FROM documents
            WHERE table_name = $1
            ORDER BY creation_time ASC, id ASC
            "#,
        )
        .bind(table)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("read_table", e))?;

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Span::current().record("row_count", rows.len());
        Ok(rows)
    }

    #[instrument(skip(self, document), err)]
    async fn insert_row(&self, table: &str, document: Document) -> Result<RecordId, StoreError> {
        let id = RecordId::new();
        sqlx::query(
            r#"
            INSERT INTO documents (id, table_name, creation_time, body)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(id.as_uuid())
        .bind(table)
        .bind(Utc::now())
        .bind(JsonValue::Object(document))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_row", e))?;

        Ok(id)
    }

    #[instrument(skip(self), err)]
    async fn query_by_index(
        &self,
        table: &str,
        index: &str,
        predicate: &IndexPredicate,
    ) -> Result<Vec<StoredRow>, StoreError> {
        let field = self.index_field(table, index)?;
        let IndexPredicate::Eq(value) = predicate;

        let rows = sqlx::query(
            r#"
            SELECT id, creation_time, body
            FROM documents
            WHERE table_name = $1 AND body -> $2 = $3
            ORDER BY creation_time ASC, id ASC
            "#,
        )
        .bind(table)
        .bind(&field)
        .bind(value)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_by_index", e))?;

        rows.iter().map(decode_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn delete_row(&self, id: RecordId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_row", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> Result<StoredRow, StoreError> {
    let id: Uuid = row
        .try_get("id")
        .map_err(|e| StoreError::InvalidDocument(format!("failed to read id: {e}")))?;
    let creation_time: DateTime<Utc> = row
        .try_get("creation_time")
        .map_err(|e| StoreError::InvalidDocument(format!("failed to read creation_time: {e}")))?;
    let body: JsonValue = row
        .try_get("body")
        .map_err(|e| StoreError::InvalidDocument(format!("failed to read body: {e}")))?;

    match body {
        JsonValue::Object(body) => Ok(StoredRow {
            id: RecordId::from_uuid(id),
            creation_time,
            body,
        }),
        other => Err(StoreError::InvalidDocument(format!(
            "row {id} body is not an object: {other}"
        ))),
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // undefined_table: schema not provisioned
                Some("42P01") => StoreError::Unavailable(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::InvalidDocument(format!("decode error in {operation}: {err}"))
        }
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_store() -> PostgresDataStore {
        let pool = PgPool::connect_lazy("postgres://chambers@localhost/chambers").unwrap();
        PostgresDataStore::new(pool)
    }

    #[tokio::test]
    async fn unregistered_index_is_reported_by_name() {
        let store = lazy_store();
        let err = store.index_field("backups", "by_type").unwrap_err();
        assert!(matches!(
            err,
            StoreError::UnknownIndex { ref table, ref index } if table == "backups" && index == "by_type"
        ));
    }

    #[tokio::test]
    async fn index_registration_survives_a_poisoned_registry() {
        let store = lazy_store();
        let poisoner = store.indexes.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.write().unwrap();
            panic!("poison the index registry");
        })
        .join();
        assert!(store.indexes.is_poisoned());

        let store = store.with_index(IndexDefinition::new("backups", "by_type", "type"));
        assert_eq!(store.index_field("backups", "by_type").unwrap(), "type");
    }
}
