//! Snapshot document, ledger record and ledger queries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use chambers_core::{BlobRef, CriticalTable, Document, RecordId};

use crate::blob::{BlobStore, BlobStoreError};
use crate::store::{DataStore, IndexDefinition, IndexPredicate, StoreError};

/// Table holding one row per snapshot.
pub const LEDGER_TABLE: &str = "backups";

/// Ledger index over the record `type` field.
pub const LEDGER_TYPE_INDEX: &str = "by_type";

/// Index the ledger queries rely on; register it with the data store.
pub fn ledger_index() -> IndexDefinition {
    IndexDefinition::new(LEDGER_TABLE, LEDGER_TYPE_INDEX, "type")
}

/// Kind of ledger record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    WeeklySnapshot,
}

impl SnapshotKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            SnapshotKind::WeeklySnapshot => "weekly_snapshot",
        }
    }
}

/// Ledger entry describing one stored snapshot. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    #[serde(rename = "type")]
    pub kind: SnapshotKind,
    pub tables: Vec<CriticalTable>,
    pub blob_ref: BlobRef,
    pub size_bytes: u64,
    pub record_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A ledger record together with the id the store assigned to its row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: RecordId,
    pub record: SnapshotRecord,
}

/// Outcome of a successful backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSummary {
    pub total_records: u64,
    pub size_bytes: u64,
    pub tables_exported: usize,
}

/// The exported document: table name to that table's rows, tables in
/// export order, rows in store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    tables: Vec<(CriticalTable, Vec<Document>)>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a table's rows. A table pushed twice replaces its earlier rows.
    pub fn push(&mut self, table: CriticalTable, rows: Vec<Document>) {
        match self.tables.iter_mut().find(|(t, _)| *t == table) {
            Some((_, existing)) => *existing = rows,
            None => self.tables.push((table, rows)),
        }
    }

    pub fn rows(&self, table: CriticalTable) -> Option<&[Document]> {
        self.tables
            .iter()
            .find(|(t, _)| *t == table)
            .map(|(_, rows)| rows.as_slice())
    }

    pub fn table_names(&self) -> Vec<CriticalTable> {
        self.tables.iter().map(|(t, _)| *t).collect()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn record_count(&self) -> u64 {
        self.tables.iter().map(|(_, rows)| rows.len() as u64).sum()
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.tables.len()))?;
        for (table, rows) in &self.tables {
            map.serialize_entry(table.as_str(), rows)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Snapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnapshotVisitor;

        impl<'de> Visitor<'de> for SnapshotVisitor {
            type Value = Snapshot;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of table name to rows")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Snapshot, A::Error> {
                let mut snapshot = Snapshot::new();
                while let Some((table, rows)) =
                    access.next_entry::<CriticalTable, Vec<Document>>()?
                {
                    snapshot.push(table, rows);
                }
                Ok(snapshot)
            }
        }

        deserializer.deserialize_map(SnapshotVisitor)
    }
}

/// Failure while reading or maintaining the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger query failed: {0}")]
    Query(#[source] StoreError),

    #[error("ledger row {id} is not a snapshot record: {source}")]
    Decode {
        id: RecordId,
        source: serde_json::Error,
    },

    #[error("failed to delete blob {blob}: {source}")]
    BlobDelete {
        blob: BlobRef,
        source: BlobStoreError,
    },

    #[error("failed to delete ledger row {id}: {source}")]
    RowDelete { id: RecordId, source: StoreError },
}

/// All snapshot records, newest first (ties broken by row id, highest first).
pub async fn list_snapshots<D>(data: &D) -> Result<Vec<LedgerEntry>, LedgerError>
where
    D: DataStore + ?Sized,
{
    let rows = data
        .query_by_index(
            LEDGER_TABLE,
            LEDGER_TYPE_INDEX,
            &IndexPredicate::eq(SnapshotKind::WeeklySnapshot.as_str()),
        )
        .await
        .map_err(LedgerError::Query)?;

    let mut entries = rows
        .into_iter()
        .map(|row| {
            let id = row.id;
            serde_json::from_value(serde_json::Value::Object(row.body))
                .map(|record| LedgerEntry { id, record })
                .map_err(|source| LedgerError::Decode { id, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    entries.sort_by(|a, b| {
        b.record
            .created_at
            .cmp(&a.record.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    Ok(entries)
}

/// Failure while loading a snapshot payload back from the blob store.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("blob store error: {0}")]
    Blob(#[from] BlobStoreError),

    #[error("snapshot blob {0} no longer exists")]
    Missing(BlobRef),

    #[error("snapshot blob is not a valid snapshot document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetch and decode the payload a ledger record points at.
pub async fn load_snapshot<B>(blobs: &B, record: &SnapshotRecord) -> Result<Snapshot, LoadError>
where
    B: BlobStore + ?Sized,
{
    let bytes = blobs
        .get(record.blob_ref)
        .await?
        .ok_or(LoadError::Missing(record.blob_ref))?;
    Ok(Snapshot::from_bytes(&bytes)?)
}
