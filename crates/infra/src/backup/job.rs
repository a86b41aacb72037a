//! Weekly snapshot export with rolling retention.
//!
//! A run is a linear pipeline: fetch every configured table, serialize, write
//! the blob, record it in the ledger, prune the ledger. Nothing is persisted
//! between steps, so a crashed run is simply re-run at the next trigger.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use chambers_core::{BlobRef, CriticalTable, DomainError, DomainResult, RecordId};

use crate::blob::{BlobStore, BlobStoreError};
use crate::store::{DataStore, StoreError};

use super::snapshot::{
    BackupSummary, LEDGER_TABLE, LedgerError, Snapshot, SnapshotKind, SnapshotRecord,
    list_snapshots,
};
use super::sweep::{SweepError, SweepReport, sweep_orphans};

/// Snapshots kept after each run unless configured otherwise.
pub const DEFAULT_MAX_BACKUPS: usize = 4;

/// Source of the timestamp written into each ledger record.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Which tables to export and how many snapshots to retain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupConfig {
    tables: Vec<CriticalTable>,
    max_backups: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            tables: CriticalTable::ALL.to_vec(),
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

impl BackupConfig {
    /// Tables must be non-empty and distinct; at least one snapshot is retained.
    pub fn new(tables: Vec<CriticalTable>, max_backups: usize) -> DomainResult<Self> {
        if tables.is_empty() {
            return Err(DomainError::validation("backup table list is empty"));
        }
        for (i, table) in tables.iter().enumerate() {
            if tables[..i].contains(table) {
                return Err(DomainError::validation(format!(
                    "table `{table}` listed more than once"
                )));
            }
        }
        if max_backups == 0 {
            return Err(DomainError::validation("max_backups must be at least 1"));
        }
        Ok(Self {
            tables,
            max_backups,
        })
    }

    /// Default table set with a different retention window.
    pub fn with_max_backups(max_backups: usize) -> DomainResult<Self> {
        Self::new(CriticalTable::ALL.to_vec(), max_backups)
    }

    pub fn tables(&self) -> &[CriticalTable] {
        &self.tables
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }
}

/// Why a run failed. No variant carries a partial summary.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Nothing was written.
    #[error("failed to read table `{table}`: {source}")]
    Read {
        table: CriticalTable,
        source: StoreError,
    },

    /// Nothing was written.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Nothing was written.
    #[error("failed to write snapshot blob: {0}")]
    BlobWrite(#[source] BlobStoreError),

    /// The blob was written but has no ledger row referencing it.
    #[error("failed to record snapshot, blob {blob_ref} is orphaned: {source}")]
    LedgerWrite {
        blob_ref: BlobRef,
        source: StoreError,
    },

    /// The new snapshot is durable; older ones may remain until the next run.
    #[error("snapshot {created} recorded but pruning failed: {source}")]
    Prune {
        created: RecordId,
        source: LedgerError,
    },
}

/// Exports the configured tables into one snapshot and enforces retention.
///
/// Runs must not overlap against the same ledger; the caller (scheduler) is
/// responsible for serializing invocations.
pub struct BackupJob<D, B, C = SystemClock> {
    data: D,
    blobs: B,
    clock: C,
    config: BackupConfig,
}

impl<D, B> BackupJob<D, B, SystemClock>
where
    D: DataStore,
    B: BlobStore,
{
    pub fn new(data: D, blobs: B, config: BackupConfig) -> Self {
        Self::with_clock(data, blobs, config, SystemClock)
    }
}

impl<D, B, C> BackupJob<D, B, C>
where
    D: DataStore,
    B: BlobStore,
    C: Clock,
{
    pub fn with_clock(data: D, blobs: B, config: BackupConfig, clock: C) -> Self {
        Self {
            data,
            blobs,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    pub fn data_store(&self) -> &D {
        &self.data
    }

    pub fn blob_store(&self) -> &B {
        &self.blobs
    }

    /// Remove blobs left behind by runs that failed after the blob write.
    ///
    /// Must not be called while a run is in progress.
    pub async fn sweep_orphans(&self) -> Result<SweepReport, SweepError> {
        sweep_orphans(&self.data, &self.blobs).await
    }

    /// Execute one full run: Fetch → Serialize → Store → Record → Prune.
    pub async fn run(&self) -> Result<BackupSummary, BackupError> {
        let snapshot = self.export().await?;
        let total_records = snapshot.record_count();

        let bytes = snapshot.to_bytes().map_err(BackupError::Serialize)?;
        let size_bytes = bytes.len() as u64;

        let blob_ref = self
            .blobs
            .store(bytes)
            .await
            .map_err(BackupError::BlobWrite)?;

        let record = SnapshotRecord {
            kind: SnapshotKind::WeeklySnapshot,
            tables: self.config.tables.clone(),
            blob_ref,
            size_bytes,
            record_count: total_records,
            created_at: self.clock.now(),
        };
        let created = self.record(&record).await?;

        info!(
            record = %created,
            blob = %blob_ref,
            total_records,
            size_bytes,
            "snapshot recorded"
        );

        let pruned = self.prune().await.map_err(|source| {
            warn!(record = %created, error = %source, "snapshot pruning failed");
            BackupError::Prune { created, source }
        })?;
        if pruned > 0 {
            info!(pruned, max_backups = self.config.max_backups, "old snapshots pruned");
        }

        Ok(BackupSummary {
            total_records,
            size_bytes,
            tables_exported: snapshot.table_count(),
        })
    }

    async fn export(&self) -> Result<Snapshot, BackupError> {
        let mut snapshot = Snapshot::new();
        for &table in &self.config.tables {
            let rows = self
                .data
                .read_all_rows(table)
                .await
                .map_err(|source| BackupError::Read { table, source })?;

            let mut documents = Vec::with_capacity(rows.len());
            let mut drifted = 0usize;
            for row in rows {
                // Exported as stored either way.
                if let Err(e) = table.check_row(&row.body) {
                    warn!(
                        table = %table,
                        row = %row.id,
                        error = %e,
                        "row does not match its schema"
                    );
                    drifted += 1;
                }
                documents.push(row.into_document());
            }

            debug!(table = %table, rows = documents.len(), drifted, "table exported");
            snapshot.push(table, documents);
        }
        Ok(snapshot)
    }

    async fn record(&self, record: &SnapshotRecord) -> Result<RecordId, BackupError> {
        let orphaned = |source: StoreError| BackupError::LedgerWrite {
            blob_ref: record.blob_ref,
            source,
        };

        let document = match serde_json::to_value(record) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(other) => {
                return Err(orphaned(StoreError::InvalidDocument(format!(
                    "snapshot record serialized to non-object: {other}"
                ))));
            }
            Err(e) => return Err(orphaned(StoreError::InvalidDocument(e.to_string()))),
        };

        self.data
            .insert_row(LEDGER_TABLE, document)
            .await
            .map_err(orphaned)
    }

    /// Delete every snapshot beyond the newest `max_backups`, blob first.
    async fn prune(&self) -> Result<usize, LedgerError> {
        let entries = list_snapshots(&self.data).await?;

        let mut pruned = 0;
        for entry in entries.into_iter().skip(self.config.max_backups) {
            let existed = self
                .blobs
                .delete(entry.record.blob_ref)
                .await
                .map_err(|source| LedgerError::BlobDelete {
                    blob: entry.record.blob_ref,
                    source,
                })?;
            if !existed {
                debug!(blob = %entry.record.blob_ref, "snapshot blob already gone");
            }

            self.data
                .delete_row(entry.id)
                .await
                .map_err(|source| LedgerError::RowDelete {
                    id: entry.id,
                    source,
                })?;
            pruned += 1;
        }
        Ok(pruned)
    }
}
