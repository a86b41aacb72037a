//! Reconciliation of the blob store against the ledger.
//!
//! A run that fails between the blob write and the ledger insert leaves a
//! blob nothing references. The sweep deletes every such blob. It assumes the
//! blob store holds ledger-owned payloads only, and must not run while a backup
//! run is in flight (the in-flight blob has no ledger row yet).

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use chambers_core::BlobRef;

use crate::blob::{BlobStore, BlobStoreError};
use crate::store::{DataStore, StoredRow};

use super::snapshot::{LEDGER_TABLE, LedgerError};

/// Ledger field naming the blob a record owns, whatever the record `type`.
const BLOB_REF_FIELD: &str = "blobRef";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Blobs present in the store.
    pub scanned: usize,
    /// Blobs referenced by a ledger record.
    pub referenced: usize,
    /// Unreferenced blobs deleted.
    pub deleted: usize,
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("blob store error: {0}")]
    Blob(#[from] BlobStoreError),
}

/// Delete every blob in `blobs` that no ledger row in `data` references.
///
/// Every row of the ledger table counts, not only weekly snapshots.
pub async fn sweep_orphans<D, B>(data: &D, blobs: &B) -> Result<SweepReport, SweepError>
where
    D: DataStore + ?Sized,
    B: BlobStore + ?Sized,
{
    let referenced: HashSet<BlobRef> = data
        .read_table(LEDGER_TABLE)
        .await
        .map_err(LedgerError::Query)?
        .iter()
        .filter_map(referenced_blob)
        .collect();

    let present = blobs.list().await?;
    let mut report = SweepReport {
        scanned: present.len(),
        ..SweepReport::default()
    };

    for blob in present {
        if referenced.contains(&blob) {
            report.referenced += 1;
            continue;
        }
        if blobs.delete(blob).await? {
            warn!(blob = %blob, "deleted orphaned snapshot blob");
            report.deleted += 1;
        }
    }

    info!(
        scanned = report.scanned,
        referenced = report.referenced,
        deleted = report.deleted,
        "orphan sweep finished"
    );
    Ok(report)
}

fn referenced_blob(row: &StoredRow) -> Option<BlobRef> {
    let value = row.body.get(BLOB_REF_FIELD)?;
    match serde_json::from_value(value.clone()) {
        Ok(blob) => Some(blob),
        Err(e) => {
            warn!(row = %row.id, error = %e, "ledger row has an unreadable blobRef");
            None
        }
    }
}
