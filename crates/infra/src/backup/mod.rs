//! Weekly snapshot backups of the critical tables.
//!
//! ## Components
//!
//! - `BackupJob`: one export run plus retention enforcement
//! - `Snapshot` / `SnapshotRecord`: the blob payload and its ledger entry
//! - `sweep_orphans`: removes blobs no ledger record references

pub mod job;
pub mod snapshot;
pub mod sweep;

pub use job::{BackupConfig, BackupError, BackupJob, Clock, DEFAULT_MAX_BACKUPS, SystemClock};
pub use snapshot::{
    BackupSummary, LEDGER_TABLE, LEDGER_TYPE_INDEX, LedgerEntry, LedgerError, LoadError, Snapshot,
    SnapshotKind, SnapshotRecord, ledger_index, list_snapshots, load_snapshot,
};
pub use sweep::{SweepError, SweepReport, sweep_orphans};
