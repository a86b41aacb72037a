//! In-process trigger for the weekly backup.
//!
//! Runs are executed one after another on a single task, so two runs never
//! overlap against the same ledger. Failures are logged and left for the next
//! scheduled trigger; there is no in-run retry.

pub mod runner;
pub mod weekly;

pub use runner::{BackupScheduler, BackupSchedulerHandle, SchedulerStats};
pub use weekly::WeeklySchedule;
