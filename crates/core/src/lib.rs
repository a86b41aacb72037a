//! `chambers-core`: domain primitives shared by the backup tooling.
//!
//! This crate contains **pure domain** types (no infrastructure concerns):
//! identifiers, the closed set of critical tables and their row schemas.

pub mod error;
pub mod id;
pub mod rows;
pub mod table;

pub use error::{DomainError, DomainResult};
pub use id::{BlobRef, RecordId};
pub use rows::{
    GovernanceTierRow, ProfileRow, SubscriptionRow, SubscriptionStatus, UserRow, WebhookEventRow,
};
pub use table::{CriticalTable, Document, TableRow};
