//! Infrastructure layer: document store, blob store, backup job, scheduling
//! and configuration.

pub mod backup;
pub mod blob;
pub mod config;
pub mod schedule;
pub mod store;

#[cfg(test)]
mod integration_tests;
