//! Worker configuration loaded from environment variables.
//!
//! | variable | default |
//! |----------|---------|
//! | `DATABASE_URL` | required |
//! | `BACKUP_BLOB_DIR` | `./backups` |
//! | `BACKUP_MAX_SNAPSHOTS` | `4` |
//! | `BACKUP_WEEKDAY` | `sun` |
//! | `BACKUP_HOUR_UTC` | `3` |
//! | `BACKUP_MINUTE_UTC` | `0` |
//! | `BACKUP_SWEEP_ORPHANS` | `false` |

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Weekday;
use thiserror::Error;
use tracing::info;

use chambers_core::DomainError;

use crate::backup::{BackupConfig, DEFAULT_MAX_BACKUPS};
use crate::schedule::WeeklySchedule;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub blob_dir: PathBuf,
    pub backup: BackupConfig,
    pub schedule: WeeklySchedule,
    pub sweep_orphans: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let blob_dir = PathBuf::from(load(&lookup, "BACKUP_BLOB_DIR", "./backups".to_string())?);
        let max_backups = load(&lookup, "BACKUP_MAX_SNAPSHOTS", DEFAULT_MAX_BACKUPS)?;
        let weekday = load(&lookup, "BACKUP_WEEKDAY", Weekday::Sun)?;
        let hour = load(&lookup, "BACKUP_HOUR_UTC", 3u32)?;
        let minute = load(&lookup, "BACKUP_MINUTE_UTC", 0u32)?;
        let sweep_orphans = load(&lookup, "BACKUP_SWEEP_ORPHANS", false)?;

        Ok(Self {
            database_url,
            blob_dir,
            backup: BackupConfig::with_max_backups(max_backups)?,
            schedule: WeeklySchedule::new(weekday, hour, minute)?,
            sweep_orphans,
        })
    }
}

fn load<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
