use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::backup::{BackupJob, BackupSummary, Clock};
use crate::blob::BlobStore;
use crate::store::DataStore;

use super::weekly::WeeklySchedule;

/// Outcome counters for a running scheduler.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SchedulerStats {
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_summary: Option<BackupSummary>,
    pub last_error: Option<String>,
}

/// Handle for the running scheduler (shutdown + manual trigger).
///
/// Dropping the handle stops the scheduler after any in-flight run.
#[derive(Debug)]
pub struct BackupSchedulerHandle {
    shutdown: oneshot::Sender<()>,
    trigger: mpsc::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<SchedulerStats>>,
}

impl BackupSchedulerHandle {
    /// Request a run now instead of waiting for the next trigger.
    ///
    /// Triggers are coalesced: if one is already pending this is a no-op.
    pub fn trigger(&self) {
        let _ = self.trigger.try_send(());
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Stop the scheduler, waiting for an in-flight run to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        let _ = self.join.await;
    }
}

/// Weekly trigger for a [`BackupJob`].
#[derive(Debug, Clone, Default)]
pub struct BackupScheduler {
    pub schedule: WeeklySchedule,
    /// Reconcile the blob store after every successful run.
    pub sweep_orphans: bool,
}

impl BackupScheduler {
    pub fn new(schedule: WeeklySchedule) -> Self {
        Self {
            schedule,
            sweep_orphans: false,
        }
    }

    pub fn with_orphan_sweep(mut self, enabled: bool) -> Self {
        self.sweep_orphans = enabled;
        self
    }

    /// Spawn the scheduler loop on the current tokio runtime.
    pub fn spawn<D, B, C>(self, job: Arc<BackupJob<D, B, C>>) -> BackupSchedulerHandle
    where
        D: DataStore + 'static,
        B: BlobStore + 'static,
        C: Clock + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let stats = Arc::new(Mutex::new(SchedulerStats::default()));

        let join = tokio::spawn(scheduler_loop(
            self,
            job,
            shutdown_rx,
            trigger_rx,
            stats.clone(),
        ));

        BackupSchedulerHandle {
            shutdown: shutdown_tx,
            trigger: trigger_tx,
            join,
            stats,
        }
    }
}

async fn scheduler_loop<D, B, C>(
    cfg: BackupScheduler,
    job: Arc<BackupJob<D, B, C>>,
    mut shutdown_rx: oneshot::Receiver<()>,
    mut trigger_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<SchedulerStats>>,
) where
    D: DataStore,
    B: BlobStore,
    C: Clock,
{
    info!(
        weekday = %cfg.schedule.weekday(),
        time = %cfg.schedule.time(),
        "backup scheduler started"
    );

    loop {
        let now = Utc::now();
        let next = cfg.schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!(next_run = %next, "next backup scheduled");

        tokio::select! {
            // Shutdown has priority.
            biased;
            _ = &mut shutdown_rx => break,
            Some(()) = trigger_rx.recv() => info!("backup triggered manually"),
            _ = tokio::time::sleep(wait) => {}
        }

        execute(&cfg, &job, &stats).await;
    }

    info!("backup scheduler stopped");
}

async fn execute<D, B, C>(
    cfg: &BackupScheduler,
    job: &BackupJob<D, B, C>,
    stats: &Mutex<SchedulerStats>,
) where
    D: DataStore,
    B: BlobStore,
    C: Clock,
{
    let result = job.run().await;
    let finished_at = Utc::now();

    match &result {
        Ok(summary) => info!(
            total_records = summary.total_records,
            size_bytes = summary.size_bytes,
            tables_exported = summary.tables_exported,
            "backup run succeeded"
        ),
        Err(e) => error!(error = %e, "backup run failed"),
    }

    if result.is_ok() && cfg.sweep_orphans {
        if let Err(e) = job.sweep_orphans().await {
            warn!(error = %e, "orphan sweep failed");
        }
    }

    if let Ok(mut s) = stats.lock() {
        s.last_run_at = Some(finished_at);
        match result {
            Ok(summary) => {
                s.runs_succeeded += 1;
                s.last_summary = Some(summary);
                s.last_error = None;
            }
            Err(e) => {
                s.runs_failed += 1;
                s.last_error = Some(e.to_string());
            }
        }
    }
}
