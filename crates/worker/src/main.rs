//! Backup worker: runs the weekly snapshot on a schedule, or one-off
//! maintenance commands against the same stores.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use chambers_core::RecordId;
use chambers_infra::backup::{BackupJob, ledger_index, list_snapshots, load_snapshot};
use chambers_infra::blob::FsBlobStore;
use chambers_infra::config::WorkerConfig;
use chambers_infra::schedule::BackupScheduler;
use chambers_infra::store::PostgresDataStore;

type Job = BackupJob<Arc<PostgresDataStore>, Arc<FsBlobStore>>;

#[derive(Parser, Debug)]
#[command(name = "chambers-worker")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the weekly scheduler until interrupted.
    Run,
    /// Execute a single backup now and print its summary.
    Once {
        /// Remove unreferenced blobs after a successful run.
        #[arg(long)]
        sweep: bool,
    },
    /// Delete blobs no snapshot record references.
    Sweep,
    /// List retained snapshots, newest first.
    List,
    /// Print the row counts of one snapshot.
    Inspect { record_id: RecordId },
}

#[tokio::main]
async fn main() -> Result<()> {
    chambers_observability::init();

    let cli = Cli::parse();
    let config = WorkerConfig::from_env().context("invalid worker configuration")?;
    let job = connect(&config).await?;

    match cli.command {
        Command::Run => run_scheduler(job, &config).await,
        Command::Once { sweep } => {
            let summary = job.run().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if sweep || config.sweep_orphans {
                let report = job.sweep_orphans().await?;
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
        Command::Sweep => {
            let report = job.sweep_orphans().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::List => {
            for entry in list_snapshots(job.data_store()).await? {
                println!(
                    "{}  {}  records={}  bytes={}  blob={}",
                    entry.id,
                    entry.record.created_at.to_rfc3339(),
                    entry.record.record_count,
                    entry.record.size_bytes,
                    entry.record.blob_ref,
                );
            }
            Ok(())
        }
        Command::Inspect { record_id } => {
            let entry = list_snapshots(job.data_store())
                .await?
                .into_iter()
                .find(|e| e.id == record_id)
                .with_context(|| format!("no snapshot record {record_id}"))?;
            let snapshot = load_snapshot(job.blob_store(), &entry.record).await?;
            for table in snapshot.table_names() {
                let rows = snapshot.rows(table).map_or(0, <[_]>::len);
                println!("{table}: {rows}");
            }
            println!("total: {}", snapshot.record_count());
            Ok(())
        }
    }
}

async fn connect(config: &WorkerConfig) -> Result<Job> {
    info!(
        database = config.database_url.split('@').next_back().unwrap_or("unknown"),
        blob_dir = %config.blob_dir.display(),
        "connecting backup stores"
    );

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let data = PostgresDataStore::new(pool).with_index(ledger_index());
    data.ensure_schema().await?;
    let blobs = FsBlobStore::new(config.blob_dir.clone());

    Ok(BackupJob::new(
        Arc::new(data),
        Arc::new(blobs),
        config.backup.clone(),
    ))
}

async fn run_scheduler(job: Job, config: &WorkerConfig) -> Result<()> {
    let handle = BackupScheduler::new(config.schedule)
        .with_orphan_sweep(config.sweep_orphans)
        .spawn(Arc::new(job));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    handle.shutdown().await;
    Ok(())
}
