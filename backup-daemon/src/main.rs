mod config;
mod services;

use crate::services::backup_scheduler::BackupScheduler;
use backup_engine::{utils, BackupManager, BuildRequest, DailySchedule};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the daily backup scheduler until interrupted
    Run,

    /// Create a manual backup now
    Create {
        #[arg(short, long, default_value = "manual backup")]
        description: String,

        /// Leave the memory store out of this backup
        #[arg(long)]
        skip_memory_store: bool,

        /// Leave media assets out of this backup
        #[arg(long)]
        skip_media_assets: bool,
    },

    /// List backups, newest first
    List,

    /// Show one backup record
    Show {
        id: String,

        /// Also list the archive members
        #[arg(long)]
        members: bool,
    },

    /// Restore a backup over the project tree (a safety backup is taken first)
    Restore { id: String },

    /// Delete a backup
    Delete { id: String },

    /// Summary of stored backups
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load(args.config.as_deref())?;
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let manager = Arc::new(BackupManager::from_config(&config)?);

    match args.command {
        Command::Run => {
            let schedule = DailySchedule::new(config.schedule.hour, config.schedule.minute)
                .ok_or_else(|| anyhow::anyhow!("invalid schedule time"))?;
            run_daemon(manager, schedule, config.schedule.enabled).await?;
        }
        Command::Create {
            description,
            skip_memory_store,
            skip_media_assets,
        } => {
            let request = BuildRequest {
                include_memory_store: !skip_memory_store,
                include_media_assets: !skip_media_assets,
                ..BuildRequest::manual(description)
            };
            let record = blocking(manager, move |m| m.create(&request)).await?;
            print_json(&record)?;
        }
        Command::List => {
            let backups = blocking(manager, |m| Ok(m.list())).await?;
            print_json(&json!({ "backups": backups, "total": backups.len() }))?;
        }
        Command::Show { id, members } => {
            let (record, names) = blocking(manager, move |m| {
                let record = m.get(&id)?;
                let names = if members {
                    Some(m.archive_members(&id)?)
                } else {
                    None
                };
                Ok((record, names))
            })
            .await?;
            match names {
                Some(names) => print_json(&json!({ "backup": record, "members": names }))?,
                None => print_json(&json!({ "backup": record }))?,
            }
        }
        Command::Restore { id } => {
            let result = blocking(manager, move |m| m.restore(&id)).await?;
            print_json(&result)?;
            if !result.success {
                anyhow::bail!("restore failed: {}", result.errors.join(", "));
            }
        }
        Command::Delete { id } => {
            let target = id.clone();
            let deleted = blocking(manager, move |m| m.delete(&target)).await?;
            print_json(&json!({ "id": id, "deleted": deleted }))?;
        }
        Command::Stats => {
            let stats = blocking(manager, |m| Ok(m.stats())).await?;
            print_json(&stats)?;
        }
    }

    Ok(())
}

/// Run an engine call on the blocking pool.
async fn blocking<T, F>(manager: Arc<BackupManager>, f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&BackupManager) -> backup_engine::Result<T> + Send + 'static,
{
    let value = tokio::task::spawn_blocking(move || f(&manager))
        .await
        .map_err(|e| anyhow::anyhow!(e))??;
    Ok(value)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_daemon(
    manager: Arc<BackupManager>,
    schedule: DailySchedule,
    enabled: bool,
) -> anyhow::Result<()> {
    tracing::info!("Starting backup daemon v{}", env!("CARGO_PKG_VERSION"));

    let cancel = CancellationToken::new();
    let scheduler = if enabled {
        Some(BackupScheduler::new(manager, schedule).start(cancel.clone()))
    } else {
        tracing::warn!("Daily backups are disabled by configuration");
        None
    };

    shutdown_signal(cancel.clone()).await;

    tracing::info!("Shutting down...");
    if let Some(handle) = scheduler {
        // A backup already running on the blocking pool is allowed to finish
        if let Err(e) = handle.await {
            tracing::warn!("Scheduler shutdown error: {}", e);
        }
    }
    tracing::info!("Daemon stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    cancel.cancel();
}
