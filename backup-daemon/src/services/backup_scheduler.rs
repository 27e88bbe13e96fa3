use backup_engine::schedule::DAILY_INTERVAL;
use backup_engine::{BackupError, BackupManager, BackupRecord, BuildRequest, DailySchedule};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct BackupScheduler {
    manager: Arc<BackupManager>,
    schedule: DailySchedule,
}

impl BackupScheduler {
    pub fn new(manager: Arc<BackupManager>, schedule: DailySchedule) -> Self {
        Self { manager, schedule }
    }

    /// Fire at the next configured time of day, then every 24 hours.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        let delay = self.schedule.delay_until_next();
        tracing::info!(
            next_run = %self.schedule.next_fire_time(),
            delay_secs = delay.as_secs(),
            "Daily backup scheduled"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + delay, DAILY_INTERVAL);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        run_scheduled_backup(self.manager.clone()).await;
                    }
                }
            }
            tracing::info!("Backup scheduler stopped");
        })
    }
}

/// One scheduled run. Skipped with a warning if another operation holds the engine.
pub async fn run_scheduled_backup(manager: Arc<BackupManager>) -> Option<BackupRecord> {
    tracing::info!("Starting daily automatic backup");

    let outcome =
        tokio::task::spawn_blocking(move || manager.create(&BuildRequest::scheduled())).await;

    match outcome {
        Ok(Ok(record)) => {
            tracing::info!(backup_id = %record.id, size = %record.size_human, "Daily automatic backup completed");
            Some(record)
        }
        Ok(Err(BackupError::Busy)) => {
            tracing::warn!("Skipping scheduled run: another backup or restore is running");
            None
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Daily automatic backup failed");
            None
        }
        Err(e) => {
            tracing::error!(error = %e, "Daily backup task panicked");
            None
        }
    }
}
