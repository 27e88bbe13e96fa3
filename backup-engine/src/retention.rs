//! Retention: keep at most N backups, pruning the oldest first.

use crate::store::RecordStore;
use crate::utils::{BackupError, Result};

/// Outcome of one retention pass.
#[derive(Debug, Default)]
pub struct RetentionReport {
    pub kept: usize,
    pub pruned: Vec<String>,
    pub failures: Vec<BackupError>,
}

/// Delete every valid backup beyond the `max_count` newest.
///
/// The backup named by `keep` is never pruned and always counts toward
/// the ceiling, even when older backups carry later timestamps. A
/// ceiling of zero is treated as one. Individual delete failures are
/// logged and collected; they do not stop the remaining deletions.
pub fn enforce(store: &RecordStore, max_count: usize, keep: &str) -> RetentionReport {
    enforce_with(store, max_count, keep, |id| store.delete(id))
}

fn enforce_with(
    store: &RecordStore,
    max_count: usize,
    keep: &str,
    mut delete: impl FnMut(&str) -> Result<bool>,
) -> RetentionReport {
    let max_count = max_count.max(1);
    let backups = store.list();
    let pinned = backups.iter().any(|b| b.id == keep);
    let others: Vec<_> = backups.iter().filter(|b| b.id != keep).collect();
    let quota = if pinned { max_count - 1 } else { max_count };

    let mut report = RetentionReport {
        kept: backups.len().min(max_count),
        ..Default::default()
    };

    if others.len() <= quota {
        return report;
    }

    // Oldest first
    for old in others.iter().skip(quota).rev() {
        match delete(&old.id) {
            Ok(_) => {
                tracing::info!(backup_id = %old.id, "Pruned old backup");
                report.pruned.push(old.id.clone());
            }
            Err(e) => {
                let source = match e {
                    BackupError::Io(source) => source,
                    other => std::io::Error::other(other.to_string()),
                };
                let failure = BackupError::RetentionDelete {
                    id: old.id.clone(),
                    source,
                };
                tracing::error!(error = %failure, "Retention pruning failed");
                report.failures.push(failure);
            }
        }
    }

    report
}
