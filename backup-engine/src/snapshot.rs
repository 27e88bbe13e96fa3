//! Point-in-time copies of live SQLite databases.
//!
//! A raw byte copy of a database that another process is writing can
//! capture a torn page. The snapshot goes through SQLite's online backup
//! API instead, which copies a transactionally consistent image and
//! restarts transparently if the source changes mid-copy.

use crate::utils::{BackupError, Result};
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;

/// Pages copied per backup step before yielding the source lock.
const PAGES_PER_STEP: i32 = 256;

/// Pause between steps so writers on the live database are not starved.
const STEP_PAUSE: Duration = Duration::from_millis(10);

pub struct Snapshotter {
    scratch_dir: PathBuf,
    pages_per_step: i32,
    step_pause: Duration,
}

impl Snapshotter {
    /// Snapshots are staged as hidden `.partial` files in `scratch_dir`.
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            pages_per_step: PAGES_PER_STEP,
            step_pause: STEP_PAUSE,
        }
    }

    /// Copy `source` into a fresh temporary file.
    ///
    /// The returned [`TempPath`] deletes the copy when dropped. On error no
    /// temporary file is left behind.
    pub fn snapshot(&self, source: &Path) -> Result<TempPath> {
        let snapshot_err = |source_err: rusqlite::Error| BackupError::Snapshot {
            path: source.to_path_buf(),
            source: source_err,
        };

        let src = Connection::open_with_flags(
            source,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(snapshot_err)?;

        let temp_path = tempfile::Builder::new()
            .prefix(".snapshot-")
            .suffix(".db.partial")
            .tempfile_in(&self.scratch_dir)?
            .into_temp_path();

        {
            let mut dest = Connection::open(&temp_path).map_err(snapshot_err)?;
            let backup = Backup::new(&src, &mut dest).map_err(snapshot_err)?;
            backup
                .run_to_completion(self.pages_per_step, self.step_pause, None)
                .map_err(snapshot_err)?;
        }

        tracing::debug!(source = %source.display(), "Database snapshot taken");
        Ok(temp_path)
    }
}
