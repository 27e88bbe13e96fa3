//! On-disk layout of the backup directory.
//!
//! Each backup is two sibling files sharing an id-derived stem:
//! `backup_<id>.tar.zst` (the archive) and `backup_<id>.json` (its
//! record). Only complete pairs count as backups; a lone archive or a
//! lone record is treated as not found.

use crate::archive::{partial_path, PARTIAL_SUFFIX};
use crate::record::{base_id, is_valid_id, BackupRecord};
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const FILE_PREFIX: &str = "backup_";
const ARCHIVE_EXT: &str = ".tar.zst";
const RECORD_EXT: &str = ".json";

pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "Backup directory ready");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn archive_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{id}{ARCHIVE_EXT}"))
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{id}{RECORD_EXT}"))
    }

    fn id_in_use(&self, id: &str) -> bool {
        self.archive_path(id).exists()
            || self.record_path(id).exists()
            || partial_path(&self.archive_path(id)).exists()
    }

    /// Pick an unused id for a backup created at `now`.
    ///
    /// Two backups in the same second get `_01`, `_02`, ... suffixes,
    /// which still sort after the bare id.
    pub fn allocate_id(&self, now: &DateTime<Local>) -> String {
        let base = base_id(now);
        if !self.id_in_use(&base) {
            return base;
        }
        let mut n = 1u32;
        loop {
            let candidate = format!("{base}_{n:02}");
            if !self.id_in_use(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    /// Persist a record next to its archive.
    pub fn save(&self, record: &BackupRecord) -> Result<()> {
        let path = self.record_path(&record.id);
        let staging = partial_path(&path);
        let json = serde_json::to_vec_pretty(record)?;

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&staging)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&staging, &path)
        };

        write().map_err(|e| {
            let _ = fs::remove_file(&staging);
            BackupError::Io(e)
        })
    }

    /// Read the record file for `id`, whether or not its archive exists.
    pub fn load(&self, id: &str) -> Result<Option<BackupRecord>> {
        if !is_valid_id(id) {
            return Ok(None);
        }
        let path = self.record_path(id);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: BackupRecord =
            serde_json::from_slice(&content).map_err(|e| BackupError::RecordCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        if record.id != id {
            return Err(BackupError::RecordCorrupt {
                path,
                reason: format!("record claims id {}", record.id),
            });
        }
        Ok(Some(record))
    }

    /// A backup is valid only when both its record and archive exist.
    pub fn get(&self, id: &str) -> Result<BackupRecord> {
        match self.load(id)? {
            Some(record) if self.archive_path(id).is_file() => Ok(record),
            _ => Err(BackupError::NotFound(id.to_string())),
        }
    }

    /// All valid backups, newest first.
    ///
    /// Never fails: unreadable records are logged and skipped, as are
    /// records whose archive is gone.
    pub fn list(&self) -> Vec<BackupRecord> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(dir = %self.dir.display(), error = %e, "Failed to list backups");
                return Vec::new();
            }
        };

        let mut records: Vec<BackupRecord> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                name.strip_prefix(FILE_PREFIX)?
                    .strip_suffix(RECORD_EXT)
                    .map(str::to_string)
            })
            .filter_map(|id| match self.get(&id) {
                Ok(record) => Some(record),
                Err(BackupError::NotFound(_)) => {
                    tracing::warn!(backup_id = %id, "Skipping record without archive");
                    None
                }
                Err(e) => {
                    tracing::warn!(backup_id = %id, error = %e, "Skipping unreadable backup record");
                    None
                }
            })
            .collect();

        records.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.cmp(&a.id))
        });
        records
    }

    /// Remove the archive and record for `id`.
    ///
    /// Returns true if at least one file was removed. Deleting an unknown
    /// id returns false.
    pub fn delete(&self, id: &str) -> Result<bool> {
        if !is_valid_id(id) {
            return Ok(false);
        }

        let mut deleted = false;
        for path in [self.archive_path(id), self.record_path(id)] {
            match fs::remove_file(&path) {
                Ok(()) => {
                    deleted = true;
                    tracing::debug!(path = %path.display(), "Removed backup file");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        if deleted {
            tracing::info!(backup_id = %id, "Backup deleted");
        }
        Ok(deleted)
    }

    /// Remove `*.partial` leftovers from an interrupted run.
    pub fn sweep_partials(&self) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };

        let mut removed = 0;
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.file_name().to_string_lossy().ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    tracing::warn!(path = %entry.path().display(), "Removed stale partial file");
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Failed to remove stale partial file");
                }
            }
        }
        removed
    }
}
