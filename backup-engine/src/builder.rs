//! Archive builder: turns the resource catalog into one backup.
//!
//! Database files go through the [`Snapshotter`]; everything else is read
//! straight from disk. Missing sources and failed snapshots are logged
//! and skipped. Any error while writing the archive itself aborts the
//! whole backup and leaves nothing under the final name.

use crate::archive::ArchiveWriter;
use crate::catalog::{Category, ResourceCatalog};
use crate::fs::walker::collect_files;
use crate::record::{format_bytes, BackupRecord, Contains};
use crate::snapshot::Snapshotter;
use crate::store::RecordStore;
use crate::utils::{BackupError, Deadline, Result};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Parameters of one `create` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub description: String,
    pub is_automatic: bool,
    pub include_memory_store: bool,
    pub include_media_assets: bool,
}

impl BuildRequest {
    pub fn manual(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            is_automatic: false,
            include_memory_store: true,
            include_media_assets: true,
        }
    }

    /// What the daily trigger asks for.
    pub fn scheduled() -> Self {
        Self {
            description: "daily automatic backup".into(),
            is_automatic: true,
            include_memory_store: true,
            include_media_assets: true,
        }
    }

    /// Snapshot of the current state taken before a restore.
    pub fn pre_restore() -> Self {
        Self {
            description: "pre-restore safety backup".into(),
            is_automatic: false,
            include_memory_store: true,
            include_media_assets: true,
        }
    }

    fn wants(&self, category: Category) -> bool {
        match category {
            Category::MemoryStore => self.include_memory_store,
            Category::MediaAssets => self.include_media_assets,
            _ => category.is_mandatory(),
        }
    }
}

pub struct ArchiveBuilder {
    project_root: PathBuf,
    catalog: ResourceCatalog,
    snapshotter: Snapshotter,
    compression_level: i32,
    timeout: Option<Duration>,
}

impl ArchiveBuilder {
    pub fn new(
        project_root: impl Into<PathBuf>,
        catalog: ResourceCatalog,
        snapshotter: Snapshotter,
        compression_level: i32,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            catalog,
            snapshotter,
            compression_level,
            timeout,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Write a new archive and its record into `store`.
    ///
    /// Retention is not applied here; the caller runs it once the record
    /// is persisted.
    pub fn build(&self, store: &RecordStore, request: &BuildRequest) -> Result<BackupRecord> {
        let deadline = Deadline::start(self.timeout);
        let now = Local::now();
        let id = store.allocate_id(&now);
        let archive_path = store.archive_path(&id);

        tracing::info!(backup_id = %id, description = %request.description, "Creating backup");

        let mut writer = ArchiveWriter::create(&archive_path, self.compression_level)?;
        let mut contains = Contains::default();

        for entry in self.catalog.entries() {
            if !request.wants(entry.category) {
                tracing::debug!(category = %entry.category, "Category not requested");
                continue;
            }

            let mut written = 0;
            for relative in &entry.paths {
                Deadline::check(deadline)?;
                written += self.add_path(&mut writer, entry.category, relative, deadline)?;
            }
            contains.set(entry.category, written > 0);
        }

        let size_bytes = writer.finish()?;

        let record = BackupRecord {
            id: id.clone(),
            timestamp: now,
            size_bytes,
            size_human: format_bytes(size_bytes),
            description: request.description.clone(),
            is_automatic: request.is_automatic,
            contains,
        };

        if let Err(e) = store.save(&record) {
            tracing::error!(backup_id = %id, error = %e, "Failed to persist backup record");
            let _ = fs::remove_file(&archive_path);
            return Err(e);
        }

        tracing::info!(backup_id = %id, size = %record.size_human, "Backup created");
        Ok(record)
    }

    /// Archive one catalog path. Returns how many files were written.
    fn add_path(
        &self,
        writer: &mut ArchiveWriter,
        category: Category,
        relative: &Path,
        deadline: Option<Deadline>,
    ) -> Result<usize> {
        let full_path = self.project_root.join(relative);
        if !full_path.exists() {
            let skipped = BackupError::SourceMissing(relative.to_path_buf());
            tracing::debug!(category = %category, "{skipped}");
            return Ok(0);
        }

        let files = collect_files(&self.project_root, relative).map_err(|e| {
            BackupError::ArchiveWrite {
                path: full_path.clone(),
                source: e,
            }
        })?;

        let mut written = 0;
        for file in files {
            Deadline::check(deadline)?;
            if category == Category::Database {
                let snapshot = match self.snapshotter.snapshot(&file.path) {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::warn!(error = %e, "Omitting database file from backup");
                        continue;
                    }
                };
                writer.append_file(&snapshot, &file.relative_path)?;
            } else {
                writer.append_file(&file.path, &file.relative_path)?;
            }
            written += 1;
        }
        Ok(written)
    }
}
