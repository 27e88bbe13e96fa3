//! Backup manager: the entry point for create/list/get/restore/delete/stats.
//!
//! One manager owns one backup directory. `create`, `restore` and
//! `delete` hold a single mutex for their whole duration and fail fast
//! with [`BackupError::Busy`] if another of them is already running.
//! Reads (`list`, `get`, `stats`) do not take the lock.
//!
//! Everything here blocks on file I/O; async callers should run it on a
//! blocking worker (`tokio::task::spawn_blocking`).

use crate::archive;
use crate::builder::{ArchiveBuilder, BuildRequest};
use crate::catalog::ResourceCatalog;
use crate::config::EngineConfig;
use crate::record::{format_bytes, BackupRecord};
use crate::restore::{self, RestoreResult};
use crate::retention;
use crate::snapshot::Snapshotter;
use crate::store::RecordStore;
use crate::utils::{BackupError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

/// Aggregate figures over all valid backups.
#[derive(Debug, Clone, Serialize)]
pub struct BackupStats {
    pub total_count: usize,
    pub total_size_bytes: u64,
    pub total_size_human: String,
    pub oldest_timestamp: Option<DateTime<Local>>,
    pub newest_timestamp: Option<DateTime<Local>>,
    pub automatic_count: usize,
    pub manual_count: usize,
    pub max_retained: usize,
    pub backup_dir: PathBuf,
}

pub struct BackupManager {
    builder: ArchiveBuilder,
    store: RecordStore,
    max_backups: usize,
    timeout: Option<Duration>,
    op_lock: Mutex<()>,
}

impl BackupManager {
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            &config.project_root,
            config.backup_dir(),
            config.catalog(),
            config.max_backups,
            config.compression_level,
            config.operation_timeout(),
        )
    }

    pub fn new(
        project_root: &Path,
        backup_dir: PathBuf,
        catalog: ResourceCatalog,
        max_backups: usize,
        compression_level: i32,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        catalog.validate().map_err(BackupError::Config)?;
        let store = RecordStore::open(backup_dir)?;

        let swept = store.sweep_partials();
        if swept > 0 {
            tracing::warn!(count = swept, "Cleaned up leftovers from an interrupted operation");
        }

        let builder = ArchiveBuilder::new(
            project_root,
            catalog,
            Snapshotter::new(store.dir()),
            compression_level,
            timeout,
        );

        tracing::info!(
            project_root = %project_root.display(),
            backup_dir = %store.dir().display(),
            max_backups,
            "Backup manager ready"
        );

        Ok(Self {
            builder,
            store,
            max_backups,
            timeout,
            op_lock: Mutex::new(()),
        })
    }

    fn acquire(&self) -> Result<MutexGuard<'_, ()>> {
        match self.op_lock.try_lock() {
            Ok(guard) => Ok(guard),
            // The guarded value is `()`, so a poisoned lock holds no broken state
            Err(TryLockError::Poisoned(poisoned)) => Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => Err(BackupError::Busy),
        }
    }

    /// Create a backup, then prune old ones beyond the retention ceiling.
    pub fn create(&self, request: &BuildRequest) -> Result<BackupRecord> {
        let _guard = self.acquire()?;
        self.create_locked(request)
    }

    fn create_locked(&self, request: &BuildRequest) -> Result<BackupRecord> {
        let record = self.builder.build(&self.store, request).map_err(|e| {
            tracing::error!(error = %e, "Backup failed");
            e
        })?;

        let report = retention::enforce(&self.store, self.max_backups, &record.id);
        if !report.failures.is_empty() {
            tracing::warn!(failures = report.failures.len(), "Some old backups could not be pruned");
        }
        Ok(record)
    }

    /// All valid backups, newest first.
    pub fn list(&self) -> Vec<BackupRecord> {
        self.store.list()
    }

    pub fn get(&self, id: &str) -> Result<BackupRecord> {
        self.store.get(id)
    }

    /// Member names stored in the archive for `id`.
    pub fn archive_members(&self, id: &str) -> Result<Vec<String>> {
        self.store.get(id)?;
        archive::list_members(&self.store.archive_path(id))
    }

    /// Restore backup `id` over the project tree.
    ///
    /// A safety backup of the current state is always attempted first;
    /// if it fails the restore still proceeds.
    pub fn restore(&self, id: &str) -> Result<RestoreResult> {
        let _guard = self.acquire()?;

        let source_record = self.store.get(id)?;
        let archive_path = self.store.archive_path(id);

        // Opened before the safety backup so retention cannot remove it from under us
        let archive_file = File::open(&archive_path).map_err(|e| BackupError::ArchiveRead {
            path: archive_path.clone(),
            source: e,
        })?;

        tracing::info!(backup_id = %id, "Starting restore");

        let safety_backup_id = match self.create_locked(&BuildRequest::pre_restore()) {
            Ok(safety) => {
                tracing::info!(backup_id = %safety.id, "Pre-restore safety backup created");
                Some(safety.id)
            }
            Err(e) => {
                tracing::error!(error = %e, "Pre-restore safety backup failed, restoring anyway");
                None
            }
        };

        let extraction = restore::extract(
            archive_file,
            &archive_path,
            self.builder.project_root(),
            self.timeout,
        )?;

        let result = RestoreResult {
            success: !extraction.restored_files.is_empty(),
            restored_files: extraction.restored_files,
            errors: extraction.errors.iter().map(ToString::to_string).collect(),
            source_record,
            safety_backup_id,
        };

        tracing::info!(
            backup_id = %id,
            restored = result.restored_files.len(),
            errors = result.errors.len(),
            "Restore finished"
        );
        Ok(result)
    }

    /// Delete backup `id`. Returns false if nothing was there.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.acquire()?;
        self.store.delete(id)
    }

    pub fn stats(&self) -> BackupStats {
        let backups = self.store.list();
        let total_size_bytes = backups.iter().map(|b| b.size_bytes).sum();
        let automatic_count = backups.iter().filter(|b| b.is_automatic).count();

        BackupStats {
            total_count: backups.len(),
            total_size_bytes,
            total_size_human: format_bytes(total_size_bytes),
            oldest_timestamp: backups.last().map(|b| b.timestamp),
            newest_timestamp: backups.first().map(|b| b.timestamp),
            automatic_count,
            manual_count: backups.len() - automatic_count,
            max_retained: self.max_backups,
            backup_dir: self.store.dir().to_path_buf(),
        }
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Category;
    use rusqlite::Connection;
    use std::fs;
    use tempfile::TempDir;

    struct Env {
        _root: TempDir,
        project: PathBuf,
        backups: PathBuf,
    }

    fn env() -> Env {
        let root = TempDir::new().unwrap();
        let project = root.path().join("project");
        let backups = root.path().join("backups");
        fs::create_dir(&project).unwrap();
        Env {
            _root: root,
            project,
            backups,
        }
    }

    fn write(project: &Path, relative: &str, content: &[u8]) {
        let path = project.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn manager(env: &Env, catalog: ResourceCatalog, max_backups: usize) -> BackupManager {
        BackupManager::new(&env.project, env.backups.clone(), catalog, max_backups, 3, None).unwrap()
    }

    fn config_catalog() -> ResourceCatalog {
        ResourceCatalog::empty().with(Category::Config, ["config/a.toml"])
    }

    #[test]
    fn test_scenario_a_missing_database() {
        let env = env();
        write(&env.project, "a.toml", b"name = 'a'");
        let catalog = ResourceCatalog::empty()
            .with(Category::Database, ["db.bin"])
            .with(Category::Config, ["a.toml"]);
        let mgr = manager(&env, catalog, 5);

        let record = mgr.create(&BuildRequest::manual("scenario a")).unwrap();
        assert!(!record.contains.database);
        assert!(record.contains.config);
        assert_eq!(mgr.archive_members(&record.id).unwrap(), vec!["a.toml"]);
    }

    #[test]
    fn test_scenario_b_retention_keeps_newest() {
        let env = env();
        write(&env.project, "config/a.toml", b"v");
        let mgr = manager(&env, config_catalog(), 2);

        let t1 = mgr.create(&BuildRequest::manual("t1")).unwrap();
        let t2 = mgr.create(&BuildRequest::manual("t2")).unwrap();
        let t3 = mgr.create(&BuildRequest::manual("t3")).unwrap();

        let ids: Vec<_> = mgr.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![t3.id.clone(), t2.id.clone()]);
        assert!(!env.backups.join(format!("backup_{}.tar.zst", t1.id)).exists());
        assert!(!env.backups.join(format!("backup_{}.json", t1.id)).exists());
    }

    #[test]
    fn test_retention_bound_over_many_creates() {
        let env = env();
        write(&env.project, "config/a.toml", b"v");
        let mgr = manager(&env, config_catalog(), 3);

        let mut created = Vec::new();
        for i in 0..7 {
            created.push(mgr.create(&BuildRequest::manual(format!("run {i}"))).unwrap().id);
            assert!(mgr.list().len() <= 3);
        }

        let expected: Vec<_> = created.iter().rev().take(3).cloned().collect();
        let ids: Vec<_> = mgr.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_create_never_prunes_its_own_backup() {
        use crate::record::Contains;
        use chrono::{Local, TimeZone};

        let env = env();
        write(&env.project, "config/a.toml", b"v");

        // Records left behind by a clock that ran ahead
        let store = RecordStore::open(&env.backups).unwrap();
        let future = Local.with_ymd_and_hms(2099, 1, 1, 3, 0, 0).unwrap();
        for day in 0..2 {
            let timestamp = future + chrono::Duration::days(day);
            let id = store.allocate_id(&timestamp);
            fs::write(store.archive_path(&id), b"archive").unwrap();
            store
                .save(&BackupRecord {
                    id,
                    timestamp,
                    size_bytes: 7,
                    size_human: format_bytes(7),
                    description: "future".into(),
                    is_automatic: true,
                    contains: Contains::default(),
                })
                .unwrap();
        }

        let mgr = manager(&env, config_catalog(), 2);
        let record = mgr.create(&BuildRequest::manual("new")).unwrap();

        assert!(mgr.get(&record.id).is_ok());
        let ids: Vec<_> = mgr.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&record.id));
        assert_eq!(ids[0], "20990102_030000");
    }

    #[test]
    fn test_scenario_c_restore_onto_empty_tree() {
        let env = env();
        write(&env.project, "config/a.toml", b"config contents");
        write(&env.project, "data/db.bin", b"\x00binary\xff");
        let catalog = ResourceCatalog::empty()
            .with(Category::Config, ["config/a.toml"])
            .with(Category::LocalStore, ["data/db.bin"]);
        let mgr = manager(&env, catalog, 10);
        let record = mgr.create(&BuildRequest::manual("c")).unwrap();

        fs::remove_dir_all(env.project.join("config")).unwrap();
        fs::remove_dir_all(env.project.join("data")).unwrap();

        let result = mgr.restore(&record.id).unwrap();
        assert!(result.success);
        assert_eq!(result.restored_files, vec!["config/a.toml", "data/db.bin"]);
        assert!(result.errors.is_empty());
        assert_eq!(result.source_record, record);
        assert_eq!(fs::read(env.project.join("config/a.toml")).unwrap(), b"config contents");
        assert_eq!(fs::read(env.project.join("data/db.bin")).unwrap(), b"\x00binary\xff");
    }

    #[test]
    fn test_round_trip_with_live_database() {
        let env = env();
        fs::create_dir_all(env.project.join("data/memory_store/nested")).unwrap();
        let conn = Connection::open(env.project.join("data/primary.db")).unwrap();
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE notes (body TEXT);
             INSERT INTO notes VALUES ('first'), ('second');",
        )
        .unwrap();
        write(&env.project, "config/bot_config.toml", b"[bot]\nname = 'x'\n");
        write(&env.project, "data/local_store.json", b"{\"k\": 1}");
        write(&env.project, "data/memory_store/nested/m.json", b"[1,2,3]");
        write(&env.project, "data/media_assets/cat.png", &[0x89, 0x50, 0x4E, 0x47]);

        let mgr = manager(&env, ResourceCatalog::default(), 10);
        let record = mgr.create(&BuildRequest::manual("round trip")).unwrap();
        assert!(record.contains.database);
        assert!(record.contains.config);
        assert!(record.contains.local_store);
        assert!(record.contains.memory_store);
        assert!(record.contains.media_assets);

        // Diverge from the backup, then restore
        conn.execute("DELETE FROM notes", []).unwrap();
        drop(conn);
        write(&env.project, "config/bot_config.toml", b"changed");
        write(&env.project, "data/memory_store/nested/m.json", b"changed");
        write(&env.project, "data/media_assets/new.png", b"added later");

        let result = mgr.restore(&record.id).unwrap();
        assert!(result.success, "errors: {:?}", result.errors);

        assert_eq!(
            fs::read(env.project.join("config/bot_config.toml")).unwrap(),
            b"[bot]\nname = 'x'\n"
        );
        assert_eq!(
            fs::read(env.project.join("data/memory_store/nested/m.json")).unwrap(),
            b"[1,2,3]"
        );
        assert_eq!(
            fs::read(env.project.join("data/media_assets/cat.png")).unwrap(),
            [0x89, 0x50, 0x4E, 0x47]
        );
        // Files absent from the archive are left alone
        assert_eq!(
            fs::read(env.project.join("data/media_assets/new.png")).unwrap(),
            b"added later"
        );

        let _ = fs::remove_file(env.project.join("data/primary.db-wal"));
        let _ = fs::remove_file(env.project.join("data/primary.db-shm"));
        let restored = Connection::open(env.project.join("data/primary.db")).unwrap();
        let count: i64 = restored
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_restore_takes_safety_backup() {
        let env = env();
        write(&env.project, "config/a.toml", b"original");
        let mgr = manager(&env, config_catalog(), 10);
        let record = mgr.create(&BuildRequest::manual("before")).unwrap();

        write(&env.project, "config/a.toml", b"edited");
        let result = mgr.restore(&record.id).unwrap();

        let safety_id = result.safety_backup_id.expect("safety backup id");
        let safety = mgr.get(&safety_id).unwrap();
        assert!(!safety.is_automatic);
        assert_eq!(safety.description, "pre-restore safety backup");
        assert_eq!(mgr.list().len(), 2);

        // The safety backup captured the pre-restore state
        let undo = mgr.restore(&safety_id).unwrap();
        assert!(undo.success);
        assert_eq!(fs::read(env.project.join("config/a.toml")).unwrap(), b"edited");
    }

    #[test]
    fn test_restore_survives_retention_of_its_own_archive() {
        let env = env();
        write(&env.project, "config/a.toml", b"oldest state");
        let mgr = manager(&env, config_catalog(), 2);
        let oldest = mgr.create(&BuildRequest::manual("oldest")).unwrap();
        write(&env.project, "config/a.toml", b"newer state");
        mgr.create(&BuildRequest::manual("newer")).unwrap();

        // The safety backup pushes `oldest` past the ceiling
        let result = mgr.restore(&oldest.id).unwrap();
        assert!(result.success);
        assert!(result.safety_backup_id.is_some());
        assert_eq!(fs::read(env.project.join("config/a.toml")).unwrap(), b"oldest state");
        assert!(mgr.list().len() <= 2);
    }

    #[test]
    fn test_restore_unknown_or_half_backup_is_not_found() {
        let env = env();
        write(&env.project, "config/a.toml", b"x");
        let mgr = manager(&env, config_catalog(), 10);
        let record = mgr.create(&BuildRequest::manual("x")).unwrap();

        assert!(matches!(mgr.restore("20000101_000000"), Err(BackupError::NotFound(_))));

        fs::remove_file(env.backups.join(format!("backup_{}.json", record.id))).unwrap();
        assert!(matches!(mgr.restore(&record.id), Err(BackupError::NotFound(_))));
        // No safety backup was attempted for a missing target
        assert!(mgr.list().is_empty());
    }

    #[test]
    fn test_restore_of_empty_archive_is_failure() {
        let env = env();
        let mgr = manager(&env, config_catalog(), 10);
        let record = mgr.create(&BuildRequest::manual("nothing")).unwrap();
        assert!(!record.contains.config);

        let result = mgr.restore(&record.id).unwrap();
        assert!(!result.success);
        assert!(result.errors.is_empty());
        assert!(result.restored_files.is_empty());
    }

    #[test]
    fn test_delete_twice() {
        let env = env();
        write(&env.project, "config/a.toml", b"x");
        let mgr = manager(&env, config_catalog(), 10);
        let record = mgr.create(&BuildRequest::manual("x")).unwrap();

        assert!(mgr.delete(&record.id).unwrap());
        assert!(!mgr.delete(&record.id).unwrap());
        assert!(mgr.list().iter().all(|r| r.id != record.id));
        assert!(matches!(mgr.get(&record.id), Err(BackupError::NotFound(_))));
    }

    #[test]
    fn test_stats() {
        let env = env();
        write(&env.project, "config/a.toml", b"x");
        let mgr = manager(&env, config_catalog(), 10);

        let empty = mgr.stats();
        assert_eq!(empty.total_count, 0);
        assert_eq!(empty.oldest_timestamp, None);
        assert_eq!(empty.total_size_human, "0.00 B");

        let first = mgr.create(&BuildRequest::scheduled()).unwrap();
        let second = mgr.create(&BuildRequest::manual("manual")).unwrap();

        let stats = mgr.stats();
        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.automatic_count, 1);
        assert_eq!(stats.manual_count, 1);
        assert_eq!(stats.total_size_bytes, first.size_bytes + second.size_bytes);
        assert_eq!(stats.oldest_timestamp, Some(first.timestamp));
        assert_eq!(stats.newest_timestamp, Some(second.timestamp));
        assert_eq!(stats.max_retained, 10);
        assert_eq!(stats.backup_dir, env.backups);
    }

    #[test]
    fn test_busy_while_operation_in_flight() {
        let env = env();
        write(&env.project, "config/a.toml", b"x");
        let mgr = manager(&env, config_catalog(), 10);

        let guard = mgr.acquire().unwrap();
        assert!(matches!(
            mgr.create(&BuildRequest::manual("blocked")),
            Err(BackupError::Busy)
        ));
        assert!(matches!(mgr.restore("20260101_000000"), Err(BackupError::Busy)));
        assert!(matches!(mgr.delete("20260101_000000"), Err(BackupError::Busy)));
        // Reads stay available
        assert!(mgr.list().is_empty());
        drop(guard);

        assert!(mgr.create(&BuildRequest::manual("free")).is_ok());
    }

    #[test]
    fn test_startup_sweeps_partials() {
        let env = env();
        fs::create_dir_all(&env.backups).unwrap();
        fs::write(env.backups.join("backup_20260101_000000.tar.zst.partial"), b"half").unwrap();

        let _mgr = manager(&env, config_catalog(), 10);
        assert_eq!(fs::read_dir(&env.backups).unwrap().count(), 0);
    }

    #[test]
    fn test_from_config() {
        let env = env();
        let config = EngineConfig {
            project_root: env.project.clone(),
            backup_dir: Some(env.backups.clone()),
            max_backups: 4,
            ..Default::default()
        };

        let mgr = BackupManager::from_config(&config).unwrap();
        assert_eq!(mgr.max_backups(), 4);
        assert!(env.backups.is_dir());
    }
}
