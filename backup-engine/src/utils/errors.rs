//! Error types for the backup engine.
//!
//! Each failure kind maps to one variant so callers can branch on it.
//! Some of them never escape an operation: they are logged or collected
//! into a partial result instead (see the docs on each variant).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    /// A cataloged path does not exist. Skipped, never fatal.
    #[error("Source path missing: {}", .0.display())]
    SourceMissing(PathBuf),

    /// The database engine's online backup failed. The file is omitted.
    #[error("Database snapshot failed for {}: {source}", path.display())]
    Snapshot {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// I/O or compression failure while building. Aborts the backup.
    #[error("Archive write failed for {}: {source}", path.display())]
    ArchiveWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested archive cannot be opened or decoded at all.
    #[error("Archive read failed for {}: {source}", path.display())]
    ArchiveRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A metadata file is unreadable or malformed. Skipped when listing.
    #[error("Backup record corrupt at {}: {reason}", path.display())]
    RecordCorrupt { path: PathBuf, reason: String },

    #[error("Backup not found: {0}")]
    NotFound(String),

    /// One archived member failed to extract. Collected into the result.
    #[error("Failed to restore {member}: {reason}")]
    RestoreMember { member: String, reason: String },

    /// Pruning one old backup failed. Logged, pruning continues.
    #[error("Failed to prune backup {id}: {source}")]
    RetentionDelete {
        id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Another backup or restore is already in progress")]
    Busy,

    #[error("Operation exceeded its time budget of {0:?}")]
    TimedOut(std::time::Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BackupError>;
