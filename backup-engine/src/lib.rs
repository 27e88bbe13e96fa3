//! Backup Engine Library
//!
//! Snapshots a fixed catalog of project resources (a live SQLite
//! database, config files, JSON stores and data directories) into
//! versioned zstd-compressed tar archives, enforces retention, and
//! restores archives back onto the project tree.

pub mod archive;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod fs;
pub mod manager;
pub mod record;
pub mod restore;
pub mod retention;
pub mod schedule;
pub mod snapshot;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use builder::BuildRequest;
pub use catalog::{Category, ResourceCatalog};
pub use config::EngineConfig;
pub use manager::{BackupManager, BackupStats};
pub use record::{BackupRecord, Contains};
pub use restore::RestoreResult;
pub use schedule::DailySchedule;
pub use utils::errors::BackupError;
pub type Result<T> = std::result::Result<T, BackupError>;
