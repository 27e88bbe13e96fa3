//! Backup record: the metadata stored beside every archive.

use crate::catalog::Category;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Format of the timestamp part of a backup id.
pub const ID_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Per-category inclusion flags.
///
/// Serialized as a flat object keyed by category name, e.g.
/// `{"database": true, "config": true, "local_store": false, ...}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contains {
    pub database: bool,
    pub config: bool,
    pub local_store: bool,
    pub memory_store: bool,
    pub media_assets: bool,
}

impl Contains {
    pub fn get(&self, category: Category) -> bool {
        match category {
            Category::Database => self.database,
            Category::Config => self.config,
            Category::LocalStore => self.local_store,
            Category::MemoryStore => self.memory_store,
            Category::MediaAssets => self.media_assets,
        }
    }

    pub fn set(&mut self, category: Category, included: bool) {
        let slot = match category {
            Category::Database => &mut self.database,
            Category::Config => &mut self.config,
            Category::LocalStore => &mut self.local_store,
            Category::MemoryStore => &mut self.memory_store,
            Category::MediaAssets => &mut self.media_assets,
        };
        *slot = included;
    }
}

/// One persisted backup. There is no update operation: records are
/// written once by the archive builder and later only deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// `YYYYMMDD_HHMMSS`, with an `_NN` suffix on same-second collisions
    pub id: String,
    pub timestamp: DateTime<Local>,
    pub size_bytes: u64,
    pub size_human: String,
    pub description: String,
    pub is_automatic: bool,
    pub contains: Contains,
}

/// Base id for a backup created at `now`.
pub fn base_id(now: &DateTime<Local>) -> String {
    now.format(ID_FORMAT).to_string()
}

/// Ids are only ever digits and underscores, which keeps them safe to
/// splice into file names.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit() || b == b'_')
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}
