//! Configuration management for the backup engine.
//!
//! Loads configuration from a TOML file; every field has a default so an
//! empty file (or no file) is a valid configuration.

use crate::catalog::{Category, ResourceCatalog};
use crate::utils::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base directory for catalog paths and restore destination
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,

    /// Where archives and records live (default: `<project_root>/backups`)
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Retention ceiling
    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Compression level (1-22 for zstd)
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Wall-clock budget for one build or restore
    #[serde(default)]
    pub operation_timeout_secs: Option<u64>,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Local hour of the daily backup (0-23)
    #[serde(default = "default_schedule_hour")]
    pub hour: u32,

    #[serde(default)]
    pub minute: u32,
}

/// Per-category path overrides. Unset categories keep their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub database: Option<Vec<PathBuf>>,
    pub config: Option<Vec<PathBuf>>,
    pub local_store: Option<Vec<PathBuf>>,
    pub memory_store: Option<Vec<PathBuf>>,
    pub media_assets: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values
fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_backups() -> usize {
    30
}

fn default_compression_level() -> i32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_schedule_hour() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: default_schedule_hour(),
            minute: 0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_root: default_project_root(),
            backup_dir: None,
            max_backups: default_max_backups(),
            compression_level: default_compression_level(),
            operation_timeout_secs: None,
            schedule: ScheduleConfig::default(),
            catalog: CatalogConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl CatalogConfig {
    fn overrides(&self) -> [(Category, Option<&Vec<PathBuf>>); 5] {
        [
            (Category::Database, self.database.as_ref()),
            (Category::Config, self.config.as_ref()),
            (Category::LocalStore, self.local_store.as_ref()),
            (Category::MemoryStore, self.memory_store.as_ref()),
            (Category::MediaAssets, self.media_assets.as_ref()),
        ]
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| BackupError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_backups == 0 {
            return Err(BackupError::Config("max_backups must be at least 1".into()));
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(BackupError::Config(format!(
                "compression_level must be between 1 and 22, got {}",
                self.compression_level
            )));
        }
        if self.schedule.hour > 23 || self.schedule.minute > 59 {
            return Err(BackupError::Config(format!(
                "invalid schedule time {:02}:{:02}",
                self.schedule.hour, self.schedule.minute
            )));
        }
        if self.operation_timeout_secs == Some(0) {
            return Err(BackupError::Config(
                "operation_timeout_secs must be positive".into(),
            ));
        }
        self.catalog().validate().map_err(BackupError::Config)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.project_root.join("backups"))
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_secs.map(Duration::from_secs)
    }

    /// The default catalog with configured overrides applied.
    pub fn catalog(&self) -> ResourceCatalog {
        self.catalog
            .overrides()
            .into_iter()
            .fold(ResourceCatalog::default(), |catalog, (category, paths)| {
                match paths {
                    Some(paths) => catalog.with(category, paths.iter().cloned()),
                    None => catalog,
                }
            })
    }
}
