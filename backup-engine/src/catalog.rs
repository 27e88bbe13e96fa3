//! Resource catalog: which project paths make up each backup category.
//!
//! The catalog is plain data. It is built once (from defaults or from
//! configuration) and handed to the archive builder, so tests can run
//! against a synthetic catalog rooted in a temporary directory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A named group of files backed up as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Database,
    Config,
    LocalStore,
    MemoryStore,
    MediaAssets,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Database,
        Category::Config,
        Category::LocalStore,
        Category::MemoryStore,
        Category::MediaAssets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Database => "database",
            Category::Config => "config",
            Category::LocalStore => "local_store",
            Category::MemoryStore => "memory_store",
            Category::MediaAssets => "media_assets",
        }
    }

    /// Mandatory categories are always attempted; optional ones only on request.
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            Category::Database | Category::Config | Category::LocalStore
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One category and its ordered, project-relative paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub category: Category,
    pub paths: Vec<PathBuf>,
}

/// Static mapping from category to the paths it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCatalog {
    entries: Vec<CatalogEntry>,
}

impl ResourceCatalog {
    /// An empty catalog. Categories never added are recorded as absent.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add (or replace) the paths for a category.
    ///
    /// Entries keep their insertion order, which is also the order
    /// members are written to the archive.
    pub fn with<I, P>(mut self, category: Category, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let paths: Vec<PathBuf> = paths.into_iter().map(Into::into).collect();
        match self.entries.iter_mut().find(|e| e.category == category) {
            Some(entry) => entry.paths = paths,
            None => self.entries.push(CatalogEntry { category, paths }),
        }
        self
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn paths(&self, category: Category) -> &[PathBuf] {
        self.entries
            .iter()
            .find(|e| e.category == category)
            .map(|e| e.paths.as_slice())
            .unwrap_or(&[])
    }

    /// Reject absolute paths and paths that climb out of the project root.
    pub fn validate(&self) -> Result<(), String> {
        for entry in &self.entries {
            for path in &entry.paths {
                if !is_project_relative(path) {
                    return Err(format!(
                        "catalog path for {} must be project-relative: {}",
                        entry.category,
                        path.display()
                    ));
                }
            }
        }
        Ok(())
    }
}

impl Default for ResourceCatalog {
    fn default() -> Self {
        Self::empty()
            .with(Category::Database, ["data/primary.db"])
            .with(
                Category::Config,
                ["config/bot_config.toml", "config/model_config.toml"],
            )
            .with(
                Category::LocalStore,
                ["data/local_store.json", "data/webui.json"],
            )
            .with(Category::MemoryStore, ["data/memory_store"])
            .with(
                Category::MediaAssets,
                ["data/media_assets", "data/media_thumbnails"],
            )
    }
}

/// True if `path` only has normal components (no root, prefix or `..`).
pub fn is_project_relative(path: &Path) -> bool {
    let mut normal = 0;
    for component in path.components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    normal > 0
}
