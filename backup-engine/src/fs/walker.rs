//! Expands catalog paths into the concrete files to archive.
//!
//! A catalog path may name a single file or a directory; directories are
//! walked recursively. Every file is reported with its path relative to
//! the project root, which becomes its member name in the archive.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Relative path from the project root
    pub relative_path: PathBuf,

    /// File size in bytes
    pub size: u64,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Symlinks are resolved to the target file. Returns None for symlinks
    /// to directories and for broken links.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let raw_metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        let size = if raw_metadata.is_symlink() {
            match std::fs::metadata(&path) {
                Ok(resolved) if resolved.is_file() => resolved.len(),
                _ => return Ok(None),
            }
        } else {
            raw_metadata.len()
        };

        Ok(Some(Self {
            path,
            relative_path,
            size,
        }))
    }
}

/// Collect every file under `root/relative`, in a stable order.
///
/// # Arguments
/// * `root` - Project root that member names are relative to
/// * `relative` - A catalog path (file or directory) under `root`
///
/// # Returns
/// * `Ok(Vec<FileInfo>)` - Files found, sorted by path within each directory
/// * `Err(io::Error)` - If a directory cannot be read
pub fn collect_files(root: &Path, relative: &Path) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root.join(relative))
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;

        // Directories themselves are implied by their files
        if entry.file_type().is_dir() {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            files.push(file_info);
        }
    }

    Ok(files)
}
