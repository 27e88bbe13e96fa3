//! Archive container: a tar stream compressed with zstd.
//!
//! Writers stage into `<target>.partial` and only rename onto the final
//! name once the stream is complete and fsynced, so an archive under its
//! final name is always whole.

use crate::utils::{BackupError, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

/// Suffix for files that are still being written.
pub const PARTIAL_SUFFIX: &str = ".partial";

type Encoder = zstd::Encoder<'static, BufWriter<File>>;
pub type ArchiveReader = Archive<zstd::Decoder<'static, BufReader<File>>>;

/// `<path>.partial`
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Streams files into a new compressed archive.
///
/// Dropping a writer without calling [`ArchiveWriter::finish`] removes
/// the partial file.
pub struct ArchiveWriter {
    builder: Option<Builder<Encoder>>,
    partial_path: PathBuf,
    target_path: PathBuf,
    members: usize,
}

impl ArchiveWriter {
    pub fn create(target_path: &Path, compression_level: i32) -> Result<Self> {
        let partial_path = partial_path(target_path);
        let write_err = |e| BackupError::ArchiveWrite {
            path: partial_path.clone(),
            source: e,
        };

        let file = File::create(&partial_path).map_err(write_err)?;
        let encoder = zstd::Encoder::new(BufWriter::new(file), compression_level).map_err(write_err)?;

        let mut builder = Builder::new(encoder);
        builder.mode(tar::HeaderMode::Complete);

        Ok(Self {
            builder: Some(builder),
            partial_path,
            target_path: target_path.to_path_buf(),
            members: 0,
        })
    }

    /// Add the file at `source` under member name `name`.
    pub fn append_file(&mut self, source: &Path, name: &Path) -> Result<()> {
        let builder = self.builder.as_mut().ok_or_else(|| BackupError::ArchiveWrite {
            path: self.partial_path.clone(),
            source: std::io::Error::other("archive already finished"),
        })?;

        let mut file = File::open(source).map_err(|e| BackupError::ArchiveWrite {
            path: source.to_path_buf(),
            source: e,
        })?;
        builder
            .append_file(member_name(name), &mut file)
            .map_err(|e| BackupError::ArchiveWrite {
                path: source.to_path_buf(),
                source: e,
            })?;

        self.members += 1;
        tracing::debug!(member = %name.display(), "Archived file");
        Ok(())
    }

    pub fn members(&self) -> usize {
        self.members
    }

    /// Complete the stream, fsync it and move it to its final name.
    ///
    /// Returns the archive size in bytes.
    pub fn finish(mut self) -> Result<u64> {
        let builder = match self.builder.take() {
            Some(builder) => builder,
            None => return Err(BackupError::ArchiveWrite {
                path: self.partial_path.clone(),
                source: std::io::Error::other("archive already finished"),
            }),
        };

        match Self::seal(builder, &self.partial_path, &self.target_path) {
            Ok(size) => Ok(size),
            Err(e) => {
                let _ = fs::remove_file(&self.partial_path);
                Err(BackupError::ArchiveWrite {
                    path: self.target_path.clone(),
                    source: e,
                })
            }
        }
    }

    fn seal(builder: Builder<Encoder>, partial: &Path, target: &Path) -> std::io::Result<u64> {
        let encoder = builder.into_inner()?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        fs::rename(partial, target)?;
        Ok(fs::metadata(target)?.len())
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if let Some(builder) = self.builder.take() {
            drop(builder);
            if let Err(e) = fs::remove_file(&self.partial_path) {
                tracing::warn!(path = %self.partial_path.display(), error = %e, "Failed to remove partial archive");
            }
        }
    }
}

/// Open an archive for reading from an already opened file.
pub fn open_reader(file: File, path: &Path) -> Result<ArchiveReader> {
    let decoder = zstd::Decoder::new(file).map_err(|e| BackupError::ArchiveRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Archive::new(decoder))
}

/// Member names of the archive at `path`, in stored order.
pub fn list_members(path: &Path) -> Result<Vec<String>> {
    let read_err = |e| BackupError::ArchiveRead {
        path: path.to_path_buf(),
        source: e,
    };

    let file = File::open(path).map_err(read_err)?;
    let mut archive = open_reader(file, path)?;
    let mut names = Vec::new();
    for entry in archive.entries().map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        names.push(entry.path().map_err(read_err)?.to_string_lossy().to_string());
    }
    Ok(names)
}

/// Member names always use `/`, whatever the host separator is.
fn member_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
