//! Extraction of an archive back onto the project tree.
//!
//! Restore is additive: every member overwrites its destination, and
//! files that are not in the archive are left alone. Member failures are
//! collected rather than aborting the remaining members.

use crate::archive::open_reader;
use crate::catalog::is_project_relative;
use crate::record::BackupRecord;
use crate::utils::{BackupError, Deadline, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Outcome of a restore.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    /// True iff at least one file was restored
    pub success: bool,
    pub restored_files: Vec<String>,
    pub errors: Vec<String>,
    pub source_record: BackupRecord,
    /// Id of the backup taken just before extraction, if it succeeded
    pub safety_backup_id: Option<String>,
}

/// Members extracted from one archive.
#[derive(Debug, Default)]
pub struct Extraction {
    pub restored_files: Vec<String>,
    pub errors: Vec<BackupError>,
}

/// Extract every member of the archive in `file` under `project_root`.
///
/// Fails as a whole only when the archive cannot be read at all; once
/// one member has been read, later problems are reported per member.
pub fn extract(
    file: File,
    archive_path: &Path,
    project_root: &Path,
    timeout: Option<Duration>,
) -> Result<Extraction> {
    let deadline = Deadline::start(timeout);
    let read_err = |e| BackupError::ArchiveRead {
        path: archive_path.to_path_buf(),
        source: e,
    };

    let mut archive = open_reader(file, archive_path)?;
    let mut extraction = Extraction::default();
    let mut seen_any = false;

    for entry in archive.entries().map_err(read_err)? {
        if let Err(e) = Deadline::check(deadline) {
            tracing::warn!(error = %e, "Restore stopped before all members were extracted");
            extraction.errors.push(e);
            break;
        }

        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) if !seen_any => return Err(read_err(e)),
            Err(e) => {
                // The stream is unusable past a broken header
                tracing::error!(error = %e, "Archive stream is corrupt");
                extraction.errors.push(read_err(e));
                break;
            }
        };
        seen_any = true;

        let member = match entry.path() {
            Ok(path) => path.into_owned(),
            Err(e) => {
                extraction.errors.push(member_error("<unreadable name>", e));
                continue;
            }
        };
        let member_name = member.to_string_lossy().to_string();

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            continue;
        }
        if !entry_type.is_file() {
            let e = io::Error::new(io::ErrorKind::Unsupported, "unsupported archive entry type");
            extraction.errors.push(member_error(&member_name, e));
            continue;
        }

        match destination(project_root, &member) {
            Some(dest) => match write_member(&mut entry, &dest) {
                Ok(()) => {
                    tracing::debug!(member = %member_name, "Restored file");
                    extraction.restored_files.push(member_name);
                }
                Err(e) => {
                    let failure = member_error(&member_name, e);
                    tracing::error!(error = %failure, "Member restore failed");
                    extraction.errors.push(failure);
                }
            },
            None => {
                let e = io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "path escapes the project root",
                );
                let failure = member_error(&member_name, e);
                tracing::warn!(error = %failure, "Refusing archive member");
                extraction.errors.push(failure);
            }
        }
    }

    Ok(extraction)
}

/// Where a member lands, or `None` if its path would leave the project.
fn destination(project_root: &Path, member: &Path) -> Option<PathBuf> {
    is_project_relative(member).then(|| project_root.join(member))
}

fn write_member(entry: &mut impl io::Read, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(dest)?;
    io::copy(entry, &mut out)?;
    out.sync_all()
}

fn member_error(member: &str, e: io::Error) -> BackupError {
    BackupError::RestoreMember {
        member: member.to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use tempfile::TempDir;

    fn archive_with(dir: &Path, members: &[(&str, &[u8])]) -> PathBuf {
        let staging = dir.join("staging");
        fs::create_dir_all(&staging).unwrap();
        let target = dir.join("backup_test.tar.zst");
        let mut writer = ArchiveWriter::create(&target, 3).unwrap();
        for (i, (name, content)) in members.iter().enumerate() {
            let source = staging.join(format!("src{i}"));
            fs::write(&source, content).unwrap();
            writer.append_file(&source, Path::new(name)).unwrap();
        }
        writer.finish().unwrap();
        target
    }

    fn raw_tar_zst(dir: &Path, name_bytes: &[u8], content: &[u8]) -> PathBuf {
        let mut header = tar::Header::new_gnu();
        header.as_old_mut().name[..name_bytes.len()].copy_from_slice(name_bytes);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();

        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            builder.append(&header, content).unwrap();
            builder.finish().unwrap();
        }
        let path = dir.join("raw.tar.zst");
        fs::write(&path, zstd::encode_all(&tar_bytes[..], 3).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_extract_overwrites_and_keeps_others() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(project.join("config")).unwrap();
        fs::write(project.join("config/a.toml"), b"new-local-edit").unwrap();
        fs::write(project.join("config/untouched.toml"), b"keep me").unwrap();

        let archive = archive_with(
            temp_dir.path(),
            &[("config/a.toml", b"archived"), ("data/db.bin", b"\x00\x01")],
        );

        let extraction = extract(File::open(&archive).unwrap(), &archive, &project, None).unwrap();
        assert_eq!(extraction.restored_files, vec!["config/a.toml", "data/db.bin"]);
        assert!(extraction.errors.is_empty());
        assert_eq!(fs::read(project.join("config/a.toml")).unwrap(), b"archived");
        assert_eq!(fs::read(project.join("data/db.bin")).unwrap(), b"\x00\x01");
        assert_eq!(fs::read(project.join("config/untouched.toml")).unwrap(), b"keep me");
    }

    #[test]
    fn test_member_failure_does_not_abort() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        // A directory where a file should go makes that one member fail
        fs::create_dir_all(project.join("config/a.toml")).unwrap();

        let archive = archive_with(
            temp_dir.path(),
            &[("config/a.toml", b"a"), ("config/b.toml", b"b")],
        );

        let extraction = extract(File::open(&archive).unwrap(), &archive, &project, None).unwrap();
        assert_eq!(extraction.restored_files, vec!["config/b.toml"]);
        assert_eq!(extraction.errors.len(), 1);
        assert!(matches!(
            &extraction.errors[0],
            BackupError::RestoreMember { member, .. } if member == "config/a.toml"
        ));
    }

    #[test]
    fn test_escaping_member_is_refused() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).unwrap();

        let archive = raw_tar_zst(temp_dir.path(), b"../escaped.txt", b"gotcha");
        let extraction = extract(File::open(&archive).unwrap(), &archive, &project, None).unwrap();

        assert!(extraction.restored_files.is_empty());
        assert_eq!(extraction.errors.len(), 1);
        assert!(!temp_dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_unreadable_archive_is_top_level_failure() {
        let temp_dir = TempDir::new().unwrap();
        let bogus = temp_dir.path().join("bogus.tar.zst");
        fs::write(&bogus, b"not an archive at all").unwrap();

        let result = extract(File::open(&bogus).unwrap(), &bogus, temp_dir.path(), None);
        assert!(matches!(result, Err(BackupError::ArchiveRead { .. })));
    }

    #[test]
    fn test_empty_archive_restores_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let archive = archive_with(temp_dir.path(), &[]);

        let extraction =
            extract(File::open(&archive).unwrap(), &archive, temp_dir.path(), None).unwrap();
        assert!(extraction.restored_files.is_empty());
        assert!(extraction.errors.is_empty());
    }

    #[test]
    fn test_timeout_stops_between_members() {
        let temp_dir = TempDir::new().unwrap();
        let project = temp_dir.path().join("project");
        fs::create_dir_all(&project).unwrap();
        let archive = archive_with(
            temp_dir.path(),
            &[("config/a.toml", b"a"), ("config/b.toml", b"b"), ("data/c.bin", b"c")],
        );

        let extraction = extract(
            File::open(&archive).unwrap(),
            &archive,
            &project,
            Some(Duration::ZERO),
        )
        .unwrap();

        assert!(extraction.restored_files.is_empty());
        assert_eq!(extraction.errors.len(), 1);
        assert!(matches!(extraction.errors[0], BackupError::TimedOut(_)));
        assert!(!project.join("config/a.toml").exists());
    }
}
