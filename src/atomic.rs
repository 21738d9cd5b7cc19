//! Atomic file commits: write to a temp file in the target directory, then
//! rename over the original so no other process ever observes a partial
//! write. Optional `.bak` backups support rollback and manual recovery.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    #[error("Failed to create backup for {path}: {source}")]
    BackupFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No backup found for {0}")]
    MissingBackup(PathBuf),
}

/// Sibling backup path for a file (`file.txt` -> `file.txt.bak`).
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// Atomically replace `path` with `content`.
///
/// The temp file is created in the target's own directory, which guarantees
/// the final rename stays on one filesystem and is atomic. If `backup` is
/// set, the original is copied to its `.bak` sibling before the rename; a
/// backup that was already created survives a later rename failure so the
/// caller can recover by hand.
pub fn write_atomic(path: &Path, content: &str, backup: bool) -> Result<(), WriteError> {
    if backup && path.exists() {
        fs::copy(path, backup_path(path)).map_err(|source| WriteError::BackupFailed {
            path: path.to_path_buf(),
            source,
        })?;
    }

    let temp = stage_temp(path, content)?;

    temp.persist(path).map_err(|e| WriteError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.error.to_string(),
    })?;

    Ok(())
}

/// Stage content for `path` without committing it: the temp file is written
/// and fsynced but not renamed. The multi-file coordinator stages every
/// file first, then renames in a second sweep.
pub fn stage_temp(path: &Path, content: &str) -> Result<tempfile::NamedTempFile, WriteError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let parent = parent.ok_or_else(|| WriteError::WriteFailed {
        path: path.to_path_buf(),
        reason: "path has no parent directory".to_string(),
    })?;

    let stage = || -> std::io::Result<tempfile::NamedTempFile> {
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        temp.write_all(content.as_bytes())?;
        temp.as_file().sync_all()?;
        Ok(temp)
    };

    stage().map_err(|e| WriteError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Copy the original to its `.bak` sibling.
pub fn create_backup(path: &Path) -> Result<PathBuf, WriteError> {
    let bak = backup_path(path);
    fs::copy(path, &bak).map_err(|source| WriteError::BackupFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(bak)
}

/// Restore a file from its `.bak` sibling, consuming the backup.
pub fn restore_backup(path: &Path) -> Result<(), WriteError> {
    let bak = backup_path(path);
    if !bak.exists() {
        return Err(WriteError::MissingBackup(path.to_path_buf()));
    }
    fs::rename(&bak, path).map_err(|e| WriteError::WriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Remove a leftover `.bak` sibling if present. Failures are ignored; a
/// stale backup is harmless.
pub fn discard_backup(path: &Path) {
    let _ = fs::remove_file(backup_path(path));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "old\n").unwrap();

        write_atomic(&file, "new\n", false).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "new\n");
        assert!(!backup_path(&file).exists());
    }

    #[test]
    fn backup_preserves_original() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "old\n").unwrap();

        write_atomic(&file, "new\n", true).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "new\n");
        assert_eq!(fs::read_to_string(backup_path(&file)).unwrap(), "old\n");
    }

    #[test]
    fn restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "old\n").unwrap();

        write_atomic(&file, "new\n", true).unwrap();
        restore_backup(&file).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "old\n");
        assert!(!backup_path(&file).exists());
    }

    #[test]
    fn restore_without_backup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "x\n").unwrap();

        let result = restore_backup(&file);
        assert!(matches!(result, Err(WriteError::MissingBackup(_))));
    }

    #[test]
    fn staged_temp_does_not_touch_target() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "old\n").unwrap();

        let temp = stage_temp(&file, "new\n").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "old\n");
        assert_eq!(fs::read_to_string(temp.path()).unwrap(), "new\n");
    }

    #[test]
    fn write_failure_leaves_original() {
        let dir = tempfile::tempdir().unwrap();
        let missing_dir = dir.path().join("no-such-dir").join("f.txt");
        let result = write_atomic(&missing_dir, "x\n", false);
        assert!(matches!(result, Err(WriteError::WriteFailed { .. })));
    }
}
