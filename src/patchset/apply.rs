//! The apply phase: two sweeps over the mutation set.
//!
//! Sweep one stages a temp file (and backup) for every changed file without
//! renaming anything; a failure here leaves zero files changed. Sweep two
//! renames the temps over their originals in first-mention order; a failure
//! here restores every already-renamed file from its backup. Backups are
//! forced on whenever the transaction spans more than one file, so rollback
//! is never conditional for multi-file applies.

use crate::atomic;
use crate::index::FileFingerprint;
use crate::patchset::{PatchError, PatchSet, TxState};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Knobs for the apply phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    /// Keep a `.bak` sibling per written file. Forced on (but cleaned up
    /// after a full commit) when the transaction spans more than one file.
    pub use_backups: bool,
    /// Skip the per-file drift guard.
    pub force: bool,
}

/// Final disposition of one file in the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// New content is on disk.
    Written,
    /// Was renamed, then restored from its backup.
    RolledBack,
    /// Never touched.
    Unchanged,
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Written => write!(f, "written"),
            FileOutcome::RolledBack => write!(f, "rolled_back"),
            FileOutcome::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// What the apply phase did, per file, plus the first error when the
/// transaction did not fully commit.
#[derive(Debug)]
pub struct TxReport {
    pub state: TxState,
    pub files: Vec<(String, FileOutcome)>,
    pub error: Option<PatchError>,
}

impl TxReport {
    pub fn is_committed(&self) -> bool {
        self.state == TxState::Committed
    }

    pub fn outcome_for(&self, path: &str) -> Option<FileOutcome> {
        self.files
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, o)| *o)
    }

    /// Paths that ended up with new content on disk.
    pub fn written_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(_, o)| *o == FileOutcome::Written)
            .map(|(p, _)| p.as_str())
            .collect()
    }
}

impl PatchSet {
    /// Apply the transaction to disk.
    ///
    /// Returns `Err` for anything caught before the first write (validation,
    /// drift); once staging begins the per-file story is told through the
    /// [`TxReport`] instead.
    pub fn apply(&mut self, options: &ApplyOptions) -> Result<TxReport, PatchError> {
        self.apply_with(options, |from, to| std::fs::rename(from, to))
    }

    /// [`PatchSet::apply`] with the rename operation injected, so tests can
    /// force a failure partway through the rename sweep.
    pub(crate) fn apply_with<F>(
        &mut self,
        options: &ApplyOptions,
        mut rename: F,
    ) -> Result<TxReport, PatchError>
    where
        F: FnMut(&Path, &Path) -> io::Result<()>,
    {
        if self.state() == TxState::Building {
            self.validate_all()?;
        }

        if !options.force {
            for path in self.files() {
                let fresh = FileFingerprint::capture(Path::new(path))?;
                if !fresh.matches(&self.baselines[path].fingerprint) {
                    return Err(PatchError::DriftDetected { path: path.clone() });
                }
            }
        }

        self.set_state(TxState::Applying);

        // Per-file new content, with files whose content is unchanged
        // dropped from the write set entirely.
        let mut changed: Vec<(PathBuf, String)> = Vec::new();
        for path in self.files().to_vec() {
            let baseline = &self.baselines[&path];
            let new_content = self.new_content_for(&path)?;
            let restored = crate::diff::restore_newlines(&new_content, baseline.newline_mode);
            let original = crate::diff::restore_newlines(&baseline.content, baseline.newline_mode);
            if restored != original {
                changed.push((PathBuf::from(&path), restored));
            }
        }

        let backups = options.use_backups || changed.len() > 1;

        // Sweep one: back up and stage every file. No renames yet, so any
        // failure here means zero files changed.
        let mut staged: Vec<(PathBuf, NamedTempFile)> = Vec::new();
        for (path, content) in &changed {
            let stage = || -> Result<NamedTempFile, PatchError> {
                if backups {
                    atomic::create_backup(path)?;
                }
                Ok(atomic::stage_temp(path, content)?)
            };
            match stage() {
                Ok(temp) => staged.push((path.clone(), temp)),
                Err(e) => {
                    for (done, _) in &staged {
                        atomic::discard_backup(done);
                    }
                    atomic::discard_backup(path);
                    self.set_state(TxState::RolledBack);
                    return Ok(self.report(
                        TxState::RolledBack,
                        &[],
                        Some(PatchError::ValidationFailedDuringWrite {
                            path: path.to_string_lossy().into_owned(),
                            reason: e.to_string(),
                        }),
                    ));
                }
            }
        }

        // Sweep two: rename in first-mention order.
        let mut renamed: Vec<PathBuf> = Vec::new();
        for (path, temp) in &staged {
            if let Err(e) = rename(temp.path(), path.as_path()) {
                return Ok(self.rollback(&staged, &renamed, path, e, backups));
            }
            renamed.push(path.clone());
        }

        if backups && !options.use_backups {
            // Backups that were only forced for rollback safety are noise
            // once the transaction has committed.
            for (path, _) in &changed {
                atomic::discard_backup(path);
            }
        }

        self.set_state(TxState::Committed);
        Ok(self.report(TxState::Committed, &renamed, None))
    }

    /// Restore every already-renamed file from its backup after a rename
    /// failure. A file whose restore fails stays in its new state and is
    /// reported through the higher-severity `RollbackFailed` error.
    fn rollback(
        &mut self,
        staged: &[(PathBuf, NamedTempFile)],
        renamed: &[PathBuf],
        failed: &Path,
        cause: io::Error,
        backups: bool,
    ) -> TxReport {
        let mut stuck: Vec<PathBuf> = Vec::new();
        let mut restored = 0usize;
        let mut restore_failure: Option<String> = None;
        if backups {
            for path in renamed {
                match atomic::restore_backup(path) {
                    Ok(()) => restored += 1,
                    Err(e) => {
                        if restore_failure.is_none() {
                            restore_failure = Some(e.to_string());
                        }
                        stuck.push(path.clone());
                    }
                }
            }
            // Files staged but never renamed have unchanged content; their
            // sweep-one backups are leftovers.
            for (path, _) in staged {
                if !renamed.contains(path) {
                    atomic::discard_backup(path);
                }
            }
        } else {
            stuck.extend_from_slice(renamed);
        }

        let error = if let Some(path) = stuck.first() {
            PatchError::RollbackFailed {
                path: path.to_string_lossy().into_owned(),
                reason: restore_failure.unwrap_or_else(|| cause.to_string()),
            }
        } else if renamed.is_empty() {
            // Nothing had been renamed, so nothing changed on disk.
            PatchError::ValidationFailedDuringWrite {
                path: failed.to_string_lossy().into_owned(),
                reason: cause.to_string(),
            }
        } else {
            PatchError::PartiallyFailed {
                committed: stuck.len(),
                restored,
                reason: format!("rename failed for {}: {cause}", failed.display()),
            }
        };

        let state = if renamed.is_empty() {
            TxState::RolledBack
        } else {
            TxState::PartiallyFailed
        };
        self.set_state(state);

        let mut files = Vec::with_capacity(self.files().len());
        for path in self.files() {
            let p = PathBuf::from(path);
            let outcome = if stuck.contains(&p) {
                FileOutcome::Written
            } else if renamed.contains(&p) {
                FileOutcome::RolledBack
            } else {
                FileOutcome::Unchanged
            };
            files.push((path.clone(), outcome));
        }
        TxReport {
            state,
            files,
            error: Some(error),
        }
    }

    fn report(
        &self,
        state: TxState,
        written: &[PathBuf],
        error: Option<PatchError>,
    ) -> TxReport {
        let files = self
            .files()
            .iter()
            .map(|path| {
                let outcome = if written.contains(&PathBuf::from(path)) {
                    FileOutcome::Written
                } else {
                    FileOutcome::Unchanged
                };
                (path.clone(), outcome)
            })
            .collect();
        TxReport {
            state,
            files,
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atomic::backup_path;
    use crate::patchset::{FileMutation, OpKind};
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> String {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn commits_two_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a1\na2\n");
        let b = write(dir.path(), "b.txt", "b1\nb2\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "A1"));
        set.add(FileMutation::new(&b, OpKind::Delete, 2, 2, ""));
        let report = set.apply(&ApplyOptions::default()).unwrap();

        assert!(report.is_committed());
        assert_eq!(report.outcome_for(&a), Some(FileOutcome::Written));
        assert_eq!(report.outcome_for(&b), Some(FileOutcome::Written));
        assert_eq!(fs::read_to_string(&a).unwrap(), "A1\na2\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "b1\n");
        // Forced backups are cleaned up after a full commit.
        assert!(!backup_path(Path::new(&a)).exists());
        assert!(!backup_path(Path::new(&b)).exists());
    }

    #[test]
    fn requested_backups_survive_commit() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a1\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "A1"));
        let options = ApplyOptions {
            use_backups: true,
            force: false,
        };
        set.apply(&options).unwrap();

        assert_eq!(fs::read_to_string(&a).unwrap(), "A1\n");
        assert_eq!(
            fs::read_to_string(backup_path(Path::new(&a))).unwrap(),
            "a1\n"
        );
    }

    #[test]
    fn no_op_mutation_reports_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "same\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "same"));
        let report = set.apply(&ApplyOptions::default()).unwrap();

        assert!(report.is_committed());
        assert_eq!(report.outcome_for(&a), Some(FileOutcome::Unchanged));
    }

    #[test]
    fn drift_aborts_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a1\n");
        let b = write(dir.path(), "b.txt", "b1\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "A1"));
        set.add(FileMutation::new(&b, OpKind::Replace, 1, 1, "B1"));
        set.validate_all().unwrap();

        fs::write(&b, "b1 edited elsewhere\n").unwrap();

        let result = set.apply(&ApplyOptions::default());
        assert!(matches!(result, Err(PatchError::DriftDetected { .. })));
        assert_eq!(fs::read_to_string(&a).unwrap(), "a1\n");
    }

    #[test]
    fn force_overrides_drift() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a1\na2\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "A1"));
        set.validate_all().unwrap();
        // Touch the file without changing the validated range's meaning.
        fs::write(&a, "a1\na2 drifted\n").unwrap();

        let options = ApplyOptions {
            use_backups: false,
            force: true,
        };
        let report = set.apply(&options).unwrap();
        assert!(report.is_committed());
    }

    #[test]
    fn stage_failure_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a1\n");
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let b = write(&sub, "b.txt", "b1\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "A1"));
        set.add(FileMutation::new(&b, OpKind::Replace, 1, 1, "B1"));
        set.validate_all().unwrap();

        // Remove b's directory so its temp cannot be staged.
        fs::remove_dir_all(&sub).unwrap();

        let options = ApplyOptions {
            use_backups: false,
            force: true,
        };
        let report = set.apply(&options).unwrap();

        assert_eq!(report.state, TxState::RolledBack);
        assert!(matches!(
            report.error,
            Some(PatchError::ValidationFailedDuringWrite { .. })
        ));
        assert_eq!(report.outcome_for(&a), Some(FileOutcome::Unchanged));
        assert_eq!(fs::read_to_string(&a).unwrap(), "a1\n");
        assert!(!backup_path(Path::new(&a)).exists());
    }

    #[test]
    fn third_rename_failure_restores_first_two() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a original\n");
        let b = write(dir.path(), "b.txt", "b original\n");
        let c = write(dir.path(), "c.txt", "c original\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "a new"));
        set.add(FileMutation::new(&b, OpKind::Replace, 1, 1, "b new"));
        set.add(FileMutation::new(&c, OpKind::Replace, 1, 1, "c new"));

        let mut calls = 0;
        let report = set
            .apply_with(&ApplyOptions::default(), |from, to| {
                calls += 1;
                if calls == 3 {
                    return Err(io::Error::other("injected rename failure"));
                }
                fs::rename(from, to)
            })
            .unwrap();

        assert_eq!(report.state, TxState::PartiallyFailed);
        assert_eq!(report.outcome_for(&a), Some(FileOutcome::RolledBack));
        assert_eq!(report.outcome_for(&b), Some(FileOutcome::RolledBack));
        assert_eq!(report.outcome_for(&c), Some(FileOutcome::Unchanged));
        assert!(matches!(
            report.error,
            Some(PatchError::PartiallyFailed {
                committed: 0,
                restored: 2,
                ..
            })
        ));
        assert_eq!(fs::read_to_string(&a).unwrap(), "a original\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "b original\n");
        assert_eq!(fs::read_to_string(&c).unwrap(), "c original\n");

        // Restores consumed a and b's backups; c was staged but never
        // renamed, so its backup is discarded during rollback.
        assert!(!backup_path(Path::new(&a)).exists());
        assert!(!backup_path(Path::new(&b)).exists());
        assert!(!backup_path(Path::new(&c)).exists());
    }

    #[test]
    fn stuck_restore_reports_the_restore_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a original\n");
        let b = write(dir.path(), "b.txt", "b original\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "a new"));
        set.add(FileMutation::new(&b, OpKind::Replace, 1, 1, "b new"));

        // First rename succeeds but a's backup vanishes underneath the
        // transaction; the second rename fails, and the rollback cannot
        // restore a.
        let a_bak = backup_path(Path::new(&a));
        let mut calls = 0;
        let report = set
            .apply_with(&ApplyOptions::default(), |from, to| {
                calls += 1;
                if calls == 2 {
                    return Err(io::Error::other("injected rename failure"));
                }
                fs::rename(from, to)?;
                fs::remove_file(&a_bak)
            })
            .unwrap();

        assert_eq!(report.outcome_for(&a), Some(FileOutcome::Written));
        match report.error {
            Some(PatchError::RollbackFailed { ref path, ref reason }) => {
                assert!(path.ends_with("a.txt"));
                assert!(reason.contains("No backup found"), "got reason {reason:?}");
            }
            ref other => panic!("expected RollbackFailed, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&a).unwrap(), "a new\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "b original\n");
    }

    #[test]
    fn first_rename_failure_is_a_clean_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.txt", "a original\n");
        let b = write(dir.path(), "b.txt", "b original\n");

        let mut set = PatchSet::new();
        set.add(FileMutation::new(&a, OpKind::Replace, 1, 1, "a new"));
        set.add(FileMutation::new(&b, OpKind::Replace, 1, 1, "b new"));

        let report = set
            .apply_with(&ApplyOptions::default(), |_, _| {
                Err(io::Error::other("injected rename failure"))
            })
            .unwrap();

        assert_eq!(report.state, TxState::RolledBack);
        assert_eq!(report.written_files().len(), 0);
        assert_eq!(fs::read_to_string(&a).unwrap(), "a original\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "b original\n");
    }
}
