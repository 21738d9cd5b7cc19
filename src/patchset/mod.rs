//! Multi-file transactions: a set of line mutations validated as a whole
//! and applied atomically, with backup-based rollback.
//!
//! State machine: Building -> Validated -> Previewed -> Applying ->
//! {Committed | RolledBack | PartiallyFailed}. Nothing touches disk before
//! the apply phase, and the apply phase stages every file's temp before the
//! first rename, so a transaction either commits every file or restores
//! what it changed.

pub mod apply;
pub mod format;

pub use apply::{ApplyOptions, FileOutcome, TxReport};
pub use format::{FileMutation, OpKind};

use crate::diff::{self, NewlineMode};
use crate::editor::{self, LineOp};
use crate::index::{FileFingerprint, FileIndex, IndexError};
use crate::atomic::WriteError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("Patch set contains no mutations")]
    Empty,

    #[error("Invalid mutation at line {line}: {reason}")]
    InvalidFormat { line: usize, reason: String },

    #[error("Invalid range {start_line}-{end_line} for {path} ({file_lines} lines)")]
    InvalidRange {
        path: String,
        start_line: usize,
        end_line: usize,
        file_lines: usize,
    },

    #[error("Conflicting mutations in {path}: '{first}' overlaps '{second}'")]
    ConflictingMutations {
        path: String,
        first: String,
        second: String,
    },

    #[error(
        "File {path} changed on disk since validation (drift detected); \
         re-validate or pass force to override"
    )]
    DriftDetected { path: String },

    #[error("Staging failed for {path}: {reason}; no files were changed")]
    ValidationFailedDuringWrite { path: String, reason: String },

    #[error("Transaction partially failed: {committed} written, {restored} restored ({reason})")]
    PartiallyFailed {
        committed: usize,
        restored: usize,
        reason: String,
    },

    #[error(
        "Rollback failed for {path}: {reason}; the file is left in its new \
         state and its .bak sibling holds the original"
    )]
    RollbackFailed { path: String, reason: String },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Transaction lifecycle. Terminal states are only reached through
/// [`PatchSet::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Building,
    Validated,
    Previewed,
    Applying,
    Committed,
    RolledBack,
    PartiallyFailed,
}

/// Computed result for one file, before any write.
#[derive(Debug, Clone)]
pub struct FilePreview {
    pub path: String,
    pub new_content: String,
    pub diff: String,
}

/// Original state of a file captured at validation time. The fingerprint is
/// the drift baseline for the apply phase.
#[derive(Debug, Clone)]
pub(crate) struct Baseline {
    pub(crate) content: String,
    pub(crate) newline_mode: NewlineMode,
    pub(crate) fingerprint: FileFingerprint,
}

/// A set of mutations applied as one transaction.
pub struct PatchSet {
    mutations: Vec<FileMutation>,
    state: TxState,
    /// Files in first-mention order; sweeps preserve it.
    pub(crate) file_order: Vec<String>,
    pub(crate) baselines: HashMap<String, Baseline>,
}

impl PatchSet {
    pub fn new() -> Self {
        PatchSet {
            mutations: Vec::new(),
            state: TxState::Building,
            file_order: Vec::new(),
            baselines: HashMap::new(),
        }
    }

    /// Build a set from the line-oriented simple format.
    pub fn from_simple(input: &str) -> Result<Self, PatchError> {
        let mut set = PatchSet::new();
        for mutation in format::parse_simple(input)? {
            set.add(mutation);
        }
        Ok(set)
    }

    /// Build a set from the JSON list form.
    pub fn from_json(input: &str) -> Result<Self, PatchError> {
        let mut set = PatchSet::new();
        for mutation in format::parse_json(input)? {
            set.add(mutation);
        }
        Ok(set)
    }

    /// Add a mutation. Drops the set back to Building; it must be
    /// re-validated before the next preview or apply.
    pub fn add(&mut self, mutation: FileMutation) {
        if !self.file_order.contains(&mutation.file_path) {
            self.file_order.push(mutation.file_path.clone());
        }
        self.mutations.push(mutation);
        self.state = TxState::Building;
        self.baselines.clear();
    }

    pub fn mutations(&self) -> &[FileMutation] {
        &self.mutations
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Files the transaction touches, in first-mention order.
    pub fn files(&self) -> &[String] {
        &self.file_order
    }

    /// Validate every mutation against the files on disk. Any single
    /// failure aborts the whole transaction before anything is written;
    /// this ordering is the multi-file atomicity guarantee.
    ///
    /// Checks: the file exists and is readable, every range lies within
    /// the file (inserts may point one line past the end), and no two
    /// mutations overlap within a file. The overlap check is pairwise and
    /// commutative, so mutation order never affects the verdict.
    pub fn validate_all(&mut self) -> Result<(), PatchError> {
        if self.mutations.is_empty() {
            return Err(PatchError::Empty);
        }

        self.baselines.clear();
        for path in &self.file_order {
            self.baselines
                .insert(path.clone(), read_baseline(Path::new(path))?);
        }

        for mutation in &self.mutations {
            let baseline = &self.baselines[&mutation.file_path];
            let file_lines = count_lines(&baseline.content);
            let max_start = match mutation.op {
                OpKind::Insert => file_lines + 1,
                _ => file_lines,
            };
            let out_of_bounds = mutation.start_line == 0
                || mutation.start_line > mutation.end_line
                || mutation.start_line > max_start.max(1)
                || match mutation.op {
                    // Inserts target a point, not a span; a wider range
                    // would block unrelated lines in the overlap check.
                    OpKind::Insert => mutation.end_line != mutation.start_line,
                    _ => mutation.end_line > file_lines,
                };
            if out_of_bounds {
                return Err(PatchError::InvalidRange {
                    path: mutation.file_path.clone(),
                    start_line: mutation.start_line,
                    end_line: mutation.end_line,
                    file_lines,
                });
            }
        }

        for (i, a) in self.mutations.iter().enumerate() {
            for b in &self.mutations[i + 1..] {
                if a.file_path != b.file_path {
                    continue;
                }
                if a.start_line <= b.end_line && b.start_line <= a.end_line {
                    return Err(PatchError::ConflictingMutations {
                        path: a.file_path.clone(),
                        first: a.summary(),
                        second: b.summary(),
                    });
                }
            }
        }

        self.state = TxState::Validated;
        Ok(())
    }

    /// Compute each file's new content and diff without writing anything.
    /// This is the default mode: inspecting the preview and stopping is
    /// how a transaction is cancelled.
    pub fn preview(&mut self) -> Result<Vec<FilePreview>, PatchError> {
        if self.state == TxState::Building {
            self.validate_all()?;
        }

        let mut previews = Vec::with_capacity(self.file_order.len());
        for path in &self.file_order {
            let baseline = &self.baselines[path];
            let new_content = self.new_content_for(path)?;
            let restored = diff::restore_newlines(&new_content, baseline.newline_mode);
            let original = diff::restore_newlines(&baseline.content, baseline.newline_mode);
            previews.push(FilePreview {
                path: path.clone(),
                diff: diff::unified_diff(&original, &restored, path),
                new_content: restored,
            });
        }

        self.state = TxState::Previewed;
        Ok(previews)
    }

    /// Apply this file's mutations to its baseline. Mutations run in
    /// descending start order so each one still sees original line
    /// numbers.
    pub(crate) fn new_content_for(&self, path: &str) -> Result<String, PatchError> {
        let baseline = &self.baselines[path];
        let mut ordered: Vec<&FileMutation> = self
            .mutations
            .iter()
            .filter(|m| m.file_path == path)
            .collect();
        ordered.sort_by(|a, b| b.start_line.cmp(&a.start_line));

        let mut content = baseline.content.clone();
        for mutation in ordered {
            let op = match mutation.op {
                OpKind::Replace => LineOp::Replace,
                OpKind::Insert => LineOp::Insert,
                OpKind::Delete => LineOp::Delete,
            };
            content = editor::apply_line_op(
                &content,
                op,
                mutation.start_line,
                mutation.end_line,
                &mutation.text,
            )
            .map_err(|v| PatchError::InvalidRange {
                path: path.to_string(),
                start_line: v.start_line,
                end_line: v.end_line,
                file_lines: v.file_lines,
            })?;
        }
        Ok(content)
    }

    pub(crate) fn set_state(&mut self, state: TxState) {
        self.state = state;
    }
}

impl Default for PatchSet {
    fn default() -> Self {
        Self::new()
    }
}

fn read_baseline(path: &Path) -> Result<Baseline, PatchError> {
    let raw = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            IndexError::FileNotFound(path.to_path_buf())
        } else {
            IndexError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let fingerprint = FileFingerprint::capture(path)?;
    let (content, newline_mode) = diff::normalize_newlines(&raw);
    Ok(Baseline {
        content,
        newline_mode,
        fingerprint,
    })
}

fn count_lines(content: &str) -> usize {
    content.split_inclusive('\n').count()
}

/// Convenience: index the files a validated set touches, so callers can
/// report node context alongside the preview.
pub fn indices_for(set: &PatchSet) -> Result<HashMap<String, FileIndex>, IndexError> {
    let paths: Vec<PathBuf> = set.files().iter().map(PathBuf::from).collect();
    crate::index::Indexer::new().index_files(&paths)
}
