//! Single-file mutation: replace, insert, and delete against an in-memory
//! buffer, with a drift guard between indexing and writing.
//!
//! The editor never writes as a side effect of a mutation. Every operation
//! recomputes the buffer; [`Editor::write`] is the separate, explicit commit
//! step, and stopping before it is the dry run.

use crate::atomic::{self, WriteError};
use crate::diff::{self, NewlineMode};
use crate::index::{FileFingerprint, FileIndex, IndexError};
use crate::node::Node;
use crate::resolve::Target;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Node '{name}' belongs to {node_path}, not {editor_path}")]
    NodeFileMismatch {
        name: String,
        node_path: String,
        editor_path: String,
    },

    #[error("Invalid range {start_line}-{end_line} for {path} ({file_lines} lines)")]
    InvalidRange {
        path: String,
        start_line: usize,
        end_line: usize,
        file_lines: usize,
    },

    #[error(
        "File {path} changed on disk since indexing (drift detected); \
         re-index or pass force to override"
    )]
    DriftDetected { path: String },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Where to insert text relative to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    /// The line before the node's first line.
    Before,
    /// The line after the node's last line.
    After,
    /// Just inside the node, after its first line.
    InsideStart,
    /// Just inside the node, before its last line.
    InsideEnd,
}

/// Line-level primitive shared by the editor and the patch coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineOp {
    Replace,
    Insert,
    Delete,
}

/// Out-of-bounds or inverted line range.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RangeViolation {
    pub start_line: usize,
    pub end_line: usize,
    pub file_lines: usize,
}

/// Apply one line-range operation to LF-normalized content. Lines are
/// 1-indexed and inclusive; inserts happen before `start_line`, and an
/// insert at `file_lines + 1` appends. Replacement text that does not end
/// in a newline gets one, preserving the file's trailing-newline
/// discipline.
pub(crate) fn apply_line_op(
    content: &str,
    op: LineOp,
    start_line: usize,
    end_line: usize,
    text: &str,
) -> Result<String, RangeViolation> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let file_lines = lines.len();
    let violation = RangeViolation {
        start_line,
        end_line,
        file_lines,
    };

    let max_start = match op {
        LineOp::Insert => file_lines + 1,
        _ => file_lines,
    };
    if start_line == 0 || start_line > end_line || start_line > max_start.max(1) {
        return Err(violation);
    }
    if op != LineOp::Insert && end_line > file_lines {
        return Err(violation);
    }

    let start_idx = start_line - 1;
    let mut out = String::with_capacity(content.len() + text.len());
    out.extend(lines[..start_idx.min(file_lines)].iter().copied());

    if op != LineOp::Delete && !text.is_empty() {
        out.push_str(text);
        if !text.ends_with('\n') {
            out.push('\n');
        }
    }

    let tail_idx = match op {
        LineOp::Insert => start_idx,
        LineOp::Replace | LineOp::Delete => end_line,
    };
    out.extend(lines[tail_idx.min(file_lines)..].iter().copied());

    Ok(out)
}

/// Mutates one file's content in memory.
pub struct Editor {
    path: PathBuf,
    path_str: String,
    indexed_fingerprint: FileFingerprint,
    original: String,
    current: String,
    newline_mode: NewlineMode,
}

impl Editor {
    /// Open an editor for the file behind an index. The index's fingerprint
    /// becomes the drift baseline.
    pub fn open(index: &FileIndex) -> Result<Self, EditorError> {
        let path = PathBuf::from(&index.path);
        let original = std::fs::read_to_string(&path).map_err(|source| {
            IndexError::Read {
                path: path.clone(),
                source,
            }
        })?;
        let (current, newline_mode) = diff::normalize_newlines(&original);
        Ok(Editor {
            path,
            path_str: index.path.clone(),
            indexed_fingerprint: index.fingerprint.clone(),
            original,
            current,
            newline_mode,
        })
    }

    /// Replace the target's extent with `text`.
    pub fn replace(&mut self, target: &Target, text: &str) -> Result<(), EditorError> {
        self.check_target(target)?;
        let (start, end) = target.line_range();
        self.splice(LineOp::Replace, start, end, text)
    }

    /// Insert `text` relative to a node.
    pub fn insert_relative(
        &mut self,
        node: &Node,
        position: InsertPosition,
        text: &str,
    ) -> Result<(), EditorError> {
        self.check_node(node)?;
        let line = match position {
            InsertPosition::Before => node.start_line,
            InsertPosition::After => node.end_line + 1,
            InsertPosition::InsideStart => node.start_line + 1,
            InsertPosition::InsideEnd => node.end_line,
        };
        self.splice(LineOp::Insert, line, line, text)
    }

    /// Insert `text` before the given 1-indexed line. A line past the end
    /// of the file appends at end-of-file.
    pub fn insert_at_line(&mut self, line: usize, text: &str) -> Result<(), EditorError> {
        let line = line.max(1).min(self.line_count() + 1);
        self.splice(LineOp::Insert, line, line, text)
    }

    /// Delete the target's extent. Deleting a node that spans the whole
    /// file yields empty content.
    pub fn delete(&mut self, target: &Target) -> Result<(), EditorError> {
        self.check_target(target)?;
        let (start, end) = target.line_range();
        self.splice(LineOp::Delete, start, end, "")
    }

    /// The working buffer (LF-normalized).
    pub fn content(&self) -> &str {
        &self.current
    }

    /// The content that would be written: working buffer with the file's
    /// original newline convention restored.
    pub fn final_content(&self) -> String {
        diff::restore_newlines(&self.current, self.newline_mode)
    }

    /// Unified diff from the on-disk original to the current buffer.
    pub fn diff(&self) -> String {
        diff::unified_diff(&self.original, &self.final_content(), &self.path_str)
    }

    pub fn is_modified(&self) -> bool {
        self.final_content() != self.original
    }

    /// Discard all buffered mutations.
    pub fn reset(&mut self) {
        let (normalized, _) = diff::normalize_newlines(&self.original);
        self.current = normalized;
    }

    /// Commit the buffer to disk atomically.
    ///
    /// Re-fingerprints the file first: if it no longer matches the
    /// fingerprint captured at indexing, the write fails with
    /// [`EditorError::DriftDetected`] unless `force` is set. This is a
    /// best-effort optimistic check, not a lock against external writers.
    pub fn write(&self, force: bool, backup: bool) -> Result<(), EditorError> {
        if !force {
            let fresh = FileFingerprint::capture(&self.path)?;
            if !fresh.matches(&self.indexed_fingerprint) {
                return Err(EditorError::DriftDetected {
                    path: self.path_str.clone(),
                });
            }
        }
        atomic::write_atomic(&self.path, &self.final_content(), backup)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn line_count(&self) -> usize {
        self.current.split_inclusive('\n').count()
    }

    fn check_target(&self, target: &Target) -> Result<(), EditorError> {
        if let Target::Node(node) = target {
            self.check_node(node)?;
        }
        Ok(())
    }

    fn check_node(&self, node: &Node) -> Result<(), EditorError> {
        if node.path != self.path_str && !Path::new(&node.path).ends_with(&self.path_str) {
            return Err(EditorError::NodeFileMismatch {
                name: node.name.clone(),
                node_path: node.path.clone(),
                editor_path: self.path_str.clone(),
            });
        }
        Ok(())
    }

    fn splice(
        &mut self,
        op: LineOp,
        start_line: usize,
        end_line: usize,
        text: &str,
    ) -> Result<(), EditorError> {
        match apply_line_op(&self.current, op, start_line, end_line, text) {
            Ok(updated) => {
                self.current = updated;
                Ok(())
            }
            Err(violation) => Err(EditorError::InvalidRange {
                path: self.path_str.clone(),
                start_line: violation.start_line,
                end_line: violation.end_line,
                file_lines: violation.file_lines,
            }),
        }
    }
}
