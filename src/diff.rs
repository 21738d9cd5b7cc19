//! Unified diff generation and re-application.
//!
//! All comparison happens on LF-normalized content. The file's original
//! line-ending convention is detected at read time and restored only when
//! content is written back to disk.

use similar::TextDiff;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffError {
    #[error("Malformed hunk header: {0}")]
    MalformedHunk(String),

    #[error("Hunk does not apply at line {line}: expected {expected:?}, found {found:?}")]
    HunkMismatch {
        line: usize,
        expected: String,
        found: String,
    },
}

/// Line-ending convention of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewlineMode {
    Lf,
    Crlf,
}

/// Normalize CRLF to LF, remembering the original convention.
pub fn normalize_newlines(content: &str) -> (String, NewlineMode) {
    if content.contains("\r\n") {
        (content.replace("\r\n", "\n"), NewlineMode::Crlf)
    } else {
        (content.to_string(), NewlineMode::Lf)
    }
}

/// Restore the original line-ending convention before writing to disk.
pub fn restore_newlines(content: &str, mode: NewlineMode) -> String {
    match mode {
        NewlineMode::Crlf => content.replace('\n', "\r\n"),
        NewlineMode::Lf => content.to_string(),
    }
}

/// Generate a unified diff between two whole-file contents, with standard
/// `a/` and `b/` headers and three lines of context.
pub fn unified_diff(original: &str, modified: &str, file_path: &str) -> String {
    TextDiff::from_lines(original, modified)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{file_path}"), &format!("b/{file_path}"))
        .to_string()
}

/// Apply a unified diff produced by [`unified_diff`] back onto the original
/// content. Round-trip guarantee: `apply_unified(orig, unified_diff(orig, new))`
/// reproduces `new` exactly.
pub fn apply_unified(original: &str, diff: &str) -> Result<String, DiffError> {
    let orig_lines: Vec<&str> = original.split_inclusive('\n').collect();
    let mut out = String::new();
    // 0-indexed cursor into orig_lines
    let mut cursor = 0usize;
    let mut last_tag = ' ';

    for line in diff.lines() {
        if line.starts_with("---") || line.starts_with("+++") {
            continue;
        }
        if let Some(header) = line.strip_prefix("@@") {
            let (old_start, old_count) = parse_hunk_old_range(header)
                .ok_or_else(|| DiffError::MalformedHunk(line.to_string()))?;
            // Copy unchanged lines up to the hunk start. A zero-count old
            // range names the line the insertion follows, not the first
            // line of the hunk.
            let target = if old_count == 0 {
                old_start
            } else {
                old_start.saturating_sub(1)
            };
            while cursor < target && cursor < orig_lines.len() {
                out.push_str(orig_lines[cursor]);
                cursor += 1;
            }
            continue;
        }

        match line.chars().next() {
            Some(' ') | None => {
                let expected = &line[line.len().min(1)..];
                let found = orig_lines.get(cursor).copied().unwrap_or("");
                if found.trim_end_matches('\n').trim_end_matches('\r') != expected {
                    return Err(DiffError::HunkMismatch {
                        line: cursor + 1,
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
                out.push_str(found);
                cursor += 1;
                last_tag = ' ';
            }
            Some('-') => {
                let expected = &line[1..];
                let found = orig_lines.get(cursor).copied().unwrap_or("");
                if found.trim_end_matches('\n').trim_end_matches('\r') != expected {
                    return Err(DiffError::HunkMismatch {
                        line: cursor + 1,
                        expected: expected.to_string(),
                        found: found.to_string(),
                    });
                }
                cursor += 1;
                last_tag = '-';
            }
            Some('+') => {
                out.push_str(&line[1..]);
                out.push('\n');
                last_tag = '+';
            }
            Some('\\') => {
                // "\ No newline at end of file". Added lines always get a
                // newline above, so strip it; context lines were copied raw
                // and removed lines emitted nothing, so those need no fix.
                if last_tag == '+' && out.ends_with('\n') {
                    out.pop();
                }
            }
            _ => {}
        }
    }

    // Copy the tail after the last hunk.
    while cursor < orig_lines.len() {
        out.push_str(orig_lines[cursor]);
        cursor += 1;
    }

    Ok(out)
}

/// Parse the old-file (start, count) out of a `@@ -l,s +l,s @@` header.
fn parse_hunk_old_range(header: &str) -> Option<(usize, usize)> {
    let header = header.trim();
    let old = header.split_whitespace().next()?.strip_prefix('-')?;
    let mut parts = old.split(',');
    let start = parts.next()?.parse().ok()?;
    let count = match parts.next() {
        Some(c) => c.parse().ok()?,
        None => 1,
    };
    Some((start, count))
}

/// One-line human summary of a unified diff: file count and +/- totals.
pub fn diff_summary(diff: &str) -> String {
    let mut files = 0usize;
    let mut added = 0usize;
    let mut removed = 0usize;

    for line in diff.lines() {
        if line.starts_with("+++") {
            files += 1;
        } else if line.starts_with('+') {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            removed += 1;
        }
    }

    format!("{files} file(s), +{added} -{removed} lines")
}
