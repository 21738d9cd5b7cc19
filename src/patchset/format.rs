//! Mutation description formats: the line-oriented simple format and the
//! JSON list form.

use crate::patchset::PatchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a mutation does to its line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Replace,
    Insert,
    Delete,
}

impl OpKind {
    fn parse(token: &str) -> Option<OpKind> {
        match token {
            "replace" => Some(OpKind::Replace),
            "insert" => Some(OpKind::Insert),
            "delete" => Some(OpKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Replace => write!(f, "replace"),
            OpKind::Insert => write!(f, "insert"),
            OpKind::Delete => write!(f, "delete"),
        }
    }
}

/// One mutation against one file. Line numbers are 1-indexed, inclusive,
/// and always refer to the file's content before the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMutation {
    pub file_path: String,
    #[serde(rename = "operation_kind")]
    pub op: OpKind,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(default)]
    pub text: String,
    /// Free text for human-facing reports only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FileMutation {
    pub fn new(
        file_path: impl Into<String>,
        op: OpKind,
        start_line: usize,
        end_line: usize,
        text: impl Into<String>,
    ) -> Self {
        FileMutation {
            file_path: file_path.into(),
            op,
            start_line,
            end_line,
            text: text.into(),
            description: None,
        }
    }

    /// Short form for conflict and status messages.
    pub fn summary(&self) -> String {
        format!("{} {}-{}", self.op, self.start_line, self.end_line)
    }
}

/// Parse the line-oriented simple format: one mutation per line,
/// `path:op:start:end[:text]`. Blank lines and `#` comments are skipped.
/// The text field is everything after the fourth colon, so it may itself
/// contain colons; escaped `\n` sequences become real newlines.
pub fn parse_simple(input: &str) -> Result<Vec<FileMutation>, PatchError> {
    let mut mutations = Vec::new();

    for (number, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.splitn(5, ':');
        let path = parts.next().unwrap_or_default();
        let op_token = parts.next().unwrap_or_default();
        let start_token = parts.next().unwrap_or_default();
        let end_token = parts.next().unwrap_or_default();
        let text = parts.next().unwrap_or_default();

        let invalid = |reason: String| PatchError::InvalidFormat {
            line: number + 1,
            reason,
        };

        if path.is_empty() {
            return Err(invalid("missing file path".to_string()));
        }
        let op = OpKind::parse(op_token).ok_or_else(|| {
            invalid(format!(
                "unknown operation '{op_token}' (expected replace, insert, or delete)"
            ))
        })?;
        let start_line: usize = start_token
            .parse()
            .map_err(|_| invalid(format!("'{start_token}' is not a line number")))?;
        let end_line: usize = end_token
            .parse()
            .map_err(|_| invalid(format!("'{end_token}' is not a line number")))?;

        mutations.push(FileMutation {
            file_path: path.to_string(),
            op,
            start_line,
            end_line,
            text: text.replace("\\n", "\n"),
            description: None,
        });
    }

    Ok(mutations)
}

/// Parse the JSON list form.
pub fn parse_json(input: &str) -> Result<Vec<FileMutation>, PatchError> {
    serde_json::from_str(input).map_err(|e| PatchError::InvalidFormat {
        line: e.line(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_format_round() {
        let input = "\
# update the intro
doc.md:replace:3:5:New intro line
src/lib.rs:delete:10:12

doc.md:insert:1:1:Header\\nSecond line
";
        let mutations = parse_simple(input).unwrap();
        assert_eq!(mutations.len(), 3);
        assert_eq!(mutations[0].file_path, "doc.md");
        assert_eq!(mutations[0].op, OpKind::Replace);
        assert_eq!(mutations[0].start_line, 3);
        assert_eq!(mutations[0].end_line, 5);
        assert_eq!(mutations[0].text, "New intro line");
        assert_eq!(mutations[1].op, OpKind::Delete);
        assert_eq!(mutations[1].text, "");
        assert_eq!(mutations[2].text, "Header\nSecond line");
    }

    #[test]
    fn simple_format_bad_operation() {
        let result = parse_simple("doc.md:rewrite:1:2:x");
        match result {
            Err(PatchError::InvalidFormat { line, reason }) => {
                assert_eq!(line, 1);
                assert!(reason.contains("rewrite"));
            }
            other => panic!("expected InvalidFormat, got {other:?}"),
        }
    }

    #[test]
    fn simple_format_bad_line_number() {
        let result = parse_simple("doc.md:replace:three:5:x");
        assert!(matches!(result, Err(PatchError::InvalidFormat { .. })));
    }

    #[test]
    fn json_list() {
        let input = r#"[
            {"file_path": "doc.md", "operation_kind": "replace",
             "start_line": 3, "end_line": 5, "text": "new\n",
             "description": "update intro"},
            {"file_path": "b.rs", "operation_kind": "delete",
             "start_line": 5, "end_line": 5}
        ]"#;
        let mutations = parse_json(input).unwrap();
        assert_eq!(mutations.len(), 2);
        assert_eq!(mutations[0].description.as_deref(), Some("update intro"));
        assert_eq!(mutations[1].op, OpKind::Delete);
        assert_eq!(mutations[1].text, "");
    }

    #[test]
    fn json_rejects_unknown_operation() {
        let input = r#"[{"file_path": "a", "operation_kind": "merge",
                         "start_line": 1, "end_line": 1, "text": ""}]"#;
        assert!(matches!(
            parse_json(input),
            Err(PatchError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn mutation_summary() {
        let m = FileMutation::new("doc.md", OpKind::Replace, 3, 5, "x");
        assert_eq!(m.summary(), "replace 3-5");
    }
}
