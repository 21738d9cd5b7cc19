//! Selector grammar parsing.
//!
//! Forms: `<bare>` (node id or fuzzy name), `<path>:<line>`,
//! `<path>:<line>-<line>`, `<path>:<kind>:<name>`. A single-colon selector
//! is a line form only when the trailing token is an integer or an integer
//! range; that colon-count heuristic means purely numeric kind tags are not
//! addressable through the single-colon form and are unsupported.

use crate::resolve::ResolveError;

/// Parsed shape of a selector string. The resolver decides between the id
/// and fuzzy readings of `Bare` at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// No qualifier: tried as an exact node id first, then as a fuzzy name.
    Bare(String),
    /// `path:line` or `path:start-end` (1-indexed, inclusive).
    Lines {
        path: String,
        start_line: usize,
        end_line: usize,
    },
    /// `path:kind:name`. The name may itself contain colons and `/`-nested
    /// ancestry segments.
    PathKindName {
        path: String,
        kind: String,
        name: String,
    },
}

impl Selector {
    /// Parse a selector string into its grammatical form.
    pub fn parse(selector: &str) -> Result<Selector, ResolveError> {
        let trimmed = selector.trim();
        if trimmed.is_empty() {
            return Err(ResolveError::InvalidSyntax {
                selector: selector.to_string(),
                reason: "empty selector".to_string(),
            });
        }

        match trimmed.matches(':').count() {
            0 => Ok(Selector::Bare(trimmed.to_string())),
            1 => {
                let Some((path, spec)) = trimmed.rsplit_once(':') else {
                    unreachable!("colon counted above");
                };
                match parse_line_spec(spec) {
                    Some((start_line, end_line)) => Ok(Selector::Lines {
                        path: path.to_string(),
                        start_line,
                        end_line,
                    }),
                    None => Err(ResolveError::InvalidSyntax {
                        selector: selector.to_string(),
                        reason: format!(
                            "'{spec}' is not a line or line range; \
                             use path:kind:name for node selectors"
                        ),
                    }),
                }
            }
            _ => {
                let mut parts = trimmed.splitn(3, ':');
                let path = parts.next().unwrap_or_default();
                let kind = parts.next().unwrap_or_default();
                let name = parts.next().unwrap_or_default();
                if path.is_empty() || kind.is_empty() || name.is_empty() {
                    return Err(ResolveError::InvalidSyntax {
                        selector: selector.to_string(),
                        reason: "path, kind, and name must all be non-empty".to_string(),
                    });
                }
                Ok(Selector::PathKindName {
                    path: path.to_string(),
                    kind: kind.to_string(),
                    name: name.to_string(),
                })
            }
        }
    }
}

/// Parse `42` or `42-50` into a 1-indexed inclusive range. Zero and
/// inverted ranges are rejected.
fn parse_line_spec(spec: &str) -> Option<(usize, usize)> {
    if let Some((a, b)) = spec.split_once('-') {
        let start: usize = a.parse().ok()?;
        let end: usize = b.parse().ok()?;
        if start == 0 || end == 0 || start > end {
            return None;
        }
        Some((start, end))
    } else {
        let line: usize = spec.parse().ok()?;
        if line == 0 {
            return None;
        }
        Some((line, line))
    }
}
