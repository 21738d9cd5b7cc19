//! Selector resolution: mapping a reference string to zero, one, or many
//! nodes across the indexed files.
//!
//! # Hard Rules (Never Violate)
//!
//! 1. Never silently pick among multiple candidates. Two equally valid
//!    matches are an [`ResolveError::Ambiguous`] carrying the ranked list.
//! 2. Candidate ordering is deterministic: (descending score, ascending
//!    path, ascending start line). Node identity is never used for
//!    ordering.

mod selector;

pub use selector::Selector;

use crate::index::FileIndex;
use crate::node::{Node, NodeId};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Fuzzy candidates below this similarity are discarded.
const FUZZY_THRESHOLD: f64 = 0.6;
/// Ambiguous fuzzy results are truncated to this many candidates.
const FUZZY_TOP_N: usize = 10;

/// A ranked candidate surfaced by an ambiguous resolution.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub node: Node,
    pub score: f64,
    /// Qualified context for disambiguation: the parent node's name, if any.
    pub parent_name: Option<String>,
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} (lines {}-{}",
            self.node.path, self.node.kind, self.node.name, self.node.start_line, self.node.end_line
        )?;
        if let Some(parent) = &self.parent_name {
            write!(f, ", in {parent}")?;
        }
        write!(f, ")")
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No node found for selector '{selector}'{}", hint.as_deref().map(|h| format!(" ({h})")).unwrap_or_default())]
    NotFound {
        selector: String,
        hint: Option<String>,
    },

    #[error("Selector '{selector}' is ambiguous: {} candidates", candidates.len())]
    Ambiguous {
        selector: String,
        candidates: Vec<Candidate>,
    },

    #[error("Invalid selector syntax '{selector}': {reason}")]
    InvalidSyntax { selector: String, reason: String },
}

/// What a selector resolved to.
#[derive(Debug, Clone)]
pub enum Target {
    /// A unique structural node.
    Node(Node),
    /// An explicit line range with no (or no unique need for a) node.
    /// Line-based mutations do not require structural nodes; `enclosing`
    /// carries the nearest indexed nodes for error-message context.
    Lines {
        path: String,
        start_line: usize,
        end_line: usize,
        enclosing: Vec<Node>,
    },
}

impl Target {
    pub fn path(&self) -> &str {
        match self {
            Target::Node(node) => &node.path,
            Target::Lines { path, .. } => path,
        }
    }

    pub fn line_range(&self) -> (usize, usize) {
        match self {
            Target::Node(node) => (node.start_line, node.end_line),
            Target::Lines {
                start_line,
                end_line,
                ..
            } => (*start_line, *end_line),
        }
    }
}

/// Resolves selector strings against a set of file indexes.
pub struct Resolver<'a> {
    indices: &'a HashMap<String, FileIndex>,
    by_id: HashMap<&'a NodeId, &'a Node>,
}

impl<'a> Resolver<'a> {
    pub fn new(indices: &'a HashMap<String, FileIndex>) -> Self {
        let mut by_id = HashMap::new();
        for index in indices.values() {
            for node in index.nodes() {
                by_id.insert(&node.id, node);
            }
        }
        Resolver { indices, by_id }
    }

    /// Resolve a selector string to a unique target.
    ///
    /// Form priority when the shape is ambiguous: exact id, then line or
    /// line-range, then path:kind:name, then fuzzy name.
    pub fn resolve(&self, selector: &str) -> Result<Target, ResolveError> {
        match Selector::parse(selector)? {
            Selector::Bare(bare) => {
                let id = NodeId::from_raw(bare.clone());
                if let Some(node) = self.by_id.get(&id) {
                    return Ok(Target::Node((*node).clone()));
                }
                self.resolve_fuzzy(selector, &bare)
            }
            Selector::Lines {
                path,
                start_line,
                end_line,
            } => self.resolve_lines(selector, &path, start_line, end_line),
            Selector::PathKindName { path, kind, name } => {
                self.resolve_path_kind_name(selector, &path, &kind, &name)
            }
        }
    }

    fn index_for(&self, path: &str) -> Option<&'a FileIndex> {
        if let Some(index) = self.indices.get(path) {
            return Some(index);
        }
        // Tolerate prefix differences: "doc.md" matches an index stored as
        // "workdir/doc.md" as long as whole components line up.
        self.indices
            .values()
            .find(|index| Path::new(&index.path).ends_with(path))
    }

    fn resolve_path_kind_name(
        &self,
        selector: &str,
        path: &str,
        kind: &str,
        name: &str,
    ) -> Result<Target, ResolveError> {
        let index = self.index_for(path).ok_or_else(|| ResolveError::NotFound {
            selector: selector.to_string(),
            hint: Some(format!("file not indexed: {path}")),
        })?;

        let name_parts: Vec<&str> = name.split('/').collect();
        let nested = name_parts.len() > 1;

        let mut matches: Vec<&Node> = index
            .nodes()
            .iter()
            .filter(|node| node.kind == kind)
            .filter(|node| {
                if nested {
                    self.matches_ancestry(index, node, &name_parts)
                } else {
                    node.name == name
                }
            })
            .collect();

        match matches.len() {
            0 => {
                let kinds: Vec<&str> = index
                    .nodes()
                    .iter()
                    .filter(|n| {
                        n.name == name
                            || (nested && name_parts.last().is_some_and(|last| n.name == *last))
                    })
                    .map(|n| n.kind.as_str())
                    .collect();
                let hint = if kinds.is_empty() {
                    format!("no '{kind}' named '{name}' in {path}")
                } else {
                    format!("'{name}' exists in {path} with kind(s): {}", kinds.join(", "))
                };
                Err(ResolveError::NotFound {
                    selector: selector.to_string(),
                    hint: Some(hint),
                })
            }
            1 => Ok(Target::Node(matches.remove(0).clone())),
            _ => Err(self.ambiguous(
                selector,
                matches
                    .into_iter()
                    .map(|node| self.candidate(node, 1.0))
                    .collect(),
            )),
        }
    }

    /// Match a `Parent/Child` nested name against the node's ancestry chain.
    fn matches_ancestry(&self, index: &FileIndex, node: &Node, name_parts: &[&str]) -> bool {
        let chain = index.tree_path(node);
        if chain.len() < name_parts.len() {
            return false;
        }
        chain
            .iter()
            .rev()
            .zip(name_parts.iter().rev())
            .all(|(ancestor, part)| ancestor.name == *part)
    }

    fn resolve_lines(
        &self,
        selector: &str,
        path: &str,
        start_line: usize,
        end_line: usize,
    ) -> Result<Target, ResolveError> {
        let index = self.index_for(path).ok_or_else(|| ResolveError::NotFound {
            selector: selector.to_string(),
            hint: Some(format!("file not indexed: {path}")),
        })?;

        let overlapping: Vec<&Node> = index
            .nodes()
            .iter()
            .filter(|node| node.overlaps_lines(start_line, end_line))
            .collect();

        // Deepest = overlapping nodes that do not strictly contain another
        // overlapping node. Strictness matters: two nodes with the same
        // extent are equally specific and must surface as ambiguous, not
        // eliminate each other.
        let mut deepest: Vec<&Node> = overlapping
            .iter()
            .filter(|a| {
                !overlapping
                    .iter()
                    .any(|b| a.id != b.id && a.contains(b) && !b.contains(a))
            })
            .copied()
            .collect();

        match deepest.len() {
            0 => Ok(Target::Lines {
                path: index.path.clone(),
                start_line,
                end_line,
                enclosing: nearest_nodes(index, start_line),
            }),
            1 => Ok(Target::Node(deepest.remove(0).clone())),
            _ => {
                // Rank by specificity: smaller extents score higher.
                let candidates = deepest
                    .into_iter()
                    .map(|node| {
                        let score = 1.0 / node.line_span() as f64;
                        self.candidate(node, score)
                    })
                    .collect();
                Err(self.ambiguous(selector, candidates))
            }
        }
    }

    fn resolve_fuzzy(&self, selector: &str, name: &str) -> Result<Target, ResolveError> {
        let mut candidates: Vec<Candidate> = Vec::new();

        for index in self.indices.values() {
            for node in index.nodes() {
                let score = fuzzy_score(&node.name, name);
                if score >= FUZZY_THRESHOLD {
                    candidates.push(self.candidate(node, score));
                }
            }
        }

        match candidates.len() {
            0 => Err(ResolveError::NotFound {
                selector: selector.to_string(),
                hint: Some("try a glob query or the path:kind:name form".to_string()),
            }),
            1 => Ok(Target::Node(candidates.remove(0).node)),
            _ => {
                let mut err = self.ambiguous(selector, candidates);
                if let ResolveError::Ambiguous { candidates, .. } = &mut err {
                    candidates.truncate(FUZZY_TOP_N);
                }
                Err(err)
            }
        }
    }

    /// Query nodes by glob pattern over names, or `path:kind:name` where
    /// every segment may carry `*`/`?` wildcards.
    pub fn query_nodes(&self, pattern: &str) -> Vec<&'a Node> {
        let mut matches: Vec<&Node> = Vec::new();

        let mut parts = pattern.splitn(3, ':');
        let (first, kind_pat, name_pat) = (parts.next(), parts.next(), parts.next());

        for index in self.indices.values() {
            for node in index.nodes() {
                let matched = match (first, kind_pat, name_pat) {
                    (Some(name_pat), None, None) => wildcard_match(name_pat, &node.name),
                    (Some(path_pat), Some(kind_pat), None) => {
                        wildcard_match(path_pat, &node.path) && wildcard_match(kind_pat, &node.kind)
                    }
                    (Some(path_pat), Some(kind_pat), Some(name_pat)) => {
                        wildcard_match(path_pat, &node.path)
                            && wildcard_match(kind_pat, &node.kind)
                            && wildcard_match(name_pat, &node.name)
                    }
                    _ => false,
                };
                if matched {
                    matches.push(node);
                }
            }
        }

        matches.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then(a.start_line.cmp(&b.start_line))
                .then(a.name.cmp(&b.name))
        });
        matches
    }

    fn candidate(&self, node: &Node, score: f64) -> Candidate {
        let parent_name = node
            .parent_id
            .as_ref()
            .and_then(|id| self.by_id.get(id))
            .map(|parent| parent.name.clone());
        Candidate {
            node: node.clone(),
            score,
            parent_name,
        }
    }

    fn ambiguous(&self, selector: &str, mut candidates: Vec<Candidate>) -> ResolveError {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.path.cmp(&b.node.path))
                .then_with(|| a.node.start_line.cmp(&b.node.start_line))
        });
        ResolveError::Ambiguous {
            selector: selector.to_string(),
            candidates,
        }
    }
}

/// Similarity of a node name to a query. Exact matches score 1.0 and
/// substring matches rank strictly above edit-distance matches.
fn fuzzy_score(name: &str, query: &str) -> f64 {
    if name == query {
        return 1.0;
    }
    if name.contains(query) || query.contains(name) {
        return 0.9;
    }
    strsim::normalized_levenshtein(name, query) * 0.85
}

/// Nodes nearest a line, for error-message context: the innermost chain of
/// nodes whose extent covers the line, or the closest preceding node.
fn nearest_nodes(index: &FileIndex, line: usize) -> Vec<Node> {
    let covering: Vec<&Node> = index
        .nodes()
        .iter()
        .filter(|node| node.overlaps_lines(line, line))
        .collect();
    if !covering.is_empty() {
        return covering.into_iter().cloned().collect();
    }
    index
        .nodes()
        .iter()
        .filter(|node| node.end_line < line)
        .max_by_key(|node| node.end_line)
        .into_iter()
        .cloned()
        .collect()
}

/// Minimal glob matching: `*` matches any run, `?` matches one character.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    fn matches(p: &[char], t: &[char]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some('*'), _) => {
                matches(&p[1..], t) || (!t.is_empty() && matches(p, &t[1..]))
            }
            (Some('?'), Some(_)) => matches(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => matches(&p[1..], &t[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    matches(&p, &t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FileFingerprint, FileIndex};

    fn fingerprint() -> FileFingerprint {
        FileFingerprint::of_content("x", 0)
    }

    fn make_indices() -> HashMap<String, FileIndex> {
        let mut indices = HashMap::new();

        let outer = Node::new("md_heading", "Overview", "doc.md", 1, 20);
        let mut inner = Node::new("md_heading", "Details", "doc.md", 10, 16);
        inner.parent_id = Some(outer.id.clone());
        let mut outer = outer;
        outer.children_ids.push(inner.id.clone());
        indices.insert(
            "doc.md".to_string(),
            FileIndex::new("doc.md", fingerprint(), vec![outer, inner]).unwrap(),
        );

        let parse_a = Node::new("rs_fn", "parse", "a.rs", 5, 12);
        indices.insert(
            "a.rs".to_string(),
            FileIndex::new("a.rs", fingerprint(), vec![parse_a]).unwrap(),
        );

        let parse_b = Node::new("rs_fn", "parse", "b.rs", 30, 44);
        indices.insert(
            "b.rs".to_string(),
            FileIndex::new("b.rs", fingerprint(), vec![parse_b]).unwrap(),
        );

        indices
    }

    #[test]
    fn resolves_by_id() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);
        let id = indices["a.rs"].nodes()[0].id.clone();

        let target = resolver.resolve(id.as_str()).unwrap();
        match target {
            Target::Node(node) => assert_eq!(node.name, "parse"),
            other => panic!("expected node target, got {other:?}"),
        }
    }

    #[test]
    fn resolution_is_idempotent() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);

        let first = resolver.resolve("a.rs:rs_fn:parse").unwrap();
        let second = resolver.resolve("a.rs:rs_fn:parse").unwrap();
        match (first, second) {
            (Target::Node(a), Target::Node(b)) => assert_eq!(a.id, b.id),
            other => panic!("expected node targets, got {other:?}"),
        }
    }

    #[test]
    fn path_kind_name_not_found_names_other_kinds() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);

        let err = resolver.resolve("a.rs:md_heading:parse").unwrap_err();
        match err {
            ResolveError::NotFound { hint, .. } => {
                assert!(hint.unwrap().contains("rs_fn"));
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn line_selector_picks_deepest() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);

        // Line 11 is inside both Overview (1-20) and Details (10-16).
        let target = resolver.resolve("doc.md:11").unwrap();
        match target {
            Target::Node(node) => assert_eq!(node.name, "Details"),
            other => panic!("expected node target, got {other:?}"),
        }
    }

    #[test]
    fn line_selector_without_node_succeeds_with_context() {
        let mut indices = HashMap::new();
        indices.insert(
            "plain.txt".to_string(),
            FileIndex::new("plain.txt", fingerprint(), vec![]).unwrap(),
        );
        let resolver = Resolver::new(&indices);

        let target = resolver.resolve("plain.txt:3-5").unwrap();
        match target {
            Target::Lines {
                start_line,
                end_line,
                enclosing,
                ..
            } => {
                assert_eq!((start_line, end_line), (3, 5));
                assert!(enclosing.is_empty());
            }
            other => panic!("expected line target, got {other:?}"),
        }
    }

    #[test]
    fn fuzzy_ambiguous_sorted_by_path() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);

        let err = resolver.resolve("parse").unwrap_err();
        match err {
            ResolveError::Ambiguous { candidates, .. } => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[0].node.path, "a.rs");
                assert_eq!(candidates[1].node.path, "b.rs");
                assert_eq!(candidates[0].score, 1.0);
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn fuzzy_unique_auto_selects() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);

        let target = resolver.resolve("Overview").unwrap();
        match target {
            Target::Node(node) => assert_eq!(node.kind, "md_heading"),
            other => panic!("expected node target, got {other:?}"),
        }
    }

    #[test]
    fn fuzzy_substring_outranks_edit_distance() {
        assert!(fuzzy_score("parse_config", "parse") > fuzzy_score("sparse", "parse"));
        assert_eq!(fuzzy_score("parse", "parse"), 1.0);
    }

    #[test]
    fn fuzzy_no_match() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);
        let err = resolver.resolve("zzzzqqqq").unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn nested_name_matches_ancestry() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);

        let target = resolver
            .resolve("doc.md:md_heading:Overview/Details")
            .unwrap();
        match target {
            Target::Node(node) => assert_eq!(node.name, "Details"),
            other => panic!("expected node target, got {other:?}"),
        }
    }

    #[test]
    fn glob_query_over_names() {
        let indices = make_indices();
        let resolver = Resolver::new(&indices);

        let matches = resolver.query_nodes("pars*");
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].path, "a.rs");

        let matches = resolver.query_nodes("*:rs_fn:parse");
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*validate*", "revalidate_all"));
        assert!(wildcard_match("test_?", "test_a"));
        assert!(!wildcard_match("test_?", "test_ab"));
        assert!(wildcard_match("*", ""));
    }
}
