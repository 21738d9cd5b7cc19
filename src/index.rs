//! File indexing: fingerprint capture, the per-file node arena, and the
//! extractor registry that turns file content into nodes.
//!
//! An index is rebuilt fresh on every invocation that needs one. Nothing is
//! persisted between runs; the fingerprint captured here is what the drift
//! guard later compares against.

use crate::extract::{self, Extract, ExtractError};
use crate::node::{Node, NodeId};
use filetime::FileTime;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Extractor failed for {path}: {source}")]
    Extract {
        path: PathBuf,
        source: ExtractError,
    },

    #[error("Invalid node list for {path}: {reason}")]
    InvalidNodes { path: PathBuf, reason: String },
}

/// Content fingerprint captured at index time, used by the drift guard.
///
/// The content hash decides drift; the mtime is advisory context for error
/// reporting (a rewrite that produces identical bytes is not drift).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileFingerprint {
    pub content_hash: u64,
    pub mtime_seconds: i64,
}

impl FileFingerprint {
    /// Capture the current fingerprint of a file on disk.
    pub fn capture(path: &Path) -> Result<Self, IndexError> {
        let content = fs::read(path).map_err(|source| map_read_err(path, source))?;
        let metadata = fs::metadata(path).map_err(|source| map_read_err(path, source))?;
        Ok(FileFingerprint {
            content_hash: xxh3_64(&content),
            mtime_seconds: FileTime::from_last_modification_time(&metadata).unix_seconds(),
        })
    }

    /// Fingerprint in-memory content with an explicit mtime.
    pub fn of_content(content: &str, mtime_seconds: i64) -> Self {
        FileFingerprint {
            content_hash: xxh3_64(content.as_bytes()),
            mtime_seconds,
        }
    }

    /// True if the other fingerprint represents the same content.
    pub fn matches(&self, other: &FileFingerprint) -> bool {
        self.content_hash == other.content_hash
    }
}

fn map_read_err(path: &Path, source: std::io::Error) -> IndexError {
    if source.kind() == std::io::ErrorKind::NotFound {
        IndexError::FileNotFound(path.to_path_buf())
    } else {
        IndexError::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// All nodes discovered in one file, in document order, plus the fingerprint
/// of the content they were derived from.
///
/// The nodes form a tree through id references, but they are stored flat:
/// the vec owns every node and `slots` maps ids to positions. Parent and
/// child links never own anything, so the structure serializes trivially
/// and has no lifetime knots.
#[derive(Debug, Clone, Serialize)]
pub struct FileIndex {
    pub path: String,
    pub fingerprint: FileFingerprint,
    nodes: Vec<Node>,
    #[serde(skip)]
    slots: HashMap<NodeId, usize>,
}

impl FileIndex {
    /// Build an index from extracted nodes, verifying the node invariants.
    pub fn new(
        path: impl Into<String>,
        fingerprint: FileFingerprint,
        nodes: Vec<Node>,
    ) -> Result<Self, IndexError> {
        let path = path.into();
        let mut slots = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            slots.insert(node.id.clone(), i);
        }
        let index = FileIndex {
            path,
            fingerprint,
            nodes,
            slots,
        };
        index.verify()?;
        Ok(index)
    }

    /// Nodes in document order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.slots.get(id).map(|&i| &self.nodes[i])
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Direct children of a node, in document order.
    pub fn children(&self, node: &Node) -> Vec<&Node> {
        node.children_ids
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Ancestry chain from root to the given node (inclusive).
    pub fn tree_path<'a>(&'a self, node: &'a Node) -> Vec<&'a Node> {
        let mut chain = vec![node];
        let mut current = node;
        while let Some(parent_id) = &current.parent_id {
            match self.get(parent_id) {
                Some(parent) => {
                    chain.insert(0, parent);
                    current = parent;
                }
                None => break,
            }
        }
        chain
    }

    /// The node and all its descendants, depth-first.
    pub fn subtree<'a>(&'a self, node: &'a Node) -> Vec<&'a Node> {
        let mut out = vec![node];
        for child in self.children(node) {
            out.extend(self.subtree(child));
        }
        out
    }

    /// Check the structural invariants: non-empty extents, child containment,
    /// sibling non-overlap.
    fn verify(&self) -> Result<(), IndexError> {
        for node in &self.nodes {
            if node.start_line == 0 || node.start_line > node.end_line {
                return Err(self.invalid(format!(
                    "node '{}' has invalid extent {}-{}",
                    node.name, node.start_line, node.end_line
                )));
            }
            if let Some(parent_id) = &node.parent_id {
                let parent = self.get(parent_id).ok_or_else(|| {
                    self.invalid(format!("node '{}' has dangling parent id", node.name))
                })?;
                if !parent.contains(node) {
                    return Err(self.invalid(format!(
                        "node '{}' ({}-{}) escapes parent '{}' ({}-{})",
                        node.name,
                        node.start_line,
                        node.end_line,
                        parent.name,
                        parent.start_line,
                        parent.end_line
                    )));
                }
            }
        }

        // Siblings share a parent_id (including None for roots); their
        // extents must be disjoint. Nesting belongs in the parent/child
        // relation, never between siblings.
        let mut by_parent: HashMap<Option<&NodeId>, Vec<&Node>> = HashMap::new();
        for node in &self.nodes {
            by_parent
                .entry(node.parent_id.as_ref())
                .or_default()
                .push(node);
        }
        for siblings in by_parent.values() {
            for (i, a) in siblings.iter().enumerate() {
                for b in &siblings[i + 1..] {
                    if a.overlaps_lines(b.start_line, b.end_line) {
                        return Err(self.invalid(format!(
                            "siblings '{}' ({}-{}) and '{}' ({}-{}) overlap",
                            a.name, a.start_line, a.end_line, b.name, b.start_line, b.end_line
                        )));
                    }
                }
            }
        }

        Ok(())
    }

    fn invalid(&self, reason: String) -> IndexError {
        IndexError::InvalidNodes {
            path: PathBuf::from(&self.path),
            reason,
        }
    }
}

/// Builds per-file indexes by routing files to the registered extractors.
pub struct Indexer {
    extractors: Vec<(Vec<&'static str>, Box<dyn Extract>)>,
}

impl Indexer {
    /// Indexer with the built-in extractors registered.
    pub fn new() -> Self {
        Indexer {
            extractors: vec![
                (vec!["md"], Box::new(extract::markdown::MarkdownExtractor)),
                (vec!["rs"], Box::new(extract::rust::RustExtractor)),
            ],
        }
    }

    /// Register an additional extractor for the given extensions.
    pub fn register(&mut self, extensions: Vec<&'static str>, extractor: Box<dyn Extract>) {
        self.extractors.push((extensions, extractor));
    }

    fn extractor_for(&self, path: &Path) -> Option<&dyn Extract> {
        let ext = path.extension()?.to_str()?;
        self.extractors
            .iter()
            .find(|(exts, _)| exts.contains(&ext))
            .map(|(_, e)| e.as_ref())
    }

    /// Index a single file. Files with no registered extractor still get a
    /// fingerprinted, empty index; line-range mutations do not need nodes.
    pub fn index_file(&self, path: &Path) -> Result<FileIndex, IndexError> {
        let content = fs::read_to_string(path).map_err(|source| map_read_err(path, source))?;
        let metadata = fs::metadata(path).map_err(|source| map_read_err(path, source))?;
        let mtime = FileTime::from_last_modification_time(&metadata).unix_seconds();
        let fingerprint = FileFingerprint::of_content(&content, mtime);

        let path_str = path.to_string_lossy().into_owned();
        let nodes = match self.extractor_for(path) {
            Some(extractor) => {
                extractor
                    .extract(&path_str, &content)
                    .map_err(|source| IndexError::Extract {
                        path: path.to_path_buf(),
                        source,
                    })?
            }
            None => Vec::new(),
        };

        FileIndex::new(path_str, fingerprint, nodes)
    }

    /// Index several files, keyed by their path strings.
    pub fn index_files(
        &self,
        paths: &[PathBuf],
    ) -> Result<HashMap<String, FileIndex>, IndexError> {
        let mut indices = HashMap::with_capacity(paths.len());
        for path in paths {
            let index = self.index_file(path)?;
            indices.insert(index.path.clone(), index);
        }
        Ok(indices)
    }

    /// Recursively index every file under `root` with a registered
    /// extractor extension.
    pub fn index_directory(&self, root: &Path) -> Result<HashMap<String, FileIndex>, IndexError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() && self.extractor_for(entry.path()).is_some() {
                paths.push(entry.path().to_path_buf());
            }
        }
        paths.sort();
        self.index_files(&paths)
    }
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, start: usize, end: usize) -> Node {
        Node::new("md_heading", name, "doc.md", start, end)
    }

    fn fingerprint() -> FileFingerprint {
        FileFingerprint::of_content("x", 0)
    }

    #[test]
    fn builds_index_with_lookup() {
        let a = node("A", 1, 4);
        let id = a.id.clone();
        let index = FileIndex::new("doc.md", fingerprint(), vec![a, node("B", 5, 8)]).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&id).unwrap().name, "A");
    }

    #[test]
    fn rejects_inverted_extent() {
        let result = FileIndex::new("doc.md", fingerprint(), vec![node("A", 5, 3)]);
        assert!(matches!(result, Err(IndexError::InvalidNodes { .. })));
    }

    #[test]
    fn rejects_child_escaping_parent() {
        let parent = node("Parent", 5, 10);
        let mut child = node("Child", 8, 12);
        child.parent_id = Some(parent.id.clone());
        let result = FileIndex::new("doc.md", fingerprint(), vec![parent, child]);
        assert!(matches!(result, Err(IndexError::InvalidNodes { .. })));
    }

    #[test]
    fn rejects_overlapping_siblings() {
        let result = FileIndex::new(
            "doc.md",
            fingerprint(),
            vec![node("A", 1, 6), node("B", 5, 9)],
        );
        assert!(matches!(result, Err(IndexError::InvalidNodes { .. })));
    }

    #[test]
    fn rejects_nested_siblings() {
        // Containment without a parent/child link is still a sibling overlap.
        let result = FileIndex::new(
            "doc.md",
            fingerprint(),
            vec![node("A", 1, 10), node("B", 2, 5)],
        );
        assert!(matches!(result, Err(IndexError::InvalidNodes { .. })));
    }

    #[test]
    fn allows_gaps_between_siblings() {
        // Gaps mean unindexed text, which is fine.
        let result = FileIndex::new(
            "doc.md",
            fingerprint(),
            vec![node("A", 1, 4), node("B", 9, 12)],
        );
        assert!(result.is_ok());
    }

    #[test]
    fn tree_path_walks_to_root() {
        let parent = node("Parent", 1, 10);
        let mut child = node("Child", 3, 6);
        child.parent_id = Some(parent.id.clone());
        let child_id = child.id.clone();
        let index = FileIndex::new("doc.md", fingerprint(), vec![parent, child]).unwrap();
        let chain = index.tree_path(index.get(&child_id).unwrap());
        let names: Vec<_> = chain.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["Parent", "Child"]);
    }

    #[test]
    fn fingerprint_matches_on_same_content() {
        let a = FileFingerprint::of_content("hello\n", 100);
        let b = FileFingerprint::of_content("hello\n", 200);
        // mtime differs, content identical: not drift
        assert!(a.matches(&b));
        let c = FileFingerprint::of_content("hello!\n", 100);
        assert!(!a.matches(&c));
    }

    #[test]
    fn indexer_gives_empty_index_for_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.xyz");
        fs::write(&file, "some text\n").unwrap();

        let index = Indexer::new().index_file(&file).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn indexer_missing_file() {
        let result = Indexer::new().index_file(Path::new("/no/such/file.md"));
        assert!(matches!(result, Err(IndexError::FileNotFound(_))));
    }
}
