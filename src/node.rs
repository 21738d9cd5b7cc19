use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Stable identifier for a structural node.
///
/// Derived deterministically from (path, kind, name, start_line, signature),
/// so re-indexing an unchanged file yields the same id for the same unit.
/// Two nodes with identical derivation inputs collide by design: they are
/// the same logical unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Compute a node id from its derivation inputs.
    pub fn derive(
        path: &str,
        kind: &str,
        name: &str,
        start_line: usize,
        signature: Option<&str>,
    ) -> Self {
        let mut input = format!("{path}:{kind}:{name}:{start_line}");
        if let Some(sig) = signature {
            input.push(':');
            input.push_str(sig);
        }
        NodeId(format!("{:016x}", xxh3_64(input.as_bytes())))
    }

    /// Wrap a raw id string (e.g., parsed from a selector).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        NodeId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structural unit discovered in a file: a heading, a function, a
/// doc block. Nodes are immutable once built; a mutation computes new file
/// content and the next indexing pass produces fresh nodes.
///
/// `kind` is an opaque tag owned by the extractor that produced the node.
/// The core only uses it for filtering and display, never for behavior.
///
/// Parent/child links are id references into the owning [`FileIndex`],
/// not owning pointers; `children_ids` is in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: String,
    pub name: String,
    /// File path, relative to the configured root.
    pub path: String,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    /// 1-indexed, inclusive.
    pub end_line: usize,
    /// Byte extent when the extractor can provide it; line extent is the
    /// always-present fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_byte: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_byte: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children_ids: Vec<NodeId>,
    /// Supplementary extractor attributes (heading level, qualified name,
    /// namespace). Opaque to the core. BTreeMap keeps serialized order stable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl Node {
    /// Build a node, deriving its id from the identity fields.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        start_line: usize,
        end_line: usize,
    ) -> Self {
        let kind = kind.into();
        let name = name.into();
        let path = path.into();
        let id = NodeId::derive(&path, &kind, &name, start_line, None);
        Node {
            id,
            kind,
            name,
            path,
            start_line,
            end_line,
            start_byte: None,
            end_byte: None,
            parent_id: None,
            children_ids: Vec::new(),
            meta: BTreeMap::new(),
        }
    }

    /// Rebuild the id with a disambiguating signature (e.g., a function's
    /// parameter list) folded into the derivation.
    pub fn with_signature(mut self, signature: &str) -> Self {
        self.id = NodeId::derive(
            &self.path,
            &self.kind,
            &self.name,
            self.start_line,
            Some(signature),
        );
        self
    }

    pub fn with_bytes(mut self, start_byte: usize, end_byte: usize) -> Self {
        self.start_byte = Some(start_byte);
        self.end_byte = Some(end_byte);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Number of lines covered by this node.
    pub fn line_span(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// True if the node's extent intersects the given 1-indexed inclusive
    /// line range.
    pub fn overlaps_lines(&self, start_line: usize, end_line: usize) -> bool {
        self.start_line <= end_line && start_line <= self.end_line
    }

    /// True if the other node's extent lies fully within this node's extent.
    pub fn contains(&self, other: &Node) -> bool {
        self.start_line <= other.start_line && other.end_line <= self.end_line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_deterministic() {
        let a = NodeId::derive("doc.md", "md_heading", "Intro", 3, None);
        let b = NodeId::derive("doc.md", "md_heading", "Intro", 3, None);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 16);
    }

    #[test]
    fn id_changes_with_inputs() {
        let a = NodeId::derive("doc.md", "md_heading", "Intro", 3, None);
        let b = NodeId::derive("doc.md", "md_heading", "Intro", 4, None);
        let c = NodeId::derive("doc.md", "md_heading", "Intro", 3, Some("v2"));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn overlap_and_containment() {
        let outer = Node::new("md_heading", "Outer", "doc.md", 6, 14);
        let inner = Node::new("md_heading", "Inner", "doc.md", 10, 12);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.overlaps_lines(1, 6));
        assert!(outer.overlaps_lines(14, 20));
        assert!(!outer.overlaps_lines(15, 20));
        assert_eq!(inner.line_span(), 3);
    }

    #[test]
    fn serialized_field_order_is_stable() {
        let node = Node::new("rs_fn", "parse", "src/lib.rs", 1, 4).with_meta("qualname", "parse");
        let json = serde_json::to_string(&node).unwrap();
        let id_pos = json.find("\"id\"").unwrap();
        let kind_pos = json.find("\"kind\"").unwrap();
        let name_pos = json.find("\"name\"").unwrap();
        let start_pos = json.find("\"start_line\"").unwrap();
        assert!(id_pos < kind_pos && kind_pos < name_pos && name_pos < start_pos);
    }
}
