//! Per-language extractors. Each one turns file content into the initial
//! node list for that file; the core places no constraint on how beyond the
//! node invariants checked by [`crate::index::FileIndex`].
//!
//! Kinds are owned by the extractor that produces them. The core never
//! branches on a kind except for opaque filtering.

pub mod markdown;
pub mod rust;

use crate::node::Node;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Parse failed: {0}")]
    Parse(String),
}

/// The extractor contract: content in, nodes out, in document order.
pub trait Extract {
    fn extract(&self, path: &str, content: &str) -> Result<Vec<Node>, ExtractError>;
}
