//! Textgraft: structural text patching with atomic multi-file transactions.
//!
//! Files are indexed into trees of addressable nodes (headings, functions,
//! impl blocks), mutations are addressed by selector instead of byte offset,
//! and multi-file changes apply as one transaction that either commits every
//! file or restores what it touched.
//!
//! # Architecture
//!
//! Extraction produces nodes, the resolver turns selector strings into
//! targets, and every mutation funnels through the same line-splice
//! primitive. Nothing reaches disk except through [`atomic::write_atomic`]
//! or the patch coordinator's two-sweep apply.
//!
//! # Safety
//!
//! - Dry run is the default; writing is a separate explicit step
//! - Fingerprint drift guard between indexing and writing
//! - Atomic file writes (tempfile + fsync + rename)
//! - Multi-file rollback from `.bak` backups
//! - Root boundary enforcement
//!
//! # Example
//!
//! ```no_run
//! use textgraft::index::Indexer;
//! use textgraft::resolve::Resolver;
//! use textgraft::editor::Editor;
//! use std::path::PathBuf;
//!
//! let indices = Indexer::new().index_files(&[PathBuf::from("doc.md")])?;
//! let resolver = Resolver::new(&indices);
//! let target = resolver.resolve("doc.md:md_heading:Overview")?;
//!
//! let mut editor = Editor::open(&indices["doc.md"])?;
//! editor.replace(&target, "## Overview\nRewritten.\n")?;
//! println!("{}", editor.diff());
//! editor.write(false, true)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod atomic;
pub mod diff;
pub mod editor;
pub mod extract;
pub mod index;
pub mod node;
pub mod patchset;
pub mod resolve;
pub mod safety;
pub mod vcs;

// Re-exports
pub use atomic::{write_atomic, WriteError};
pub use diff::{apply_unified, unified_diff, DiffError, NewlineMode};
pub use editor::{Editor, EditorError, InsertPosition};
pub use index::{FileFingerprint, FileIndex, IndexError, Indexer};
pub use node::{Node, NodeId};
pub use patchset::{
    ApplyOptions, FileMutation, FileOutcome, OpKind, PatchError, PatchSet, TxReport, TxState,
};
pub use resolve::{Candidate, ResolveError, Resolver, Selector, Target};
pub use safety::{RootGuard, SafetyError};
pub use vcs::{GitConfig, GitError, GitRepo};
