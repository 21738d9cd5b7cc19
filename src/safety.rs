//! Root confinement for mutation targets: every file a transaction touches
//! must resolve to a path inside the configured root and outside its `.git`
//! subtree.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside the root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path is in a forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

/// Confines mutation targets to the configured root directory.
#[derive(Debug, Clone)]
pub struct RootGuard {
    root: PathBuf,
    forbidden: Vec<PathBuf>,
}

impl RootGuard {
    /// Guard for the given root. The root is canonicalized so symlinked
    /// roots behave consistently; `.git` under the root is forbidden.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref().canonicalize()?;

        let mut forbidden = Vec::new();
        if let Ok(git_dir) = root.join(".git").canonicalize() {
            forbidden.push(git_dir);
        }

        Ok(RootGuard { root, forbidden })
    }

    /// Check that a path is safe to mutate, resolving relative paths
    /// against the root. Returns the canonical path.
    ///
    /// Canonicalization happens at validation time; callers that care about
    /// the window between validation and write should call [`Self::revalidate`]
    /// again just before writing.
    pub fn validate_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };

        // Canonicalize to resolve symlinks and `..` components.
        let canonical = absolute.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    /// Re-check a previously validated path immediately before a write.
    pub fn revalidate(&self, path: &Path) -> Result<PathBuf, SafetyError> {
        let canonical = path.canonicalize()?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical.to_path_buf(),
                root: self.root.clone(),
            });
        }
        for forbidden in &self.forbidden {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }
        Ok(())
    }
}
