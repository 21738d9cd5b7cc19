//! Optional git collaborator: stage, commit, and push a committed
//! transaction's file set.
//!
//! The coordinator's obligation toward it is small: hand over the changed
//! paths and a message after the files are already on disk. A git failure
//! at that point never rolls the file writes back; it is reported
//! separately.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GitError {
    #[error("Not a git repository: {0}; apply without --commit outside a repo")]
    NotARepo(PathBuf),

    #[error(
        "Working directory not clean; commit or stash first, \
         or pass --allow-dirty"
    )]
    Dirty,

    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
}

/// Git behavior knobs carried alongside the apply options.
#[derive(Debug, Clone)]
pub struct GitConfig {
    pub auto_commit: bool,
    pub auto_push: bool,
    pub allow_dirty: bool,
    pub commit_message: String,
    pub dry_run: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        GitConfig {
            auto_commit: false,
            auto_push: false,
            allow_dirty: false,
            commit_message: "Apply textgraft patch".to_string(),
            dry_run: false,
        }
    }
}

/// A git repository rooted at a directory, driven through the `git` binary.
pub struct GitRepo {
    root: PathBuf,
    config: GitConfig,
}

impl GitRepo {
    pub fn new(root: impl Into<PathBuf>, config: GitConfig) -> Self {
        GitRepo {
            root: root.into(),
            config,
        }
    }

    pub fn is_repo(&self) -> bool {
        self.root.join(".git").exists()
    }

    /// True when `git status --porcelain` reports nothing.
    pub fn is_clean(&self) -> bool {
        match self.git(&["status", "--porcelain"]) {
            Ok(stdout) => stdout.trim().is_empty(),
            Err(_) => false,
        }
    }

    /// Pre-flight before an apply that will auto-commit: the directory must
    /// be a repository, and clean unless `allow_dirty` is set.
    pub fn prepare_for_patch(&self) -> Result<(), GitError> {
        if !self.is_repo() {
            return Err(GitError::NotARepo(self.root.clone()));
        }
        if !self.config.allow_dirty && !self.is_clean() {
            return Err(GitError::Dirty);
        }
        Ok(())
    }

    /// Stage the given files and commit them. Returns the commit hash.
    pub fn stage_and_commit(&self, files: &[&str], message: &str) -> Result<String, GitError> {
        if self.config.dry_run {
            return Ok("dry-run".to_string());
        }

        let mut add_args = vec!["add"];
        add_args.extend(files);
        self.git(&add_args)?;

        let stdout = self.git(&["commit", "-m", message])?;
        // First line looks like "[branch hash] message".
        let hash = stdout
            .split_whitespace()
            .nth(1)
            .map(|h| h.trim_end_matches(']').to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(hash)
    }

    /// Push the current branch to a remote.
    pub fn push_to_remote(&self, remote: &str, branch: Option<&str>) -> Result<(), GitError> {
        if self.config.dry_run {
            return Ok(());
        }
        let mut args = vec!["push", remote];
        if let Some(branch) = branch {
            args.push(branch);
        }
        self.git(&args)?;
        Ok(())
    }

    /// Current branch name; `None` on a detached HEAD.
    pub fn current_branch(&self) -> Option<String> {
        let stdout = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).ok()?;
        let branch = stdout.trim();
        if branch == "HEAD" || branch.is_empty() {
            None
        } else {
            Some(branch.to_string())
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn git(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| GitError::CommandFailed {
                command: args.join(" "),
                stderr: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
