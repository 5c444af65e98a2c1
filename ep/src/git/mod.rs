//! Git capability
//!
//! The pool only talks to git through the [`Git`] trait. [`SubprocessGit`]
//! shells out to the `git` binary; unit tests use an in-memory `FakeGit`.

#[cfg(test)]
mod fake;
mod subprocess;

#[cfg(test)]
pub use fake::FakeGit;
pub use subprocess::{SubprocessGit, parse_worktree_list};

use std::path::{Path, PathBuf};

/// Error types for git operations
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("Unexpected git output: {0}")]
    Parse(String),
}

/// One entry of git's worktree registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeInfo {
    /// Absolute worktree path
    pub path: PathBuf,

    /// Checked-out branch, `None` when detached
    pub branch: Option<String>,

    /// True for the repository's main working tree
    pub is_root: bool,
}

/// Git operations the pool needs
///
/// Lookups return `Ok(None)` for "does not exist" and reserve `Err` for
/// failures to answer the question.
pub trait Git {
    /// Root of the main working tree of the repository containing `path`
    fn repository_root(&self, path: &Path) -> Result<Option<PathBuf>, GitError>;

    /// Root of the worktree (main or linked) containing `path`
    fn worktree_root(&self, path: &Path) -> Result<Option<PathBuf>, GitError>;

    /// Git's worktree registry, main working tree first
    fn list_worktrees(&self, repo_root: &Path) -> Result<Vec<WorktreeInfo>, GitError>;

    /// Commit a local branch points at
    fn branch_head(&self, repo_root: &Path, branch: &str) -> Result<Option<String>, GitError>;

    /// Commit a remote-tracking branch points at
    fn remote_branch_head(&self, repo_root: &Path, remote: &str, branch: &str) -> Result<Option<String>, GitError>;

    /// True if `ancestor` is reachable from `descendant`
    fn is_ancestor(&self, repo_root: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError>;

    /// Create `branch` at `start_point`
    fn create_branch(&self, repo_root: &Path, branch: &str, start_point: &str) -> Result<(), GitError>;

    /// Move an existing branch to `target`
    fn force_update_branch(&self, repo_root: &Path, branch: &str, target: &str) -> Result<(), GitError>;

    /// Register a new worktree at `path` with `branch` checked out
    ///
    /// Stale registrations whose directory no longer exists are dropped first.
    fn add_worktree(&self, repo_root: &Path, path: &Path, branch: &str) -> Result<(), GitError>;

    /// Check out `branch` inside the worktree at `worktree`
    fn checkout_branch(&self, worktree: &Path, branch: &str) -> Result<(), GitError>;

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// Worktree in `worktrees` that has `branch` checked out
pub fn worktree_for_branch<'a>(worktrees: &'a [WorktreeInfo], branch: &str) -> Option<&'a WorktreeInfo> {
    worktrees.iter().find(|wt| wt.branch.as_deref() == Some(branch))
}
