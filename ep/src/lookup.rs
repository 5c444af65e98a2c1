//! Resolving user-supplied identifiers to assignments

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::git::Git;
use crate::state::{PoolState, SlotAssignment};
use crate::PoolError;

/// Result of looking up a slot name or branch name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentLookup<'a> {
    BySlot(&'a SlotAssignment),
    ByBranch(&'a SlotAssignment),
    NotFound,
}

impl<'a> AssignmentLookup<'a> {
    pub fn assignment(&self) -> Option<&'a SlotAssignment> {
        match *self {
            Self::BySlot(a) | Self::ByBranch(a) => Some(a),
            Self::NotFound => None,
        }
    }
}

/// Look up `identifier` as a slot name first, then as a branch name
pub fn lookup<'a>(state: &'a PoolState, identifier: &str) -> AssignmentLookup<'a> {
    debug!(%identifier, "lookup: called");
    if let Some(a) = state.find_slot_assignment(identifier) {
        debug!("lookup: matched slot name");
        return AssignmentLookup::BySlot(a);
    }
    if let Some(a) = state.find_branch_assignment(identifier) {
        debug!("lookup: matched branch name");
        return AssignmentLookup::ByBranch(a);
    }
    debug!("lookup: no match");
    AssignmentLookup::NotFound
}

/// Canonical form of `path` when it resolves, the path itself otherwise
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Assignment whose worktree contains `cwd`
///
/// `cwd` is resolved to the root of its git worktree, which must equal a
/// stored worktree path exactly. A directory that merely sits under a slot
/// path without being that worktree does not match.
pub fn find_assignment_by_worktree<'a>(
    state: &'a PoolState,
    git: &dyn Git,
    cwd: &Path,
) -> Result<Option<&'a SlotAssignment>, PoolError> {
    debug!(?cwd, "find_assignment_by_worktree: called");
    let Some(root) = git.worktree_root(cwd)? else {
        debug!("find_assignment_by_worktree: not inside a worktree");
        return Ok(None);
    };
    let root = normalize_path(&root);
    let found = state
        .assignments
        .iter()
        .find(|a| normalize_path(&a.worktree_path) == root);
    debug!(found = found.is_some(), ?root, "find_assignment_by_worktree: resolved");
    Ok(found)
}
