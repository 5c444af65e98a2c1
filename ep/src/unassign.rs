//! Releasing a slot

use tracing::{debug, info, warn};

use crate::PoolError;
use crate::lookup::{AssignmentLookup, lookup};
use crate::pool::{WorktreePool, checked};
use crate::slot::placeholder_branch_name;
use crate::state::{PoolState, SlotAssignment};

/// Remove the assignment named by `identifier` (slot name or branch)
///
/// Returns the new state and the removed assignment. The slot's
/// initialization record stays so the slot can be reused.
pub fn unassign(state: &PoolState, identifier: &str) -> Result<(PoolState, SlotAssignment), PoolError> {
    debug!(%identifier, "unassign: called");
    let removed = match lookup(state, identifier) {
        AssignmentLookup::BySlot(a) | AssignmentLookup::ByBranch(a) => a.clone(),
        AssignmentLookup::NotFound => return Err(PoolError::AssignmentNotFound(identifier.to_string())),
    };
    Ok((state.without_assignment(&removed.slot_name), removed))
}

impl WorktreePool {
    /// Release the slot held by `identifier` and park its worktree on the placeholder branch
    pub fn unassign(&self, identifier: &str) -> Result<SlotAssignment, PoolError> {
        debug!(%identifier, "WorktreePool::unassign: called");
        let tx = self.store.begin()?;
        let state = tx
            .load()?
            .ok_or_else(|| PoolError::NotConfigured(self.paths.state_file.display().to_string()))?;
        let state = checked(state)?;

        let (next, removed) = unassign(&state, identifier)?;
        tx.save(&next)?;
        info!(slot = %removed.slot_name, branch = %removed.branch_name, "Unassigned slot");

        // Park before releasing the lock.
        self.park_slot(&removed);
        drop(tx);
        Ok(removed)
    }

    fn park_slot(&self, removed: &SlotAssignment) {
        debug!(slot = %removed.slot_name, "WorktreePool::park_slot: called");
        if !self.git.is_dir(&removed.worktree_path) {
            debug!("WorktreePool::park_slot: worktree missing, nothing to do");
            return;
        }
        let Some(placeholder) = placeholder_branch_name(&removed.slot_name) else {
            return;
        };

        let result = match self.git.branch_head(&self.paths.repo_root, &placeholder) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => self.git.create_branch(&self.paths.repo_root, &placeholder, "HEAD"),
            Err(e) => Err(e),
        }
        .and_then(|()| self.git.checkout_branch(&removed.worktree_path, &placeholder));

        if let Err(e) = result {
            warn!(slot = %removed.slot_name, error = %e, "Failed to switch released slot to its placeholder branch");
        }
    }
}
