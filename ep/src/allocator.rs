//! Assigning branches to slots
//!
//! Slot choice is a pure function of the pool state ([`plan_allocation`]).
//! [`WorktreePool::allocate`] runs the plan inside a locked transaction: it
//! asks before evicting, prepares the worktree and branch, then saves.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::PoolError;
use crate::pool::{WorktreePool, checked};
use crate::prompt::Prompt;
use crate::provision::{ensure_branch, ensure_slot_worktree};
use crate::state::{PoolState, SlotAssignment, now_timestamp};

/// Options for [`WorktreePool::allocate`]
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocateOptions {
    /// Evict the oldest assignment without asking when the pool is full
    pub force: bool,
    /// Work out the slot but change nothing
    pub dry_run: bool,
}

/// How a branch would get its slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AllocationPlan {
    /// The branch already holds a slot
    Existing { assignment: SlotAssignment },
    /// An initialized slot is idle
    Reuse { slot_name: String },
    /// A never-used slot number is free
    Fresh { slot_name: String },
    /// The pool is full and `victim` is the oldest lease
    Evict { victim: SlotAssignment },
}

impl AllocationPlan {
    pub fn slot_name(&self) -> &str {
        match self {
            Self::Existing { assignment } => &assignment.slot_name,
            Self::Reuse { slot_name } | Self::Fresh { slot_name } => slot_name,
            Self::Evict { victim } => &victim.slot_name,
        }
    }
}

/// Outcome of an allocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub plan: AllocationPlan,
    /// The lease held by the branch afterwards, or the one it would get on a dry run
    pub assignment: SlotAssignment,
    /// False for dry runs and for branches that already had a slot
    pub changed: bool,
}

/// Decide which slot `branch` gets
///
/// Fails with [`PoolError::PoolFull`] only when every slot is blocked and none
/// of them holds an assignment that could be evicted.
pub fn plan_allocation(state: &PoolState, branch: &str, worktrees_dir: Option<&Path>) -> Result<AllocationPlan, PoolError> {
    debug!(%branch, "plan_allocation: called");
    if let Some(existing) = state.find_branch_assignment(branch) {
        debug!("plan_allocation: existing assignment");
        return Ok(AllocationPlan::Existing {
            assignment: existing.clone(),
        });
    }
    if let Some(slot) = state.find_inactive_slot() {
        debug!(slot = %slot.name, "plan_allocation: reusing inactive slot");
        return Ok(AllocationPlan::Reuse {
            slot_name: slot.name.clone(),
        });
    }
    if let Some(slot_name) = state.find_next_available_slot(worktrees_dir) {
        debug!(%slot_name, "plan_allocation: fresh slot");
        return Ok(AllocationPlan::Fresh { slot_name });
    }
    match state.find_oldest_assignment() {
        Some(victim) => {
            debug!(slot = %victim.slot_name, "plan_allocation: pool full");
            Ok(AllocationPlan::Evict { victim: victim.clone() })
        }
        None => Err(PoolError::PoolFull {
            pool_size: state.pool_size,
        }),
    }
}

/// Pick the eviction victim of a full pool, asking first unless `force`
pub fn handle_pool_full<'a>(state: &'a PoolState, force: bool, prompt: &dyn Prompt) -> Result<&'a SlotAssignment, PoolError> {
    debug!(force, "handle_pool_full: called");
    let pool_full = || PoolError::PoolFull {
        pool_size: state.pool_size,
    };
    let victim = state.find_oldest_assignment().ok_or_else(pool_full)?;
    if force {
        debug!("handle_pool_full: forced");
        return Ok(victim);
    }
    if !prompt.is_interactive() {
        debug!("handle_pool_full: not interactive");
        return Err(pool_full());
    }

    let mut text = format!("Pool is full ({} slots):", state.pool_size);
    for a in &state.assignments {
        text.push_str(&format!("\n  {}  {}  (since {})", a.slot_name, a.branch_name, a.assigned_at));
    }
    text.push_str(&format!(
        "\nOldest assignment: '{}' in {}",
        victim.branch_name, victim.slot_name
    ));
    prompt.show(&text);

    let question = format!("Evict '{}' from {}?", victim.branch_name, victim.slot_name);
    if prompt.confirm(&question, false)? {
        debug!("handle_pool_full: confirmed");
        Ok(victim)
    } else {
        debug!("handle_pool_full: declined");
        Err(PoolError::EvictionDeclined {
            slot: victim.slot_name.clone(),
            branch: victim.branch_name.clone(),
        })
    }
}

impl WorktreePool {
    /// Give `branch` a slot, creating the pool document if there is none
    pub fn allocate(&self, branch: &str, options: AllocateOptions) -> Result<Allocation, PoolError> {
        debug!(%branch, ?options, "WorktreePool::allocate: called");
        if options.dry_run {
            return self.plan_dry_run(branch);
        }

        let tx = self.store.begin()?;
        let state = match tx.load()? {
            Some(state) => checked(state)?,
            None => {
                debug!("WorktreePool::allocate: no pool document, creating one");
                PoolState::new(self.pool_size)
            }
        };

        let plan = plan_allocation(&state, branch, Some(&self.paths.worktrees_dir))?;
        let base = match &plan {
            AllocationPlan::Existing { assignment } => {
                debug!("WorktreePool::allocate: already assigned");
                return Ok(Allocation {
                    assignment: assignment.clone(),
                    plan,
                    changed: false,
                });
            }
            AllocationPlan::Evict { .. } => {
                let victim = handle_pool_full(&state, options.force, self.prompt.as_ref())?;
                info!(slot = %victim.slot_name, branch = %victim.branch_name, "Evicting oldest assignment");
                state.without_assignment(&victim.slot_name)
            }
            AllocationPlan::Reuse { .. } | AllocationPlan::Fresh { .. } => state.clone(),
        };

        let slot_name = plan.slot_name().to_string();
        let worktree_path = self.paths.slot_path(&slot_name);
        let repo_root = &self.paths.repo_root;

        let provisioned = ensure_slot_worktree(self.git.as_ref(), repo_root, &self.paths.worktrees_dir, &slot_name)?;
        let checkout = ensure_branch(self.git.as_ref(), repo_root, branch, &self.remote)
            .and_then(|()| self.git.checkout_branch(&worktree_path, branch).map_err(PoolError::from));
        if let Err(e) = checkout {
            if provisioned {
                // Record the new worktree so the slot stays reusable.
                warn!(%slot_name, %branch, error = %e, "Checkout failed after provisioning slot");
                tx.save(&state.with_initialized_slot(&slot_name))?;
            }
            return Err(e);
        }

        let assignment = SlotAssignment {
            slot_name: slot_name.clone(),
            branch_name: branch.to_string(),
            assigned_at: now_timestamp(),
            worktree_path,
        };
        let next = base.with_initialized_slot(&slot_name).with_assignment(assignment.clone());
        tx.save(&next)?;
        info!(%slot_name, %branch, "Assigned branch to slot");

        Ok(Allocation {
            plan,
            assignment,
            changed: true,
        })
    }

    fn plan_dry_run(&self, branch: &str) -> Result<Allocation, PoolError> {
        debug!(%branch, "WorktreePool::plan_dry_run: called");
        let state = self.load()?.unwrap_or_else(|| PoolState::new(self.pool_size));
        let plan = plan_allocation(&state, branch, Some(&self.paths.worktrees_dir))?;
        let assignment = match &plan {
            AllocationPlan::Existing { assignment } => assignment.clone(),
            other => SlotAssignment {
                slot_name: other.slot_name().to_string(),
                branch_name: branch.to_string(),
                assigned_at: now_timestamp(),
                worktree_path: self.paths.slot_path(other.slot_name()),
            },
        };
        Ok(Allocation {
            plan,
            assignment,
            changed: false,
        })
    }
}
