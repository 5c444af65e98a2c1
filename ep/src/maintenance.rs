//! Explicit, user-driven pool maintenance: repair and slot provisioning

use serde::Serialize;
use tracing::{debug, info};

use crate::PoolError;
use crate::pool::{WorktreePool, checked};
use crate::provision::ensure_slot_worktree;
use crate::slot::{MAX_POOL_SIZE, generate_slot_name};
use crate::state::{PoolState, SlotAssignment};

/// Options for [`WorktreePool::repair`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    pub force: bool,
    pub dry_run: bool,
}

/// What a repair removed, or would remove
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub stale: Vec<SlotAssignment>,
    pub applied: bool,
}

/// Result of provisioning slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub pool_size: u32,
    /// Slots whose worktree was created by this run
    pub created: Vec<String>,
}

/// Assignments whose worktree directory no longer exists
fn stale_assignments(pool: &WorktreePool, state: &PoolState) -> Vec<SlotAssignment> {
    state
        .assignments
        .iter()
        .filter(|a| !pool.git.path_exists(&a.worktree_path))
        .cloned()
        .collect()
}

fn check_pool_size(size: u32) -> Result<(), PoolError> {
    if size == 0 || size > MAX_POOL_SIZE {
        return Err(PoolError::InvalidPoolSize {
            size,
            reason: format!("must be between 1 and {}", MAX_POOL_SIZE),
        });
    }
    Ok(())
}

/// `state` resized to `size`, refusing to drop slots that are in use
pub fn resize_pool(state: &PoolState, size: u32) -> Result<PoolState, PoolError> {
    debug!(from = state.pool_size, to = size, "resize_pool: called");
    check_pool_size(size)?;
    let highest = state.highest_slot_in_use();
    if highest > size {
        return Err(PoolError::InvalidPoolSize {
            size,
            reason: format!("{} is still in use", generate_slot_name(highest)),
        });
    }
    let mut next = state.clone();
    next.pool_size = size;
    Ok(next)
}

impl WorktreePool {
    /// Drop assignments whose worktree directory has disappeared
    pub fn repair(&self, options: RepairOptions) -> Result<RepairReport, PoolError> {
        debug!(?options, "WorktreePool::repair: called");
        if options.dry_run {
            let state = self.load_required()?;
            return Ok(RepairReport {
                stale: stale_assignments(self, &state),
                applied: false,
            });
        }

        let tx = self.store.begin()?;
        let state = tx
            .load()?
            .ok_or_else(|| PoolError::NotConfigured(self.paths.state_file.display().to_string()))?;
        let state = checked(state)?;
        let stale = stale_assignments(self, &state);
        if stale.is_empty() {
            debug!("WorktreePool::repair: nothing to do");
            return Ok(RepairReport { stale, applied: false });
        }

        if !options.force {
            if !self.prompt.is_interactive() {
                return Err(PoolError::ConfirmationRequired(format!(
                    "{} stale assignment(s) would be removed; rerun with --force",
                    stale.len()
                )));
            }
            let mut text = String::from("Assignments whose worktree is missing:");
            for a in &stale {
                text.push_str(&format!("\n  {}  {}  ({})", a.slot_name, a.branch_name, a.worktree_path.display()));
            }
            self.prompt.show(&text);
            if !self.prompt.confirm("Remove these assignments?", false)? {
                debug!("WorktreePool::repair: declined");
                return Ok(RepairReport { stale, applied: false });
            }
        }

        let next = stale
            .iter()
            .fold(state, |acc, a| acc.without_assignment(&a.slot_name));
        tx.save(&next)?;
        info!(count = stale.len(), "Removed stale assignments");
        Ok(RepairReport { stale, applied: true })
    }

    /// Provision slot worktrees, resizing the pool first when `count` differs
    pub fn init_pool(&self, count: Option<u32>) -> Result<InitReport, PoolError> {
        debug!(?count, "WorktreePool::init_pool: called");
        if let Some(size) = count {
            check_pool_size(size)?;
        }

        let tx = self.store.begin()?;
        let mut state = match tx.load()? {
            Some(state) => checked(state)?,
            None => PoolState::new(count.unwrap_or(self.pool_size)),
        };
        if let Some(size) = count
            && size != state.pool_size
        {
            state = resize_pool(&state, size)?;
            info!(pool_size = size, "Resized pool");
        }

        let mut created = Vec::new();
        for slot_name in (1..=state.pool_size).map(generate_slot_name) {
            match ensure_slot_worktree(self.git.as_ref(), &self.paths.repo_root, &self.paths.worktrees_dir, &slot_name) {
                Ok(was_created) => {
                    if was_created {
                        created.push(slot_name.clone());
                    }
                    state = state.with_initialized_slot(&slot_name);
                }
                Err(e) => {
                    // Keep the record in step with the worktrees already made.
                    tx.save(&state)?;
                    return Err(e);
                }
            }
        }

        tx.save(&state)?;
        info!(pool_size = state.pool_size, created = created.len(), "Initialized pool");
        Ok(InitReport {
            pool_size: state.pool_size,
            created,
        })
    }
}
