//! The worktree pool of one repository

use poolstore::DocumentStore;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::PoolError;
use crate::config::{Config, PoolPaths};
use crate::git::Git;
use crate::lookup::find_assignment_by_worktree;
use crate::prompt::Prompt;
use crate::slot::generate_slot_name;
use crate::state::{PoolState, SlotAssignment};

/// Occupancy of one slot as shown by `ep list`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    /// Holds a branch
    Assigned,
    /// Provisioned on disk and free for reuse
    Available,
    /// Never provisioned
    Uninitialized,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Assigned => write!(f, "assigned"),
            SlotState::Available => write!(f, "available"),
            SlotState::Uninitialized => write!(f, "uninitialized"),
        }
    }
}

/// One row of the pool status listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    pub slot_name: String,
    pub state: SlotState,
    pub branch: Option<String>,
    pub assigned_at: Option<String>,
}

/// One row per slot number in `1..=pool_size`
pub fn pool_status(state: &PoolState) -> Vec<SlotStatus> {
    (1..=state.pool_size)
        .map(generate_slot_name)
        .map(|slot_name| match state.find_slot_assignment(&slot_name) {
            Some(a) => SlotStatus {
                state: SlotState::Assigned,
                branch: Some(a.branch_name.clone()),
                assigned_at: Some(a.assigned_at.clone()),
                slot_name,
            },
            None => SlotStatus {
                state: if state.is_initialized(&slot_name) {
                    SlotState::Available
                } else {
                    SlotState::Uninitialized
                },
                branch: None,
                assigned_at: None,
                slot_name,
            },
        })
        .collect()
}

/// Reject a loaded document that breaks the pool invariants
pub(crate) fn checked(state: PoolState) -> Result<PoolState, PoolError> {
    state.validate().map_err(PoolError::Corrupt)?;
    Ok(state)
}

/// Pool of slot worktrees for one repository
///
/// Git and the confirmation prompt are injected so the same code runs against
/// the real binary and a terminal, or against in-memory fakes.
pub struct WorktreePool {
    pub(crate) paths: PoolPaths,
    pub(crate) pool_size: u32,
    pub(crate) remote: String,
    pub(crate) store: DocumentStore<PoolState>,
    pub(crate) git: Box<dyn Git>,
    pub(crate) prompt: Box<dyn Prompt>,
}

impl WorktreePool {
    /// Create a pool handle; `pool_size` is used only when no document exists yet
    pub fn new(paths: PoolPaths, pool_size: u32, remote: impl Into<String>, git: Box<dyn Git>, prompt: Box<dyn Prompt>) -> Self {
        debug!(?paths, pool_size, "WorktreePool::new: called");
        let store = DocumentStore::new(&paths.state_file);
        Self {
            paths,
            pool_size,
            remote: remote.into(),
            store,
            git,
            prompt,
        }
    }

    /// Open the pool of the repository containing `cwd`
    pub fn open(config: &Config, cwd: &Path, git: Box<dyn Git>, prompt: Box<dyn Prompt>) -> Result<Self, PoolError> {
        debug!(?cwd, "WorktreePool::open: called");
        let repo_root = git
            .repository_root(cwd)?
            .ok_or_else(|| PoolError::NotInRepository(cwd.to_path_buf()))?;
        let paths = PoolPaths::new(&config.erk_root, &repo_root);
        Ok(Self::new(paths, config.pool_size, config.remote.clone(), git, prompt))
    }

    pub fn paths(&self) -> &PoolPaths {
        &self.paths
    }

    /// Read the pool document without locking
    pub fn load(&self) -> Result<Option<PoolState>, PoolError> {
        debug!("WorktreePool::load: called");
        self.store.load()?.map(checked).transpose()
    }

    /// Read the pool document, failing if there is none
    pub fn load_required(&self) -> Result<PoolState, PoolError> {
        self.load()?
            .ok_or_else(|| PoolError::NotConfigured(self.paths.state_file.display().to_string()))
    }

    /// Status rows; a missing document lists the configured size as uninitialized
    pub fn status(&self) -> Result<Vec<SlotStatus>, PoolError> {
        debug!("WorktreePool::status: called");
        let state = self.load()?.unwrap_or_else(|| PoolState::new(self.pool_size));
        Ok(pool_status(&state))
    }

    /// Assignment of the worktree containing `cwd`
    pub fn which(&self, cwd: &Path) -> Result<Option<SlotAssignment>, PoolError> {
        debug!(?cwd, "WorktreePool::which: called");
        let Some(state) = self.load()? else {
            return Ok(None);
        };
        Ok(find_assignment_by_worktree(&state, self.git.as_ref(), cwd)?.cloned())
    }
}
