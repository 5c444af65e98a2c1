//! Pool error types

use poolstore::StoreError;
use std::path::PathBuf;

use crate::git::GitError;

/// Errors surfaced by pool operations
///
/// The reconciler never produces these; it reports drift as findings.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("No worktree pool is configured for this repository (expected {0})")]
    NotConfigured(String),

    #[error("Not inside a git repository: {0}")]
    NotInRepository(PathBuf),

    #[error("Pool state is corrupt: {0}")]
    Corrupt(String),

    #[error("Pool state uses unsupported schema version {found:?} (supported: {supported})")]
    UnsupportedSchema { found: String, supported: String },

    #[error("All {pool_size} slots are assigned; rerun with --force to evict the oldest assignment")]
    PoolFull { pool_size: u32 },

    #[error("Eviction of '{branch}' from {slot} declined; nothing was changed")]
    EvictionDeclined { slot: String, branch: String },

    #[error("Cancelled; nothing was changed")]
    Interrupted,

    #[error("No assignment found for '{0}' (not a slot name or an assigned branch)")]
    AssignmentNotFound(String),

    #[error("Branch '{branch}' has diverged from {remote} and is checked out at {worktree}; resolve it manually")]
    DivergedBranchInUse {
        branch: String,
        remote: String,
        worktree: String,
    },

    #[error("Invalid pool size {size}: {reason}")]
    InvalidPoolSize { size: u32, reason: String },

    #[error("Refusing to continue without confirmation: {0}")]
    ConfirmationRequired(String),

    #[error("Pool store error: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error("Prompt failed: {0}")]
    Prompt(String),

    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<StoreError> for PoolError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Corrupt { path, message } => Self::Corrupt(format!("{}: {}", path.display(), message)),
            StoreError::UnsupportedSchema { found, supported, .. } => Self::UnsupportedSchema { found, supported },
            other => Self::Store(other),
        }
    }
}

impl PoolError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        1
    }
}
