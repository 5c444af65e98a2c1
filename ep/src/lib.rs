//! erkpool - a fixed-capacity pool of git worktree slots
//!
//! Agent-driven workflows check branches out into a bounded set of
//! pre-provisioned worktrees ("slots") instead of creating a worktree per
//! branch. The binding between branches and slots is persisted per
//! repository and shared between independent `ep` invocations.
//!
//! # Layout
//!
//! ```text
//! <erk-root>/repos/<repo-dir-name>/
//! ├── pool.json              # PoolState
//! ├── pool.json.lock         # advisory lock for read-modify-write cycles
//! └── worktrees/
//!     ├── erk-managed-wt-01/
//!     └── erk-managed-wt-02/
//! ```
//!
//! # Modules
//!
//! - [`slot`] - slot names, numbers and placeholder branches
//! - [`state`] - the persisted pool document
//! - [`allocator`] - assigning branches to slots, eviction
//! - [`reconcile`] - drift between pool, filesystem and git
//! - [`unassign`] - releasing slots
//! - [`git`] - the git capability and its implementations
//! - [`cli`] - command-line interface

pub mod allocator;
pub mod cli;
pub mod config;
mod error;
pub mod git;
pub mod lookup;
pub mod maintenance;
pub mod pool;
pub mod prompt;
pub mod provision;
pub mod reconcile;
pub mod slot;
pub mod state;
pub mod unassign;

pub use allocator::{AllocateOptions, Allocation, AllocationPlan, handle_pool_full, plan_allocation};
pub use config::{Config, PoolPaths};
pub use error::PoolError;
pub use lookup::{AssignmentLookup, find_assignment_by_worktree, lookup};
pub use maintenance::{InitReport, RepairOptions, RepairReport};
pub use pool::{SlotState, SlotStatus, WorktreePool, pool_status};
pub use reconcile::{Finding, FindingKind, reconcile};
pub use state::{PoolState, SlotAssignment, SlotInfo};
