//! Persisted pool state
//!
//! `PoolState` is the aggregate stored in `pool.json`. Values are treated as
//! immutable: every change builds a new state that is then saved as a whole.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use poolstore::Versioned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::slot::{MAX_POOL_SIZE, generate_slot_name, slot_number};

/// Schema version written by this build
pub const SCHEMA_VERSION: &str = "1.0";

/// Pool size used when nothing is configured
pub const DEFAULT_POOL_SIZE: u32 = 4;

/// A current lease binding one branch to one slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotAssignment {
    pub slot_name: String,
    pub branch_name: String,
    /// RFC 3339 UTC timestamp
    pub assigned_at: String,
    pub worktree_path: PathBuf,
}

impl SlotAssignment {
    /// Parsed `assigned_at`, `None` if it is not RFC 3339
    pub fn assigned_at_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.assigned_at).ok()
    }
}

/// A slot whose worktree has been provisioned on disk at least once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotInfo {
    pub name: String,
    #[serde(default)]
    pub last_objective_issue: Option<u64>,
}

impl SlotInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_objective_issue: None,
        }
    }
}

/// The pool document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    #[serde(rename = "version")]
    pub schema_version: String,
    pub pool_size: u32,
    #[serde(default)]
    pub assignments: Vec<SlotAssignment>,
    #[serde(default)]
    pub slots: Vec<SlotInfo>,
}

impl Versioned for PoolState {
    const SUPPORTED_VERSIONS: &'static [&'static str] = &[SCHEMA_VERSION];
}

/// Current time in the format stored in `assigned_at`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

impl PoolState {
    /// An empty pool of the given capacity
    pub fn new(pool_size: u32) -> Self {
        debug!(pool_size, "PoolState::new: called");
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            pool_size,
            assignments: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Check the document invariants, describing the first violation found
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(format!("pool_size {} is outside 1..={}", self.pool_size, MAX_POOL_SIZE));
        }
        if self.assignments.len() > self.pool_size as usize {
            return Err(format!(
                "{} assignments exceed pool_size {}",
                self.assignments.len(),
                self.pool_size
            ));
        }

        let mut slot_names = HashSet::new();
        let mut branch_names = HashSet::new();
        for a in &self.assignments {
            self.check_slot_name(&a.slot_name)?;
            if !slot_names.insert(a.slot_name.as_str()) {
                return Err(format!("slot {} is assigned more than once", a.slot_name));
            }
            if !branch_names.insert(a.branch_name.as_str()) {
                return Err(format!("branch {} is assigned more than once", a.branch_name));
            }
            if a.assigned_at_time().is_none() {
                return Err(format!(
                    "assignment for {} has invalid assigned_at {:?}",
                    a.slot_name, a.assigned_at
                ));
            }
        }

        let mut initialized = HashSet::new();
        for s in &self.slots {
            self.check_slot_name(&s.name)?;
            if !initialized.insert(s.name.as_str()) {
                return Err(format!("slot {} is listed more than once", s.name));
            }
        }
        Ok(())
    }

    fn check_slot_name(&self, name: &str) -> Result<(), String> {
        match slot_number(name) {
            Some(n) if (1..=self.pool_size).contains(&n) => Ok(()),
            Some(n) => Err(format!("slot {} is outside pool of {} (number {})", name, self.pool_size, n)),
            None => Err(format!("{:?} is not a valid slot name", name)),
        }
    }

    /// Assignment currently holding `branch`
    pub fn find_branch_assignment(&self, branch: &str) -> Option<&SlotAssignment> {
        self.assignments.iter().find(|a| a.branch_name == branch)
    }

    /// Assignment currently holding slot `slot_name`
    pub fn find_slot_assignment(&self, slot_name: &str) -> Option<&SlotAssignment> {
        self.assignments.iter().find(|a| a.slot_name == slot_name)
    }

    /// True if the slot's worktree has been provisioned before
    pub fn is_initialized(&self, slot_name: &str) -> bool {
        self.slots.iter().any(|s| s.name == slot_name)
    }

    /// Lowest-numbered initialized slot with no current assignment
    pub fn find_inactive_slot(&self) -> Option<&SlotInfo> {
        debug!("PoolState::find_inactive_slot: called");
        self.slots
            .iter()
            .filter_map(|s| slot_number(&s.name).map(|n| (n, s)))
            .filter(|(n, s)| *n <= self.pool_size && self.find_slot_assignment(&s.name).is_none())
            .min_by_key(|(n, _)| *n)
            .map(|(_, s)| s)
    }

    /// First slot in `1..=pool_size` that is unassigned, never initialized and,
    /// when `worktrees_dir` is given, has no directory on disk
    ///
    /// The disk check keeps an untracked directory left behind by a crash from
    /// being silently adopted.
    pub fn find_next_available_slot(&self, worktrees_dir: Option<&Path>) -> Option<String> {
        debug!(?worktrees_dir, "PoolState::find_next_available_slot: called");
        (1..=self.pool_size).map(generate_slot_name).find(|name| {
            if self.find_slot_assignment(name).is_some() || self.is_initialized(name) {
                return false;
            }
            match worktrees_dir {
                Some(dir) => !dir.join(name).exists(),
                None => true,
            }
        })
    }

    /// Assignment with the earliest `assigned_at`; ties go to the lower slot name
    pub fn find_oldest_assignment(&self) -> Option<&SlotAssignment> {
        self.assignments
            .iter()
            .min_by(|a, b| (a.assigned_at_time(), &a.slot_name).cmp(&(b.assigned_at_time(), &b.slot_name)))
    }

    /// New state with `assignment` added, replacing any lease on the same slot
    pub fn with_assignment(&self, assignment: SlotAssignment) -> Self {
        let mut next = self.clone();
        next.assignments.retain(|a| a.slot_name != assignment.slot_name);
        next.assignments.push(assignment);
        next.assignments.sort_by(|a, b| a.slot_name.cmp(&b.slot_name));
        next
    }

    /// New state without the lease on `slot_name`; slot records are kept
    pub fn without_assignment(&self, slot_name: &str) -> Self {
        let mut next = self.clone();
        next.assignments.retain(|a| a.slot_name != slot_name);
        next
    }

    /// New state recording `slot_name` as initialized (no-op if already recorded)
    pub fn with_initialized_slot(&self, slot_name: &str) -> Self {
        let mut next = self.clone();
        if !next.is_initialized(slot_name) {
            next.slots.push(SlotInfo::new(slot_name));
            next.slots.sort_by(|a, b| a.name.cmp(&b.name));
        }
        next
    }

    /// Highest slot number referenced by any assignment or slot record
    pub fn highest_slot_in_use(&self) -> u32 {
        self.assignments
            .iter()
            .map(|a| a.slot_name.as_str())
            .chain(self.slots.iter().map(|s| s.name.as_str()))
            .filter_map(slot_number)
            .max()
            .unwrap_or(0)
    }
}
