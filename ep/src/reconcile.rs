//! Drift detection between the pool document, the filesystem and git
//!
//! Three views of the same slots can disagree: the pool document, the slot
//! directories on disk, and git's worktree registry. [`reconcile`] compares
//! them and reports every disagreement as a [`Finding`]. It never modifies
//! anything and never fails; a view that cannot be read is skipped with a
//! warning.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::PoolError;
use crate::git::{Git, WorktreeInfo};
use crate::lookup::normalize_path;
use crate::pool::WorktreePool;
use crate::slot::is_slot_name;
use crate::state::PoolState;

/// Kind of disagreement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    /// Assignment whose worktree directory is missing
    OrphanState,
    /// Slot directory on disk that nothing accounts for
    OrphanDirectory,
    /// Assigned branch does not resolve to a commit
    MissingBranch,
    /// Git has a different branch checked out in the slot
    BranchMismatch,
    /// Assigned slot is not in git's worktree registry
    RegistryMissing,
    /// Git has a slot worktree that nothing accounts for
    UntrackedWorktree,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FindingKind::OrphanState => "orphan-state",
            FindingKind::OrphanDirectory => "orphan-directory",
            FindingKind::MissingBranch => "missing-branch",
            FindingKind::BranchMismatch => "branch-mismatch",
            FindingKind::RegistryMissing => "registry-missing",
            FindingKind::UntrackedWorktree => "untracked-worktree",
        };
        write!(f, "{}", s)
    }
}

/// One reported disagreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    pub slot_name: String,
    pub message: String,
}

impl Finding {
    fn new(kind: FindingKind, slot_name: &str, message: String) -> Self {
        Self {
            kind,
            slot_name: slot_name.to_string(),
            message,
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.slot_name, self.message)
    }
}

/// Slot-pattern directory names directly under `worktrees_dir`
fn slot_directories(worktrees_dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(worktrees_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(?worktrees_dir, error = %e, "Cannot read worktrees directory; skipping directory checks");
            return Vec::new();
        }
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| is_slot_name(name))
        .collect();
    names.sort();
    names
}

fn registered_at<'a>(registry: &'a [WorktreeInfo], path: &Path) -> Option<&'a WorktreeInfo> {
    let target = normalize_path(path);
    registry.iter().find(|wt| normalize_path(&wt.path) == target)
}

/// Compare the pool document against the filesystem and git's registry
pub fn reconcile(state: &PoolState, worktrees_dir: &Path, repo_root: &Path, git: &dyn Git) -> Vec<Finding> {
    debug!(?worktrees_dir, ?repo_root, "reconcile: called");
    let mut findings = Vec::new();

    let registry = match git.list_worktrees(repo_root) {
        Ok(registry) => Some(registry),
        Err(e) => {
            warn!(error = %e, "Cannot list git worktrees; skipping registry checks");
            None
        }
    };

    for a in &state.assignments {
        if !git.path_exists(&a.worktree_path) {
            findings.push(Finding::new(
                FindingKind::OrphanState,
                &a.slot_name,
                format!(
                    "assigned to '{}' but {} does not exist",
                    a.branch_name,
                    a.worktree_path.display()
                ),
            ));
        }

        match git.branch_head(repo_root, &a.branch_name) {
            Ok(Some(_)) => {}
            Ok(None) => findings.push(Finding::new(
                FindingKind::MissingBranch,
                &a.slot_name,
                format!("branch '{}' does not exist", a.branch_name),
            )),
            Err(e) => warn!(branch = %a.branch_name, error = %e, "Cannot resolve branch; skipping branch check"),
        }

        let Some(registry) = registry.as_deref() else {
            continue;
        };
        match registered_at(registry, &a.worktree_path) {
            None => findings.push(Finding::new(
                FindingKind::RegistryMissing,
                &a.slot_name,
                format!("{} is not a registered git worktree", a.worktree_path.display()),
            )),
            Some(wt) if wt.branch.as_deref() != Some(a.branch_name.as_str()) => findings.push(Finding::new(
                FindingKind::BranchMismatch,
                &a.slot_name,
                format!(
                    "expected '{}' but git has {} checked out",
                    a.branch_name,
                    wt.branch
                        .as_deref()
                        .map(|b| format!("'{}'", b))
                        .unwrap_or_else(|| "a detached HEAD".to_string())
                ),
            )),
            Some(_) => {}
        }
    }

    let accounted: HashSet<&str> = state
        .assignments
        .iter()
        .map(|a| a.slot_name.as_str())
        .chain(state.slots.iter().map(|s| s.name.as_str()))
        .collect();

    for name in slot_directories(worktrees_dir) {
        if !accounted.contains(name.as_str()) {
            findings.push(Finding::new(
                FindingKind::OrphanDirectory,
                &name,
                format!("{} exists but is not part of the pool", worktrees_dir.join(&name).display()),
            ));
        }
    }

    if let Some(registry) = registry.as_deref() {
        let assigned_paths: HashSet<PathBuf> = state
            .assignments
            .iter()
            .map(|a| normalize_path(&a.worktree_path))
            .collect();
        for wt in registry.iter().filter(|wt| !wt.is_root) {
            let Some(name) = wt.path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !is_slot_name(name) || accounted.contains(name) || assigned_paths.contains(&normalize_path(&wt.path)) {
                continue;
            }
            findings.push(Finding::new(
                FindingKind::UntrackedWorktree,
                name,
                format!("git has a worktree at {} that is not part of the pool", wt.path.display()),
            ));
        }
    }

    debug!(count = findings.len(), "reconcile: done");
    findings
}

impl WorktreePool {
    /// Read-only consistency check of this pool
    pub fn check(&self) -> Result<Vec<Finding>, PoolError> {
        debug!("WorktreePool::check: called");
        let state = self.load()?.unwrap_or_else(|| PoolState::new(self.pool_size));
        Ok(reconcile(
            &state,
            &self.paths.worktrees_dir,
            &self.paths.repo_root,
            self.git.as_ref(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{FakeGit, GitError};
    use crate::state::SlotAssignment;
    use tempfile::TempDir;

    const T0: &str = "2024-01-15T10:30:00+00:00";
    const SHA: &str = "1111111111111111111111111111111111111111";

    struct Scene {
        _temp: TempDir,
        repo: PathBuf,
        dir: PathBuf,
    }

    impl Scene {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let repo = temp.path().join("repo");
            let dir = temp.path().join("worktrees");
            fs::create_dir_all(&dir).unwrap();
            Self { _temp: temp, repo, dir }
        }

        fn assignment(&self, slot: u32, branch: &str) -> SlotAssignment {
            let slot_name = crate::slot::generate_slot_name(slot);
            SlotAssignment {
                worktree_path: self.dir.join(&slot_name),
                slot_name,
                branch_name: branch.to_string(),
                assigned_at: T0.to_string(),
            }
        }

        fn mkdir(&self, slot_name: &str) -> PathBuf {
            let path = self.dir.join(slot_name);
            fs::create_dir_all(&path).unwrap();
            path
        }
    }

    fn kinds(findings: &[Finding]) -> Vec<FindingKind> {
        findings.iter().map(|f| f.kind).collect()
    }

    #[test]
    fn test_clean_pool_has_no_findings() {
        let scene = Scene::new();
        let path = scene.mkdir("erk-managed-wt-01");
        let git = FakeGit::new(&scene.repo)
            .with_branch("feature-x", SHA)
            .with_worktree(&path, Some("feature-x"));
        let state = PoolState::new(4)
            .with_initialized_slot("erk-managed-wt-01")
            .with_assignment(scene.assignment(1, "feature-x"));

        assert!(reconcile(&state, &scene.dir, &scene.repo, &git).is_empty());
    }

    #[test]
    fn test_orphan_state_for_missing_path() {
        let scene = Scene::new();
        let git = FakeGit::new(&scene.repo)
            .with_branch("feature-x", SHA)
            .with_worktree(scene.dir.join("erk-managed-wt-01"), Some("feature-x"));
        let state = PoolState::new(4).with_assignment(scene.assignment(1, "feature-x"));

        let findings = reconcile(&state, &scene.dir, &scene.repo, &git);
        assert_eq!(kinds(&findings), vec![FindingKind::OrphanState]);
        assert_eq!(findings[0].slot_name, "erk-managed-wt-01");
    }

    #[test]
    fn test_orphan_directory_without_assignment_or_slot() {
        let scene = Scene::new();
        scene.mkdir("erk-managed-wt-03");
        scene.mkdir("not-a-slot");
        let git = FakeGit::new(&scene.repo);

        let findings = reconcile(&PoolState::new(4), &scene.dir, &scene.repo, &git);
        assert_eq!(kinds(&findings), vec![FindingKind::OrphanDirectory]);
        assert_eq!(findings[0].slot_name, "erk-managed-wt-03");
    }

    #[test]
    fn test_initialized_idle_slot_is_not_drift() {
        let scene = Scene::new();
        let path = scene.mkdir("erk-managed-wt-02");
        let git = FakeGit::new(&scene.repo).with_worktree(&path, Some("__erk-slot-02-placeholder__"));
        let state = PoolState::new(4).with_initialized_slot("erk-managed-wt-02");

        assert!(reconcile(&state, &scene.dir, &scene.repo, &git).is_empty());
    }

    #[test]
    fn test_missing_branch() {
        let scene = Scene::new();
        let path = scene.mkdir("erk-managed-wt-01");
        let git = FakeGit::new(&scene.repo).with_worktree(&path, Some("gone"));
        let state = PoolState::new(4)
            .with_initialized_slot("erk-managed-wt-01")
            .with_assignment(scene.assignment(1, "gone"));

        assert_eq!(
            kinds(&reconcile(&state, &scene.dir, &scene.repo, &git)),
            vec![FindingKind::MissingBranch]
        );
    }

    #[test]
    fn test_branch_mismatch() {
        let scene = Scene::new();
        let path = scene.mkdir("erk-managed-wt-01");
        let git = FakeGit::new(&scene.repo)
            .with_branch("feature-x", SHA)
            .with_worktree(&path, Some("something-else"));
        let state = PoolState::new(4)
            .with_initialized_slot("erk-managed-wt-01")
            .with_assignment(scene.assignment(1, "feature-x"));

        let findings = reconcile(&state, &scene.dir, &scene.repo, &git);
        assert_eq!(kinds(&findings), vec![FindingKind::BranchMismatch]);
        assert!(findings[0].message.contains("something-else"));
    }

    #[test]
    fn test_registry_missing() {
        let scene = Scene::new();
        scene.mkdir("erk-managed-wt-01");
        let git = FakeGit::new(&scene.repo).with_branch("feature-x", SHA);
        let state = PoolState::new(4)
            .with_initialized_slot("erk-managed-wt-01")
            .with_assignment(scene.assignment(1, "feature-x"));

        assert_eq!(
            kinds(&reconcile(&state, &scene.dir, &scene.repo, &git)),
            vec![FindingKind::RegistryMissing]
        );
    }

    #[test]
    fn test_untracked_worktree() {
        let scene = Scene::new();
        let git = FakeGit::new(&scene.repo).with_worktree("/somewhere/erk-managed-wt-04", Some("stray"));

        let findings = reconcile(&PoolState::new(4), &scene.dir, &scene.repo, &git);
        assert_eq!(kinds(&findings), vec![FindingKind::UntrackedWorktree]);
        assert_eq!(findings[0].slot_name, "erk-managed-wt-04");
    }

    #[test]
    fn test_findings_coexist() {
        let scene = Scene::new();
        scene.mkdir("erk-managed-wt-02");
        let git = FakeGit::new(&scene.repo);
        let state = PoolState::new(4).with_assignment(scene.assignment(1, "gone"));

        let found = kinds(&reconcile(&state, &scene.dir, &scene.repo, &git));
        assert_eq!(
            found,
            vec![
                FindingKind::OrphanState,
                FindingKind::MissingBranch,
                FindingKind::RegistryMissing,
                FindingKind::OrphanDirectory,
            ]
        );
    }

    struct BrokenGit;

    impl Git for BrokenGit {
        fn repository_root(&self, _: &Path) -> Result<Option<PathBuf>, GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn worktree_root(&self, _: &Path) -> Result<Option<PathBuf>, GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn list_worktrees(&self, _: &Path) -> Result<Vec<WorktreeInfo>, GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn branch_head(&self, _: &Path, _: &str) -> Result<Option<String>, GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn remote_branch_head(&self, _: &Path, _: &str, _: &str) -> Result<Option<String>, GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn is_ancestor(&self, _: &Path, _: &str, _: &str) -> Result<bool, GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn create_branch(&self, _: &Path, _: &str, _: &str) -> Result<(), GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn force_update_branch(&self, _: &Path, _: &str, _: &str) -> Result<(), GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn add_worktree(&self, _: &Path, _: &Path, _: &str) -> Result<(), GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
        fn checkout_branch(&self, _: &Path, _: &str) -> Result<(), GitError> {
            Err(GitError::Parse("broken".to_string()))
        }
    }

    #[test]
    fn test_git_failure_skips_dependent_checks() {
        let scene = Scene::new();
        scene.mkdir("erk-managed-wt-03");
        let state = PoolState::new(4).with_assignment(scene.assignment(1, "feature-x"));

        let found = kinds(&reconcile(&state, &scene.dir, &scene.repo, &BrokenGit));
        assert_eq!(found, vec![FindingKind::OrphanState, FindingKind::OrphanDirectory]);
    }

    #[test]
    fn test_finding_display_and_json() {
        let finding = Finding::new(FindingKind::OrphanState, "erk-managed-wt-01", "gone".to_string());
        assert_eq!(finding.to_string(), "[orphan-state] erk-managed-wt-01: gone");
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(json["kind"], "orphan-state");
        assert_eq!(json["slot_name"], "erk-managed-wt-01");
    }
}
