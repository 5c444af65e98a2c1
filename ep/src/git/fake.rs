//! In-memory Git capability for tests

use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{Git, GitError, WorktreeInfo};

#[derive(Debug, Default)]
struct FakeState {
    worktrees: Vec<WorktreeInfo>,
    branches: BTreeMap<String, String>,
    remote_branches: BTreeMap<(String, String), String>,
    ancestry: HashSet<(String, String)>,
    failing_checkouts: HashSet<String>,
    sha_counter: u32,
}

/// Fake repository: a branch table, a worktree registry and nothing else
///
/// `add_worktree` also creates the directory on the real filesystem so the
/// filesystem and registry views agree the way they would with real git.
#[derive(Debug)]
pub struct FakeGit {
    repo_root: PathBuf,
    state: RefCell<FakeState>,
}

impl FakeGit {
    /// Repository at `repo_root` with `main` checked out in the root worktree
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        let mut state = FakeState::default();
        state.branches.insert("main".to_string(), fake_sha(0));
        state.worktrees.push(WorktreeInfo {
            path: repo_root.clone(),
            branch: Some("main".to_string()),
            is_root: true,
        });
        Self {
            repo_root,
            state: RefCell::new(state),
        }
    }

    pub fn with_branch(self, branch: &str, sha: &str) -> Self {
        self.state.borrow_mut().branches.insert(branch.to_string(), sha.to_string());
        self
    }

    pub fn with_remote_branch(self, remote: &str, branch: &str, sha: &str) -> Self {
        self.state
            .borrow_mut()
            .remote_branches
            .insert((remote.to_string(), branch.to_string()), sha.to_string());
        self
    }

    /// Declare `ancestor` reachable from `descendant`
    pub fn with_ancestor(self, ancestor: &str, descendant: &str) -> Self {
        self.state
            .borrow_mut()
            .ancestry
            .insert((ancestor.to_string(), descendant.to_string()));
        self
    }

    /// Register an existing worktree without touching the filesystem
    pub fn with_worktree(self, path: impl Into<PathBuf>, branch: Option<&str>) -> Self {
        self.state.borrow_mut().worktrees.push(WorktreeInfo {
            path: path.into(),
            branch: branch.map(str::to_string),
            is_root: false,
        });
        self
    }

    /// Make every checkout of `branch` fail
    pub fn with_failing_checkout(self, branch: &str) -> Self {
        self.state.borrow_mut().failing_checkouts.insert(branch.to_string());
        self
    }

    /// Drop a worktree from the registry, leaving any directory in place
    pub fn forget_worktree(&self, path: &Path) {
        self.state.borrow_mut().worktrees.retain(|wt| wt.path != path);
    }

    /// Delete a local branch
    pub fn delete_branch(&self, branch: &str) {
        self.state.borrow_mut().branches.remove(branch);
    }

    /// Current registry snapshot
    pub fn worktrees(&self) -> Vec<WorktreeInfo> {
        self.state.borrow().worktrees.clone()
    }

    /// Branch checked out at `path`, if registered
    pub fn branch_at(&self, path: &Path) -> Option<String> {
        self.state
            .borrow()
            .worktrees
            .iter()
            .find(|wt| wt.path == path)
            .and_then(|wt| wt.branch.clone())
    }

    /// Commit `branch` points at
    pub fn head_of(&self, branch: &str) -> Option<String> {
        self.state.borrow().branches.get(branch).cloned()
    }

    fn failed(command: &str, stderr: impl Into<String>) -> GitError {
        GitError::Failed {
            command: command.to_string(),
            stderr: stderr.into(),
        }
    }

    fn resolve(state: &mut FakeState, start_point: &str) -> String {
        if start_point == "HEAD" {
            let root_branch = state.worktrees.first().and_then(|wt| wt.branch.clone());
            if let Some(sha) = root_branch.and_then(|b| state.branches.get(&b).cloned()) {
                return sha;
            }
        }
        if let Some(sha) = state.branches.get(start_point) {
            return sha.clone();
        }
        if let Some((remote, branch)) = start_point.split_once('/')
            && let Some(sha) = state.remote_branches.get(&(remote.to_string(), branch.to_string()))
        {
            return sha.clone();
        }
        if start_point.len() == 40 {
            return start_point.to_string();
        }
        state.sha_counter += 1;
        fake_sha(state.sha_counter)
    }
}

fn fake_sha(n: u32) -> String {
    format!("{:040x}", n)
}

impl Git for FakeGit {
    fn repository_root(&self, path: &Path) -> Result<Option<PathBuf>, GitError> {
        let state = self.state.borrow();
        let inside = state.worktrees.iter().any(|wt| path.starts_with(&wt.path));
        Ok(inside.then(|| self.repo_root.clone()))
    }

    fn worktree_root(&self, path: &Path) -> Result<Option<PathBuf>, GitError> {
        let state = self.state.borrow();
        Ok(state
            .worktrees
            .iter()
            .filter(|wt| path.starts_with(&wt.path))
            .max_by_key(|wt| wt.path.components().count())
            .map(|wt| wt.path.clone()))
    }

    fn list_worktrees(&self, _repo_root: &Path) -> Result<Vec<WorktreeInfo>, GitError> {
        Ok(self.worktrees())
    }

    fn branch_head(&self, _repo_root: &Path, branch: &str) -> Result<Option<String>, GitError> {
        Ok(self.head_of(branch))
    }

    fn remote_branch_head(&self, _repo_root: &Path, remote: &str, branch: &str) -> Result<Option<String>, GitError> {
        Ok(self
            .state
            .borrow()
            .remote_branches
            .get(&(remote.to_string(), branch.to_string()))
            .cloned())
    }

    fn is_ancestor(&self, _repo_root: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        let state = self.state.borrow();
        Ok(ancestor == descendant || state.ancestry.contains(&(ancestor.to_string(), descendant.to_string())))
    }

    fn create_branch(&self, _repo_root: &Path, branch: &str, start_point: &str) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        if state.branches.contains_key(branch) {
            return Err(Self::failed("git branch", format!("a branch named '{}' already exists", branch)));
        }
        let sha = Self::resolve(&mut state, start_point);
        state.branches.insert(branch.to_string(), sha);
        Ok(())
    }

    fn force_update_branch(&self, _repo_root: &Path, branch: &str, target: &str) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        if state.worktrees.iter().any(|wt| wt.branch.as_deref() == Some(branch)) {
            return Err(Self::failed("git branch -f", format!("cannot force update the branch '{}' used by worktree", branch)));
        }
        let sha = Self::resolve(&mut state, target);
        state.branches.insert(branch.to_string(), sha);
        Ok(())
    }

    fn add_worktree(&self, _repo_root: &Path, path: &Path, branch: &str) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        state.worktrees.retain(|wt| wt.path != path || wt.path.exists());
        if state.worktrees.iter().any(|wt| wt.path == path) {
            return Err(Self::failed("git worktree add", format!("'{}' is already registered", path.display())));
        }
        if !state.branches.contains_key(branch) {
            return Err(Self::failed("git worktree add", format!("invalid reference: {}", branch)));
        }
        if let Some(wt) = state.worktrees.iter().find(|wt| wt.branch.as_deref() == Some(branch)) {
            return Err(Self::failed(
                "git worktree add",
                format!("'{}' is already checked out at '{}'", branch, wt.path.display()),
            ));
        }
        fs::create_dir_all(path).map_err(|source| GitError::Spawn {
            command: "git worktree add".to_string(),
            source,
        })?;
        state.worktrees.push(WorktreeInfo {
            path: path.to_path_buf(),
            branch: Some(branch.to_string()),
            is_root: false,
        });
        Ok(())
    }

    fn checkout_branch(&self, worktree: &Path, branch: &str) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        if state.failing_checkouts.contains(branch) {
            return Err(Self::failed("git switch", format!("simulated failure switching to {}", branch)));
        }
        if !state.branches.contains_key(branch) {
            return Err(Self::failed("git switch", format!("invalid reference: {}", branch)));
        }
        if let Some(other) = state
            .worktrees
            .iter()
            .find(|wt| wt.branch.as_deref() == Some(branch) && wt.path != worktree)
        {
            return Err(Self::failed(
                "git switch",
                format!("'{}' is already checked out at '{}'", branch, other.path.display()),
            ));
        }
        let wt = state
            .worktrees
            .iter_mut()
            .find(|wt| wt.path == worktree)
            .ok_or_else(|| Self::failed("git switch", format!("not a git repository: {}", worktree.display())))?;
        wt.branch = Some(branch.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fake_add_and_checkout() {
        let temp = tempdir().unwrap();
        let git = FakeGit::new(temp.path().join("repo"));
        let root = temp.path().join("repo");
        let wt = temp.path().join("pool").join("erk-managed-wt-01");

        git.create_branch(&root, "feature-x", "HEAD").unwrap();
        assert_eq!(git.head_of("feature-x"), git.head_of("main"));

        git.add_worktree(&root, &wt, "feature-x").unwrap();
        assert!(wt.is_dir());
        assert_eq!(git.branch_at(&wt).as_deref(), Some("feature-x"));

        // main is held by the root worktree
        assert!(git.checkout_branch(&wt, "main").is_err());

        git.create_branch(&root, "other", "main").unwrap();
        git.checkout_branch(&wt, "other").unwrap();
        assert_eq!(git.branch_at(&wt).as_deref(), Some("other"));
    }

    #[test]
    fn test_fake_worktree_root_is_component_wise() {
        let git = FakeGit::new("/repo").with_worktree("/pool/erk-managed-wt-01", Some("a"));

        assert_eq!(
            git.worktree_root(Path::new("/pool/erk-managed-wt-01/src")).unwrap(),
            Some(PathBuf::from("/pool/erk-managed-wt-01"))
        );
        assert_eq!(git.worktree_root(Path::new("/pool/erk-managed-wt-010")).unwrap(), None);
        assert_eq!(git.repository_root(Path::new("/elsewhere")).unwrap(), None);
    }
}
