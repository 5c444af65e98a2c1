//! Git side effects of putting a branch into a slot

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::PoolError;
use crate::git::{Git, worktree_for_branch};
use crate::slot::placeholder_branch_name;

/// Make sure the worktree for `slot_name` exists under `worktrees_dir`
///
/// Returns true if the worktree was created by this call. A new worktree
/// starts on the slot's placeholder branch, created from `HEAD` if needed.
pub fn ensure_slot_worktree(
    git: &dyn Git,
    repo_root: &Path,
    worktrees_dir: &Path,
    slot_name: &str,
) -> Result<bool, PoolError> {
    debug!(?worktrees_dir, %slot_name, "ensure_slot_worktree: called");
    let path = worktrees_dir.join(slot_name);
    if git.is_dir(&path) {
        debug!(?path, "ensure_slot_worktree: already on disk");
        return Ok(false);
    }

    let placeholder = placeholder_branch_name(slot_name)
        .ok_or_else(|| PoolError::Corrupt(format!("{:?} is not a valid slot name", slot_name)))?;
    if git.branch_head(repo_root, &placeholder)?.is_none() {
        debug!(%placeholder, "ensure_slot_worktree: creating placeholder branch");
        git.create_branch(repo_root, &placeholder, "HEAD")?;
    }

    std::fs::create_dir_all(worktrees_dir).map_err(|source| PoolError::Io {
        path: worktrees_dir.to_path_buf(),
        source,
    })?;
    git.add_worktree(repo_root, &path, &placeholder)?;
    info!(%slot_name, ?path, "Provisioned slot worktree");
    Ok(true)
}

/// Path of the worktree checked out on `branch`, if any
fn checked_out_at(git: &dyn Git, repo_root: &Path, branch: &str) -> Result<Option<PathBuf>, PoolError> {
    let worktrees = git.list_worktrees(repo_root)?;
    Ok(worktree_for_branch(&worktrees, branch).map(|wt| wt.path.clone()))
}

/// Make sure `branch` exists locally and is not behind `remote` where that can be fixed
///
/// A local branch that diverged from the remote is reset to the remote when
/// nothing has it checked out; otherwise the caller gets
/// [`PoolError::DivergedBranchInUse`].
pub fn ensure_branch(git: &dyn Git, repo_root: &Path, branch: &str, remote: &str) -> Result<(), PoolError> {
    debug!(%branch, %remote, "ensure_branch: called");
    let local = git.branch_head(repo_root, branch)?;
    let upstream = git.remote_branch_head(repo_root, remote, branch)?;
    let remote_ref = format!("{}/{}", remote, branch);

    match (local, upstream) {
        (None, None) => {
            debug!("ensure_branch: new branch from HEAD");
            git.create_branch(repo_root, branch, "HEAD")?;
            info!(%branch, "Created branch from HEAD");
        }
        (None, Some(_)) => {
            debug!("ensure_branch: tracking remote branch");
            git.create_branch(repo_root, branch, &remote_ref)?;
            info!(%branch, %remote_ref, "Created branch from remote");
        }
        (Some(_), None) => {
            debug!("ensure_branch: local only");
        }
        (Some(local), Some(upstream)) => {
            if local == upstream || git.is_ancestor(repo_root, &upstream, &local)? {
                debug!("ensure_branch: local is current or ahead");
                return Ok(());
            }

            let holder = checked_out_at(git, repo_root, branch)?;
            if git.is_ancestor(repo_root, &local, &upstream)? {
                match holder {
                    Some(path) => {
                        warn!(%branch, ?path, "Branch is behind {} but checked out; using local", remote_ref);
                    }
                    None => {
                        debug!("ensure_branch: fast-forwarding");
                        git.force_update_branch(repo_root, branch, &remote_ref)?;
                        info!(%branch, %remote_ref, "Fast-forwarded branch");
                    }
                }
                return Ok(());
            }

            if let Some(path) = holder {
                debug!("ensure_branch: diverged and in use");
                return Err(PoolError::DivergedBranchInUse {
                    branch: branch.to_string(),
                    remote: remote_ref,
                    worktree: path.display().to_string(),
                });
            }
            warn!(%branch, previous = %local, "Branch diverged from {}; resetting it to the remote", remote_ref);
            git.force_update_branch(repo_root, branch, &remote_ref)?;
        }
    }
    Ok(())
}
