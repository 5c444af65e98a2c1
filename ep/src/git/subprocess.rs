//! `git` subprocess implementation of the Git capability

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

use super::{Git, GitError, WorktreeInfo};

/// Runs the `git` binary found on `PATH`
#[derive(Debug, Clone)]
pub struct SubprocessGit {
    binary: PathBuf,
}

impl Default for SubprocessGit {
    fn default() -> Self {
        Self::new()
    }
}

impl SubprocessGit {
    pub fn new() -> Self {
        debug!("SubprocessGit::new: called");
        Self {
            binary: PathBuf::from("git"),
        }
    }

    fn describe(args: &[OsString]) -> String {
        let mut parts = vec!["git".to_string()];
        parts.extend(args.iter().map(|a| a.to_string_lossy().to_string()));
        parts.join(" ")
    }

    fn output<I, S>(&self, dir: &Path, args: I) -> Result<(String, Output), GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<OsString> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let command = Self::describe(&args);
        debug!(?dir, %command, "SubprocessGit::output: running");
        // Error detection matches git's untranslated messages.
        let output = Command::new(&self.binary)
            .args(&args)
            .current_dir(dir)
            .env("LC_ALL", "C")
            .output()
            .map_err(|source| GitError::Spawn {
                command: command.clone(),
                source,
            })?;
        debug!(status = ?output.status.code(), "SubprocessGit::output: finished");
        Ok((command, output))
    }

    /// Run and require success, returning trimmed stdout
    fn run<I, S>(&self, dir: &Path, args: I) -> Result<String, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (command, output) = self.output(dir, args)?;
        if !output.status.success() {
            return Err(GitError::Failed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `rev-parse` that maps "not inside a repository" to `None`
    fn rev_parse_path(&self, path: &Path, flags: &[&str]) -> Result<Option<PathBuf>, GitError> {
        if !path.is_dir() {
            debug!(?path, "SubprocessGit::rev_parse_path: not a directory");
            return Ok(None);
        }
        let mut args = vec!["rev-parse"];
        args.extend_from_slice(flags);
        let (command, output) = self.output(path, &args)?;
        if output.status.success() {
            let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
            return Ok(Some(PathBuf::from(out)));
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not a git repository") {
            debug!(?path, "SubprocessGit::rev_parse_path: outside any repository");
            return Ok(None);
        }
        Err(GitError::Failed { command, stderr })
    }

    /// Resolve a fully qualified ref, `None` if it does not exist
    fn resolve_ref(&self, repo_root: &Path, refname: &str) -> Result<Option<String>, GitError> {
        let spec = format!("{}^{{commit}}", refname);
        let (command, output) = self.output(repo_root, ["rev-parse", "--verify", "--quiet", spec.as_str()])?;
        match output.status.code() {
            Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(GitError::Failed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }
}

impl Git for SubprocessGit {
    fn repository_root(&self, path: &Path) -> Result<Option<PathBuf>, GitError> {
        debug!(?path, "SubprocessGit::repository_root: called");
        let common_dir = self.rev_parse_path(path, &["--path-format=absolute", "--git-common-dir"])?;
        Ok(common_dir.map(|dir| match dir.file_name() {
            Some(name) if name == ".git" => dir.parent().map(Path::to_path_buf).unwrap_or(dir),
            _ => dir,
        }))
    }

    fn worktree_root(&self, path: &Path) -> Result<Option<PathBuf>, GitError> {
        debug!(?path, "SubprocessGit::worktree_root: called");
        self.rev_parse_path(path, &["--show-toplevel"])
    }

    fn list_worktrees(&self, repo_root: &Path) -> Result<Vec<WorktreeInfo>, GitError> {
        debug!(?repo_root, "SubprocessGit::list_worktrees: called");
        let out = self.run(repo_root, ["worktree", "list", "--porcelain"])?;
        parse_worktree_list(&out)
    }

    fn branch_head(&self, repo_root: &Path, branch: &str) -> Result<Option<String>, GitError> {
        debug!(%branch, "SubprocessGit::branch_head: called");
        self.resolve_ref(repo_root, &format!("refs/heads/{}", branch))
    }

    fn remote_branch_head(&self, repo_root: &Path, remote: &str, branch: &str) -> Result<Option<String>, GitError> {
        debug!(%remote, %branch, "SubprocessGit::remote_branch_head: called");
        self.resolve_ref(repo_root, &format!("refs/remotes/{}/{}", remote, branch))
    }

    fn is_ancestor(&self, repo_root: &Path, ancestor: &str, descendant: &str) -> Result<bool, GitError> {
        debug!(%ancestor, %descendant, "SubprocessGit::is_ancestor: called");
        let (command, output) = self.output(repo_root, ["merge-base", "--is-ancestor", ancestor, descendant])?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(GitError::Failed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    fn create_branch(&self, repo_root: &Path, branch: &str, start_point: &str) -> Result<(), GitError> {
        debug!(%branch, %start_point, "SubprocessGit::create_branch: called");
        self.run(repo_root, ["branch", branch, start_point]).map(|_| ())
    }

    fn force_update_branch(&self, repo_root: &Path, branch: &str, target: &str) -> Result<(), GitError> {
        debug!(%branch, %target, "SubprocessGit::force_update_branch: called");
        self.run(repo_root, ["branch", "-f", branch, target]).map(|_| ())
    }

    fn add_worktree(&self, repo_root: &Path, path: &Path, branch: &str) -> Result<(), GitError> {
        debug!(?path, %branch, "SubprocessGit::add_worktree: called");
        // A slot directory deleted by hand stays registered until pruned.
        self.run(repo_root, ["worktree", "prune"])?;
        self.run(
            repo_root,
            [OsStr::new("worktree"), OsStr::new("add"), path.as_os_str(), OsStr::new(branch)],
        )
        .map(|_| ())
    }

    fn checkout_branch(&self, worktree: &Path, branch: &str) -> Result<(), GitError> {
        debug!(?worktree, %branch, "SubprocessGit::checkout_branch: called");
        self.run(worktree, ["switch", branch]).map(|_| ())
    }
}

/// Parse `git worktree list --porcelain`
///
/// Records are separated by blank lines; the first record is the main
/// working tree.
pub fn parse_worktree_list(output: &str) -> Result<Vec<WorktreeInfo>, GitError> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            if let Some(wt) = current.take() {
                worktrees.push(wt);
            }
            continue;
        }
        if let Some(path) = line.strip_prefix("worktree ") {
            if let Some(wt) = current.take() {
                worktrees.push(wt);
            }
            current = Some(WorktreeInfo {
                path: PathBuf::from(path),
                branch: None,
                is_root: worktrees.is_empty(),
            });
        } else if let Some(refname) = line.strip_prefix("branch ") {
            let wt = current
                .as_mut()
                .ok_or_else(|| GitError::Parse(format!("branch line before worktree line: {}", line)))?;
            wt.branch = Some(refname.strip_prefix("refs/heads/").unwrap_or(refname).to_string());
        }
    }
    if let Some(wt) = current.take() {
        worktrees.push(wt);
    }

    debug!(count = worktrees.len(), "parse_worktree_list: parsed");
    Ok(worktrees)
}
