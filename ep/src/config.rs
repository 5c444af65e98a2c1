//! Configuration for erkpool

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::slot::MAX_POOL_SIZE;
use crate::state::DEFAULT_POOL_SIZE;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of slots for a newly created pool
    #[serde(rename = "pool-size")]
    pub pool_size: u32,

    /// Directory holding per-repository pool state and worktrees
    #[serde(rename = "erk-root")]
    pub erk_root: PathBuf,

    /// Remote consulted when preparing branches
    pub remote: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            erk_root: default_erk_root(),
            remote: "origin".to_string(),
        }
    }
}

fn default_erk_root() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("erk")
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(eyre::eyre!(
                "pool-size must be between 1 and {} (got {})",
                MAX_POOL_SIZE,
                self.pool_size
            ));
        }
        if self.remote.trim().is_empty() {
            return Err(eyre::eyre!("remote must not be empty"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .erkpool.yml
        let local_config = PathBuf::from(".erkpool.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/erkpool/erkpool.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("erkpool").join("erkpool.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Filesystem locations of one repository's pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPaths {
    /// Main working tree of the repository
    pub repo_root: PathBuf,

    /// `<erk-root>/repos/<repo-dir-name>`
    pub pool_dir: PathBuf,

    /// `pool.json`
    pub state_file: PathBuf,

    /// Parent directory of every slot worktree
    pub worktrees_dir: PathBuf,
}

impl PoolPaths {
    /// Locations for the repository rooted at `repo_root`
    pub fn new(erk_root: &Path, repo_root: &Path) -> Self {
        debug!(?erk_root, ?repo_root, "PoolPaths::new: called");
        let name = repo_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "root".to_string());
        let pool_dir = erk_root.join("repos").join(name);
        Self {
            repo_root: repo_root.to_path_buf(),
            state_file: pool_dir.join("pool.json"),
            worktrees_dir: pool_dir.join("worktrees"),
            pool_dir,
        }
    }

    /// Expected worktree path of a slot
    pub fn slot_path(&self, slot_name: &str) -> PathBuf {
        self.worktrees_dir.join(slot_name)
    }
}
