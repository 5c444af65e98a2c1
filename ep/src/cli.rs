//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ep - worktree slot pool
#[derive(Parser, Debug)]
#[command(
    name = "ep",
    version,
    about = "Fixed-capacity pool of git worktree slots",
    after_help = "Logs are written to: ~/.local/share/erkpool/logs/erkpool.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Assign a branch to a slot
    Assign {
        /// Branch to check out in a slot
        branch: String,

        /// Evict the oldest assignment without asking if the pool is full
        #[arg(short, long)]
        force: bool,

        /// Show which slot would be used without changing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Release a slot, by slot name or branch name
    Unassign {
        /// Slot name (erk-managed-wt-NN) or assigned branch
        identifier: String,
    },

    /// Report drift between the pool, the filesystem and git
    Check {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show every slot and what it holds
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Remove assignments whose worktree directory is gone
    Repair {
        /// Do not ask for confirmation
        #[arg(short, long)]
        force: bool,

        /// List what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Provision slot worktrees ahead of time
    InitPool {
        /// Number of slots; resizes the pool when it differs
        #[arg(short = 'n', long)]
        count: Option<u32>,
    },

    /// Show the assignment of the current worktree
    Which,
}

/// Output format for check/list commands
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
