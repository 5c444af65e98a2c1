use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use erkpool::cli::{Cli, Command, OutputFormat};
use erkpool::git::SubprocessGit;
use erkpool::prompt::TerminalPrompt;
use erkpool::slot::is_placeholder_branch;
use erkpool::{AllocateOptions, AllocationPlan, Config, PoolError, RepairOptions, SlotState, WorktreePool};

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("erkpool")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Shared by concurrent ep processes
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("erkpool.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let code = e.downcast_ref::<PoolError>().map(PoolError::exit_code).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(
        "erkpool loaded config: pool-size={}, erk-root={}",
        config.pool_size,
        config.erk_root.display()
    );

    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let pool = WorktreePool::open(
        &config,
        &cwd,
        Box::new(SubprocessGit::new()),
        Box::new(TerminalPrompt::new()),
    )?;

    match cli.command {
        Command::Assign { branch, force, dry_run } => cmd_assign(&pool, &branch, force, dry_run),
        Command::Unassign { identifier } => cmd_unassign(&pool, &identifier),
        Command::Check { format } => cmd_check(&pool, format),
        Command::List { format } => cmd_list(&pool, format),
        Command::Repair { force, dry_run } => cmd_repair(&pool, force, dry_run),
        Command::InitPool { count } => cmd_init_pool(&pool, count),
        Command::Which => cmd_which(&pool, &cwd),
    }
}

fn cmd_assign(pool: &WorktreePool, branch: &str, force: bool, dry_run: bool) -> Result<()> {
    let allocation = pool.allocate(branch, AllocateOptions { force, dry_run })?;
    let slot = allocation.assignment.slot_name.as_str();
    let path = allocation.assignment.worktree_path.display();

    if dry_run {
        let what = match &allocation.plan {
            AllocationPlan::Existing { .. } => "already assigned to".to_string(),
            AllocationPlan::Reuse { .. } => "would reuse".to_string(),
            AllocationPlan::Fresh { .. } => "would create".to_string(),
            AllocationPlan::Evict { victim } => format!("would evict '{}' from", victim.branch_name),
        };
        println!("{} {} {}", branch.cyan(), what, slot.yellow());
        return Ok(());
    }

    if allocation.changed {
        if let AllocationPlan::Evict { victim } = &allocation.plan {
            println!("{} Evicted {} from {}", "!".yellow(), victim.branch_name.cyan(), slot.yellow());
        }
        println!("{} Assigned {} to {}", "✓".green(), branch.cyan(), slot.yellow());
    } else {
        println!("{} {} is already in {}", "✓".green(), branch.cyan(), slot.yellow());
    }
    println!("{}", path);
    Ok(())
}

fn cmd_unassign(pool: &WorktreePool, identifier: &str) -> Result<()> {
    let removed = pool.unassign(identifier)?;
    println!(
        "{} Released {} (was {})",
        "✓".green(),
        removed.slot_name.yellow(),
        removed.branch_name.cyan()
    );
    Ok(())
}

fn cmd_check(pool: &WorktreePool, format: OutputFormat) -> Result<()> {
    let findings = pool.check()?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&findings).context("Failed to encode findings")?);
        }
        OutputFormat::Text => {
            if findings.is_empty() {
                println!("{} Pool is consistent", "✓".green());
            }
            for f in &findings {
                println!("{} {} {}", f.kind.to_string().red(), f.slot_name.yellow(), f.message);
            }
        }
    }
    Ok(())
}

fn cmd_list(pool: &WorktreePool, format: OutputFormat) -> Result<()> {
    let rows = pool.status()?;
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows).context("Failed to encode status")?);
        }
        OutputFormat::Text => {
            for row in &rows {
                let label = format!("{:<13}", row.state.to_string());
                let state = match row.state {
                    SlotState::Assigned => label.green(),
                    SlotState::Available => label.normal(),
                    SlotState::Uninitialized => label.dimmed(),
                };
                let branch = row
                    .branch
                    .as_deref()
                    .filter(|b| !is_placeholder_branch(b))
                    .unwrap_or("-");
                let since = row.assigned_at.as_deref().unwrap_or("");
                println!("{}  {}  {}  {}", row.slot_name, state, branch.cyan(), since.dimmed());
            }
        }
    }
    Ok(())
}

fn cmd_repair(pool: &WorktreePool, force: bool, dry_run: bool) -> Result<()> {
    let report = pool.repair(RepairOptions { force, dry_run })?;
    if report.stale.is_empty() {
        println!("{} Nothing to repair", "✓".green());
        return Ok(());
    }
    for a in &report.stale {
        let verb = if report.applied { "Removed" } else { "Stale" };
        println!("{} {} ({})", verb, a.slot_name.yellow(), a.branch_name.cyan());
    }
    if !report.applied && !dry_run {
        println!("Nothing was changed");
    }
    Ok(())
}

fn cmd_init_pool(pool: &WorktreePool, count: Option<u32>) -> Result<()> {
    let report = pool.init_pool(count)?;
    for slot in &report.created {
        println!("{} Created {}", "✓".green(), slot.yellow());
    }
    println!("Pool has {} slots", report.pool_size);
    Ok(())
}

fn cmd_which(pool: &WorktreePool, cwd: &std::path::Path) -> Result<()> {
    match pool.which(cwd)? {
        Some(a) => println!("{} {}", a.slot_name.yellow(), a.branch_name.cyan()),
        None => println!("Not in a pool worktree"),
    }
    Ok(())
}
