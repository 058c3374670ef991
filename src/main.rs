use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use prdloop::config::GlobalConfig;
use prdloop::domain::{EventKind, LoopState};
use prdloop::manager::{Manager, ManagerEvent};
use prdloop::prd::{self, PROGRESS_FILE, Prd, PrdWatcher, WatchEvent};
use prdloop::worktree::WorktreeManager;
use prdloop::PrdloopError;

mod cli;

use cli::Cli;
use cli::commands::{Commands, WorktreeCommands};

fn setup_logging() -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("prdloop")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("prdloop.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &GlobalConfig) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            prds,
            worktrees,
            max_iterations,
        } => handle_run_command(prds, *worktrees, *max_iterations, config).await,
        Commands::Status { prd } => handle_status_command(prd),
        Commands::Worktrees { command } => handle_worktrees_command(*command, config).await,
        Commands::Merge { name } => handle_merge_command(name, config).await,
        Commands::Reconcile { old, new } => handle_reconcile_command(old, new),
    }
}

fn worktree_manager(config: &GlobalConfig) -> Result<WorktreeManager> {
    let repo_root = std::env::current_dir().context("Failed to get current directory")?;
    let base = repo_root.join(&config.worktrees.dir);
    Ok(WorktreeManager::new(repo_root, base))
}

async fn handle_run_command(
    prds: &[PathBuf],
    use_worktrees: bool,
    max_iterations: Option<u32>,
    config: &GlobalConfig,
) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let mut manager_config = config.manager_config(&cwd);
    if let Some(max) = max_iterations {
        manager_config.max_iterations = max;
    }
    let manager = Manager::new(manager_config);
    let mut events = manager
        .take_events()
        .ok_or_else(|| eyre::eyre!("event stream already taken"))?;

    manager.on_complete(|name| {
        println!("{} {}", "Complete:".green().bold(), name);
    });

    let worktrees = if use_worktrees {
        Some(worktree_manager(config)?)
    } else {
        None
    };

    let mut watchers = Vec::new();
    let mut names = Vec::new();
    for path in prds {
        let path = fs::canonicalize(path).with_context(|| format!("PRD not found: {}", path.display()))?;
        let name = Prd::name_from_path(&path);

        let prd_path = match &worktrees {
            Some(wt) => {
                let dir = wt.workspace_path(&name);
                let branch = WorktreeManager::branch_name(&name);
                wt.create(&dir, &branch)
                    .await
                    .with_context(|| format!("Failed to prepare worktree for {}", name))?;
                let prd_path = place_prd_in_worktree(&path, wt.repo_root(), &dir)?;
                manager
                    .register_with_worktree(&name, &prd_path, &dir, &branch)
                    .await?;
                println!("{} {} -> {} ({})", "Worktree:".cyan(), name, dir.display(), branch);
                prd_path
            }
            None => {
                manager.register(&name, &path).await?;
                path
            }
        };

        let mut watcher = PrdWatcher::new(&prd_path);
        let mut changes = watcher.start()?;
        let watched = name.clone();
        tokio::spawn(async move {
            while let Some(change) = changes.recv().await {
                print_watch_event(&watched, &change);
            }
        });
        watchers.push(watcher);
        names.push(name);
    }

    for name in &names {
        manager.start(name).await?;
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            Some(event) = events.recv() => print_event(&event),
            _ = ticker.tick() => {
                if all_settled(&manager).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("{}", "Interrupted, stopping loops...".yellow());
                break;
            }
        }
    }

    manager.stop_all().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }
    for watcher in &mut watchers {
        watcher.stop();
    }

    println!();
    let mut failed = 0;
    for instance in manager.get_all_instances().await {
        let state = match instance.state {
            LoopState::Complete => "complete".green(),
            LoopState::Error => {
                failed += 1;
                "error".red()
            }
            other => format!("{:?}", other).to_lowercase().yellow(),
        };
        println!(
            "{:<20} {:<10} iterations: {}{}",
            instance.name,
            state,
            instance.iteration,
            instance
                .last_error
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    }

    if failed > 0 {
        eyre::bail!("{} PRD(s) failed", failed);
    }
    Ok(())
}

/// Make the PRD visible inside its worktree at the same relative location.
fn place_prd_in_worktree(prd_path: &Path, repo_root: &Path, worktree: &Path) -> Result<PathBuf> {
    let repo_root = fs::canonicalize(repo_root).unwrap_or_else(|_| repo_root.to_path_buf());
    let relative = prd_path.strip_prefix(&repo_root).with_context(|| {
        format!(
            "{} is outside the repository {}",
            prd_path.display(),
            repo_root.display()
        )
    })?;
    let target = worktree.join(relative);
    if !target.exists() {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(prd_path, &target).with_context(|| format!("Failed to copy PRD to {}", target.display()))?;
    }
    Ok(target)
}

async fn all_settled(manager: &Manager) -> bool {
    manager
        .get_all_instances()
        .await
        .iter()
        .all(|i| !i.state.is_active())
}

fn print_event(event: &ManagerEvent) {
    let tag = format!("[{} #{}]", event.name, event.event.iteration).dimmed();
    match &event.event.kind {
        EventKind::IterationStart { .. } => println!("{} {}", tag, event.event.kind.to_string().cyan()),
        EventKind::AssistantText { text } => {
            println!("{} {}", tag, text.lines().next().unwrap_or_default())
        }
        EventKind::ToolStart { .. } => println!("{} {}", tag, event.event.kind.to_string().blue()),
        EventKind::ToolResult => {}
        EventKind::Complete => println!("{} {}", tag, "complete".green()),
        EventKind::MaxIterationsReached { .. } | EventKind::Retrying { .. } => {
            println!("{} {}", tag, event.event.kind.to_string().yellow())
        }
        EventKind::Error { .. } => println!("{} {}", tag, event.event.kind.to_string().red()),
    }
}

fn print_watch_event(name: &str, event: &WatchEvent) {
    match event {
        WatchEvent::Changed(prd) => println!(
            "{} {} {}/{} stories pass",
            "Progress:".magenta(),
            name,
            prd.completed_count(),
            prd.user_stories.len()
        ),
        WatchEvent::Error(message) => println!("{} {} {}", "Watch:".red(), name, message),
    }
}

fn handle_status_command(path: &Path) -> Result<()> {
    let prd = Prd::load(path)?;
    println!("{} {} ({})", "PRD:".green(), prd.project, prd.name);
    println!(
        "  {}/{} stories pass{}",
        prd.completed_count(),
        prd.user_stories.len(),
        if prd.all_complete() { ", complete" } else { "" }
    );

    for story in &prd.user_stories {
        let marker = if story.passes {
            "x".green()
        } else if story.in_progress {
            ">".yellow()
        } else {
            " ".normal()
        };
        println!("  [{}] {} (p{}) {}", marker, story.id, story.priority, story.title);
    }

    if let Some(next) = prd.next_story() {
        println!("{} {} {}", "Next:".cyan(), next.id, next.title);
    }

    let entries = prd::load_progress(Prd::dir_of(path).join(PROGRESS_FILE))?;
    if !entries.is_empty() {
        println!("{}", "Progress:".cyan());
        for story in &prd.user_stories {
            if let Some(last) = prd::entries_for_story(&entries, &story.id).last() {
                println!("  {} {} {}", last.date, story.id, last.content.lines().next().unwrap_or_default());
            }
        }
    }
    Ok(())
}

async fn handle_worktrees_command(command: WorktreeCommands, config: &GlobalConfig) -> Result<()> {
    let wt = worktree_manager(config)?;
    match command {
        WorktreeCommands::List => {
            for worktree in wt.list().await? {
                let branch = worktree.branch.unwrap_or_else(|| "(detached)".to_string());
                let head: String = worktree.head.chars().take(8).collect();
                let prunable = if worktree.prunable { " prunable".red() } else { "".normal() };
                println!("{} {} {}{}", head, branch.cyan(), worktree.path.display(), prunable);
            }
        }
        WorktreeCommands::Prune => {
            wt.prune().await?;
            println!("{}", "Pruned stale worktree records".green());
        }
        WorktreeCommands::Orphans => {
            let known: Vec<PathBuf> = wt
                .list()
                .await?
                .into_iter()
                .map(|w| fs::canonicalize(&w.path).unwrap_or(w.path))
                .collect();
            let mut orphans: Vec<_> = WorktreeManager::detect_orphaned(wt.base_path())
                .await?
                .into_iter()
                .filter(|(_, path)| !known.contains(&fs::canonicalize(path).unwrap_or_else(|_| path.clone())))
                .collect();
            orphans.sort();
            if orphans.is_empty() {
                println!("No orphaned worktrees");
            }
            for (name, path) in orphans {
                println!("{} {} {}", "Orphan:".yellow(), name, path.display());
            }
        }
    }
    Ok(())
}

async fn handle_merge_command(name: &str, config: &GlobalConfig) -> Result<()> {
    let wt = worktree_manager(config)?;
    let branch = WorktreeManager::branch_name(name);
    match wt.merge_branch(&branch).await {
        Ok(()) => {
            println!("{} {}", "Merged:".green(), branch);
            Ok(())
        }
        Err(e @ PrdloopError::MergeConflict { .. }) => {
            println!("{} {} (merge aborted)", "Conflict:".red(), branch);
            for file in e.conflicting_files() {
                println!("  {}", file);
            }
            Err(e.into())
        }
        Err(e) => Err(e).context(format!("Failed to merge {}", branch)),
    }
}

fn handle_reconcile_command(old: &Path, new: &Path) -> Result<()> {
    let old_prd = Prd::load(old).context("Failed to load existing PRD")?;
    let merged = prd::reconcile_file(new, &old_prd).context("Failed to reconcile PRD")?;
    println!(
        "{} {} ({}/{} stories pass)",
        "Reconciled:".green(),
        new.display(),
        merged.completed_count(),
        merged.user_stories.len()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();

    let config = GlobalConfig::load(cli.config.as_ref()).context("Failed to load configuration")?;
    config.validate()?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
