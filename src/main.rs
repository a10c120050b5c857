use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::warn;

use focusdeck::activity::{ActionRunnerRegistry, ActivityRegistry};
use focusdeck::learning::{self, LearningTask};
use focusdeck::panel::ActivityPanel;
use focusdeck::pomodoro::PomodoroSnapshot;
use focusdeck::reconcile::Reconciler;
use focusdeck::store::{keys, KvStore};

#[derive(Parser)]
#[command(name = "focusdeck", about = "Pomodoro timer and task tracker with a shared activity panel", version)]
struct Cli {
    /// Path to the shared state database. Defaults to the per-user data dir.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the activity panel, re-rendering as processes change
    Panel {
        /// Render once and exit instead of watching
        #[arg(long)]
        once: bool,
    },
    /// Expand the panel (persisted, visible to every watcher)
    Open,
    /// Collapse the panel
    Close,
    /// Invoke a panel action, e.g. `act pomodoro-main toggle`
    Act {
        process_id: String,
        action_id: String,
    },
    /// Timer controls
    #[command(subcommand)]
    Pomodoro(PomodoroCommands),
    /// Task tracker controls
    #[command(subcommand)]
    Task(TaskCommands),
}

#[derive(Subcommand)]
enum PomodoroCommands {
    /// Print the current timer state
    Status,
    /// Start (or resume) the timer
    Start,
    /// Pause a running timer, resume a paused one
    Toggle,
    /// Stop and restore a full work interval
    Reset,
    /// Configure interval lengths in minutes
    Set {
        #[arg(long)]
        work: Option<u32>,
        #[arg(long = "break")]
        break_minutes: Option<u32>,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks with accumulated time
    List,
    /// Replace the task list from a markdown table file
    Import { path: PathBuf },
    /// Start tracking a task (stops any other running task)
    Start { number: u32 },
    /// Stop tracking a task
    Pause { number: u32 },
    /// Zero a task's accumulated time
    Reset { number: u32 },
    /// Print the task list as a markdown table
    Export,
}

fn default_store_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("focusdeck").join("focusdeck.sqlite3"))
}

fn open_store(cli_path: Option<PathBuf>) -> KvStore {
    let Some(path) = cli_path.or_else(default_store_path) else {
        warn!("no data directory available; state will not persist");
        return KvStore::disabled();
    };
    match KvStore::open(&path) {
        Ok(store) => store,
        Err(err) => {
            warn!("failed to open store at {}: {err:#}", path.display());
            KvStore::disabled()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::parse();
    let store = open_store(cli.store);
    let registry = Arc::new(ActivityRegistry::new());
    let runners = Arc::new(ActionRunnerRegistry::new());
    let reconciler = Reconciler::new(store.clone(), Arc::clone(&registry), Arc::clone(&runners));
    let panel = ActivityPanel::new(store.clone(), registry, runners);

    match cli.command {
        Commands::Panel { once } => {
            if once {
                reconciler.tick(Utc::now().timestamp_millis());
                print!("{}", panel.render());
                return Ok(());
            }
            watch_panel(&reconciler, &panel).await
        }
        Commands::Open => {
            panel.set_open(true);
            reconciler.tick(Utc::now().timestamp_millis());
            print!("{}", panel.render());
            Ok(())
        }
        Commands::Close => {
            panel.set_open(false);
            print!("{}", panel.render());
            Ok(())
        }
        Commands::Act {
            process_id,
            action_id,
        } => {
            // First pass registers the runners from persisted state, the
            // second reflects whatever the action changed.
            reconciler.tick(Utc::now().timestamp_millis());
            panel.invoke(&process_id, &action_id);
            reconciler.tick(Utc::now().timestamp_millis());
            print!("{}", panel.render());
            Ok(())
        }
        Commands::Pomodoro(command) => run_pomodoro(&store, command),
        Commands::Task(command) => run_task(&store, command),
    }
}

async fn watch_panel(reconciler: &Reconciler, panel: &ActivityPanel) -> Result<()> {
    let mut revisions = reconciler.registry().subscribe();
    reconciler.spawn().await;

    print!("{}", panel.render());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                // Clear and redraw in place.
                print!("\x1b[2J\x1b[H{}", panel.render());
            }
        }
    }

    reconciler.shutdown().await;
    Ok(())
}

fn run_pomodoro(store: &KvStore, command: PomodoroCommands) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let mut snapshot = PomodoroSnapshot::load(store).unwrap_or_else(PomodoroSnapshot::fresh);

    match command {
        PomodoroCommands::Status => {
            let state = if snapshot.is_running { "running" } else { "paused" };
            println!(
                "{} {}  {}  (work {}m / break {}m)",
                snapshot.mode.as_str(),
                state,
                focusdeck::panel::format_mm_ss(snapshot.seconds_left(now)),
                snapshot.work_minutes_or_default(),
                snapshot.break_minutes_or_default(),
            );
            return Ok(());
        }
        PomodoroCommands::Start => {
            if !snapshot.is_running {
                snapshot.toggle(now);
            }
        }
        PomodoroCommands::Toggle => snapshot.toggle(now),
        PomodoroCommands::Reset => snapshot.reset(),
        PomodoroCommands::Set {
            work,
            break_minutes,
        } => {
            validate_durations(work, break_minutes)?;
            snapshot.set_durations(work, break_minutes, now);
        }
    }

    snapshot.save(store);
    println!(
        "{} {}  {}",
        snapshot.mode.as_str(),
        if snapshot.is_running { "running" } else { "paused" },
        focusdeck::panel::format_mm_ss(snapshot.seconds_left(now)),
    );
    Ok(())
}

fn run_task(store: &KvStore, command: TaskCommands) -> Result<()> {
    let now = Utc::now().timestamp_millis();
    let mut tasks = learning::load_tasks(store).unwrap_or_default();

    match command {
        TaskCommands::List => {
            if tasks.is_empty() {
                println!("No tasks. Import some with `focusdeck task import <file>`.");
                return Ok(());
            }
            tasks.sort_by_key(|t| t.number);
            for task in &tasks {
                println!(
                    "{:>3}. {}  {}{}",
                    task.number,
                    learning::format_duration(task.elapsed_ms(now)),
                    task.display_label(),
                    if task.running { "  (running)" } else { "" },
                );
            }
            Ok(())
        }
        TaskCommands::Import { path } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading task table from {}", path.display()))?;
            let imported = learning::parse_table(&raw, &tasks);
            if imported.is_empty() {
                bail!("no task rows found in {}", path.display());
            }
            learning::save_tasks(store, &imported);
            store.set(keys::LEARNING_RAW_TABLE, &raw);

            // Drop the active marker if the running task did not survive.
            if let Some(active_id) = learning::active_task_id(store) {
                if !imported.iter().any(|t| t.id == active_id && t.running) {
                    store.remove(keys::LEARNING_ACTIVE_ID);
                }
            }
            println!("Imported {} task(s).", imported.len());
            Ok(())
        }
        TaskCommands::Start { number } => {
            let task = find_by_number(&tasks, number)?;
            let id = task.id.clone();
            learning::start_task(&mut tasks, &id, now);
            learning::save_tasks(store, &tasks);
            store.set(keys::LEARNING_ACTIVE_ID, &id);
            println!("Tracking task {number}.");
            Ok(())
        }
        TaskCommands::Pause { number } => {
            let task = find_by_number(&tasks, number)?;
            let id = task.id.clone();
            learning::pause_task(&mut tasks, &id, now);
            learning::save_tasks(store, &tasks);
            if learning::active_task_id(store).as_deref() == Some(id.as_str()) {
                store.remove(keys::LEARNING_ACTIVE_ID);
            }
            println!("Paused task {number}.");
            Ok(())
        }
        TaskCommands::Reset { number } => {
            let task = find_by_number(&tasks, number)?;
            let id = task.id.clone();
            learning::reset_task(&mut tasks, &id);
            learning::save_tasks(store, &tasks);
            if learning::active_task_id(store).as_deref() == Some(id.as_str()) {
                store.remove(keys::LEARNING_ACTIVE_ID);
            }
            println!("Reset task {number}.");
            Ok(())
        }
        TaskCommands::Export => {
            let table = learning::export_table(&tasks, now);
            store.set(keys::LEARNING_RAW_TABLE, &table);
            println!("{table}");
            Ok(())
        }
    }
}

fn find_by_number(tasks: &[LearningTask], number: u32) -> Result<&LearningTask> {
    tasks
        .iter()
        .find(|t| t.number == number)
        .with_context(|| format!("no task numbered {number}"))
}

/// A zero-length mode would leave the catch-up loop treading water at the
/// target, so the timer never advances past `secondsLeft 0`.
fn validate_durations(work: Option<u32>, break_minutes: Option<u32>) -> Result<()> {
    if work.is_none() && break_minutes.is_none() {
        bail!("nothing to set: pass --work and/or --break");
    }
    if work == Some(0) || break_minutes == Some(0) {
        bail!("durations must be at least 1 minute");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_edits_reject_zero_minutes() {
        assert!(validate_durations(Some(0), None).is_err());
        assert!(validate_durations(None, Some(0)).is_err());
        assert!(validate_durations(Some(25), Some(0)).is_err());
        assert!(validate_durations(None, None).is_err());

        assert!(validate_durations(Some(25), None).is_ok());
        assert!(validate_durations(None, Some(5)).is_ok());
        assert!(validate_durations(Some(50), Some(10)).is_ok());
    }
}
