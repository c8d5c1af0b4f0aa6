// SPDX-License-Identifier: MIT

//! `ralph`: the thin operator surface over the control plane (spec §9
//! "supplemented features" — CLI ergonomics are an explicit Non-goal, so
//! this exists only so `control.json` and `queue.json` have a human-usable
//! producer). It talks to the daemon exclusively through the on-disk files
//! it shares with `ralphd` — there is no IPC protocol here, unlike the
//! teacher's Unix-socket `DaemonClient`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use ralph_core::{Priority, Task, TaskStatus};
use ralph_storage::{discover_daemon_record, ControlPaths, ControlStatePatch, Mode};

#[derive(Parser)]
#[command(name = "ralph", version, about = "Operator surface for the ralph orchestration daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a new agent task bound to one upstream issue (spec §3 `Task`, §4.D).
    Enqueue {
        /// `owner/name`
        repo: String,
        /// `owner/name#N`
        issue_ref: String,
        /// Queue key; defaults to `issue_ref` (one task per issue).
        #[arg(long)]
        path: Option<String>,
        #[arg(long, value_enum, default_value_t = CliPriority::Normal)]
        priority: CliPriority,
    },
    /// Flip the control file to `draining` (spec §4.C): stop admitting new
    /// queued work, let in-flight and resumes finish.
    Drain,
    /// Request a pause, optionally at a named checkpoint (spec §4.C).
    Pause {
        /// One of: planned, routed, implementation_step_complete, pr_ready,
        /// merge_step_complete, survey_complete, recorded.
        #[arg(long)]
        checkpoint: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Clear drain/pause state and return to `running`.
    Resume,
    /// Print control-plane, daemon-registry, and queue status.
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPriority {
    Low,
    Normal,
    High,
}

impl From<CliPriority> for Priority {
    fn from(p: CliPriority) -> Self {
        match p {
            CliPriority::Low => Priority::Low,
            CliPriority::Normal => Priority::Normal,
            CliPriority::High => Priority::High,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    let paths = ControlPaths::canonical();
    paths.ensure_dir().with_context(|| format!("creating control root {}", paths.root.display()))?;

    match cli.command {
        Command::Enqueue { repo, issue_ref, path, priority } => enqueue(&paths, repo, issue_ref, path, priority),
        Command::Drain => drain(&paths),
        Command::Pause { checkpoint, timeout_ms } => pause(&paths, checkpoint, timeout_ms),
        Command::Resume => resume(&paths),
        Command::Status => status(&paths),
    }
}

fn enqueue(paths: &ControlPaths, repo: String, issue_ref: String, path: Option<String>, priority: CliPriority) -> Result<()> {
    let store = ralph_storage::TaskQueueStore::new(paths);
    let path = path.unwrap_or_else(|| issue_ref.clone());
    let mut task = Task::new(path.clone(), repo, issue_ref);
    task.priority = priority.into();
    store.enqueue(task).with_context(|| format!("enqueueing task {path:?}"))?;
    println!("queued {path}");
    Ok(())
}

fn drain(paths: &ControlPaths) -> Result<()> {
    let store = ralph_storage::ControlStateStore::new(paths);
    let patch = ControlStatePatch { mode: Some(Mode::Draining), ..Default::default() };
    store.update(patch).context("writing control.json")?;
    println!("draining: new queued dispatch stopped, in-flight and resumes continue");
    Ok(())
}

fn pause(paths: &ControlPaths, checkpoint: Option<String>, timeout_ms: Option<u64>) -> Result<()> {
    if let Some(name) = &checkpoint {
        if !valid_checkpoint_name(name) {
            anyhow::bail!("unrecognized checkpoint {name:?}; expected one of {:?}", checkpoint_names());
        }
    }
    let store = ralph_storage::ControlStateStore::new(paths);
    let patch = ControlStatePatch {
        pause_requested: Some(Some(true)),
        pause_at_checkpoint: checkpoint.clone().map(Some),
        drain_timeout_ms: timeout_ms.map(Some),
        ..Default::default()
    };
    store.update(patch).context("writing control.json")?;
    match checkpoint {
        Some(cp) => println!("pause requested at checkpoint {cp}"),
        None => println!("pause requested"),
    }
    Ok(())
}

fn resume(paths: &ControlPaths) -> Result<()> {
    let store = ralph_storage::ControlStateStore::new(paths);
    let patch = ControlStatePatch {
        mode: Some(Mode::Running),
        pause_requested: Some(None),
        pause_at_checkpoint: Some(None),
        drain_timeout_ms: Some(None),
    };
    store.update(patch).context("writing control.json")?;
    println!("running");
    Ok(())
}

fn status(paths: &ControlPaths) -> Result<()> {
    let control = ralph_storage::ControlStateStore::new(paths).read();
    println!("mode: {}", if control.mode == Mode::Draining { "draining" } else { "running" });
    if let Some(true) = control.pause_requested {
        match &control.pause_at_checkpoint {
            Some(cp) => println!("pause requested at checkpoint: {cp}"),
            None => println!("pause requested"),
        }
    }

    match discover_daemon_record(paths) {
        Some(record) => {
            let now = chrono::Utc::now();
            let fresh = record.is_fresh(now, ralph_storage::DEFAULT_TTL_SECS);
            println!(
                "daemon: {} (pid {}, {})",
                record.daemon_id,
                record.pid,
                if fresh { "alive" } else { "stale" }
            );
        }
        None => println!("daemon: none found"),
    }

    let queue = ralph_storage::TaskQueueStore::new(paths);
    let tasks = queue.all();
    println!("tasks: {}", tasks.len());
    for status in [
        TaskStatus::Queued,
        TaskStatus::Starting,
        TaskStatus::InProgress,
        TaskStatus::Throttled,
        TaskStatus::Blocked,
        TaskStatus::WaitingOnPr,
        TaskStatus::Escalated,
        TaskStatus::Done,
    ] {
        let count = tasks.iter().filter(|t| t.status == status).count();
        if count > 0 {
            println!("  {status}: {count}");
        }
    }
    Ok(())
}

fn checkpoint_names() -> Vec<&'static str> {
    ralph_core::PipelineCheckpoint::ALL.iter().map(|c| -> &'static str { checkpoint_name(*c) }).collect()
}

fn checkpoint_name(cp: ralph_core::PipelineCheckpoint) -> &'static str {
    match cp {
        ralph_core::PipelineCheckpoint::Planned => "planned",
        ralph_core::PipelineCheckpoint::Routed => "routed",
        ralph_core::PipelineCheckpoint::ImplementationStepComplete => "implementation_step_complete",
        ralph_core::PipelineCheckpoint::PrReady => "pr_ready",
        ralph_core::PipelineCheckpoint::MergeStepComplete => "merge_step_complete",
        ralph_core::PipelineCheckpoint::SurveyComplete => "survey_complete",
        ralph_core::PipelineCheckpoint::Recorded => "recorded",
    }
}

fn valid_checkpoint_name(name: &str) -> bool {
    checkpoint_names().contains(&name)
}
