// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `ralphd`: the long-lived orchestration daemon (spec §1, §2). Holds the
//! singleton lock, runs the Drain/Pause Monitor and Fair Scheduler, and
//! dispatches one [`ralph_engine::RepoWorker`] task at a time per admitted
//! slot. The daemon owns no IPC surface (spec §9's capability-bundle ports
//! are the only process boundary); operators and the `ralph` CLI interact
//! with it exclusively through the control file and task queue it shares
//! on disk.

mod env;
mod lifecycle;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use ralph_adapters::{DesktopNotifyAdapter, NullRelationshipProvider, ReqwestHostClient, ShellSessionRunner};
use ralph_core::{CheckpointDeduper, Clock, IssueCircuitBreaker, SystemClock, Task, TaskStatus};
use ralph_engine::{
    DrainMonitor, FairScheduler, PrResolver, RateLimitedLogger, RequiredChecksResolver, RepoWorker, TaskPermits,
    WorkerConfig, WorkerContext,
};
use ralph_storage::{ConflictLeaseStore, ControlPaths, ControlStateStore, PrCreateLeaseStore};
use tokio::signal::unix::{signal, Signal, SignalKind};

use lifecycle::DaemonState;

type Ctx = WorkerContext<DesktopNotifyAdapter, SystemClock>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let paths = ControlPaths::canonical();
    let state = match DaemonState::start(paths.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "failed to start ralphd");
            std::process::exit(1);
        }
    };
    tracing::info!(daemon_id = %state.daemon_id, root = %paths.root.display(), "ralphd started");

    match state.reconcile_orphans() {
        Ok(0) => {}
        Ok(n) => tracing::warn!(count = n, "requeued orphaned tasks from a prior daemon instance"),
        Err(e) => tracing::error!(error = %e, "orphan reconciliation failed"),
    }

    let Some(host_base_url) = env::host_base_url() else {
        tracing::error!("RALPH_HOST_BASE_URL is not set; ralphd has nothing to orchestrate against");
        std::process::exit(1);
    };
    let host_token = env::host_token().unwrap_or_default();
    let host: Arc<dyn ralph_adapters::HostClient> = Arc::new(ReqwestHostClient::new(host_base_url, host_token));
    let session: Arc<dyn ralph_adapters::SessionRunner> = {
        let mut cmd = env::agent_command().into_iter();
        let program = cmd.next().unwrap_or_else(|| "ralph-agent".to_string());
        Arc::new(ShellSessionRunner::new(program, cmd.collect()))
    };
    let relationships: Arc<dyn ralph_adapters::RelationshipProvider> = Arc::new(NullRelationshipProvider);
    let clock = SystemClock;

    let pr_resolver = PrResolver::new(host.clone(), relationships.clone(), clock);
    let monitor = Arc::new(DrainMonitor::new(ControlStateStore::new(&paths)));

    let ctx: Arc<Ctx> = Arc::new(WorkerContext {
        host,
        session,
        relationships,
        notify: DesktopNotifyAdapter::new(),
        clock,
        queue: state.queue.clone(),
        pr_create_leases: Arc::new(PrCreateLeaseStore::new(&paths)),
        conflict_leases: Arc::new(ConflictLeaseStore::new(&paths)),
        required_checks: RequiredChecksResolver::new(),
        pr_resolver,
        circuit_breaker: StdMutex::new(IssueCircuitBreaker::default()),
        checkpoints: StdMutex::new(CheckpointDeduper::new()),
        monitor: monitor.clone(),
        logger: RateLimitedLogger::new(Duration::from_secs(60)),
        quarantine: StdMutex::new(std::collections::HashMap::new()),
        config: config_from_env(),
    });

    let scheduler = Arc::new(tokio::sync::Mutex::new(FairScheduler::new(
        env::global_capacity(),
        Box::new(|_repo: &str| env::repo_capacity()),
    )));
    let in_flight = Arc::new(AtomicUsize::new(0));

    let Some(mut reload) = install_signal(SignalKind::user_defined1(), "SIGUSR1") else {
        std::process::exit(1);
    };
    let Some(mut term) = install_signal(SignalKind::terminate(), "SIGTERM") else {
        std::process::exit(1);
    };
    let Some(mut interrupt) = install_signal(SignalKind::interrupt(), "SIGINT") else {
        std::process::exit(1);
    };
    let mut ticker = tokio::time::interval(env::monitor_poll_interval());
    let mut heartbeat_ticker = tokio::time::interval(env::heartbeat_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.poll();
            }
            _ = heartbeat_ticker.tick() => {
                if let Err(e) = state.heartbeat() {
                    tracing::warn!(error = %e, "failed to refresh daemon heartbeat");
                }
            }
            _ = reload.recv() => {
                tracing::info!("SIGUSR1 received, forcing drain-monitor reload");
                monitor.reload_now();
            }
            _ = term.recv() => {
                tracing::info!("SIGTERM received, draining");
                break;
            }
            _ = interrupt.recv() => {
                tracing::info!("SIGINT received, draining");
                break;
            }
        }

        dispatch_once(&state, &ctx, &monitor, &scheduler, &in_flight);
    }

    state.shutdown(env::drain_timeout(), || in_flight.load(Ordering::SeqCst)).await;
    tracing::info!("ralphd stopped");
}

fn install_signal(kind: SignalKind, name: &str) -> Option<Signal> {
    match signal(kind) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(signal = name, error = %e, "failed to install signal handler");
            None
        }
    }
}

fn config_from_env() -> WorkerConfig {
    WorkerConfig {
        worktree_root: env::worktree_root(),
        watchdog_soft_ms: env::watchdog_soft_ms(),
        watchdog_hard_ms: env::watchdog_hard_ms(),
        stall_idle_ms: env::stall_idle_ms(),
        ..WorkerConfig::default()
    }
}

/// One dispatch pass: admits as many queued/resumable tasks as the
/// scheduler's permits allow, spawning a detached `RepoWorker` run for
/// each (spec §4.B/§4.E). Each spawned task releases its permits and
/// decrements `in_flight` on completion, regardless of outcome.
fn dispatch_once(
    state: &DaemonState,
    ctx: &Arc<Ctx>,
    monitor: &Arc<DrainMonitor>,
    scheduler: &Arc<tokio::sync::Mutex<FairScheduler>>,
    in_flight: &Arc<AtomicUsize>,
) {
    let gate = monitor.gate();
    let queued = state.queue.get_queued();
    let now_ms = ctx.clock.epoch_ms();
    let resumable: Vec<Task> = state
        .queue
        .by_status(TaskStatus::Throttled)
        .into_iter()
        .filter(|t| t.resume_at.is_some_and(|r| r <= now_ms))
        .collect();

    let Ok(mut sched) = scheduler.try_lock() else {
        return;
    };

    sched.start_queued_tasks(
        gate,
        &queued,
        &resumable,
        |task, permits| spawn_task(task.clone(), permits, ctx.clone(), scheduler.clone(), in_flight.clone(), true),
        |task, permits| spawn_task(task.clone(), permits, ctx.clone(), scheduler.clone(), in_flight.clone(), false),
    );
}

fn spawn_task(
    task: Task,
    permits: TaskPermits,
    ctx: Arc<Ctx>,
    scheduler: Arc<tokio::sync::Mutex<FairScheduler>>,
    in_flight: Arc<AtomicUsize>,
    is_resume: bool,
) {
    in_flight.fetch_add(1, Ordering::SeqCst);
    let path = task.path.clone();
    let worker_id = format!("worker-{}", nanoid::nanoid!(8));
    tokio::spawn(async move {
        let _permits = permits;
        let worker = RepoWorker::new(ctx, worker_id);
        let outcome = if is_resume && task.session_id.is_some() {
            worker.resume(task, None).await
        } else {
            worker.run(task).await
        };
        tracing::info!(task = %path, outcome = ?outcome, "pipeline finished");

        scheduler.lock().await.mark_finished(&path);
        in_flight.fetch_sub(1, Ordering::SeqCst);
    });
}
