// SPDX-License-Identifier: MIT

//! `SessionRunner` — the opaque agent-runtime port (spec §1, §6, §9). The
//! core never spawns an agent subprocess itself; it only calls this trait
//! and interprets the structured [`SessionResult`] it returns.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("agent runtime unavailable: {0}")]
    Unavailable(String),
    #[error("session {0:?} not found")]
    SessionNotFound(String),
    #[error("cache miss for {0:?}")]
    CacheMiss(String),
}

/// Introspection metadata threaded through to the agent runtime for logging
/// and dashboards (spec §6 `opts.introspection`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Introspection {
    pub repo: Option<String>,
    pub issue: Option<String>,
    pub task_name: Option<String>,
    pub step: Option<String>,
    pub step_title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WatchdogOpts {
    pub enabled: bool,
    pub thresholds_ms: Vec<u64>,
    pub soft_log_interval_ms: u64,
    pub recent_event_limit: usize,
    pub context: String,
}

impl Default for WatchdogOpts {
    fn default() -> Self {
        Self {
            enabled: true,
            thresholds_ms: vec![5 * 60_000, 15 * 60_000],
            soft_log_interval_ms: 60_000,
            recent_event_limit: 20,
            context: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StallOpts {
    pub enabled: bool,
    pub idle_ms: u64,
    pub context: String,
}

impl Default for StallOpts {
    fn default() -> Self {
        Self { enabled: true, idle_ms: 10 * 60_000, context: String::new() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopDetectionOpts {
    pub enabled: bool,
    pub gate_matchers: Vec<String>,
    pub recommended_gate_command: Option<String>,
    pub thresholds: HashMap<String, u64>,
}

/// Options recognized by [`SessionRunner`] calls (spec §6 `opts`).
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    pub repo: Option<String>,
    pub cache_key: Option<String>,
    pub run_log_path: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub introspection: Introspection,
    pub watchdog: WatchdogOpts,
    pub stall: StallOpts,
    pub loop_detection: LoopDetectionOpts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogTimeout {
    pub tool_name: String,
    pub call_id: String,
    pub elapsed_ms: u64,
    pub recent_events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StallTimeout {
    pub idle_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopTrip {
    pub reason: String,
    pub metrics: serde_json::Value,
}

/// `SessionResult` (spec §6): the only channel through which the agent
/// runtime communicates back to the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionResult {
    pub success: bool,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub watchdog_timeout: Option<WatchdogTimeout>,
    #[serde(default)]
    pub stall_timeout: Option<StallTimeout>,
    #[serde(default)]
    pub loop_trip: Option<LoopTrip>,
}

impl SessionResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into(), ..Default::default() }
    }
}

/// The agent-runtime port (spec §1, §6, §9).
#[async_trait]
pub trait SessionRunner: Send + Sync + 'static {
    async fn run_agent(
        &self,
        repo_path: &std::path::Path,
        agent: &str,
        prompt: &str,
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError>;

    async fn continue_session(
        &self,
        repo_path: &std::path::Path,
        session_id: &str,
        message: &str,
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError>;

    async fn continue_command(
        &self,
        repo_path: &std::path::Path,
        session_id: &str,
        command: &str,
        args: &[String],
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError>;
}

#[async_trait]
impl<T: SessionRunner + ?Sized> SessionRunner for std::sync::Arc<T> {
    async fn run_agent(
        &self,
        repo_path: &std::path::Path,
        agent: &str,
        prompt: &str,
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError> {
        (**self).run_agent(repo_path, agent, prompt, opts).await
    }

    async fn continue_session(
        &self,
        repo_path: &std::path::Path,
        session_id: &str,
        message: &str,
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError> {
        (**self).continue_session(repo_path, session_id, message, opts).await
    }

    async fn continue_command(
        &self,
        repo_path: &std::path::Path,
        session_id: &str,
        command: &str,
        args: &[String],
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError> {
        (**self).continue_command(repo_path, session_id, command, args, opts).await
    }
}

/// Thin subprocess glue over an external agent-runtime binary (spec §1:
/// "the core treats it as an opaque `SessionRunner`"). Invokes
/// `{program} {subcommand} ...} <extra args>` in `repo_path`, feeding
/// `opts`'s introspection/watchdog/stall/loop-detection config as a single
/// JSON object on stdin and expecting a JSON-encoded [`SessionResult`] on
/// stdout — the counterpart to [`ReqwestHostClient`](crate::host::ReqwestHostClient)
/// for the session port.
pub struct ShellSessionRunner {
    program: String,
    base_args: Vec<String>,
}

impl ShellSessionRunner {
    pub fn new(program: impl Into<String>, base_args: Vec<String>) -> Self {
        Self { program: program.into(), base_args }
    }

    async fn invoke(
        &self,
        repo_path: &std::path::Path,
        extra_args: &[&str],
        stdin_payload: &serde_json::Value,
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError> {
        let mut spec = ralph_shell::CommandSpec::new(self.program.as_str(), repo_path)
            .args(self.base_args.clone())
            .args(extra_args.iter().map(|s| s.to_string()));
        if let Some(timeout) = opts.timeout {
            spec = spec.timeout(timeout);
        }
        if let Some(run_log_path) = &opts.run_log_path {
            spec = spec.env("RALPH_RUN_LOG_PATH", run_log_path.display().to_string());
        }
        spec = spec.env("RALPH_SESSION_REQUEST", stdin_payload.to_string());

        let output = spec.run().await.map_err(|e| SessionError::Unavailable(e.to_string()))?;
        if !output.success() {
            return Err(SessionError::Unavailable(format!(
                "agent runtime exited {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        serde_json::from_str::<SessionResult>(output.stdout.trim())
            .map_err(|e| SessionError::Unavailable(format!("malformed session result: {e}")))
    }
}

#[async_trait]
impl SessionRunner for ShellSessionRunner {
    async fn run_agent(
        &self,
        repo_path: &std::path::Path,
        agent: &str,
        prompt: &str,
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError> {
        self.invoke(repo_path, &["run-agent", agent, prompt], &serde_json::json!({ "opts": opts_json(opts) }), opts)
            .await
    }

    async fn continue_session(
        &self,
        repo_path: &std::path::Path,
        session_id: &str,
        message: &str,
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError> {
        self.invoke(
            repo_path,
            &["continue-session", session_id, message],
            &serde_json::json!({ "opts": opts_json(opts) }),
            opts,
        )
        .await
    }

    async fn continue_command(
        &self,
        repo_path: &std::path::Path,
        session_id: &str,
        command: &str,
        args: &[String],
        opts: &RunOpts,
    ) -> Result<SessionResult, SessionError> {
        let mut full_args = vec!["continue-command", session_id, command];
        let owned: Vec<String> = args.to_vec();
        full_args.extend(owned.iter().map(String::as_str));
        self.invoke(repo_path, &full_args, &serde_json::json!({ "opts": opts_json(opts) }), opts).await
    }
}

fn opts_json(opts: &RunOpts) -> serde_json::Value {
    serde_json::json!({
        "repo": opts.repo,
        "cacheKey": opts.cache_key,
        "introspection": opts.introspection,
    })
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    pub enum SessionCall {
        RunAgent { agent: String, prompt: String },
        ContinueSession { session_id: String, message: String },
        ContinueCommand { session_id: String, command: String, args: Vec<String> },
    }

    /// Fake agent runtime for engine/daemon tests. Responses are queued via
    /// [`FakeSessionRunner::push_result`]; the default response when the
    /// queue is empty is a bare success with empty output, so most call
    /// sites don't need to prime every step.
    #[derive(Clone, Default)]
    pub struct FakeSessionRunner {
        calls: Arc<Mutex<Vec<SessionCall>>>,
        queued: Arc<Mutex<Vec<SessionResult>>>,
    }

    impl FakeSessionRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_result(&self, result: SessionResult) {
            self.queued.lock().push(result);
        }

        pub fn calls(&self) -> Vec<SessionCall> {
            self.calls.lock().clone()
        }

        fn next_result(&self) -> SessionResult {
            let mut q = self.queued.lock();
            if q.is_empty() {
                SessionResult::ok("")
            } else {
                q.remove(0)
            }
        }
    }

    #[async_trait]
    impl SessionRunner for FakeSessionRunner {
        async fn run_agent(
            &self,
            _repo_path: &std::path::Path,
            agent: &str,
            prompt: &str,
            _opts: &RunOpts,
        ) -> Result<SessionResult, SessionError> {
            self.calls.lock().push(SessionCall::RunAgent {
                agent: agent.to_string(),
                prompt: prompt.to_string(),
            });
            Ok(self.next_result())
        }

        async fn continue_session(
            &self,
            _repo_path: &std::path::Path,
            session_id: &str,
            message: &str,
            _opts: &RunOpts,
        ) -> Result<SessionResult, SessionError> {
            self.calls.lock().push(SessionCall::ContinueSession {
                session_id: session_id.to_string(),
                message: message.to_string(),
            });
            Ok(self.next_result())
        }

        async fn continue_command(
            &self,
            _repo_path: &std::path::Path,
            session_id: &str,
            command: &str,
            args: &[String],
            _opts: &RunOpts,
        ) -> Result<SessionResult, SessionError> {
            self.calls.lock().push(SessionCall::ContinueCommand {
                session_id: session_id.to_string(),
                command: command.to_string(),
                args: args.to_vec(),
            });
            Ok(self.next_result())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSessionRunner, SessionCall};

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
