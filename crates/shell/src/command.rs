// SPDX-License-Identifier: MIT

//! A single configured command run through `tokio::process`, with bounded
//! output capture and a hard timeout, mirroring the shape of the teacher's
//! `CommandTrace` (command/args/exit_code/duration/snippets) without the
//! surrounding shell-language machinery.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

use crate::error::ShellError;

/// Bytes of stdout/stderr retained per command (teacher's "snippet" idea).
const DEFAULT_SNIPPET_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: HashMap::new(),
            timeout: Duration::from_secs(600),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the command to completion or until `self.timeout` elapses,
    /// whichever comes first. The child is killed on timeout and on drop of
    /// the future (cancellation), never left orphaned.
    pub async fn run(&self) -> Result<CommandOutput, ShellError> {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.cwd)
            .envs(&self.env)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ShellError::Spawn {
            program: self.program.clone(),
            cwd: self.cwd.clone(),
            source,
        })?;

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let wait = async {
            let status = child.wait().await;
            let mut out_buf = Vec::new();
            let mut err_buf = Vec::new();
            if let Some(s) = stdout.as_mut() {
                let _ = s.take(DEFAULT_SNIPPET_LIMIT as u64).read_to_end(&mut out_buf).await;
            }
            if let Some(s) = stderr.as_mut() {
                let _ = s.take(DEFAULT_SNIPPET_LIMIT as u64).read_to_end(&mut err_buf).await;
            }
            (status, out_buf, err_buf)
        };

        match tokio::time::timeout(self.timeout, wait).await {
            Ok((status, stdout_bytes, stderr_bytes)) => {
                let status = status.map_err(|source| ShellError::Wait {
                    program: self.program.clone(),
                    source,
                })?;
                Ok(CommandOutput {
                    exit_code: status.code().unwrap_or(-1),
                    duration: start.elapsed(),
                    stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                })
            }
            Err(_) => {
                let _ = child.start_kill();
                Err(ShellError::Timeout {
                    program: self.program.clone(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
