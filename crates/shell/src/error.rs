// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to spawn {program:?} in {cwd}: {source}")]
    Spawn { program: String, cwd: PathBuf, source: std::io::Error },
    #[error("{program:?} timed out after {timeout_ms}ms")]
    Timeout { program: String, timeout_ms: u64 },
    #[error("io error waiting on {program:?}: {source}")]
    Wait { program: String, source: std::io::Error },
}
