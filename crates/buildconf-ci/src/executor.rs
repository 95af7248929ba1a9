//! Step execution.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use buildconf_core::BuildStep;
use tokio::process::Command;
use tracing::debug;

use crate::error::{ExecutionError, Result};

/// Captured result of one finished process.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Exit code, -1 when killed by a signal.
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a single build step in a working directory.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, step: &BuildStep, workdir: &Path) -> Result<StepOutput>;
}

/// Runs steps as `sh -c <script>` child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    /// Applied to steps that declare no timeout of their own.
    default_timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    fn timeout_for(&self, step: &BuildStep) -> Option<Duration> {
        step.timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .or(self.default_timeout)
    }
}

#[async_trait]
impl StepExecutor for ProcessExecutor {
    async fn execute(&self, step: &BuildStep, workdir: &Path) -> Result<StepOutput> {
        let start = Instant::now();
        let dir = match &step.working_dir {
            Some(sub) => workdir.join(sub),
            None => workdir.to_path_buf(),
        };

        debug!(step = %step.label(), dir = %dir.display(), "Spawning step");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&step.script)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                step: step.label().to_string(),
                source,
            })?;

        let waited = match self.timeout_for(step) {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ExecutionError::Timeout {
                    step: step.label().to_string(),
                    secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };
        let output = waited.map_err(|source| ExecutionError::Spawn {
            step: step.label().to_string(),
            source,
        })?;

        Ok(StepOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
