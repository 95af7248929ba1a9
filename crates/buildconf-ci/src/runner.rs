//! Build execution: steps in declared order, fail fast.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use buildconf_core::BuildType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ExecutionError, Result};
use crate::executor::{ProcessExecutor, StepExecutor};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Not run because an earlier step failed.
    Skipped,
}

/// Result of one step of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the build type's step list.
    pub index: usize,

    pub label: String,

    pub status: StepStatus,

    /// Absent when the process never finished.
    pub exit_code: Option<i32>,

    /// Spawn or timeout failure.
    pub error: Option<String>,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,
}

impl StepResult {
    fn skipped(index: usize, label: &str) -> Self {
        Self {
            index,
            label: label.to_string(),
            status: StepStatus::Skipped,
            exit_code: None,
            error: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

/// Result of a complete build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildOutcome {
    pub build_type_id: String,

    /// Checkout directory the steps ran in.
    pub workdir: PathBuf,

    /// Whether every step passed.
    pub success: bool,

    /// One entry per declared step, in order.
    pub steps: Vec<StepResult>,

    pub started_at: DateTime<Utc>,

    pub duration_ms: u64,
}

impl BuildOutcome {
    pub fn passed_count(&self) -> usize {
        self.count(StepStatus::Passed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(StepStatus::Failed)
    }

    pub fn skipped_count(&self) -> usize {
        self.count(StepStatus::Skipped)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepResult> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
    }

    fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }
}

/// Runs build types against a checkout directory.
#[derive(Clone)]
pub struct BuildRunner {
    executor: Arc<dyn StepExecutor>,
}

impl Default for BuildRunner {
    fn default() -> Self {
        Self::new(Arc::new(ProcessExecutor::new()))
    }
}

impl BuildRunner {
    pub fn new(executor: Arc<dyn StepExecutor>) -> Self {
        Self { executor }
    }

    /// Execute every step of `build_type` in `workdir`.
    ///
    /// Step failures, including spawn errors and timeouts, are recorded in
    /// the outcome. Errors are returned only when the build cannot start.
    pub async fn run(&self, build_type: &BuildType, workdir: &Path) -> Result<BuildOutcome> {
        if !build_type.is_runnable() {
            return Err(ExecutionError::NotRunnable {
                build_type: build_type.id.clone(),
            });
        }
        match std::fs::metadata(workdir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ExecutionError::Workdir {
                    path: workdir.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "not a directory",
                    ),
                })
            }
            Err(source) => {
                return Err(ExecutionError::Workdir {
                    path: workdir.to_path_buf(),
                    source,
                })
            }
        }

        let started_at = Utc::now();
        let start = Instant::now();
        info!(build_type = %build_type.id, workdir = %workdir.display(), "Starting build");

        let mut steps = Vec::with_capacity(build_type.steps.len());
        let mut success = true;

        for (index, step) in build_type.steps.iter().enumerate() {
            if !success {
                info!(step = %step.label(), "Skipping step after failure");
                steps.push(StepResult::skipped(index, step.label()));
                continue;
            }

            info!(step = %step.label(), index, "Executing step");
            let result = match self.executor.execute(step, workdir).await {
                Ok(output) => StepResult {
                    index,
                    label: step.label().to_string(),
                    status: if output.success() {
                        StepStatus::Passed
                    } else {
                        StepStatus::Failed
                    },
                    exit_code: Some(output.exit_code),
                    error: None,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    duration_ms: output.duration_ms,
                },
                Err(e) => {
                    warn!(step = %step.label(), error = %e, "Step execution failed");
                    StepResult {
                        index,
                        label: step.label().to_string(),
                        status: StepStatus::Failed,
                        exit_code: None,
                        error: Some(e.to_string()),
                        stdout: String::new(),
                        stderr: String::new(),
                        duration_ms: 0,
                    }
                }
            };

            if !result.passed() {
                success = false;
                warn!(step = %result.label, exit_code = ?result.exit_code, "Step failed");
            }
            steps.push(result);
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(build_type = %build_type.id, success, duration_ms, "Build finished");

        Ok(BuildOutcome {
            build_type_id: build_type.id.clone(),
            workdir: workdir.to_path_buf(),
            success,
            steps,
            started_at,
            duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StepOutput;
    use async_trait::async_trait;
    use buildconf_core::{BuildStep, VcsSettings};
    use std::sync::Mutex;

    /// Exit code taken from the script text; records every call.
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StepExecutor for ScriptedExecutor {
        async fn execute(&self, step: &BuildStep, _workdir: &Path) -> Result<StepOutput> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(step.script.clone());
            }
            if step.script == "hang" {
                return Err(ExecutionError::Timeout {
                    step: step.label().to_string(),
                    secs: 1,
                });
            }
            Ok(StepOutput {
                exit_code: step.script.parse().unwrap_or(0),
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 1,
            })
        }
    }

    fn build(scripts: &[&str]) -> BuildType {
        scripts.iter().fold(
            BuildType::new("Build", "Build", VcsSettings::new("Repo")),
            |bt, s| bt.step(BuildStep::script(*s)),
        )
    }

    #[tokio::test]
    async fn test_all_steps_pass() {
        let executor = Arc::new(ScriptedExecutor::default());
        let runner = BuildRunner::new(executor.clone());
        let dir = tempfile::tempdir().expect("tempdir");

        let outcome = runner.run(&build(&["0", "0"]), dir.path()).await.expect("run");
        assert!(outcome.success);
        assert_eq!(outcome.passed_count(), 2);
        assert_eq!(executor.calls.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn test_first_failure_skips_rest() {
        let executor = Arc::new(ScriptedExecutor::default());
        let runner = BuildRunner::new(executor.clone());
        let dir = tempfile::tempdir().expect("tempdir");

        let outcome = runner
            .run(&build(&["0", "2", "0", "0"]), dir.path())
            .await
            .expect("run");
        assert!(!outcome.success);
        assert_eq!(outcome.passed_count(), 1);
        assert_eq!(outcome.failed_count(), 1);
        assert_eq!(outcome.skipped_count(), 2);
        assert_eq!(outcome.steps[1].exit_code, Some(2));
        assert_eq!(*executor.calls.lock().expect("lock"), vec!["0", "2"]);
    }

    #[tokio::test]
    async fn test_executor_error_is_recorded_not_raised() {
        let runner = BuildRunner::new(Arc::new(ScriptedExecutor::default()));
        let dir = tempfile::tempdir().expect("tempdir");

        let outcome = runner
            .run(&build(&["hang", "0"]), dir.path())
            .await
            .expect("run");
        assert!(!outcome.success);
        let failed: Vec<_> = outcome.failed_steps().collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .error
            .as_deref()
            .unwrap_or_default()
            .contains("timed out"));
        assert_eq!(outcome.steps[1].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_not_runnable_rejected() {
        let runner = BuildRunner::new(Arc::new(ScriptedExecutor::default()));
        let dir = tempfile::tempdir().expect("tempdir");
        let err = runner.run(&build(&[]), dir.path()).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotRunnable { .. }));
    }

    #[tokio::test]
    async fn test_missing_workdir_rejected() {
        let runner = BuildRunner::new(Arc::new(ScriptedExecutor::default()));
        let dir = tempfile::tempdir().expect("tempdir");
        let err = runner
            .run(&build(&["0"]), &dir.path().join("absent"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Workdir { .. }));
    }
}
