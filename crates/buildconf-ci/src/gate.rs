//! Pass/fail verdict for a finished build.

use std::path::Path;

use buildconf_core::{BuildFeature, BuildType, RuleKind};
use serde::{Deserialize, Serialize};

use crate::runner::BuildOutcome;

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Build gate rules.
pub struct BuildGate;

impl BuildGate {
    /// Evaluate a finished build.
    ///
    /// Gate rule:
    /// - every failed step is a violation, with its exit code or error
    /// - every literal include path of a report feature must exist under the
    ///   build's working directory; glob patterns are not checked
    pub fn evaluate(build_type: &BuildType, outcome: &BuildOutcome) -> GateVerdict {
        let mut violations = Vec::new();

        for step in outcome.failed_steps() {
            match (&step.error, step.exit_code) {
                (Some(error), _) => {
                    violations.push(format!("Step '{}' failed: {}", step.label, error))
                }
                (None, Some(code)) => violations.push(format!(
                    "Step '{}' returned non-zero exit code: {}",
                    step.label, code
                )),
                (None, None) => violations.push(format!("Step '{}' failed", step.label)),
            }
        }

        for path in missing_reports(build_type, &outcome.workdir) {
            violations.push(format!("Report '{}' was not produced", path));
        }

        let passed = violations.is_empty();
        let message = if passed {
            "All steps passed".to_string()
        } else {
            format!("Gate failed with {} violation(s)", violations.len())
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }
}

fn missing_reports(build_type: &BuildType, workdir: &Path) -> Vec<String> {
    build_type
        .features
        .iter()
        .filter_map(|feature| match feature {
            BuildFeature::XmlReport(report) => Some(report),
            BuildFeature::Opaque { .. } => None,
        })
        .flat_map(|report| report.report_dirs.rules())
        .filter(|rule| rule.kind == RuleKind::Include && rule.is_literal())
        .filter(|rule| !workdir.join(&rule.pattern).exists())
        .map(|rule| rule.pattern.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{StepResult, StepStatus};
    use buildconf_core::{ArtifactRules, BuildStep, ReportType, VcsSettings};
    use chrono::Utc;

    fn step(index: usize, status: StepStatus, exit_code: Option<i32>) -> StepResult {
        StepResult {
            index,
            label: format!("step{}", index),
            status,
            exit_code,
            error: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 1,
        }
    }

    fn outcome(workdir: &Path, steps: Vec<StepResult>) -> BuildOutcome {
        BuildOutcome {
            build_type_id: "Build".to_string(),
            workdir: workdir.to_path_buf(),
            success: steps.iter().all(|s| s.passed()),
            steps,
            started_at: Utc::now(),
            duration_ms: 1,
        }
    }

    fn build(report_dirs: &str) -> BuildType {
        BuildType::new("Build", "Build", VcsSettings::new("Repo"))
            .step(BuildStep::script("make"))
            .feature(BuildFeature::xml_report(
                ReportType::Junit,
                ArtifactRules::parse_block(report_dirs).expect("report dirs"),
            ))
    }

    #[test]
    fn test_passing_build_with_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("build")).expect("mkdir");
        std::fs::write(dir.path().join("build/test.xml"), "<testsuite/>").expect("write");

        let verdict = BuildGate::evaluate(
            &build("+:build/test.xml"),
            &outcome(dir.path(), vec![step(0, StepStatus::Passed, Some(0))]),
        );
        assert!(verdict.passed);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn test_missing_report_is_violation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let verdict = BuildGate::evaluate(
            &build("+:build/test.xml"),
            &outcome(dir.path(), vec![step(0, StepStatus::Passed, Some(0))]),
        );
        assert!(!verdict.passed);
        assert_eq!(verdict.violations.len(), 1);
        assert!(verdict.violations[0].contains("build/test.xml"));
    }

    #[test]
    fn test_globs_and_excludes_not_checked() {
        let dir = tempfile::tempdir().expect("tempdir");
        let verdict = BuildGate::evaluate(
            &build("+:reports/**/*.xml\n-:reports/skip.xml"),
            &outcome(dir.path(), vec![step(0, StepStatus::Passed, Some(0))]),
        );
        assert!(verdict.passed);
    }

    #[test]
    fn test_failed_step_reported_with_exit_code() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bt = BuildType::new("Build", "Build", VcsSettings::new("Repo"))
            .step(BuildStep::script("make"));
        let verdict = BuildGate::evaluate(
            &bt,
            &outcome(
                dir.path(),
                vec![
                    step(0, StepStatus::Failed, Some(127)),
                    step(1, StepStatus::Skipped, None),
                ],
            ),
        );
        assert!(!verdict.passed);
        assert_eq!(verdict.violations.len(), 1);
        assert!(verdict.violations[0].contains("127"));
        assert_eq!(verdict.message, "Gate failed with 1 violation(s)");
    }
}
