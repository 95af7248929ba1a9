//! Integration tests: loaded build types executed with real processes.

use buildconf_ci::{BuildGate, BuildRunner, StepStatus};
use buildconf_core::{ConfigBundle, Loader};

const CONFIG: &str = r#"{
  "projects": [{
    "id": "Local",
    "name": "Local",
    "parent": "_Root",
    "vcs_roots": [{
      "id": "Repo",
      "name": "Repo",
      "url": "file:///tmp/repo.git",
      "branch_spec": "+:refs/heads/(*)",
      "auth": { "method": "anonymous" }
    }],
    "build_types": [
      {
        "id": "Green",
        "name": "Green",
        "vcs": { "root": "Repo", "checkout_mode": "on_agent", "clean_checkout": true },
        "artifact_rules": "+:build/**/*",
        "steps": [
          { "name": "prepare", "script": "mkdir -p build" },
          { "name": "test", "script": "echo '<testsuite/>' > test.xml", "working_dir": "build" }
        ],
        "features": [{
          "type": "xml-report-plugin",
          "params": {
            "xmlReportParsing.reportType": "junit",
            "xmlReportParsing.reportDirs": "+:build/test.xml"
          }
        }]
      },
      {
        "id": "Red",
        "name": "Red",
        "vcs": { "root": "Repo", "checkout_mode": "on_agent", "clean_checkout": true },
        "artifact_rules": [],
        "steps": [
          { "script": "true" },
          { "script": "exit 4" },
          { "script": "touch never-created" }
        ],
        "features": []
      }
    ]
  }]
}"#;

fn load() -> buildconf_core::LoadedConfig {
    Loader::load(ConfigBundle::from_json_str(CONFIG).expect("parse")).expect("load")
}

/// Test: every step passes and the declared report exists
#[tokio::test]
async fn test_green_build_passes_gate() {
    let config = load();
    let bt = config.build_type("Green").expect("build type");
    let dir = tempfile::tempdir().expect("tempdir");

    let outcome = BuildRunner::default()
        .run(bt, dir.path())
        .await
        .expect("run failed");

    assert!(outcome.success, "Build should succeed");
    assert_eq!(outcome.passed_count(), 2);
    assert!(dir.path().join("build/test.xml").exists());

    let verdict = BuildGate::evaluate(bt, &outcome);
    assert!(verdict.passed, "violations: {:?}", verdict.violations);
}

/// Test: a failing step stops the build; later steps never run
#[tokio::test]
async fn test_red_build_fails_fast() {
    let config = load();
    let bt = config.build_type("Red").expect("build type");
    let dir = tempfile::tempdir().expect("tempdir");

    let outcome = BuildRunner::default()
        .run(bt, dir.path())
        .await
        .expect("run failed");

    assert!(!outcome.success);
    let statuses: Vec<_> = outcome.steps.iter().map(|s| s.status).collect();
    assert_eq!(
        statuses,
        vec![StepStatus::Passed, StepStatus::Failed, StepStatus::Skipped]
    );
    assert_eq!(outcome.steps[1].exit_code, Some(4));
    assert!(!dir.path().join("never-created").exists());

    let verdict = BuildGate::evaluate(bt, &outcome);
    assert!(!verdict.passed);
    assert_eq!(verdict.violations.len(), 1);
}

/// Test: the outcome serializes for reporting
#[tokio::test]
async fn test_outcome_serializes() {
    let config = load();
    let bt = config.build_type("Red").expect("build type");
    let dir = tempfile::tempdir().expect("tempdir");

    let outcome = BuildRunner::default()
        .run(bt, dir.path())
        .await
        .expect("run failed");
    let value = serde_json::to_value(&outcome).expect("serialize");
    assert_eq!(value["build_type_id"], "Red");
    assert_eq!(value["steps"][2]["status"], "skipped");
}
