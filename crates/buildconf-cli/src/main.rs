//! buildconf - CI configuration as code
//!
//! The `buildconf` command loads a configuration bundle and works with it
//! locally.
//!
//! ## Commands
//!
//! - `validate`: Load the bundle and report counts and warnings
//! - `show`: List runnable build entry points with their VCS roots
//! - `digest`: Print the canonical configuration digest
//! - `match-branch`: Resolve a ref against a VCS root's branch spec
//! - `plan`: Feed commits through a build type's trigger and show the queue
//! - `run`: Execute a build type's steps locally and evaluate the gate

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

use buildconf_ci::{BuildGate, BuildOutcome, BuildRunner, GateVerdict, ProcessExecutor};
use buildconf_core::{
    BuildQueue, CommitEvent, LoadedConfig, Loader, QueuedBuild, TriggerDecision,
};

#[derive(Parser)]
#[command(name = "buildconf")]
#[command(author = "Lyokocoin ABC Developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI configuration as code", long_about = None)]
struct Cli {
    /// Configuration bundle (JSON)
    #[arg(
        short,
        long,
        global = true,
        env = "BUILDCONF_CONFIG",
        default_value = ".buildconf/settings.json"
    )]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output and JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate the configuration
    Validate,

    /// List runnable build types and their resolved VCS roots
    Show {
        /// Only this project and its descendants
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Print the canonical digest of the configuration
    Digest,

    /// Check whether a ref is monitored by a VCS root
    MatchBranch {
        /// VCS root id
        #[arg(long)]
        vcs_root: String,

        /// Full ref name, e.g. refs/heads/master
        #[arg(value_name = "REF")]
        ref_name: String,
    },

    /// Feed commits on one ref through a build type's trigger
    Plan {
        /// Build type id
        #[arg(short, long)]
        build_type: String,

        /// Full ref name the commits land on
        #[arg(short, long = "ref", value_name = "REF")]
        ref_name: String,

        /// Revisions, oldest first
        #[arg(required = true)]
        revisions: Vec<String>,
    },

    /// Execute a build type locally
    Run {
        /// Build type id
        #[arg(short, long)]
        build_type: String,

        /// Checkout directory the steps run in
        #[arg(short, long, default_value = ".")]
        workdir: PathBuf,

        /// Timeout in seconds for steps that declare none
        #[arg(short, long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    buildconf_core::init_tracing(cli.json, level);

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Validate => cmd_validate(&config, cli.json),
        Commands::Show { project } => cmd_show(&config, project.as_deref(), cli.json),
        Commands::Digest => cmd_digest(&config),
        Commands::MatchBranch { vcs_root, ref_name } => {
            cmd_match_branch(&config, &vcs_root, &ref_name, cli.json)
        }
        Commands::Plan {
            build_type,
            ref_name,
            revisions,
        } => cmd_plan(&config, &build_type, &ref_name, &revisions, cli.json),
        Commands::Run {
            build_type,
            workdir,
            timeout,
        } => cmd_run(&config, &build_type, &workdir, timeout, cli.json).await,
    }
}

fn load_config(path: &Path) -> Result<LoadedConfig> {
    Loader::load_path(path)
        .with_context(|| format!("Failed to load configuration from {:?}", path))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ValidateReport {
    projects: usize,
    build_types: usize,
    vcs_roots: usize,
    digest: String,
    warnings: Vec<String>,
}

fn build_validate_report(config: &LoadedConfig) -> Result<ValidateReport> {
    Ok(ValidateReport {
        projects: config.projects().len(),
        build_types: config.build_type_count(),
        vcs_roots: config.vcs_root_count(),
        digest: config.digest()?,
        warnings: config.warnings().iter().map(|w| w.to_string()).collect(),
    })
}

fn cmd_validate(config: &LoadedConfig, json: bool) -> Result<()> {
    let report = build_validate_report(config)?;
    if json {
        return print_json(&report);
    }

    println!("✓ Configuration is valid");
    println!("  Projects:    {}", report.projects);
    println!("  Build types: {}", report.build_types);
    println!("  VCS roots:   {}", report.vcs_roots);
    println!("  Digest:      {}", report.digest);
    for warning in &report.warnings {
        println!("  ! {}", warning);
    }
    Ok(())
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct EntryPointRow {
    project: String,
    build_type: String,
    name: String,
    vcs_root: String,
    url: String,
    steps: usize,
    triggered: bool,
}

fn build_entry_rows(config: &LoadedConfig, project: Option<&str>) -> Result<Vec<EntryPointRow>> {
    let points = match project {
        Some(id) => config.entry_points(id)?,
        None => config.all_entry_points()?,
    };
    Ok(points
        .into_iter()
        .map(|p| EntryPointRow {
            project: p.project.id.clone(),
            build_type: p.build_type.id.clone(),
            name: p.build_type.name.clone(),
            vcs_root: p.vcs_root.id.clone(),
            url: p.vcs_root.url.clone(),
            steps: p.build_type.steps.len(),
            triggered: p.build_type.trigger.is_some(),
        })
        .collect())
}

fn cmd_show(config: &LoadedConfig, project: Option<&str>, json: bool) -> Result<()> {
    let rows = build_entry_rows(config, project)?;
    if json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        println!("No runnable build types.");
        return Ok(());
    }
    for row in &rows {
        println!("{} / {} ({})", row.project, row.build_type, row.name);
        println!("  VCS root: {} <{}>", row.vcs_root, row.url);
        println!(
            "  Steps: {}, trigger: {}",
            row.steps,
            if row.triggered { "on commit" } else { "manual" }
        );
    }
    Ok(())
}

fn cmd_digest(config: &LoadedConfig) -> Result<()> {
    println!("{}", config.digest()?);
    Ok(())
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct BranchMatch {
    vcs_root: String,
    ref_name: String,
    matched: bool,
    logical_branch: Option<String>,
}

fn build_branch_match(config: &LoadedConfig, vcs_root: &str, ref_name: &str) -> Result<BranchMatch> {
    let root = config.vcs_root(vcs_root)?;
    let logical_branch = root.logical_branch(ref_name);
    Ok(BranchMatch {
        vcs_root: root.id.clone(),
        ref_name: ref_name.to_string(),
        matched: logical_branch.is_some(),
        logical_branch,
    })
}

fn cmd_match_branch(config: &LoadedConfig, vcs_root: &str, ref_name: &str, json: bool) -> Result<()> {
    let result = build_branch_match(config, vcs_root, ref_name)?;
    if json {
        return print_json(&result);
    }

    match &result.logical_branch {
        Some(branch) => println!("✓ {} matches (branch: {})", result.ref_name, branch),
        None => println!("✗ {} is not monitored by {}", result.ref_name, result.vcs_root),
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlannedCommit {
    revision: String,
    decision: TriggerDecision,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    build_type: String,
    ref_name: String,
    commits: Vec<PlannedCommit>,
    queue: Vec<QueuedBuild>,
}

fn build_plan(
    config: &LoadedConfig,
    build_type: &str,
    ref_name: &str,
    revisions: &[String],
) -> Result<PlanReport> {
    let bt = config.build_type(build_type)?;
    let root = config.resolve_vcs_root(build_type)?;

    let mut queue = BuildQueue::new();
    let commits = revisions
        .iter()
        .map(|rev| PlannedCommit {
            revision: rev.clone(),
            decision: queue.on_commit(bt, root, &CommitEvent::new(rev.as_str(), ref_name)),
        })
        .collect();

    Ok(PlanReport {
        build_type: bt.id.clone(),
        ref_name: ref_name.to_string(),
        commits,
        queue: queue.pending().cloned().collect(),
    })
}

fn cmd_plan(
    config: &LoadedConfig,
    build_type: &str,
    ref_name: &str,
    revisions: &[String],
    json: bool,
) -> Result<()> {
    let plan = build_plan(config, build_type, ref_name, revisions)?;
    if json {
        return print_json(&plan);
    }

    println!("Build type: {}", plan.build_type);
    println!("Ref: {}", plan.ref_name);
    println!();
    for commit in &plan.commits {
        println!("  {} -> {}", commit.revision, render_decision(&commit.decision));
    }
    println!();
    println!("Queued builds: {}", plan.queue.len());
    for build in &plan.queue {
        println!(
            "  #{} {} [{}]",
            build.seq,
            build.branch,
            build.revisions.join(", ")
        );
    }
    Ok(())
}

fn render_decision(decision: &TriggerDecision) -> String {
    match decision {
        TriggerDecision::Ignored { reason } => format!("ignored ({:?})", reason),
        TriggerDecision::Enqueued { seq } => format!("queued #{}", seq),
        TriggerDecision::Merged { seq } => format!("merged into #{}", seq),
        TriggerDecision::Replaced { superseded, seq } => {
            format!("queued #{} replacing #{}", seq, superseded)
        }
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    outcome: BuildOutcome,
    verdict: GateVerdict,
}

async fn execute_build(
    config: &LoadedConfig,
    build_type: &str,
    workdir: &Path,
    timeout: Option<u64>,
) -> Result<RunReport> {
    let bt = config.build_type(build_type)?;
    let mut executor = ProcessExecutor::new();
    if let Some(secs) = timeout {
        executor = executor.with_default_timeout(Duration::from_secs(secs));
    }

    info!(build_type = %bt.id, "Running build locally");
    let outcome = BuildRunner::new(Arc::new(executor))
        .run(bt, workdir)
        .await
        .with_context(|| format!("Build {} could not start", bt.id))?;
    let verdict = BuildGate::evaluate(bt, &outcome);
    Ok(RunReport { outcome, verdict })
}

async fn cmd_run(
    config: &LoadedConfig,
    build_type: &str,
    workdir: &Path,
    timeout: Option<u64>,
    json: bool,
) -> Result<()> {
    let report = execute_build(config, build_type, workdir, timeout).await?;

    if json {
        print_json(&report)?;
    } else {
        let outcome = &report.outcome;
        println!("Build type: {}", outcome.build_type_id);
        println!("Workdir: {:?}", outcome.workdir);
        println!(
            "Status: {}",
            if outcome.success { "✓ PASSED" } else { "✗ FAILED" }
        );
        println!("Duration: {}ms", outcome.duration_ms);
        println!();

        for step in &outcome.steps {
            let marker = match step.status {
                buildconf_ci::StepStatus::Passed => "✓",
                buildconf_ci::StepStatus::Failed => "✗",
                buildconf_ci::StepStatus::Skipped => "-",
            };
            match step.exit_code {
                Some(code) => println!(
                    "  {} {} ({}ms, exit code: {})",
                    marker, step.label, step.duration_ms, code
                ),
                None => println!("  {} {}", marker, step.label),
            }
        }

        println!();
        println!(
            "Summary: {}/{} steps passed",
            outcome.passed_count(),
            outcome.steps.len()
        );
        println!(
            "Gate: {}",
            if report.verdict.passed { "✓ PASSED" } else { "✗ FAILED" }
        );
        if !report.verdict.violations.is_empty() {
            println!("Violations:");
            for violation in &report.verdict.violations {
                println!("  - {}", violation);
            }
        }
    }

    if report.outcome.success && report.verdict.passed {
        Ok(())
    } else {
        anyhow::bail!("Build {} failed", report.outcome.build_type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildconf_core::QueueState;

    const CONFIG: &str = r#"{
      "projects": [
        {
          "id": "P",
          "name": "P",
          "parent": "_Root",
          "vcs_roots": [{
            "id": "Repo",
            "name": "Repo",
            "url": "ssh://host/repo.git",
            "branch_spec": ["+:refs/heads/(*)", "+:refs/tags/(*)"],
            "auth": { "method": "anonymous" }
          }],
          "build_types": [{
            "id": "Build",
            "name": "Build",
            "vcs": { "root": "Repo", "checkout_mode": "on_agent", "clean_checkout": true },
            "artifact_rules": ["+:out/**/*"],
            "steps": [{ "script": "echo built > out.txt" }],
            "trigger": { "per_checkin_triggering": true, "enable_queue_optimization": false },
            "features": []
          }]
        },
        {
          "id": "Child",
          "name": "Child",
          "parent": "P",
          "vcs_roots": [],
          "build_types": [
            {
              "id": "Nightly",
              "name": "Nightly",
              "vcs": { "root": "Repo", "checkout_mode": "on_server", "clean_checkout": false },
              "artifact_rules": [],
              "steps": [{ "script": "exit 1" }],
              "features": []
            },
            {
              "id": "Idle",
              "name": "Idle",
              "vcs": { "root": "Repo", "checkout_mode": "on_agent", "clean_checkout": false },
              "artifact_rules": [],
              "steps": [],
              "features": []
            }
          ]
        }
      ]
    }"#;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("settings.json");
        std::fs::write(&path, CONFIG).expect("write config");
        path
    }

    #[test]
    fn test_validate_report_counts_and_warnings() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&write_config(temp_dir.path())).expect("load");

        let report = build_validate_report(&config).expect("report");
        assert_eq!(report.projects, 2);
        assert_eq!(report.build_types, 3);
        assert_eq!(report.vcs_roots, 1);
        assert_eq!(report.digest.len(), 64);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("Idle"));
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let err = load_config(&temp_dir.path().join("absent.json")).unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains("Failed to load configuration"),
            "unexpected error: {msg}"
        );
    }

    #[test]
    fn test_show_rows_follow_project_scope() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&write_config(temp_dir.path())).expect("load");

        let all = build_entry_rows(&config, None).expect("rows");
        let ids: Vec<_> = all.iter().map(|r| r.build_type.as_str()).collect();
        assert_eq!(ids, vec!["Build", "Nightly"]);

        let child = build_entry_rows(&config, Some("Child")).expect("rows");
        assert_eq!(
            child,
            vec![EntryPointRow {
                project: "Child".to_string(),
                build_type: "Nightly".to_string(),
                name: "Nightly".to_string(),
                vcs_root: "Repo".to_string(),
                url: "ssh://host/repo.git".to_string(),
                steps: 1,
                triggered: false,
            }]
        );

        assert!(build_entry_rows(&config, Some("Nope")).is_err());
    }

    #[test]
    fn test_branch_match() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&write_config(temp_dir.path())).expect("load");

        let tag = build_branch_match(&config, "Repo", "refs/tags/v1.0").expect("match");
        assert!(tag.matched);
        assert_eq!(tag.logical_branch.as_deref(), Some("v1.0"));

        let pull = build_branch_match(&config, "Repo", "refs/pull/1").expect("match");
        assert!(!pull.matched);
        assert_eq!(pull.logical_branch, None);
    }

    #[test]
    fn test_plan_one_build_per_commit() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&write_config(temp_dir.path())).expect("load");
        let revisions = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let plan = build_plan(&config, "Build", "refs/heads/master", &revisions).expect("plan");
        assert_eq!(plan.queue.len(), 3);
        assert!(plan.queue.iter().all(|b| b.state == QueueState::Queued));
        assert_eq!(render_decision(&plan.commits[2].decision), "queued #3");
    }

    #[test]
    fn test_plan_without_trigger_queues_nothing() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&write_config(temp_dir.path())).expect("load");
        let revisions = vec!["a".to_string()];

        let plan = build_plan(&config, "Nightly", "refs/heads/master", &revisions).expect("plan");
        assert!(plan.queue.is_empty());
        assert_eq!(render_decision(&plan.commits[0].decision), "ignored (NoTrigger)");
    }

    #[tokio::test]
    async fn test_run_build_locally() {
        let temp_dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&write_config(temp_dir.path())).expect("load");

        let report = execute_build(&config, "Build", temp_dir.path(), Some(30))
            .await
            .expect("run");
        assert!(report.outcome.success);
        assert!(report.verdict.passed);
        assert!(temp_dir.path().join("out.txt").exists());

        let result = cmd_run(&config, "Nightly", temp_dir.path(), None, true).await;
        assert!(result.is_err());
    }
}
