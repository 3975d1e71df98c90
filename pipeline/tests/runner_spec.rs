//! Integration tests for DAG loading and local runs
//!
//! Shell tasks stand in for dbt so the runs are hermetic.

use sentinel_pipeline::dag::{DEFAULT_INTERPRETER, DEFAULT_PROJECT_DIR};
use sentinel_pipeline::{BashCommand, DagError, DagSpec, TaskRunner, TaskSpec, TaskState};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn sh_task(id: &str, dir: &Path, script: &str, upstream: &[&str]) -> TaskSpec {
    TaskSpec {
        task_id: id.to_string(),
        command: BashCommand {
            working_dir: dir.to_path_buf(),
            interpreter: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script.to_string()],
        },
        upstream: upstream.iter().map(|s| s.to_string()).collect(),
    }
}

fn two_step_dag(dir: &Path, first: &str, second: &str) -> DagSpec {
    let mut spec = DagSpec::sentinel_daily_dbt_run(dir, "/bin/sh");
    spec.tasks = vec![
        sh_task("dbt_run", dir, first, &[]),
        sh_task("dbt_test", dir, second, &["dbt_run"]),
    ];
    spec
}

#[test]
fn test_bundled_yaml_matches_builtin_definition() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("dags/sentinel_daily_dbt_run.yaml");
    let loaded = DagSpec::from_yaml_file(&path).unwrap();

    assert_eq!(
        loaded,
        DagSpec::sentinel_daily_dbt_run(DEFAULT_PROJECT_DIR, DEFAULT_INTERPRETER)
    );
    assert!(loaded.validate().is_ok());
}

#[test]
fn test_missing_file_reports_path() {
    let err = DagSpec::from_yaml_file(Path::new("/nonexistent/dag.yaml")).unwrap_err();
    assert!(matches!(err, DagError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/dag.yaml"));
}

#[test]
fn test_malformed_yaml_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dag.yaml");
    std::fs::write(&path, "dag_id: [unterminated").unwrap();

    let err = DagSpec::from_yaml_file(&path).unwrap_err();
    assert!(matches!(err, DagError::Parse { .. }));
}

#[tokio::test]
async fn test_tasks_run_in_order_inside_working_dir() {
    let dir = TempDir::new().unwrap();
    let spec = two_step_dag(
        dir.path(),
        "echo run >> steps.log",
        "test -f steps.log && echo test >> steps.log",
    );

    let report = TaskRunner::new().run(&spec).await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.dag_id, "sentinel_daily_dbt_run");
    let log = std::fs::read_to_string(dir.path().join("steps.log")).unwrap();
    assert_eq!(log, "run\ntest\n");
    assert_eq!(report.outcome("dbt_run").unwrap().exit_code, Some(0));
}

#[tokio::test]
async fn test_failed_task_blocks_downstream() {
    let dir = TempDir::new().unwrap();
    let spec = two_step_dag(
        dir.path(),
        "echo boom >&2; exit 3",
        "touch should_not_exist",
    );

    let report = TaskRunner::new().run(&spec).await.unwrap();

    assert!(!report.succeeded());
    let run = report.outcome("dbt_run").unwrap();
    assert_eq!(run.state, TaskState::Failed);
    assert_eq!(run.exit_code, Some(3));
    assert!(run.output_tail.contains("boom"));

    let test = report.outcome("dbt_test").unwrap();
    assert_eq!(test.state, TaskState::UpstreamFailed);
    assert!(!dir.path().join("should_not_exist").exists());
}

#[tokio::test]
async fn test_missing_interpreter_is_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let mut spec = two_step_dag(dir.path(), "true", "true");
    spec.tasks[0].command.interpreter = PathBuf::from("/nonexistent/bin/python");

    let report = TaskRunner::new().run(&spec).await.unwrap();

    let run = report.outcome("dbt_run").unwrap();
    assert_eq!(run.state, TaskState::Failed);
    assert_eq!(run.exit_code, None);
    assert!(run.error.as_deref().unwrap().contains("Failed to spawn"));
    assert_eq!(
        report.outcome("dbt_test").unwrap().state,
        TaskState::UpstreamFailed
    );
}

#[tokio::test]
async fn test_invalid_dag_is_not_run() {
    let dir = TempDir::new().unwrap();
    let mut spec = two_step_dag(dir.path(), "touch ran", "true");
    spec.tasks[0].upstream = vec!["dbt_test".to_string()];

    let err = TaskRunner::new().run(&spec).await.unwrap_err();

    assert!(matches!(err, DagError::Validation { .. }));
    assert!(!dir.path().join("ran").exists());
}
