//! Local, manually triggered DAG runs
//!
//! Tasks run one at a time in dependency order. A failed task fails the run and
//! every task downstream of it is marked `upstream_failed` without being spawned.

use crate::dag::{BashCommand, DagSpec};
use crate::error::{DagError, TaskError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Captured output longer than this is truncated in the report
const OUTPUT_TAIL_LIMIT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Success,
    Failed,
    UpstreamFailed,
    /// Dry run: command was rendered but not executed
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: String,
    pub state: TaskState,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub output_tail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DagRunReport {
    pub dag_id: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<TaskOutcome>,
}

impl DagRunReport {
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.state, TaskState::Success | TaskState::Skipped))
    }

    pub fn outcome(&self, task_id: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.task_id == task_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskRunner {
    dry_run: bool,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    /// Validate `spec` and run every task once
    pub async fn run(&self, spec: &DagSpec) -> Result<DagRunReport, DagError> {
        spec.validate()?;
        let order = spec.execution_order()?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(dag_id = %spec.dag_id, %run_id, dry_run = self.dry_run, "dag.run.start");

        let mut failed: HashSet<&str> = HashSet::new();
        let mut outcomes = Vec::with_capacity(order.len());

        for task in order {
            let rendered = task.command.render();

            if let Some(upstream) = task.upstream.iter().find(|u| failed.contains(u.as_str())) {
                warn!(task_id = %task.task_id, upstream = %upstream, "Skipping task, upstream failed");
                failed.insert(task.task_id.as_str());
                outcomes.push(TaskOutcome {
                    task_id: task.task_id.clone(),
                    state: TaskState::UpstreamFailed,
                    command: rendered,
                    exit_code: None,
                    duration_ms: 0,
                    error: Some(format!("upstream task '{}' failed", upstream)),
                    output_tail: String::new(),
                });
                continue;
            }

            if self.dry_run {
                info!(task_id = %task.task_id, command = %rendered, "Would run task (dry-run)");
                outcomes.push(TaskOutcome {
                    task_id: task.task_id.clone(),
                    state: TaskState::Skipped,
                    command: rendered,
                    exit_code: None,
                    duration_ms: 0,
                    error: None,
                    output_tail: String::new(),
                });
                continue;
            }

            info!(task_id = %task.task_id, command = %rendered, "task.start");
            let started = Instant::now();
            let result = execute(&task.task_id, &task.command).await;
            let duration_ms = started.elapsed().as_millis();

            let outcome = match result {
                Ok(exec) => {
                    info!(task_id = %task.task_id, duration_ms, "task.success");
                    TaskOutcome {
                        task_id: task.task_id.clone(),
                        state: TaskState::Success,
                        command: rendered,
                        exit_code: exec.exit_code,
                        duration_ms,
                        error: None,
                        output_tail: exec.output_tail,
                    }
                }
                Err((err, output_tail)) => {
                    error!(task_id = %task.task_id, error = %err, duration_ms, "task.failed");
                    failed.insert(task.task_id.as_str());
                    let exit_code = match &err {
                        TaskError::NonZeroExit { code, .. } => *code,
                        TaskError::Spawn { .. } => None,
                    };
                    TaskOutcome {
                        task_id: task.task_id.clone(),
                        state: TaskState::Failed,
                        command: rendered,
                        exit_code,
                        duration_ms,
                        error: Some(err.to_string()),
                        output_tail,
                    }
                }
            };
            outcomes.push(outcome);
        }

        let report = DagRunReport {
            dag_id: spec.dag_id.clone(),
            run_id,
            started_at,
            outcomes,
        };

        if report.succeeded() {
            info!(dag_id = %report.dag_id, run_id = %report.run_id, "dag.run.success");
        } else {
            error!(dag_id = %report.dag_id, run_id = %report.run_id, "dag.run.failed");
        }

        Ok(report)
    }
}

struct Execution {
    exit_code: Option<i32>,
    output_tail: String,
}

async fn execute(task_id: &str, command: &BashCommand) -> Result<Execution, (TaskError, String)> {
    let output = Command::new(&command.interpreter)
        .args(&command.args)
        .current_dir(&command.working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| {
            (
                TaskError::Spawn {
                    task_id: task_id.to_string(),
                    program: command.interpreter.display().to_string(),
                    source,
                },
                String::new(),
            )
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines() {
        info!(task_id = %task_id, stream = "stdout", "{}", line);
    }
    for line in stderr.lines() {
        warn!(task_id = %task_id, stream = "stderr", "{}", line);
    }

    let combined = format!("{}{}", stdout, stderr);
    let output_tail = tail(&combined, OUTPUT_TAIL_LIMIT);
    let exit_code = output.status.code();

    if output.status.success() {
        Ok(Execution {
            exit_code,
            output_tail,
        })
    } else {
        Err((
            TaskError::NonZeroExit {
                task_id: task_id.to_string(),
                code: exit_code,
            },
            output_tail,
        ))
    }
}

/// Last `limit` bytes of `text`, cut on a char boundary
fn tail(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

/// Total wall time across all executed tasks
pub fn total_duration(report: &DagRunReport) -> Duration {
    let millis: u128 = report.outcomes.iter().map(|o| o.duration_ms).sum();
    Duration::from_millis(millis.min(u64::MAX as u128) as u64)
}
