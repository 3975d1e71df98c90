use crate::schedule::ScheduleError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Failed to read DAG definition {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse DAG definition {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid DAG {dag_id}: {message}")]
    Validation { dag_id: String, message: String },

    #[error("Invalid schedule for DAG {dag_id}: {source}")]
    Schedule {
        dag_id: String,
        source: ScheduleError,
    },
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Failed to spawn {program} for task {task_id}: {source}")]
    Spawn {
        task_id: String,
        program: String,
        source: std::io::Error,
    },

    #[error("Task {task_id} exited with {}", exit_label(*code))]
    NonZeroExit { task_id: String, code: Option<i32> },
}

fn exit_label(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
