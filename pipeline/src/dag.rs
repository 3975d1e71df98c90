//! DAG definition: tasks, dependency edges and the cron trigger

use crate::error::DagError;
use crate::schedule::CronSchedule;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const SENTINEL_DAG_ID: &str = "sentinel_daily_dbt_run";
pub const DEFAULT_PROJECT_DIR: &str = "/usr/local/airflow/dags/dbt/sentinel_dbt";
pub const DEFAULT_INTERPRETER: &str = "/usr/local/airflow/dbt_venv/bin/python";
/// Daily at 02:00 UTC
pub const DEFAULT_SCHEDULE: &str = "0 2 * * *";

/// A command run through an interpreter inside a working directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BashCommand {
    pub working_dir: PathBuf,
    pub interpreter: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl BashCommand {
    /// `<interpreter> -m dbt <verb>` inside `working_dir`
    pub fn dbt(
        working_dir: impl Into<PathBuf>,
        interpreter: impl Into<PathBuf>,
        verb: &str,
    ) -> Self {
        Self {
            working_dir: working_dir.into(),
            interpreter: interpreter.into(),
            args: vec!["-m".to_string(), "dbt".to_string(), verb.to_string()],
        }
    }

    /// Shell-equivalent rendering, for display only
    pub fn render(&self) -> String {
        let mut line = format!(
            "cd {} && {}",
            self.working_dir.display(),
            self.interpreter.display()
        );
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub command: BashCommand,
    /// Tasks that must succeed before this one starts
    #[serde(default)]
    pub upstream: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagSpec {
    pub dag_id: String,
    #[serde(default)]
    pub description: Option<String>,
    pub schedule: String,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub catchup: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub tasks: Vec<TaskSpec>,
}

impl DagSpec {
    /// The daily dbt workflow: `dbt_run`, then `dbt_test`
    pub fn sentinel_daily_dbt_run(
        project_dir: impl Into<PathBuf>,
        interpreter: impl Into<PathBuf>,
    ) -> Self {
        let project_dir = project_dir.into();
        let interpreter = interpreter.into();

        Self {
            dag_id: SENTINEL_DAG_ID.to_string(),
            description: Some("Build and test the sentinel dbt models".to_string()),
            schedule: DEFAULT_SCHEDULE.to_string(),
            start_date: Utc
                .with_ymd_and_hms(2025, 8, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
            catchup: false,
            tags: vec!["sentinel".to_string(), "dbt".to_string()],
            tasks: vec![
                TaskSpec {
                    task_id: "dbt_run".to_string(),
                    command: BashCommand::dbt(&project_dir, &interpreter, "run"),
                    upstream: Vec::new(),
                },
                TaskSpec {
                    task_id: "dbt_test".to_string(),
                    command: BashCommand::dbt(&project_dir, &interpreter, "test"),
                    upstream: vec!["dbt_run".to_string()],
                },
            ],
        }
    }

    pub fn from_yaml_str(text: &str, origin: &Path) -> Result<Self, DagError> {
        serde_yaml::from_str(text).map_err(|source| DagError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, DagError> {
        let text = std::fs::read_to_string(path).map_err(|source| DagError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let spec = Self::from_yaml_str(&text, path)?;
        debug!(dag_id = %spec.dag_id, path = %path.display(), "Loaded DAG definition");
        Ok(spec)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn cron(&self) -> Result<CronSchedule, DagError> {
        CronSchedule::parse(&self.schedule).map_err(|source| DagError::Schedule {
            dag_id: self.dag_id.clone(),
            source,
        })
    }

    /// Check ids, edges, acyclicity and the schedule expression
    pub fn validate(&self) -> Result<(), DagError> {
        if self.dag_id.trim().is_empty() {
            return Err(self.invalid("dag_id must not be empty"));
        }
        if self.tasks.is_empty() {
            return Err(self.invalid("at least one task is required"));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.task_id.trim().is_empty() {
                return Err(self.invalid("task_id must not be empty"));
            }
            if !seen.insert(task.task_id.as_str()) {
                return Err(self.invalid(format!("duplicate task_id '{}'", task.task_id)));
            }
        }

        for task in &self.tasks {
            for upstream in &task.upstream {
                if upstream == &task.task_id {
                    return Err(
                        self.invalid(format!("task '{}' depends on itself", task.task_id))
                    );
                }
                if !seen.contains(upstream.as_str()) {
                    return Err(self.invalid(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.task_id, upstream
                    )));
                }
            }
        }

        self.execution_order()?;
        self.cron()?;
        Ok(())
    }

    /// Tasks in dependency order; ties keep declaration order
    pub fn execution_order(&self) -> Result<Vec<&TaskSpec>, DagError> {
        let index: HashMap<&str, usize> = self
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.task_id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.tasks.len()];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); self.tasks.len()];
        for (i, task) in self.tasks.iter().enumerate() {
            for upstream in &task.upstream {
                let &u = index.get(upstream.as_str()).ok_or_else(|| {
                    self.invalid(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.task_id, upstream
                    ))
                })?;
                in_degree[i] += 1;
                downstream[u].push(i);
            }
        }

        let mut ready: VecDeque<usize> = (0..self.tasks.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.tasks.len());

        while let Some(i) = ready.pop_front() {
            order.push(&self.tasks[i]);
            let mut unlocked = Vec::new();
            for &d in &downstream[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    unlocked.push(d);
                }
            }
            unlocked.sort_unstable();
            ready.extend(unlocked);
        }

        if order.len() != self.tasks.len() {
            let stuck: Vec<&str> = self
                .tasks
                .iter()
                .enumerate()
                .filter(|(i, _)| in_degree[*i] > 0)
                .map(|(_, t)| t.task_id.as_str())
                .collect();
            return Err(self.invalid(format!(
                "dependency cycle between tasks: {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }

    /// Next scheduled run strictly after `after`, never before `start_date`
    pub fn next_run_after(&self, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, DagError> {
        let cron = self.cron()?;
        let floor = self.start_date - Duration::minutes(1);
        Ok(cron.next_after(after.max(floor)))
    }

    pub fn upcoming_runs(
        &self,
        after: DateTime<Utc>,
        count: usize,
    ) -> Result<Vec<DateTime<Utc>>, DagError> {
        let cron = self.cron()?;
        let floor = self.start_date - Duration::minutes(1);
        Ok(cron.upcoming(after.max(floor), count))
    }

    fn invalid(&self, message: impl Into<String>) -> DagError {
        DagError::Validation {
            dag_id: self.dag_id.clone(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentinel() -> DagSpec {
        DagSpec::sentinel_daily_dbt_run(DEFAULT_PROJECT_DIR, DEFAULT_INTERPRETER)
    }

    fn shell_task(id: &str, upstream: &[&str]) -> TaskSpec {
        TaskSpec {
            task_id: id.to_string(),
            command: BashCommand {
                working_dir: PathBuf::from("/tmp"),
                interpreter: PathBuf::from("/bin/sh"),
                args: vec!["-c".to_string(), "true".to_string()],
            },
            upstream: upstream.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_sentinel_dag_shape() {
        let dag = sentinel();
        assert!(dag.validate().is_ok());
        assert_eq!(dag.dag_id, "sentinel_daily_dbt_run");
        assert_eq!(dag.schedule, "0 2 * * *");
        assert!(!dag.catchup);
        assert_eq!(dag.tags, vec!["sentinel", "dbt"]);
        assert_eq!(
            dag.start_date,
            Utc.with_ymd_and_hms(2025, 8, 1, 0, 0, 0).unwrap()
        );

        let order: Vec<&str> = dag
            .execution_order()
            .unwrap()
            .iter()
            .map(|t| t.task_id.as_str())
            .collect();
        assert_eq!(order, vec!["dbt_run", "dbt_test"]);
    }

    #[test]
    fn test_render_commands() {
        let dag = sentinel();
        assert_eq!(
            dag.task("dbt_run").unwrap().command.render(),
            "cd /usr/local/airflow/dags/dbt/sentinel_dbt && /usr/local/airflow/dbt_venv/bin/python -m dbt run"
        );
        assert_eq!(
            dag.task("dbt_test").unwrap().command.render(),
            "cd /usr/local/airflow/dags/dbt/sentinel_dbt && /usr/local/airflow/dbt_venv/bin/python -m dbt test"
        );
    }

    #[test]
    fn test_order_follows_edges_not_declaration() {
        let mut dag = sentinel();
        dag.tasks = vec![
            shell_task("c", &["b"]),
            shell_task("a", &[]),
            shell_task("b", &["a"]),
            shell_task("d", &[]),
        ];

        let order: Vec<&str> = dag
            .execution_order()
            .unwrap()
            .iter()
            .map(|t| t.task_id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "d", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut dag = sentinel();
        dag.tasks = vec![shell_task("a", &["b"]), shell_task("b", &["a"])];

        let err = dag.validate().unwrap_err();
        assert!(err.to_string().contains("dependency cycle"), "{err}");
    }

    #[test]
    fn test_unknown_upstream_is_rejected() {
        let mut dag = sentinel();
        dag.tasks[1].upstream = vec!["dbt_seed".to_string()];

        let err = dag.validate().unwrap_err();
        assert!(err.to_string().contains("unknown task 'dbt_seed'"), "{err}");
    }

    #[test]
    fn test_duplicate_and_self_dependency_are_rejected() {
        let mut dag = sentinel();
        dag.tasks[1].task_id = "dbt_run".to_string();
        assert!(dag.validate().unwrap_err().to_string().contains("duplicate"));

        let mut dag = sentinel();
        dag.tasks[0].upstream = vec!["dbt_run".to_string()];
        assert!(dag
            .validate()
            .unwrap_err()
            .to_string()
            .contains("depends on itself"));
    }

    #[test]
    fn test_bad_schedule_is_rejected() {
        let mut dag = sentinel();
        dag.schedule = "every day".to_string();
        assert!(matches!(dag.validate(), Err(DagError::Schedule { .. })));
    }

    #[test]
    fn test_next_run_clamped_to_start_date() {
        let dag = sentinel();
        let before_start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            dag.next_run_after(before_start).unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 8, 1, 2, 0, 0).unwrap())
        );

        let later = Utc.with_ymd_and_hms(2025, 9, 10, 3, 0, 0).unwrap();
        assert_eq!(
            dag.next_run_after(later).unwrap(),
            Some(Utc.with_ymd_and_hms(2025, 9, 11, 2, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_yaml_round_trip() {
        let dag = sentinel();
        let yaml = dag.to_yaml().unwrap();
        let parsed = DagSpec::from_yaml_str(&yaml, Path::new("inline.yaml")).unwrap();
        assert_eq!(parsed, dag);
    }
}
