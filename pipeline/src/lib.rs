//! Sentinel pipeline - declares the daily dbt run/test workflow
//!
//! The definition is data: a cron trigger plus two ordered shell tasks. Periodic
//! execution belongs to the orchestration host; this crate validates the graph,
//! computes upcoming run times, and can trigger a single local run.

pub mod dag;
pub mod error;
pub mod runner;
pub mod schedule;

pub use dag::{BashCommand, DagSpec, TaskSpec};
pub use error::{DagError, TaskError};
pub use runner::{DagRunReport, TaskOutcome, TaskRunner, TaskState};
pub use schedule::{CronSchedule, ScheduleError};
