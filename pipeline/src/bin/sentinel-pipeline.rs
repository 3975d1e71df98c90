use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sentinel_pipeline::dag::{DEFAULT_INTERPRETER, DEFAULT_PROJECT_DIR};
use sentinel_pipeline::runner::total_duration;
use sentinel_pipeline::{DagSpec, TaskRunner};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "sentinel-pipeline", version)]
#[command(about = "Daily dbt run/test workflow for the sentinel project")]
struct Cli {
    /// Load the DAG from a YAML file instead of the built-in definition
    #[arg(long, global = true, value_name = "FILE")]
    file: Option<PathBuf>,

    /// dbt project directory for the built-in definition
    #[arg(long, global = true, env = "DBT_PROJECT_DIR", default_value = DEFAULT_PROJECT_DIR)]
    project_dir: PathBuf,

    /// Interpreter with dbt installed, for the built-in definition
    #[arg(long, global = true, env = "DBT_PYTHON", default_value = DEFAULT_INTERPRETER)]
    interpreter: PathBuf,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the DAG definition and task order
    Show {
        /// Print as YAML
        #[arg(long)]
        yaml: bool,
    },
    /// Validate the DAG definition
    Validate,
    /// Print upcoming scheduled run times
    Next {
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Trigger one local run of every task
    Run {
        /// Log the commands without executing them
        #[arg(long)]
        dry_run: bool,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn load_spec(cli: &Cli) -> Result<DagSpec> {
    match &cli.file {
        Some(path) => DagSpec::from_yaml_file(path)
            .with_context(|| format!("loading DAG from {}", path.display())),
        None => Ok(DagSpec::sentinel_daily_dbt_run(
            &cli.project_dir,
            &cli.interpreter,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let spec = load_spec(&cli)?;

    match cli.cmd {
        Commands::Show { yaml } => {
            if yaml {
                print!("{}", spec.to_yaml().context("serializing DAG")?);
                return Ok(());
            }
            println!("DAG:        {}", spec.dag_id);
            if let Some(description) = &spec.description {
                println!("About:      {}", description);
            }
            println!("Schedule:   {} (UTC)", spec.schedule);
            println!("Start date: {}", spec.start_date.to_rfc3339());
            println!("Catchup:    {}", spec.catchup);
            println!("Tags:       {}", spec.tags.join(", "));
            println!("Tasks:");
            for (i, task) in spec.execution_order()?.iter().enumerate() {
                let after = if task.upstream.is_empty() {
                    String::new()
                } else {
                    format!(" (after {})", task.upstream.join(", "))
                };
                println!("  {}. {}{}", i + 1, task.task_id, after);
                println!("     {}", task.command.render());
            }
        }
        Commands::Validate => {
            if let Err(e) = spec.validate() {
                eprintln!("Invalid DAG: {}", e);
                std::process::exit(1);
            }
            println!("{} is valid", spec.dag_id);
        }
        Commands::Next { count } => {
            for run in spec.upcoming_runs(Utc::now(), count)? {
                println!("{}", run.to_rfc3339());
            }
        }
        Commands::Run { dry_run, json } => {
            let runner = if dry_run {
                TaskRunner::dry_run()
            } else {
                TaskRunner::new()
            };
            let report = runner.run(&spec).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for outcome in &report.outcomes {
                    println!(
                        "{:<12} {:?} ({} ms)",
                        outcome.task_id, outcome.state, outcome.duration_ms
                    );
                }
                println!("Total: {:.1}s", total_duration(&report).as_secs_f64());
            }

            if !report.succeeded() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
