//! sf - run file-based workflow tasks with atomic, resumable outputs.
//!
//! Usage:
//!   sf run <task-file>       Run every task in the file concurrently
//!   sf format <task-file>    Print each task's formatted command
//!   sf validate <task-file>  Check that every task can be built

use clap::{Parser, Subcommand};
use sciflow::{
    Event, EventBus, EventHandler, GlobalConfig, ShellTask, TaskExecutor, WorkflowRunner,
    YamlLoader,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// sf - run file-based workflow tasks
#[derive(Parser)]
#[command(name = "sf")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Global configuration file (shell, prefix)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every task in a task file, each on its own worker
    Run {
        /// Path to the task file
        #[arg(value_name = "TASK_FILE")]
        task_file: PathBuf,
    },

    /// Print the formatted command of every task
    Format {
        /// Path to the task file
        #[arg(value_name = "TASK_FILE")]
        task_file: PathBuf,
    },

    /// Check that every task in a task file can be built
    Validate {
        /// Path to the task file
        #[arg(value_name = "TASK_FILE")]
        task_file: PathBuf,
    },
}

/// Event handler that logs task lifecycle events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::TaskStarted {
                task_id, command, ..
            } => {
                info!("Task '{}' started: {}", task_id, command);
            }
            Event::TaskSkipped {
                task_id, reasons, ..
            } => {
                info!("Task '{}' skipped ({} reason(s))", task_id, reasons.len());
            }
            Event::TaskCompleted {
                task_id, duration, ..
            } => {
                info!("Task '{}' completed in {:?}", task_id, duration);
            }
            Event::TaskFailed {
                task_id,
                command,
                error,
                ..
            } => {
                error!("Task '{}' failed: {}", task_id, error);
                error!("    command: {}", command);
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let global = match cli.config {
        Some(ref path) => YamlLoader::load_global_config(path)?,
        None => GlobalConfig::default(),
    };

    match cli.command {
        Commands::Run { task_file } => {
            run_tasks(task_file, global).await?;
        }
        Commands::Format { task_file } => {
            for task in build_tasks(&task_file, &global)? {
                println!("{}\t{}", task.name(), task.command());
            }
        }
        Commands::Validate { task_file } => {
            let tasks = build_tasks(&task_file, &global)?;
            println!("{} task(s) valid", tasks.len());
        }
    }

    Ok(())
}

fn build_tasks(
    task_file: &Path,
    global: &GlobalConfig,
) -> Result<Vec<ShellTask>, Box<dyn std::error::Error>> {
    let config = YamlLoader::load_task_file(task_file)?;
    Ok(config.build_all(global)?)
}

async fn run_tasks(
    task_file: PathBuf,
    global: GlobalConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let tasks: Vec<Arc<ShellTask>> = build_tasks(&task_file, &global)?
        .into_iter()
        .map(Arc::new)
        .collect();
    info!("Loaded {} task(s) from {:?}", tasks.len(), task_file);

    let event_bus = Arc::new(EventBus::new());
    event_bus.register(Arc::new(LoggingHandler)).await;
    let runner = WorkflowRunner::new(
        TaskExecutor::new()
            .with_event_bus(event_bus)
            .with_default_strategy(Arc::new(global.shell_command())),
    );

    let summary = runner.run(&tasks).await?;

    if !summary.is_success() {
        return Err(format!(
            "{} of {} task(s) failed",
            summary.failed_count(),
            tasks.len()
        )
        .into());
    }
    info!(
        "All {} task(s) finished in {:?} ({} completed, {} skipped)",
        tasks.len(),
        summary.duration,
        summary.completed_count(),
        summary.skipped_count()
    );
    Ok(())
}
