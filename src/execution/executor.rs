//! Task execution engine.
//!
//! The `TaskExecutor` drives a single [`ShellTask`] through its lifecycle:
//!
//! 1. Skip check: existing file outputs (final or temporary) or a missing
//!    FIFO for a streaming output mean nothing is run
//! 2. Execution through the task's custom strategy, or the executor's
//!    default [`ShellCommand`]
//! 3. Atomization of every non-streaming output
//! 4. Completion signal, fired exactly once on every path
//!
//! Each step is reported on the executor's [`EventBus`].

use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::core::task::{ExecuteStrategy, ShellTask, TaskError};
use crate::core::types::TaskOutcome;
use crate::events::{Event, EventBus};

use super::command::ShellCommand;

/// Executor for running shell tasks with resumable, atomic outputs.
pub struct TaskExecutor {
    /// Strategy used for tasks without a custom one.
    default_strategy: Arc<dyn ExecuteStrategy>,
    /// Where lifecycle events are reported.
    event_bus: Arc<EventBus>,
}

impl TaskExecutor {
    /// Create an executor using `bash -c` and an event bus without handlers.
    pub fn new() -> Self {
        Self {
            default_strategy: Arc::new(ShellCommand::default()),
            event_bus: Arc::new(EventBus::new()),
        }
    }

    /// Report events on the given bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Replace the strategy used for tasks without a custom one.
    pub fn with_default_strategy(mut self, strategy: Arc<dyn ExecuteStrategy>) -> Self {
        self.default_strategy = strategy;
        self
    }

    /// The bus events are reported on.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Execute a task.
    ///
    /// Returns [`TaskOutcome::Skipped`] when outputs already exist or a
    /// required FIFO is missing, and [`TaskOutcome::Completed`] once the
    /// command ran and every file output was atomized. Errors from the
    /// command or from atomization are returned as-is after the completion
    /// signal has fired with [`TaskOutcome::Failed`].
    ///
    /// A task can be executed only once; further calls return
    /// [`TaskError::AlreadyExecuted`] without touching the filesystem.
    pub async fn execute(&self, task: &ShellTask) -> Result<TaskOutcome, TaskError> {
        if !task.begin_execution() {
            return Err(TaskError::AlreadyExecuted);
        }
        let _guard = FailOnDrop(task);

        let span = info_span!("task_execution", task = %task.id());
        let result = self.run(task).instrument(span).await;

        let outcome = match &result {
            Ok(outcome) => *outcome,
            Err(e) => {
                error!(task = %task.id(), command = %task.command(), error = %e, "Task failed");
                self.event_bus
                    .emit(Event::task_failed(
                        task.id().clone(),
                        task.command(),
                        e.to_string(),
                    ))
                    .await;
                TaskOutcome::Failed
            }
        };

        debug!(task = %task.id(), outcome = %outcome, "Signalling completion");
        task.signal().complete(outcome);
        result
    }

    /// Execute a task on its own worker.
    pub fn spawn(self: &Arc<Self>, task: Arc<ShellTask>) -> JoinHandle<Result<TaskOutcome, TaskError>> {
        let executor = Arc::clone(self);
        tokio::spawn(async move { executor.execute(&task).await })
    }

    async fn run(&self, task: &ShellTask) -> Result<TaskOutcome, TaskError> {
        let reasons = task.skip_reasons().await;
        if !reasons.is_empty() {
            for reason in &reasons {
                warn!(task = %task.id(), "{}, so skipping", reason);
                self.event_bus
                    .emit(Event::resource_warning(task.id().clone(), reason.clone()))
                    .await;
            }
            self.event_bus
                .emit(Event::task_skipped(task.id().clone(), reasons))
                .await;
            return Ok(TaskOutcome::Skipped);
        }

        let start_time = Instant::now();
        self.event_bus
            .emit(Event::task_started(task.id().clone(), task.command()))
            .await;

        match task.custom_strategy() {
            Some(strategy) => {
                info!(task = %task.id(), strategy = strategy.name(), "Executing task");
                strategy.execute(task).await?;
            }
            None => self.default_strategy.execute(task).await?,
        }

        self.atomize_outputs(task).await?;

        self.event_bus
            .emit(Event::task_completed(task.id().clone(), start_time.elapsed()))
            .await;
        Ok(TaskOutcome::Completed)
    }

    /// Rename every file output from its temporary path into place.
    async fn atomize_outputs(&self, task: &ShellTask) -> Result<(), TaskError> {
        for (port, target) in task.sorted_outputs() {
            if target.is_streaming() {
                debug!(path = %target.final_path(), "Target is streaming, so not atomizing");
                continue;
            }
            debug!(from = %target.temp_path(), to = %target.final_path(), "Atomizing file");
            target.atomize().await?;
            self.event_bus
                .emit(Event::output_atomized(
                    task.id().clone(),
                    port,
                    target.final_path(),
                ))
                .await;
        }
        Ok(())
    }
}

/// Fires the completion signal with [`TaskOutcome::Failed`] if execution
/// unwinds or is dropped before reaching a terminal state.
struct FailOnDrop<'a>(&'a ShellTask);

impl Drop for FailOnDrop<'_> {
    fn drop(&mut self) {
        if self.0.signal().complete(TaskOutcome::Failed) {
            error!(task = %self.0.id(), "Task aborted before completing");
        }
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}
