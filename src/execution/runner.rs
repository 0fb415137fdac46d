//! Running a set of tasks together.
//!
//! The `WorkflowRunner` launches every task on its own worker and owns the
//! named pipes that connect producers to consumers. Before anything starts
//! it works out which tasks will actually run:
//!
//! - a task whose file outputs (final or temporary) exist will skip;
//! - a producer runs only if some consumer of each of its streams runs;
//! - a consumer runs only if a producer of each of its streams runs, when
//!   that stream is produced inside the workflow.
//!
//! A FIFO is created only for streams whose producer runs. Every other
//! FIFO is kept absent, so its producer skips instead of blocking on a pipe
//! nobody opens. A consumer left without a producer is not started and is
//! reported as failed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::core::target::{Target, path_exists};
use crate::core::task::{ResourceWarning, ShellTask, TaskError};
use crate::core::types::{TaskId, TaskOutcome};
use crate::events::Event;

use super::executor::TaskExecutor;

/// Result of one task within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRunResult {
    /// The task.
    pub task_id: TaskId,
    /// Terminal state the task reached.
    pub outcome: TaskOutcome,
    /// Why the task failed, if it did.
    pub error: Option<String>,
}

/// Result of running a set of tasks.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Total duration of the run.
    pub duration: Duration,
    /// One result per task, in the order the tasks were given.
    pub results: Vec<TaskRunResult>,
}

impl RunSummary {
    /// Whether no task failed.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    /// Get the number of completed tasks.
    pub fn completed_count(&self) -> usize {
        self.count(TaskOutcome::Completed)
    }

    /// Get the number of skipped tasks.
    pub fn skipped_count(&self) -> usize {
        self.count(TaskOutcome::Skipped)
    }

    /// Get the number of failed tasks.
    pub fn failed_count(&self) -> usize {
        self.count(TaskOutcome::Failed)
    }

    /// Get the result for a specific task.
    pub fn get_task_result(&self, task_id: &TaskId) -> Option<&TaskRunResult> {
        self.results.iter().find(|r| &r.task_id == task_id)
    }

    fn count(&self, outcome: TaskOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// How the tasks of a run are wired through their streams.
struct StreamGraph {
    /// Per task, per streaming output: indices of the tasks reading it.
    consumers: Vec<Vec<Vec<usize>>>,
    /// Per task, per streaming input produced in the run: indices of the
    /// tasks writing it.
    producers: Vec<Vec<Vec<usize>>>,
}

impl StreamGraph {
    fn new(tasks: &[Arc<ShellTask>]) -> Self {
        let outs: Vec<HashSet<&str>> = tasks
            .iter()
            .map(|t| streaming_fifos(t.outputs()))
            .collect();
        let ins: Vec<HashSet<&str>> = tasks
            .iter()
            .map(|t| streaming_fifos(t.inputs()))
            .collect();

        let consumers: Vec<Vec<Vec<usize>>> = outs
            .iter()
            .map(|fifos| {
                fifos
                    .iter()
                    .map(|fifo| tasks_with(&ins, fifo))
                    .collect::<Vec<_>>()
            })
            .collect();
        let producers: Vec<Vec<Vec<usize>>> = ins
            .iter()
            .map(|fifos| {
                fifos
                    .iter()
                    .map(|fifo| tasks_with(&outs, fifo))
                    .filter(|writers| !writers.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect();

        Self {
            consumers,
            producers,
        }
    }
}

fn streaming_fifos(targets: &HashMap<String, Arc<dyn Target>>) -> HashSet<&str> {
    targets
        .values()
        .filter(|t| t.is_streaming())
        .map(|t| t.fifo_path())
        .collect()
}

fn tasks_with(sets: &[HashSet<&str>], fifo: &str) -> Vec<usize> {
    sets.iter()
        .enumerate()
        .filter(|(_, set)| set.contains(fifo))
        .map(|(j, _)| j)
        .collect()
}

/// Which tasks will run, and which were left without a producer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Per task: whether it will execute its command.
    pub runs: Vec<bool>,
    /// Per task: whether it cannot start because no producer of one of its
    /// streaming inputs runs, while nothing would make it skip on its own.
    pub starved: Vec<bool>,
}

/// Runs a set of tasks concurrently, managing the FIFOs between them.
pub struct WorkflowRunner {
    /// Underlying task executor.
    executor: Arc<TaskExecutor>,
}

impl WorkflowRunner {
    /// Create a runner on top of the given executor.
    pub fn new(executor: TaskExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
        }
    }

    /// The executor tasks are spawned on.
    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    /// Work out which tasks will run, from the current filesystem state.
    pub async fn plan(&self, tasks: &[Arc<ShellTask>]) -> RunPlan {
        let graph = StreamGraph::new(tasks);

        let mut file_blocked = Vec::with_capacity(tasks.len());
        for task in tasks {
            let reasons = task.skip_reasons().await;
            file_blocked.push(
                reasons
                    .iter()
                    .any(|r| !matches!(r, ResourceWarning::FifoMissing { .. })),
            );
        }

        let mut runs: Vec<bool> = file_blocked.iter().map(|blocked| !blocked).collect();
        loop {
            let mut changed = false;
            for i in 0..tasks.len() {
                if !runs[i] {
                    continue;
                }
                let fed = graph.consumers[i]
                    .iter()
                    .all(|readers| readers.iter().any(|&j| runs[j]));
                let supplied = graph.producers[i]
                    .iter()
                    .all(|writers| writers.iter().any(|&j| runs[j]));
                if !fed || !supplied {
                    runs[i] = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Tasks with streaming outputs skip on their missing FIFOs; anything
        // else that should not run would still be started by the executor.
        let starved = (0..tasks.len())
            .map(|i| !runs[i] && !file_blocked[i] && graph.consumers[i].is_empty())
            .collect();

        RunPlan { runs, starved }
    }

    /// Run every task and wait until each reaches a terminal state.
    ///
    /// FIFOs are created before any task starts and removed after all have
    /// finished. Task failures are reported in the summary, not as an error;
    /// an error is returned only when a FIFO cannot be prepared.
    pub async fn run(&self, tasks: &[Arc<ShellTask>]) -> Result<RunSummary, TaskError> {
        let span = info_span!("workflow_run", task_count = tasks.len());
        async {
            let start_time = Instant::now();
            let plan = self.plan(tasks).await;

            if let Err(e) = self.prepare_fifos(tasks, &plan).await {
                self.clean_up_fifos(tasks).await;
                return Err(e);
            }

            let mut handles = Vec::with_capacity(tasks.len());
            for (i, task) in tasks.iter().enumerate() {
                if plan.starved[i] {
                    handles.push(None);
                } else {
                    handles.push(Some(self.executor.spawn(Arc::clone(task))));
                }
            }

            let mut results = Vec::with_capacity(tasks.len());
            for (task, handle) in tasks.iter().zip(handles) {
                let result = match handle {
                    None => self.fail_starved(task).await,
                    Some(handle) => match handle.await {
                        Ok(Ok(outcome)) => TaskRunResult {
                            task_id: task.id().clone(),
                            outcome,
                            error: None,
                        },
                        Ok(Err(e)) => TaskRunResult {
                            task_id: task.id().clone(),
                            outcome: TaskOutcome::Failed,
                            error: Some(e.to_string()),
                        },
                        Err(e) => {
                            error!(task = %task.id(), error = %e, "Task worker panicked");
                            TaskRunResult {
                                task_id: task.id().clone(),
                                outcome: TaskOutcome::Failed,
                                error: Some(format!("worker panicked: {}", e)),
                            }
                        }
                    },
                };
                results.push(result);
            }

            self.clean_up_fifos(tasks).await;

            let summary = RunSummary {
                duration: start_time.elapsed(),
                results,
            };
            info!(
                completed = summary.completed_count(),
                skipped = summary.skipped_count(),
                failed = summary.failed_count(),
                "Run finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    /// Create the FIFOs of running producers; remove leftovers of the rest.
    async fn prepare_fifos(
        &self,
        tasks: &[Arc<ShellTask>],
        plan: &RunPlan,
    ) -> Result<(), TaskError> {
        for (i, task) in tasks.iter().enumerate() {
            task.existing_fifos().await;
            for (port, target) in task.sorted_outputs() {
                if !target.is_streaming() {
                    continue;
                }
                let exists = path_exists(target.fifo_path()).await;
                if plan.runs[i] && !exists {
                    debug!(task = %task.id(), port, path = %target.fifo_path(), "Creating FIFO");
                    target.create_fifo().await?;
                } else if !plan.runs[i] && exists {
                    debug!(task = %task.id(), port, path = %target.fifo_path(), "Removing FIFO of a producer that will not run");
                    target.remove_fifo().await?;
                } else if !plan.runs[i] {
                    debug!(task = %task.id(), port, "Producer will not run, leaving FIFO absent");
                }
            }
        }
        Ok(())
    }

    async fn clean_up_fifos(&self, tasks: &[Arc<ShellTask>]) {
        for task in tasks {
            if let Err(e) = task.clean_up_fifos().await {
                warn!(task = %task.id(), error = %e, "Failed to clean up FIFOs");
            }
        }
    }

    async fn fail_starved(&self, task: &ShellTask) -> TaskRunResult {
        let message = "no producer will write to a streaming input".to_string();
        error!(task = %task.id(), "Not starting task: {}", message);
        if task.begin_execution() {
            task.signal().complete(TaskOutcome::Failed);
        }
        self.executor
            .event_bus()
            .emit(Event::task_failed(
                task.id().clone(),
                task.command(),
                message.clone(),
            ))
            .await;
        TaskRunResult {
            task_id: task.id().clone(),
            outcome: TaskOutcome::Failed,
            error: Some(message),
        }
    }
}
