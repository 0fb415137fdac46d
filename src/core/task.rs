//! Shell tasks, the execution strategy seam, and task error types.
//!
//! A [`ShellTask`] is the unit of work: a formatted shell command together
//! with the targets it reads and writes. Tasks are built with
//! [`ShellTask::builder`], which evaluates the output path generators, creates
//! the output targets and formats the command exactly once.
//!
//! # Example
//!
//! ```
//! use sciflow::{FileTarget, ShellTask};
//! use std::sync::Arc;
//!
//! let task = ShellTask::builder("compress", "gzip -c {i:in} > {o:out}")
//!     .input("in", Arc::new(FileTarget::new("/data/a.txt")))
//!     .output("out", |t| format!("{}.gz", t.in_path("in").unwrap_or_default()))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(task.command(), "gzip -c /data/a.txt > /data/a.txt.gz.tmp");
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

use super::format::{FormatError, format_command};
use super::signal::{CompletionSignal, CompletionWaiter};
use super::target::{FileTarget, Target, TargetError, path_exists};
use super::types::{TaskId, TaskOutcome};

/// Errors that can occur while building or executing a task.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The command pattern could not be formatted.
    #[error("invalid command: {0}")]
    Format(#[from] FormatError),

    /// The same port name was declared twice.
    #[error("duplicate port '{0}'")]
    DuplicatePort(String),

    /// An output path generator returned an empty path.
    #[error("empty path generated for out-port '{0}'")]
    EmptyOutputPath(String),

    /// The command could not be started.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The command exited with a non-zero status.
    #[error("command exited with code {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    /// A target filesystem operation failed.
    #[error(transparent)]
    Target(#[from] TargetError),

    /// The task was executed a second time.
    #[error("task has already been executed")]
    AlreadyExecuted,

    /// Generic error wrapper for custom strategies.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// How a task's outputs get produced.
///
/// The built-in [`ShellCommand`](crate::execution::ShellCommand) runs the
/// formatted command through a shell. A task built with
/// [`ShellTaskBuilder::custom_execute`] replaces it entirely; the custom
/// strategy is then responsible for writing every declared output (to the
/// temporary path for file outputs, or the FIFO path for streaming ones).
#[async_trait]
pub trait ExecuteStrategy: Send + Sync {
    /// Produce the outputs of `task`.
    async fn execute(&self, task: &ShellTask) -> Result<(), TaskError>;

    /// Short label used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// A pre-existing or missing resource noticed before execution.
///
/// Warnings are never fatal; the ones reported by
/// [`ShellTask::skip_reasons`] make the executor skip the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceWarning {
    /// The final output file already exists.
    OutputExists { port: String, path: String },
    /// A temporary output file exists, most likely left by a crashed run.
    TempOutputExists { port: String, path: String },
    /// A streaming output's FIFO has not been created.
    FifoMissing { port: String, path: String },
    /// A streaming output's FIFO exists before it was meant to be created.
    FifoExists { port: String, path: String },
}

impl ResourceWarning {
    /// The offending path.
    pub fn path(&self) -> &str {
        match self {
            ResourceWarning::OutputExists { path, .. }
            | ResourceWarning::TempOutputExists { path, .. }
            | ResourceWarning::FifoMissing { path, .. }
            | ResourceWarning::FifoExists { path, .. } => path,
        }
    }

    /// The out-port the path belongs to.
    pub fn port(&self) -> &str {
        match self {
            ResourceWarning::OutputExists { port, .. }
            | ResourceWarning::TempOutputExists { port, .. }
            | ResourceWarning::FifoMissing { port, .. }
            | ResourceWarning::FifoExists { port, .. } => port,
        }
    }
}

impl fmt::Display for ResourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceWarning::OutputExists { path, .. } => {
                write!(f, "output file already exists: {path}")
            }
            ResourceWarning::TempOutputExists { path, .. } => {
                write!(f, "temporary output file already exists: {path}")
            }
            ResourceWarning::FifoMissing { path, .. } => {
                write!(f, "FIFO missing for streaming output: {path}")
            }
            ResourceWarning::FifoExists { path, .. } => {
                write!(f, "output FIFO already exists: {path}")
            }
        }
    }
}

/// Computes an output's final path from the task under construction.
///
/// Inputs and params are already attached when generators run; outputs are not.
pub type PathGenerator = Box<dyn Fn(&ShellTask) -> String + Send + Sync>;

/// A single unit of work: a formatted command plus its targets.
pub struct ShellTask {
    id: TaskId,
    command: String,
    custom: Option<Arc<dyn ExecuteStrategy>>,
    inputs: HashMap<String, Arc<dyn Target>>,
    outputs: HashMap<String, Arc<dyn Target>>,
    params: HashMap<String, String>,
    completion: CompletionSignal,
    executed: AtomicBool,
}

impl ShellTask {
    /// Start building a task from a command pattern.
    pub fn builder(name: impl Into<String>, pattern: impl Into<String>) -> ShellTaskBuilder {
        ShellTaskBuilder::new(name, pattern)
    }

    /// Build a task from plain maps.
    ///
    /// Out-ports listed in `out_path_fns` whose entry in `out_streaming` is
    /// `true` become streaming targets.
    pub fn new(
        name: impl Into<String>,
        pattern: impl Into<String>,
        inputs: HashMap<String, Arc<dyn Target>>,
        out_path_fns: HashMap<String, PathGenerator>,
        out_streaming: &HashMap<String, bool>,
        params: HashMap<String, String>,
        prefix: impl Into<String>,
    ) -> Result<Self, TaskError> {
        let mut builder = ShellTaskBuilder::new(name, pattern)
            .inputs(inputs)
            .params(params)
            .prefix(prefix);
        for (port, generator) in out_path_fns {
            let streaming = out_streaming.get(&port).copied().unwrap_or(false);
            builder = builder.boxed_output(port, generator, streaming);
        }
        builder.build()
    }

    /// The task identifier.
    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// The task name.
    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    /// The fully formatted command.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The custom strategy, if one replaces the shell command.
    pub fn custom_strategy(&self) -> Option<&Arc<dyn ExecuteStrategy>> {
        self.custom.as_ref()
    }

    /// Input targets by port name.
    pub fn inputs(&self) -> &HashMap<String, Arc<dyn Target>> {
        &self.inputs
    }

    /// Output targets by port name.
    pub fn outputs(&self) -> &HashMap<String, Arc<dyn Target>> {
        &self.outputs
    }

    /// Parameters by name.
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Get one input target.
    pub fn input(&self, port: &str) -> Option<&Arc<dyn Target>> {
        self.inputs.get(port)
    }

    /// Get one output target, e.g. to wire it into a downstream task.
    pub fn output(&self, port: &str) -> Option<&Arc<dyn Target>> {
        self.outputs.get(port)
    }

    /// Get one parameter value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Final path of an input target.
    pub fn in_path(&self, port: &str) -> Option<&str> {
        self.inputs.get(port).map(|t| t.final_path())
    }

    /// A waiter that resolves once the task reaches a terminal state.
    pub fn completion(&self) -> CompletionWaiter {
        self.completion.waiter()
    }

    /// The terminal state, if reached.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.completion.outcome()
    }

    pub(crate) fn signal(&self) -> &CompletionSignal {
        &self.completion
    }

    /// Mark the task as executing. Returns `false` if it already was.
    pub(crate) fn begin_execution(&self) -> bool {
        !self.executed.swap(true, Ordering::SeqCst)
    }

    /// Outputs sorted by port name, so checks and logs are deterministic.
    pub(crate) fn sorted_outputs(&self) -> Vec<(&str, &Arc<dyn Target>)> {
        let mut outputs: Vec<_> = self
            .outputs
            .iter()
            .map(|(port, target)| (port.as_str(), target))
            .collect();
        outputs.sort_by_key(|(port, _)| *port);
        outputs
    }

    /// Resource states that mean this task must not run.
    ///
    /// A file output whose final or temporary path exists counts as done;
    /// a streaming output whose FIFO is missing cannot be written safely.
    pub async fn skip_reasons(&self) -> Vec<ResourceWarning> {
        let mut reasons = Vec::new();
        for (port, target) in self.sorted_outputs() {
            if target.is_streaming() {
                if !path_exists(target.fifo_path()).await {
                    reasons.push(ResourceWarning::FifoMissing {
                        port: port.to_string(),
                        path: target.fifo_path().to_string(),
                    });
                }
                continue;
            }
            if path_exists(target.final_path()).await {
                reasons.push(ResourceWarning::OutputExists {
                    port: port.to_string(),
                    path: target.final_path().to_string(),
                });
            }
            if path_exists(target.temp_path()).await {
                reasons.push(ResourceWarning::TempOutputExists {
                    port: port.to_string(),
                    path: target.temp_path().to_string(),
                });
            }
        }
        reasons
    }

    /// Streaming outputs whose FIFO already exists.
    pub async fn existing_fifos(&self) -> Vec<ResourceWarning> {
        let mut found = Vec::new();
        for (port, target) in self.sorted_outputs() {
            if target.is_streaming() && path_exists(target.fifo_path()).await {
                warn!(
                    task = %self.id,
                    path = %target.fifo_path(),
                    "Output FIFO already exists, check the workflow for correctness"
                );
                found.push(ResourceWarning::FifoExists {
                    port: port.to_string(),
                    path: target.fifo_path().to_string(),
                });
            }
        }
        found
    }

    /// Create a FIFO for every streaming output.
    ///
    /// Must run before this task executes and before any consumer of these
    /// outputs performs its own pre-check.
    pub async fn create_fifos(&self) -> Result<(), TaskError> {
        debug!(task = %self.id, "Creating FIFOs");
        for (_, target) in self.sorted_outputs() {
            if target.is_streaming() {
                target.create_fifo().await?;
            }
        }
        Ok(())
    }

    /// Remove the FIFOs of streaming outputs once producer and consumer are done.
    ///
    /// FIFOs that are already gone are ignored.
    pub async fn clean_up_fifos(&self) -> Result<(), TaskError> {
        for (_, target) in self.sorted_outputs() {
            if !target.is_streaming() {
                debug!(task = %self.id, path = %target.final_path(), "Output is not streaming, no FIFO to remove");
                continue;
            }
            if path_exists(target.fifo_path()).await {
                debug!(task = %self.id, path = %target.fifo_path(), "Removing FIFO");
                target.remove_fifo().await?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ShellTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellTask")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("custom", &self.custom.as_ref().map(|s| s.name()))
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("params", &self.params)
            .field("outcome", &self.completion.outcome())
            .finish()
    }
}

/// Builder for [`ShellTask`].
pub struct ShellTaskBuilder {
    name: String,
    pattern: String,
    inputs: HashMap<String, Arc<dyn Target>>,
    outputs: Vec<(String, PathGenerator, bool)>,
    params: HashMap<String, String>,
    prefix: String,
    custom: Option<Arc<dyn ExecuteStrategy>>,
    duplicate: Option<String>,
}

impl ShellTaskBuilder {
    /// Create a new builder.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            inputs: HashMap::new(),
            outputs: Vec::new(),
            params: HashMap::new(),
            prefix: String::new(),
            custom: None,
            duplicate: None,
        }
    }

    fn note_duplicate(&mut self, port: &str) {
        if self.duplicate.is_none() {
            self.duplicate = Some(port.to_string());
        }
    }

    /// Attach an input target.
    pub fn input(mut self, port: impl Into<String>, target: Arc<dyn Target>) -> Self {
        let port = port.into();
        if self.inputs.contains_key(&port) {
            self.note_duplicate(&port);
        }
        self.inputs.insert(port, target);
        self
    }

    /// Attach a regular file input by path.
    pub fn input_path(self, port: impl Into<String>, path: impl Into<String>) -> Self {
        self.input(port, Arc::new(FileTarget::new(path)))
    }

    /// Attach several input targets.
    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = (S, Arc<dyn Target>)>,
        S: Into<String>,
    {
        for (port, target) in inputs {
            self = self.input(port, target);
        }
        self
    }

    /// Declare a file output whose path is computed from the task.
    pub fn output<F>(self, port: impl Into<String>, generator: F) -> Self
    where
        F: Fn(&ShellTask) -> String + Send + Sync + 'static,
    {
        self.boxed_output(port, Box::new(generator), false)
    }

    /// Declare an output that is streamed through a FIFO.
    pub fn streaming_output<F>(self, port: impl Into<String>, generator: F) -> Self
    where
        F: Fn(&ShellTask) -> String + Send + Sync + 'static,
    {
        self.boxed_output(port, Box::new(generator), true)
    }

    /// Declare an output from an already boxed generator.
    pub fn boxed_output(
        mut self,
        port: impl Into<String>,
        generator: PathGenerator,
        streaming: bool,
    ) -> Self {
        let port = port.into();
        if self.outputs.iter().any(|(p, _, _)| *p == port) {
            self.note_duplicate(&port);
            self.outputs.retain(|(p, _, _)| *p != port);
        }
        self.outputs.push((port, generator, streaming));
        self
    }

    /// Set a parameter value.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Set several parameter values.
    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Prepend a wrapper (e.g. an environment or container runner) to the command.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the shell command with a custom strategy.
    pub fn custom_execute(mut self, strategy: Arc<dyn ExecuteStrategy>) -> Self {
        self.custom = Some(strategy);
        self
    }

    /// Create the output targets and format the command.
    pub fn build(self) -> Result<ShellTask, TaskError> {
        if let Some(port) = self.duplicate {
            return Err(TaskError::DuplicatePort(port));
        }

        let mut task = ShellTask {
            id: TaskId::new(self.name),
            command: String::new(),
            custom: self.custom,
            inputs: self.inputs,
            outputs: HashMap::new(),
            params: self.params,
            completion: CompletionSignal::new(),
            executed: AtomicBool::new(false),
        };

        debug!(task = %task.id, pattern = %self.pattern, "Creating output targets");
        let mut outputs: HashMap<String, Arc<dyn Target>> = HashMap::new();
        for (port, generator, streaming) in &self.outputs {
            let path = generator(&task);
            if path.is_empty() {
                return Err(TaskError::EmptyOutputPath(port.clone()));
            }
            debug!(task = %task.id, port = %port, path = %path, streaming, "Created output target");
            outputs.insert(
                port.clone(),
                Arc::new(FileTarget::new(path).with_streaming(*streaming)),
            );
        }
        task.outputs = outputs;

        task.command = format_command(
            &self.pattern,
            &task.inputs,
            &task.outputs,
            &task.params,
            &self.prefix,
        )?;
        debug!(task = %task.id, command = %task.command, "Formatted command");

        Ok(task)
    }
}
