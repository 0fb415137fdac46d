//! sciflow - single-task execution for file-based scientific workflows.
//!
//! A [`ShellTask`] turns a command pattern with typed placeholders into a
//! concrete shell command, and a [`TaskExecutor`] runs it so that finished
//! outputs appear exactly once, atomically, and are never recomputed on a
//! re-run. Outputs can also be streamed to a concurrently running consumer
//! through named pipes.

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod testing;

pub use config::{ConfigError, GlobalConfig, TargetConfig, TaskConfig, TaskFileConfig, YamlLoader};
pub use core::format::{FormatError, Placeholder, PortKind, format_command, placeholders};
pub use core::signal::{CompletionError, CompletionSignal, CompletionWaiter};
pub use core::target::{FIFO_SUFFIX, FileTarget, TEMP_SUFFIX, Target, TargetError};
pub use core::task::{
    ExecuteStrategy, PathGenerator, ResourceWarning, ShellTask, ShellTaskBuilder, TaskError,
};
pub use core::types::{TaskId, TaskOutcome};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{
    RunPlan, RunSummary, ShellCommand, ShellCommandBuilder, TaskExecutor, TaskRunResult,
    WorkflowRunner,
};
