//! Task execution engine.
//!
//! This module provides the execution infrastructure for running tasks:
//! the built-in shell strategy, the executor that handles skipping,
//! atomization and completion signaling, and the runner that launches a
//! whole set of tasks with the FIFOs between them.

mod command;
mod executor;
mod runner;

pub use command::{DEFAULT_SHELL, DEFAULT_SHELL_ARG, ShellCommand, ShellCommandBuilder};
pub use executor::TaskExecutor;
pub use runner::{RunPlan, RunSummary, TaskRunResult, WorkflowRunner};
