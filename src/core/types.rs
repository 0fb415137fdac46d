//! Core identifier types.
//!
//! These types provide type-safe identifiers for tasks and their ports.

use std::fmt;

/// Identifier of a task, used for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new TaskId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal state reached by a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Outputs already existed (or a required FIFO was missing); nothing ran.
    Skipped,
    /// The command ran and every file output was atomized.
    Completed,
    /// Execution or finalization failed.
    Failed,
}

impl TaskOutcome {
    /// Whether the task reached a non-failure terminal state.
    pub fn is_success(&self) -> bool {
        !matches!(self, TaskOutcome::Failed)
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskOutcome::Skipped => "skipped",
            TaskOutcome::Completed => "completed",
            TaskOutcome::Failed => "failed",
        };
        f.write_str(s)
    }
}
