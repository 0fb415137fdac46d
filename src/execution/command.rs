//! The built-in shell execution strategy.
//!
//! [`ShellCommand`] hands a task's formatted command to a shell
//! (`bash -c <command>` by default) and waits for it to finish. Any failure
//! to start the shell, or a non-zero exit status, is fatal for the task.
//!
//! ```rust
//! use sciflow::ShellCommand;
//!
//! // The default: bash -c
//! let shell = ShellCommand::default();
//! assert_eq!(shell.shell(), "bash");
//!
//! // A POSIX shell with extra environment and a working directory
//! let sh = ShellCommand::builder()
//!     .shell("sh", "-c")
//!     .env("LC_ALL", "C")
//!     .working_dir("/tmp")
//!     .build();
//! assert_eq!(sh.shell(), "sh");
//! ```
//!
//! # Error Handling
//!
//! - **Non-zero exit code**: [`TaskError::CommandFailed`] with the exit code
//!   and captured stderr
//! - **Shell cannot be started**: [`TaskError::ExecutionFailed`]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::task::{ExecuteStrategy, ShellTask, TaskError};

/// Default shell program.
pub const DEFAULT_SHELL: &str = "bash";

/// Default flag passing the command string to the shell.
pub const DEFAULT_SHELL_ARG: &str = "-c";

/// Runs a task's command through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    /// Shell program
    shell: String,
    /// Flag that makes the shell read the command from the next argument
    shell_arg: String,
    /// Extra environment variables
    environment: BTreeMap<String, String>,
    /// Working directory
    working_dir: Option<PathBuf>,
}

impl ShellCommand {
    /// Create a new builder.
    pub fn builder() -> ShellCommandBuilder {
        ShellCommandBuilder::new()
    }

    /// Get the shell program.
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Get the shell flag.
    pub fn shell_arg(&self) -> &str {
        &self.shell_arg
    }

    /// Get the extra environment variables.
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    /// Get the working directory.
    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    /// Run `command` and wait for it to exit.
    pub async fn run(&self, command: &str) -> Result<(), TaskError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg(&self.shell_arg).arg(command);

        for (key, value) in &self.environment {
            cmd.env(key, value);
        }
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = cmd.output().await.map_err(|e| {
            TaskError::ExecutionFailed(format!("failed to start '{}': {}", self.shell, e))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines() {
            debug!("    stdout: {}", line);
        }

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(TaskError::CommandFailed {
                code: output.status.code().unwrap_or(-1),
                stderr,
            })
        }
    }
}

impl Default for ShellCommand {
    fn default() -> Self {
        ShellCommandBuilder::new().build()
    }
}

#[async_trait]
impl ExecuteStrategy for ShellCommand {
    async fn execute(&self, task: &ShellTask) -> Result<(), TaskError> {
        info!(task = %task.id(), command = %task.command(), "Executing command");
        self.run(task.command()).await
    }

    fn name(&self) -> &str {
        "shell"
    }
}

/// Builder for creating [`ShellCommand`] instances.
#[derive(Debug, Clone)]
pub struct ShellCommandBuilder {
    shell: String,
    shell_arg: String,
    environment: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ShellCommandBuilder {
    /// Create a builder using `bash -c`.
    pub fn new() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            shell_arg: DEFAULT_SHELL_ARG.to_string(),
            environment: BTreeMap::new(),
            working_dir: None,
        }
    }

    /// Set the shell program and its command flag.
    pub fn shell(mut self, shell: impl Into<String>, arg: impl Into<String>) -> Self {
        self.shell = shell.into();
        self.shell_arg = arg.into();
        self
    }

    /// Add a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Build the `ShellCommand`.
    pub fn build(self) -> ShellCommand {
        ShellCommand {
            shell: self.shell,
            shell_arg: self.shell_arg,
            environment: self.environment,
            working_dir: self.working_dir,
        }
    }
}

impl Default for ShellCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}
