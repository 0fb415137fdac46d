//! YAML configuration parsing.
//!
//! Parses task definitions and global configuration from YAML files.
//!
//! A task file lists the tasks to run:
//!
//! ```yaml
//! tasks:
//!   - name: unzip
//!     command: zcat {i:reads} > {os:out}
//!     inputs:
//!       reads: data/reads.fq.gz
//!     outputs:
//!       out: { path: data/reads.fq, stream: true }
//!   - name: count
//!     command: wc -l < {i:in} > {o:out}
//!     inputs:
//!       in: { path: data/reads.fq, stream: true }
//!     outputs:
//!       out: data/reads.count
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use super::error::ConfigError;
use crate::core::target::FileTarget;
use crate::core::task::ShellTask;
use crate::execution::ShellCommand;

/// Global configuration (sciflow.yaml).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Shell program used to run commands (default: bash).
    pub shell: Option<String>,
    /// Flag passing the command string to the shell (default: -c).
    pub shell_arg: Option<String>,
    /// Prefix prepended to every command unless a task sets its own.
    pub prefix: Option<String>,
}

impl GlobalConfig {
    /// The shell strategy described by this configuration.
    pub fn shell_command(&self) -> ShellCommand {
        let mut builder = ShellCommand::builder();
        if self.shell.is_some() || self.shell_arg.is_some() {
            let defaults = ShellCommand::default();
            builder = builder.shell(
                self.shell.as_deref().unwrap_or(defaults.shell()),
                self.shell_arg.as_deref().unwrap_or(defaults.shell_arg()),
            );
        }
        builder.build()
    }
}

/// A file on an in- or out-port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetConfig {
    /// Just a path; never streaming.
    Path(String),
    /// Path with options.
    Detailed {
        path: String,
        /// Backed by a named pipe.
        #[serde(default)]
        stream: bool,
    },
}

impl TargetConfig {
    /// The final path.
    pub fn path(&self) -> &str {
        match self {
            TargetConfig::Path(path) => path,
            TargetConfig::Detailed { path, .. } => path,
        }
    }

    /// Whether the target is streaming.
    pub fn is_streaming(&self) -> bool {
        match self {
            TargetConfig::Path(_) => false,
            TargetConfig::Detailed { stream, .. } => *stream,
        }
    }
}

/// One task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Task name, unique within the file.
    pub name: String,
    /// Command pattern with `{i:..}`, `{o:..}`, `{os:..}` and `{p:..}` placeholders.
    pub command: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, TargetConfig>,
    #[serde(default)]
    pub outputs: BTreeMap<String, TargetConfig>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Overrides the global prefix.
    pub prefix: Option<String>,
}

impl TaskConfig {
    /// Build the task this definition describes.
    pub fn build(&self, global: &GlobalConfig) -> Result<ShellTask, ConfigError> {
        if self.command.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(format!(
                "task '{}' has an empty command",
                self.name
            )));
        }

        let mut builder = ShellTask::builder(&self.name, &self.command);
        for (port, target) in &self.inputs {
            builder = builder.input(
                port,
                Arc::new(FileTarget::new(target.path()).with_streaming(target.is_streaming())),
            );
        }
        for (port, target) in &self.outputs {
            let path = target.path().to_string();
            builder = builder.boxed_output(
                port,
                Box::new(move |_| path.clone()),
                target.is_streaming(),
            );
        }
        builder = builder.params(self.params.clone());

        let prefix = self.prefix.as_ref().or(global.prefix.as_ref());
        if let Some(prefix) = prefix {
            builder = builder.prefix(prefix);
        }

        builder.build().map_err(|source| ConfigError::Task {
            name: self.name.clone(),
            source,
        })
    }
}

/// A file of task definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFileConfig {
    pub tasks: Vec<TaskConfig>,
}

impl TaskFileConfig {
    /// Build every task, in file order.
    pub fn build_all(&self, global: &GlobalConfig) -> Result<Vec<ShellTask>, ConfigError> {
        self.tasks.iter().map(|t| t.build(global)).collect()
    }
}

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load global configuration from a file.
    pub fn load_global_config(path: impl AsRef<Path>) -> Result<GlobalConfig, ConfigError> {
        let path = path.as_ref();
        let content = read_file(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse global configuration from a YAML string.
    pub fn parse_global_config(yaml: &str) -> Result<GlobalConfig, ConfigError> {
        let config: GlobalConfig = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load task definitions from a file.
    pub fn load_task_file(path: impl AsRef<Path>) -> Result<TaskFileConfig, ConfigError> {
        let path = path.as_ref();
        let content = read_file(path)?;
        let config: TaskFileConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_task_file(&config)?;
        Ok(config)
    }

    /// Parse task definitions from a YAML string.
    pub fn parse_task_file(yaml: &str) -> Result<TaskFileConfig, ConfigError> {
        let config: TaskFileConfig = serde_yaml::from_str(yaml)?;
        Self::validate_task_file(&config)?;
        Ok(config)
    }

    fn validate_task_file(config: &TaskFileConfig) -> Result<(), ConfigError> {
        if config.tasks.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "task file must define at least one task".into(),
            ));
        }

        let mut names: HashSet<&str> = HashSet::new();
        for task in &config.tasks {
            if task.name.is_empty() {
                return Err(ConfigError::InvalidConfig("task name cannot be empty".into()));
            }
            if !names.insert(&task.name) {
                return Err(ConfigError::DuplicateTask(task.name.clone()));
            }
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
        path: path.to_path_buf(),
        source,
    })
}
