//! Configuration loading and parsing.
//!
//! This module provides YAML-based task definitions and global settings.

mod error;
mod yaml;

pub use error::ConfigError;
pub use yaml::{GlobalConfig, TargetConfig, TaskConfig, TaskFileConfig, YamlLoader};
