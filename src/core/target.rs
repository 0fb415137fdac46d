//! File targets: the on-disk locations a task reads from and writes to.
//!
//! A target is identified by its final path. While a task runs it writes to
//! the temporary path, and [`Target::atomize`] renames the temporary file
//! into place once the task has finished. Streaming targets are backed by a
//! named pipe at the FIFO path instead and are never atomized.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::process::Command;

/// Suffix appended to the final path while an output is being written.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Suffix appended to the final path for the named pipe of a streaming target.
pub const FIFO_SUFFIX: &str = ".fifo";

/// Errors raised by target filesystem operations.
#[derive(Debug, Error)]
pub enum TargetError {
    /// Renaming the temporary file to its final path failed.
    #[error("failed to atomize '{temp}' -> '{path}': {source}")]
    Atomize {
        temp: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Creating the named pipe failed.
    #[error("failed to create FIFO '{path}': {message}")]
    CreateFifo { path: String, message: String },

    /// Removing the named pipe failed.
    #[error("failed to remove FIFO '{path}': {source}")]
    RemoveFifo {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A file or named pipe participating in a task's input or output port.
#[async_trait]
pub trait Target: Send + Sync + fmt::Debug {
    /// The publicly visible path of the finished file.
    fn final_path(&self) -> &str;

    /// Where the file is written while the task is still running.
    fn temp_path(&self) -> &str;

    /// Path of the named pipe used when streaming.
    fn fifo_path(&self) -> &str;

    /// Whether this target is backed by a named pipe.
    fn is_streaming(&self) -> bool;

    /// Create the named pipe at [`fifo_path`](Self::fifo_path).
    async fn create_fifo(&self) -> Result<(), TargetError>;

    /// Remove the named pipe at [`fifo_path`](Self::fifo_path).
    async fn remove_fifo(&self) -> Result<(), TargetError>;

    /// Rename the temporary file to the final path.
    async fn atomize(&self) -> Result<(), TargetError>;
}

/// The standard [`Target`] implementation for files on the local filesystem.
///
/// The temporary and FIFO paths are derived from the final path by
/// appending [`TEMP_SUFFIX`] and [`FIFO_SUFFIX`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    path: String,
    temp_path: String,
    fifo_path: String,
    streaming: bool,
}

impl FileTarget {
    /// Create a regular (non-streaming) target.
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            temp_path: format!("{path}{TEMP_SUFFIX}"),
            fifo_path: format!("{path}{FIFO_SUFFIX}"),
            path,
            streaming: false,
        }
    }

    /// Create a target backed by a named pipe.
    pub fn streaming(path: impl Into<String>) -> Self {
        Self::new(path).with_streaming(true)
    }

    /// Set the streaming flag.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }
}

#[async_trait]
impl Target for FileTarget {
    fn final_path(&self) -> &str {
        &self.path
    }

    fn temp_path(&self) -> &str {
        &self.temp_path
    }

    fn fifo_path(&self) -> &str {
        &self.fifo_path
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    async fn create_fifo(&self) -> Result<(), TargetError> {
        let output = Command::new("mkfifo")
            .arg(&self.fifo_path)
            .output()
            .await
            .map_err(|e| TargetError::CreateFifo {
                path: self.fifo_path.clone(),
                message: e.to_string(),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(TargetError::CreateFifo {
                path: self.fifo_path.clone(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn remove_fifo(&self) -> Result<(), TargetError> {
        tokio::fs::remove_file(&self.fifo_path)
            .await
            .map_err(|source| TargetError::RemoveFifo {
                path: self.fifo_path.clone(),
                source,
            })
    }

    async fn atomize(&self) -> Result<(), TargetError> {
        if self.streaming {
            return Ok(());
        }
        tokio::fs::rename(&self.temp_path, &self.path)
            .await
            .map_err(|source| TargetError::Atomize {
                temp: self.temp_path.clone(),
                path: self.path.clone(),
                source,
            })
    }
}

/// Whether anything (file, directory or pipe) exists at `path`.
pub async fn path_exists(path: &str) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}
