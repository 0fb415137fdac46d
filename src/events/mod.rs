//! Lifecycle events and event handling.
//!
//! The executor reports everything it decides (skip, run, atomize, fail)
//! through an [`EventBus`] it is handed at construction, so callers and
//! tests can observe a task's diagnostics without global logger state.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::task::ResourceWarning;
use crate::core::types::TaskId;

/// Lifecycle events emitted during execution.
#[derive(Debug, Clone)]
pub enum Event {
    /// A pre-existing or missing resource was found before execution.
    ResourceWarning {
        task_id: TaskId,
        warning: ResourceWarning,
        timestamp: Instant,
    },

    /// The task was skipped; nothing was run.
    TaskSkipped {
        task_id: TaskId,
        reasons: Vec<ResourceWarning>,
        timestamp: Instant,
    },

    /// The task's command (or custom strategy) is about to run.
    TaskStarted {
        task_id: TaskId,
        command: String,
        timestamp: Instant,
    },

    /// A file output was renamed from its temporary path into place.
    OutputAtomized {
        task_id: TaskId,
        port: String,
        path: String,
        timestamp: Instant,
    },

    /// The task ran and all file outputs were atomized.
    TaskCompleted {
        task_id: TaskId,
        duration: Duration,
        timestamp: Instant,
    },

    /// Execution or finalization failed.
    TaskFailed {
        task_id: TaskId,
        command: String,
        error: String,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::ResourceWarning { timestamp, .. } => *timestamp,
            Event::TaskSkipped { timestamp, .. } => *timestamp,
            Event::TaskStarted { timestamp, .. } => *timestamp,
            Event::OutputAtomized { timestamp, .. } => *timestamp,
            Event::TaskCompleted { timestamp, .. } => *timestamp,
            Event::TaskFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the task the event belongs to.
    pub fn task_id(&self) -> &TaskId {
        match self {
            Event::ResourceWarning { task_id, .. }
            | Event::TaskSkipped { task_id, .. }
            | Event::TaskStarted { task_id, .. }
            | Event::OutputAtomized { task_id, .. }
            | Event::TaskCompleted { task_id, .. }
            | Event::TaskFailed { task_id, .. } => task_id,
        }
    }

    /// Create a ResourceWarning event.
    pub fn resource_warning(task_id: TaskId, warning: ResourceWarning) -> Self {
        Event::ResourceWarning {
            task_id,
            warning,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskSkipped event.
    pub fn task_skipped(task_id: TaskId, reasons: Vec<ResourceWarning>) -> Self {
        Event::TaskSkipped {
            task_id,
            reasons,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskStarted event.
    pub fn task_started(task_id: TaskId, command: impl Into<String>) -> Self {
        Event::TaskStarted {
            task_id,
            command: command.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create an OutputAtomized event.
    pub fn output_atomized(
        task_id: TaskId,
        port: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Event::OutputAtomized {
            task_id,
            port: port.into(),
            path: path.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskCompleted event.
    pub fn task_completed(task_id: TaskId, duration: Duration) -> Self {
        Event::TaskCompleted {
            task_id,
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskFailed event.
    pub fn task_failed(task_id: TaskId, command: impl Into<String>, error: String) -> Self {
        Event::TaskFailed {
            task_id,
            command: command.into(),
            error,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
