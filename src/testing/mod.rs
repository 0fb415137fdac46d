//! Testing utilities for users of the sciflow library.
//!
//! - [`RecordingHandler`]: An event handler that keeps every event it sees
//! - [`CountingStrategy`]: An execution strategy that counts its invocations
//!   and can write placeholder content to a task's file outputs
//! - [`FailingStrategy`]: An execution strategy that always fails

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

use crate::core::task::{ExecuteStrategy, ResourceWarning, ShellTask, TaskError};
use crate::events::{Event, EventHandler};

/// An event handler that records every event.
///
/// # Example
///
/// ```ignore
/// let handler = Arc::new(RecordingHandler::new());
/// let bus = Arc::new(EventBus::new());
/// bus.register(handler.clone()).await;
///
/// TaskExecutor::new().with_event_bus(bus).execute(&task).await?;
/// assert_eq!(handler.skipped_count().await, 0);
/// ```
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// All events received so far, in order.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Every resource warning received so far.
    pub async fn warnings(&self) -> Vec<ResourceWarning> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|e| match e {
                Event::ResourceWarning { warning, .. } => Some(warning.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of TaskSkipped events.
    pub async fn skipped_count(&self) -> usize {
        self.count_matching(|e| matches!(e, Event::TaskSkipped { .. }))
            .await
    }

    /// Number of TaskStarted events.
    pub async fn started_count(&self) -> usize {
        self.count_matching(|e| matches!(e, Event::TaskStarted { .. }))
            .await
    }

    /// Number of events matching `predicate`.
    pub async fn count_matching(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|&e| predicate(e))
            .count()
    }
}

impl Default for RecordingHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}

/// A strategy that counts how often it runs.
///
/// Built with [`writing`](Self::writing), it also writes the given content
/// to the temporary path of every non-streaming output, so the executor's
/// atomization step has something to rename.
pub struct CountingStrategy {
    calls: AtomicU32,
    content: Option<String>,
}

impl CountingStrategy {
    /// Count invocations without touching the filesystem.
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            content: None,
        }
    }

    /// Count invocations and write `content` to each file output.
    pub fn writing(content: impl Into<String>) -> Self {
        Self {
            calls: AtomicU32::new(0),
            content: Some(content.into()),
        }
    }

    /// Number of invocations so far.
    pub fn count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for CountingStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecuteStrategy for CountingStrategy {
    async fn execute(&self, task: &ShellTask) -> Result<(), TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref content) = self.content {
            for target in task.outputs().values() {
                if !target.is_streaming() {
                    tokio::fs::write(target.temp_path(), content)
                        .await
                        .map_err(|e| TaskError::ExecutionFailed(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

/// A strategy that always fails with the given message.
pub struct FailingStrategy {
    message: String,
}

impl FailingStrategy {
    /// Create a strategy failing with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ExecuteStrategy for FailingStrategy {
    async fn execute(&self, _task: &ShellTask) -> Result<(), TaskError> {
        Err(TaskError::ExecutionFailed(self.message.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
