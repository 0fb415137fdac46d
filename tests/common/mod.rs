//! Common test utilities shared across integration tests.

use sciflow::{EventBus, TaskExecutor, testing::RecordingHandler};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Absolute path of `name` inside `dir`, as a string.
pub fn path_in(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

/// An executor running the default shell, with a recorder attached.
pub async fn recording_executor() -> (Arc<TaskExecutor>, Arc<RecordingHandler>) {
    let handler = Arc::new(RecordingHandler::new());
    let bus = Arc::new(EventBus::new());
    bus.register(handler.clone()).await;
    (Arc::new(TaskExecutor::new().with_event_bus(bus)), handler)
}

/// Read a file, panicking with its path on failure.
pub async fn read(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    tokio::fs::read_to_string(path)
        .await
        .unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
}

/// Upper bound for anything a test waits on.
pub const TIMEOUT: Duration = Duration::from_secs(10);
