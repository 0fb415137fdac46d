//! Producer and consumer connected through a named pipe.

#![cfg(unix)]

use crate::common::{TIMEOUT, path_in, read, recording_executor};
use sciflow::{FileTarget, ResourceWarning, ShellTask, Target, TaskOutcome};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn pipeline(dir: &TempDir) -> (Arc<ShellTask>, Arc<ShellTask>, String, String) {
    let stream = path_in(dir, "numbers.txt");
    let count = path_in(dir, "numbers.count");

    let stream_path = stream.clone();
    let producer = ShellTask::builder("produce", "seq 1 1000 > {os:out}")
        .streaming_output("out", move |_| stream_path.clone())
        .build()
        .unwrap();

    let count_path = count.clone();
    let consumer = ShellTask::builder("consume", "wc -l < {i:in} | tr -d ' ' > {o:out}")
        .input("in", Arc::new(FileTarget::streaming(&stream)))
        .output("out", move |_| count_path.clone())
        .build()
        .unwrap();

    (Arc::new(producer), Arc::new(consumer), stream, count)
}

#[tokio::test]
async fn test_producer_streams_into_consumer() {
    let dir = TempDir::new().unwrap();
    let (producer, consumer, stream, count) = pipeline(&dir);
    let fifo = format!("{}.fifo", stream);

    assert_eq!(producer.command(), format!("seq 1 1000 > {}", fifo));
    assert_eq!(
        consumer.command(),
        format!("wc -l < {} | tr -d ' ' > {}.tmp", fifo, count)
    );

    producer.create_fifos().await.unwrap();
    assert!(Path::new(&fifo).exists());

    let (executor, handler) = recording_executor().await;
    let p = executor.spawn(Arc::clone(&producer));
    let c = executor.spawn(Arc::clone(&consumer));

    let (p, c) = tokio::time::timeout(TIMEOUT, async { (p.await, c.await) })
        .await
        .unwrap();
    assert_eq!(p.unwrap().unwrap(), TaskOutcome::Completed);
    assert_eq!(c.unwrap().unwrap(), TaskOutcome::Completed);

    producer.clean_up_fifos().await.unwrap();

    assert_eq!(read(&count).await.trim(), "1000");
    // Streamed data is never materialized.
    assert!(!Path::new(&stream).exists());
    assert!(!Path::new(&fifo).exists());
    assert!(handler.warnings().await.is_empty());
}

#[tokio::test]
async fn test_producer_without_fifo_is_skipped() {
    let dir = TempDir::new().unwrap();
    let (producer, _, stream, _) = pipeline(&dir);

    let (executor, handler) = recording_executor().await;
    assert_eq!(executor.execute(&producer).await.unwrap(), TaskOutcome::Skipped);

    let warnings = handler.warnings().await;
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        warnings[0],
        ResourceWarning::FifoMissing { ref path, .. } if *path == format!("{}.fifo", stream)
    ));
    assert_eq!(handler.started_count().await, 0);
}

#[tokio::test]
async fn test_existing_fifo_is_reported_and_cleaned_up() {
    let dir = TempDir::new().unwrap();
    let (producer, _, stream, _) = pipeline(&dir);

    producer.create_fifos().await.unwrap();
    let found = producer.existing_fifos().await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].port(), "out");

    let fifo = producer.output("out").unwrap().fifo_path().to_string();
    assert_eq!(fifo, format!("{}.fifo", stream));

    producer.clean_up_fifos().await.unwrap();
    assert!(!Path::new(&fifo).exists());

    // Cleaning up again is harmless.
    producer.clean_up_fifos().await.unwrap();
    assert!(producer.existing_fifos().await.is_empty());
}
