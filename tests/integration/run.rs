//! Running whole task files, including resuming a finished workflow.

#![cfg(unix)]

use crate::common::{TIMEOUT, path_in, read};
use sciflow::{
    GlobalConfig, RunSummary, ShellTask, TaskExecutor, TaskOutcome, WorkflowRunner, YamlLoader,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// `seq` streamed into `wc -l` through a FIFO.
fn pipeline_yaml(dir: &TempDir) -> String {
    let stream = path_in(dir, "nums.txt");
    let count = path_in(dir, "nums.count");
    format!(
        r#"
tasks:
  - name: produce
    command: seq 1 100 > {{os:out}}
    outputs:
      out: {{ path: {stream}, stream: true }}
  - name: consume
    command: wc -l < {{i:in}} | tr -d ' ' > {{o:out}}
    inputs:
      in: {{ path: {stream}, stream: true }}
    outputs:
      out: {count}
"#
    )
}

fn tasks_from(yaml: &str) -> Vec<Arc<ShellTask>> {
    YamlLoader::parse_task_file(yaml)
        .unwrap()
        .build_all(&GlobalConfig::default())
        .unwrap()
        .into_iter()
        .map(Arc::new)
        .collect()
}

async fn run_once(yaml: &str) -> RunSummary {
    let runner = WorkflowRunner::new(TaskExecutor::new());
    tokio::time::timeout(TIMEOUT, runner.run(&tasks_from(yaml)))
        .await
        .expect("run did not finish")
        .unwrap()
}

#[tokio::test]
async fn test_streaming_pipeline_runs_then_resumes() {
    let dir = TempDir::new().unwrap();
    let yaml = pipeline_yaml(&dir);
    let fifo = format!("{}.fifo", path_in(&dir, "nums.txt"));

    let first = run_once(&yaml).await;
    assert!(first.is_success());
    assert_eq!(first.completed_count(), 2);
    assert_eq!(read(path_in(&dir, "nums.count")).await, "100\n");
    assert!(!Path::new(&fifo).exists());

    // Everything is done, so neither task may start.
    let second = run_once(&yaml).await;
    assert!(second.is_success());
    assert_eq!(second.skipped_count(), 2);
    assert_eq!(read(path_in(&dir, "nums.count")).await, "100\n");
    assert!(!Path::new(&fifo).exists());
}

#[tokio::test]
async fn test_missing_consumer_output_reruns_pipeline() {
    let dir = TempDir::new().unwrap();
    let yaml = pipeline_yaml(&dir);

    run_once(&yaml).await;
    tokio::fs::remove_file(path_in(&dir, "nums.count"))
        .await
        .unwrap();

    let rerun = run_once(&yaml).await;
    assert_eq!(rerun.completed_count(), 2);
    assert_eq!(read(path_in(&dir, "nums.count")).await, "100\n");
}

#[tokio::test]
async fn test_leftover_fifo_of_finished_pipeline_is_removed() {
    let dir = TempDir::new().unwrap();
    let yaml = pipeline_yaml(&dir);
    let fifo = format!("{}.fifo", path_in(&dir, "nums.txt"));

    run_once(&yaml).await;
    let status = std::process::Command::new("mkfifo")
        .arg(&fifo)
        .status()
        .unwrap();
    assert!(status.success());

    let summary = run_once(&yaml).await;
    assert_eq!(summary.skipped_count(), 2);
    assert!(!Path::new(&fifo).exists());
}

#[tokio::test]
async fn test_failed_task_is_counted_and_others_finish() {
    let dir = TempDir::new().unwrap();
    let good = path_in(&dir, "good.txt");
    let yaml = format!(
        r#"
tasks:
  - name: good
    command: echo fine > {{o:out}}
    outputs:
      out: {good}
  - name: bad
    command: echo broken >&2; exit 2
"#
    );

    let summary = run_once(&yaml).await;

    assert!(!summary.is_success());
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.completed_count(), 1);
    let bad = &summary.results[1];
    assert_eq!(bad.outcome, TaskOutcome::Failed);
    assert!(bad.error.as_deref().unwrap().contains("broken"));
    assert_eq!(read(&good).await, "fine\n");
}

async fn sf_run(task_file: &str) -> std::process::ExitStatus {
    let child = tokio::process::Command::new(env!("CARGO_BIN_EXE_sf"))
        .arg("run")
        .arg(task_file)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
    tokio::time::timeout(TIMEOUT, child)
        .await
        .expect("sf run did not finish")
        .unwrap()
}

#[tokio::test]
async fn test_cli_rerun_of_streaming_file_exits_cleanly() {
    let dir = TempDir::new().unwrap();
    let file = path_in(&dir, "tasks.yaml");
    tokio::fs::write(&file, pipeline_yaml(&dir)).await.unwrap();

    assert!(sf_run(&file).await.success());
    assert!(sf_run(&file).await.success());

    assert_eq!(read(path_in(&dir, "nums.count")).await, "100\n");
    assert!(!Path::new(&format!("{}.fifo", path_in(&dir, "nums.txt"))).exists());
}

#[tokio::test]
async fn test_cli_exits_non_zero_when_a_task_fails() {
    let dir = TempDir::new().unwrap();
    let file = path_in(&dir, "tasks.yaml");
    tokio::fs::write(&file, "tasks:\n  - name: bad\n    command: exit 1\n")
        .await
        .unwrap();

    assert!(!sf_run(&file).await.success());
}
