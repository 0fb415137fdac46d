//! End-to-end task execution with real shell commands.

use crate::common::{TIMEOUT, path_in, read, recording_executor};
use sciflow::{
    Event, FileTarget, ResourceWarning, ShellTask, Target, TaskError, TaskOutcome,
    testing::CountingStrategy,
};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_task_runs_and_publishes_output_atomically() {
    let dir = TempDir::new().unwrap();
    let input = path_in(&dir, "in.txt");
    tokio::fs::write(&input, "abc\n").await.unwrap();

    let task = ShellTask::builder("tool", "cat {i:in} > {o:out} && echo level={p:level} >> {o:out}")
        .input_path("in", &input)
        .param("level", "3")
        .output("out", |t: &ShellTask| {
            format!(
                "{}.level{}.out",
                t.in_path("in").unwrap_or_default(),
                t.param("level").unwrap_or("0")
            )
        })
        .build()
        .unwrap();

    let expected = format!("{}.level3.out", input);
    assert_eq!(
        task.command(),
        format!(
            "cat {} > {}.tmp && echo level=3 >> {}.tmp",
            input, expected, expected
        )
    );

    let (executor, handler) = recording_executor().await;
    let outcome = executor.execute(&task).await.unwrap();

    assert_eq!(outcome, TaskOutcome::Completed);
    assert_eq!(read(&expected).await, "abc\nlevel=3\n");
    assert!(!std::path::Path::new(&format!("{}.tmp", expected)).exists());
    assert_eq!(handler.started_count().await, 1);
    assert_eq!(
        handler
            .count_matching(|e| matches!(e, Event::OutputAtomized { .. }))
            .await,
        1
    );
}

#[tokio::test]
async fn test_rerun_is_skipped_and_output_untouched() {
    let dir = TempDir::new().unwrap();
    let out = path_in(&dir, "out.txt");

    let build = |content: &'static str| {
        let out = out.clone();
        ShellTask::builder("write", format!("echo {} > {{o:out}}", content))
            .output("out", move |_| out.clone())
            .build()
            .unwrap()
    };

    let (executor, handler) = recording_executor().await;
    assert_eq!(executor.execute(&build("first")).await.unwrap(), TaskOutcome::Completed);
    assert_eq!(executor.execute(&build("second")).await.unwrap(), TaskOutcome::Skipped);

    assert_eq!(read(&out).await, "first\n");
    assert_eq!(handler.skipped_count().await, 1);
    let warnings = handler.warnings().await;
    assert_eq!(warnings.len(), 1);
    assert!(matches!(warnings[0], ResourceWarning::OutputExists { ref path, .. } if *path == out));
}

#[tokio::test]
async fn test_failed_command_leaves_no_final_output() {
    let dir = TempDir::new().unwrap();
    let out = path_in(&dir, "out.txt");
    let out_clone = out.clone();
    let task = ShellTask::builder("broken", "echo partial > {o:out}; echo oops >&2; exit 4")
        .output("out", move |_| out_clone.clone())
        .build()
        .unwrap();

    let (executor, handler) = recording_executor().await;
    let mut waiter = task.completion();
    let err = executor.execute(&task).await.unwrap_err();

    match err {
        TaskError::CommandFailed { code, ref stderr } => {
            assert_eq!(code, 4);
            assert_eq!(stderr, "oops");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!std::path::Path::new(&out).exists());
    assert_eq!(waiter.wait().await.unwrap(), TaskOutcome::Failed);
    assert_eq!(
        handler
            .count_matching(|e| matches!(e, Event::TaskFailed { .. }))
            .await,
        1
    );
}

#[tokio::test]
async fn test_dependent_task_waits_on_completion_signal() {
    let dir = TempDir::new().unwrap();
    let first_out = path_in(&dir, "first.txt");
    let second_out = path_in(&dir, "second.txt");

    let first_path = first_out.clone();
    let first = Arc::new(
        ShellTask::builder("first", "sleep 0.1 && echo one > {o:out}")
            .output("out", move |_| first_path.clone())
            .build()
            .unwrap(),
    );
    let second_path = second_out.clone();
    let second = Arc::new(
        ShellTask::builder("second", "cat {i:in} > {o:out}")
            .input("in", Arc::new(FileTarget::new(&first_out)))
            .output("out", move |_| second_path.clone())
            .build()
            .unwrap(),
    );

    let (executor, _) = recording_executor().await;
    let mut upstream = first.completion();
    let producer = executor.spawn(Arc::clone(&first));

    let consumer = {
        let executor = Arc::clone(&executor);
        let second = Arc::clone(&second);
        tokio::spawn(async move {
            assert_eq!(upstream.wait().await.unwrap(), TaskOutcome::Completed);
            executor.execute(&second).await
        })
    };

    let (a, b) = tokio::time::timeout(TIMEOUT, async { (producer.await, consumer.await) })
        .await
        .unwrap();
    assert_eq!(a.unwrap().unwrap(), TaskOutcome::Completed);
    assert_eq!(b.unwrap().unwrap(), TaskOutcome::Completed);
    assert_eq!(read(&second_out).await, "one\n");
}

#[tokio::test]
async fn test_many_tasks_run_concurrently() {
    let dir = TempDir::new().unwrap();
    let (executor, handler) = recording_executor().await;

    let tasks: Vec<Arc<ShellTask>> = (0..8)
        .map(|i| {
            let out = path_in(&dir, &format!("out{}.txt", i));
            Arc::new(
                ShellTask::builder(format!("t{}", i), "sleep 0.2 && echo {p:n} > {o:out}")
                    .param("n", i.to_string())
                    .output("out", move |_| out.clone())
                    .build()
                    .unwrap(),
            )
        })
        .collect();

    let start = std::time::Instant::now();
    let handles: Vec<_> = tasks.iter().map(|t| executor.spawn(Arc::clone(t))).collect();
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), TaskOutcome::Completed);
    }

    // Serial execution would take at least 1.6s.
    assert!(start.elapsed() < std::time::Duration::from_millis(1500));
    assert_eq!(handler.started_count().await, 8);
    for i in 0..8 {
        assert_eq!(read(path_in(&dir, &format!("out{}.txt", i))).await, format!("{}\n", i));
    }
}

#[tokio::test]
async fn test_custom_strategy_output_is_atomized() {
    let dir = TempDir::new().unwrap();
    let out = path_in(&dir, "custom.txt");
    let out_clone = out.clone();
    let strategy = Arc::new(CountingStrategy::writing("computed in-process"));
    let task = ShellTask::builder("custom", "this command never runs {o:out}")
        .output("out", move |_| out_clone.clone())
        .custom_execute(strategy.clone())
        .build()
        .unwrap();

    let (executor, _) = recording_executor().await;
    assert_eq!(executor.execute(&task).await.unwrap(), TaskOutcome::Completed);

    assert_eq!(strategy.count(), 1);
    assert_eq!(read(&out).await, "computed in-process");
    assert!(!std::path::Path::new(task.output("out").unwrap().temp_path()).exists());
}
