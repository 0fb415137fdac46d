//! Tasks loaded from a YAML task file.

use crate::common::{path_in, read, recording_executor};
use sciflow::{ConfigError, GlobalConfig, TaskExecutor, TaskOutcome, YamlLoader};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_task_file_builds_and_runs() {
    let dir = TempDir::new().unwrap();
    let input = path_in(&dir, "greeting.txt");
    let output = path_in(&dir, "greeting.upper");
    tokio::fs::write(&input, "hello\n").await.unwrap();

    let yaml = format!(
        r#"
tasks:
  - name: upper
    command: tr a-z A-Z < {{i:in}} > {{o:out}}
    inputs:
      in: {input}
    outputs:
      out: {output}
"#
    );
    let file = path_in(&dir, "tasks.yaml");
    tokio::fs::write(&file, yaml).await.unwrap();

    let tasks = YamlLoader::load_task_file(&file)
        .unwrap()
        .build_all(&GlobalConfig::default())
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(
        tasks[0].command(),
        format!("tr a-z A-Z < {} > {}.tmp", input, output)
    );

    let (executor, _) = recording_executor().await;
    assert_eq!(executor.execute(&tasks[0]).await.unwrap(), TaskOutcome::Completed);
    assert_eq!(read(&output).await, "HELLO\n");
}

#[tokio::test]
async fn test_global_shell_and_prefix_are_applied() {
    let dir = TempDir::new().unwrap();
    let output = path_in(&dir, "env.txt");

    let global = YamlLoader::parse_global_config("shell: sh\nprefix: env GREETING=hi\n").unwrap();
    let yaml = format!(
        r#"
tasks:
  - name: env
    command: printenv GREETING > {{o:out}}
    outputs:
      out: {output}
"#
    );
    let tasks = YamlLoader::parse_task_file(&yaml)
        .unwrap()
        .build_all(&global)
        .unwrap();
    assert!(tasks[0].command().starts_with("env GREETING=hi printenv"));

    let executor = TaskExecutor::new().with_default_strategy(Arc::new(global.shell_command()));
    assert_eq!(executor.execute(&tasks[0]).await.unwrap(), TaskOutcome::Completed);
    assert_eq!(read(&output).await, "hi\n");
}

#[test]
fn test_unknown_placeholder_fails_to_build() {
    let yaml = r#"
tasks:
  - name: broken
    command: cat {i:missing}
"#;
    let err = YamlLoader::parse_task_file(yaml)
        .unwrap()
        .build_all(&GlobalConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigError::Task { ref name, .. } if name == "broken"));
}
