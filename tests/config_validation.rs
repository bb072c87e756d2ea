// tests/config_validation.rs

use std::error::Error;
use std::fs;

use tempfile::tempdir;

use flowgraph::config::{FlowConfig, load_and_validate, load_from_str};
use flowgraph::errors::FlowgraphError;
use flowgraph::types::{FlowBlock, JobStoreMode, OnTaskError};

type TestResult = Result<(), Box<dyn Error>>;

fn load(contents: &str) -> flowgraph::errors::Result<flowgraph::config::DefinitionFile> {
    let dir = tempdir()?;
    let path = dir.path().join("Flowgraph.toml");
    fs::write(&path, contents)?;
    load_and_validate(&path)
}

#[test]
fn full_definition_loads_with_defaults() -> TestResult {
    let def = load(
        r#"
        [job]
        name = "nightly"
        on_task_error = "suspend"
        store = "file"

        [task.A]
        cmd = "echo A"
        flow = { type = "if", target = "B", else = "C", join = "D" }

        [task.B]
        cmd = "echo B"

        [task.C]
        cmd = "echo C"
        block = "start"
        matching_block = "E"

        [task.E]
        cmd = "echo E"
        after = ["C"]
        block = "end"
        matching_block = "C"

        [task.D]
        cmd = "echo D"
        max_executions = 3
        "#,
    )?;

    assert_eq!(def.job.name, "nightly");
    assert_eq!(def.job.on_task_error, OnTaskError::Suspend);
    assert_eq!(def.job.store, JobStoreMode::File);
    assert_eq!(def.job.max_executions, 1);
    assert_eq!(def.job.max_executions_on_failure, 2);

    assert_eq!(def.task["C"].block, FlowBlock::Start);
    assert_eq!(def.task["E"].matching_block.as_deref(), Some("C"));
    assert_eq!(def.task["D"].effective_limits(&def.job).max_executions, 3);
    assert_eq!(def.task["B"].effective_limits(&def.job).max_executions, 1);

    match def.task["A"].flow.as_ref() {
        Some(FlowConfig::If {
            target,
            target_else,
            join,
            script,
        }) => {
            assert_eq!(target, "B");
            assert_eq!(target_else, "C");
            assert_eq!(join.as_deref(), Some("D"));
            assert!(script.is_none());
        }
        other => panic!("expected IF action, got {:?}", other),
    }

    Ok(())
}

#[test]
fn replicate_runs_defaults_to_one() -> TestResult {
    let raw = load_from_str(
        r#"
        [task.A]
        flow = { type = "replicate" }
        "#,
    )?;
    assert!(matches!(
        raw.task["A"].flow,
        Some(FlowConfig::Replicate { runs: 1, .. })
    ));
    Ok(())
}

#[test]
fn rejects_dependency_cycle() {
    let err = load(
        r#"
        [task.A]
        after = ["B"]

        [task.B]
        after = ["A"]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::DependencyCycle(_)), "{err}");
}

#[test]
fn rejects_unknown_dependency() {
    let err = load(
        r#"
        [task.A]
        after = ["missing"]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::ConfigError(_)), "{err}");
}

#[test]
fn rejects_unknown_flow_target() {
    let err = load(
        r#"
        [task.A]
        flow = { type = "loop", target = "nope" }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::InvalidFlowTarget(_)), "{err}");
}

#[test]
fn rejects_loop_target_that_is_not_upstream() {
    let err = load(
        r#"
        [task.A]

        [task.B]

        [task.C]
        after = ["A"]
        flow = { type = "loop", target = "B" }
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::InvalidFlowTarget(_)), "{err}");
}

#[test]
fn accepts_self_loop() -> TestResult {
    load(
        r#"
        [task.A]
        flow = { type = "loop", target = "A" }
        "#,
    )?;
    Ok(())
}

#[test]
fn rejects_if_branch_with_after() {
    let err = load(
        r#"
        [task.A]
        flow = { type = "if", target = "B", else = "C" }

        [task.B]
        after = ["A"]

        [task.C]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::InvalidFlowTarget(_)), "{err}");
}

#[test]
fn rejects_if_with_identical_branches() {
    let err = load(
        r#"
        [task.A]
        flow = { type = "if", target = "B", else = "B" }

        [task.B]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::InvalidFlowTarget(_)), "{err}");
}

#[test]
fn rejects_unmatched_block() {
    let err = load(
        r#"
        [task.A]
        block = "start"
        matching_block = "B"

        [task.B]
        after = ["A"]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::ConfigError(_)), "{err}");
}

#[test]
fn rejects_block_without_partner() {
    let err = load(
        r#"
        [task.A]
        block = "end"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::ConfigError(_)), "{err}");
}

#[test]
fn rejects_reserved_characters_in_names() {
    let err = load(
        r#"
        [task."build#1"]
        cmd = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::ConfigError(_)), "{err}");

    let err = load(
        r#"
        [task."build*2"]
        cmd = "true"
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::ConfigError(_)), "{err}");
}

#[test]
fn rejects_zero_executions() {
    let err = load(
        r#"
        [job]
        max_executions = 0

        [task.A]
        "#,
    )
    .unwrap_err();
    assert!(matches!(err, FlowgraphError::ConfigError(_)), "{err}");
}

#[test]
fn rejects_empty_definition() {
    let err = load("[job]\nname = \"empty\"\n").unwrap_err();
    assert!(matches!(err, FlowgraphError::ConfigError(_)), "{err}");
}

#[test]
fn reports_toml_syntax_errors() {
    let err = load("[task.A\ncmd = 1").unwrap_err();
    assert!(matches!(err, FlowgraphError::TomlError(_)), "{err}");
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, FlowgraphError::IoError(_)), "{err}");
}
