// tests/script_and_store.rs

use std::error::Error;
use std::time::Duration;

use tempfile::tempdir;

use flowgraph::dag::{BranchChoice, FlowAction, FlowDecision, TaskId};
use flowgraph::engine::{FlowRequest, JobId, JobRegistry};
use flowgraph::exec::{
    CommandScriptResolver, FileJobStore, JOB_DIR_PATH, JobStore, MemoryJobStore, ScriptResolver,
    parse_decision, store_for_mode,
};
use flowgraph::types::JobStoreMode;
use flowgraph_test_utils::builders::{DefinitionBuilder, TaskBuilder};
use flowgraph_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn loop_action() -> FlowAction {
    FlowAction::Loop {
        target: "A".into(),
    }
}

fn if_action() -> FlowAction {
    FlowAction::If {
        target: "B".into(),
        target_else: "C".into(),
        join: None,
    }
}

#[test]
fn loop_decision_needs_explicit_true() {
    assert_eq!(parse_decision(&loop_action(), "loop=true\n"), FlowDecision::Loop);
    assert_eq!(parse_decision(&loop_action(), "loop = \"TRUE\""), FlowDecision::Loop);
    assert_eq!(parse_decision(&loop_action(), "loop=false"), FlowDecision::Continue);
    assert_eq!(parse_decision(&loop_action(), "loop=yes"), FlowDecision::Continue);
    assert_eq!(parse_decision(&loop_action(), ""), FlowDecision::Continue);
}

#[test]
fn last_matching_line_wins() {
    let output = "progress 10%\nloop=true\nsome noise\nloop=false\n";
    assert_eq!(parse_decision(&loop_action(), output), FlowDecision::Continue);
}

#[test]
fn branch_decisions() {
    let then = FlowDecision::If {
        branch: BranchChoice::Then,
    };
    let otherwise = FlowDecision::If {
        branch: BranchChoice::Else,
    };

    assert_eq!(parse_decision(&if_action(), "branch=else"), otherwise);
    assert_eq!(parse_decision(&if_action(), "branch='if'"), then);
    assert_eq!(parse_decision(&if_action(), "branch=then"), then);
    // Unknown values keep the default.
    assert_eq!(parse_decision(&if_action(), "branch=maybe"), then);
}

#[test]
fn runs_decisions() {
    let action = FlowAction::Replicate { runs: 2 };
    assert_eq!(
        parse_decision(&action, "runs=5"),
        FlowDecision::Replicate { runs: 5 }
    );
    assert_eq!(
        parse_decision(&action, "runs=lots"),
        FlowDecision::Replicate { runs: 2 }
    );
    assert_eq!(
        parse_decision(&action, "runs=0"),
        FlowDecision::Replicate { runs: 0 }
    );
}

#[test]
fn keys_for_other_actions_are_ignored() {
    assert_eq!(parse_decision(&loop_action(), "branch=else"), FlowDecision::Continue);
    assert_eq!(
        parse_decision(&if_action(), "loop=true"),
        FlowDecision::If {
            branch: BranchChoice::Then
        }
    );
}

fn request(action: FlowAction, script: Option<&str>) -> FlowRequest {
    FlowRequest {
        job: JobId(1),
        task: TaskId(0),
        name: "A".into(),
        action,
        script: script.map(str::to_string),
    }
}

#[tokio::test]
async fn resolver_without_script_uses_default() -> TestResult {
    let mut resolver = CommandScriptResolver::default();
    let decision = resolver.resolve(request(if_action(), None)).await?;
    assert_eq!(
        decision,
        FlowDecision::If {
            branch: BranchChoice::Then
        }
    );
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn resolver_reads_script_output() -> TestResult {
    init_tracing();
    let mut resolver = CommandScriptResolver::default();

    let decision = resolver
        .resolve(request(loop_action(), Some("echo working; echo loop=true")))
        .await?;
    assert_eq!(decision, FlowDecision::Loop);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn failing_script_is_an_error() {
    let mut resolver = CommandScriptResolver::default();
    let result = resolver.resolve(request(loop_action(), Some("exit 3"))).await;
    assert!(result.is_err());
}

#[cfg(unix)]
#[tokio::test]
async fn slow_script_times_out() {
    let mut resolver = CommandScriptResolver::new(Duration::from_millis(100));
    let result = resolver.resolve(request(loop_action(), Some("sleep 5"))).await;
    assert!(result.is_err());
}

fn finished_snapshot_registry() -> (JobRegistry, JobId) {
    let def = DefinitionBuilder::new()
        .job_name("persisted")
        .with_task("A", TaskBuilder::new("echo A").build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .build();
    let registry = JobRegistry::new();
    let (job, _) = registry.submit_job(&def).unwrap();
    (registry, job)
}

#[test]
fn file_store_writes_toml_snapshots() -> TestResult {
    let dir = tempdir()?;
    let store = FileJobStore::new(dir.path().to_path_buf());
    let (registry, job) = finished_snapshot_registry();

    assert!(store.load(job)?.is_none());

    store.persist(&*registry.snapshot_graph(job)?)?;

    let path = store.path_for(job);
    assert_eq!(path, dir.path().join(JOB_DIR_PATH).join("job-1.toml"));
    assert!(path.exists());

    let stored = store.load(job)?.expect("snapshot on disk");
    let value: toml::Value = toml::from_str(&stored)?;
    assert_eq!(value["name"].as_str(), Some("persisted"));
    assert_eq!(value["status"].as_str(), Some("running"));
    let tasks = value["tasks"].as_array().expect("tasks array");
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["name"].as_str(), Some("A"));
    assert_eq!(tasks[0]["status"].as_str(), Some("submitted"));
    Ok(())
}

#[test]
fn file_store_overwrites_previous_snapshot() -> TestResult {
    let dir = tempdir()?;
    let store = FileJobStore::new(dir.path().to_path_buf());
    let (registry, job) = finished_snapshot_registry();

    store.persist(&*registry.snapshot_graph(job)?)?;
    registry.dispatch_ready(job)?;
    store.persist(&*registry.snapshot_graph(job)?)?;

    let stored = store.load(job)?.expect("snapshot on disk");
    assert!(stored.contains("status = \"running\""));
    let value: toml::Value = toml::from_str(&stored)?;
    assert_eq!(value["tasks"][0]["status"].as_str(), Some("running"));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join(JOB_DIR_PATH))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn memory_store_keeps_latest_snapshot() -> TestResult {
    let store = MemoryJobStore::new();
    let (registry, job) = finished_snapshot_registry();

    assert!(store.load(job)?.is_none());
    store.persist(&*registry.snapshot_graph(job)?)?;

    let stored = store.load(job)?.expect("snapshot in memory");
    assert!(stored.contains("persisted"));
    assert!(store.load(JobId(2))?.is_none());
    Ok(())
}

#[test]
fn store_mode_selects_implementation() -> TestResult {
    let dir = tempdir()?;
    let (registry, job) = finished_snapshot_registry();
    let snapshot = registry.snapshot_graph(job)?;

    let file = store_for_mode(JobStoreMode::File, dir.path().to_path_buf());
    file.persist(&snapshot)?;
    assert!(dir.path().join(JOB_DIR_PATH).join("job-1.toml").exists());

    let memory = store_for_mode(JobStoreMode::Memory, dir.path().join("unused"));
    memory.persist(&snapshot)?;
    assert!(!dir.path().join("unused").exists());
    assert!(memory.load(job)?.is_some());
    Ok(())
}
