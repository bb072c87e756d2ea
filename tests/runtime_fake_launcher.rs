// tests/runtime_fake_launcher.rs

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use flowgraph::config::DefinitionFile;
use flowgraph::dag::{BranchChoice, FlowDecision, TaskStatus};
use flowgraph::engine::{
    CoreRuntime, GraphSnapshot, JobId, JobRegistry, JobStatus, Runtime, RuntimeEvent,
    RuntimeOptions, TaskOutcome,
};
use flowgraph::exec::{JobStore, MemoryJobStore, ScriptResolver};
use flowgraph_test_utils::builders::{DefinitionBuilder, TaskBuilder};
use flowgraph_test_utils::fake_launcher::{
    DefaultDecisionResolver, FailingResolver, FakeLauncher, OutcomePlan,
};
use flowgraph_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

struct RunResult {
    launched: Vec<String>,
    snapshot: Arc<GraphSnapshot>,
    stored: Option<String>,
}

/// Run `def` to completion with a fake launcher following `plan`.
async fn run_job(def: &DefinitionFile, plan: OutcomePlan) -> Result<RunResult, Box<dyn Error>> {
    run_job_with(def, plan, DefaultDecisionResolver).await
}

async fn run_job_with<S: ScriptResolver>(
    def: &DefinitionFile,
    plan: OutcomePlan,
    resolver: S,
) -> Result<RunResult, Box<dyn Error>> {
    let registry = Arc::new(JobRegistry::new());
    let (job, _roots) = registry.submit_job(def)?;

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let launched = Arc::new(Mutex::new(Vec::new()));
    let launcher = FakeLauncher::new(rt_tx.clone(), launched.clone(), plan);
    let store = Arc::new(MemoryJobStore::new());

    rt_tx.send(RuntimeEvent::JobSubmitted { job }).await?;

    let core = CoreRuntime::new(
        registry.clone(),
        RuntimeOptions {
            exit_when_idle: true,
        },
    );
    let runtime = Runtime::new(core, rt_rx, launcher, resolver, store.clone());

    with_timeout(Duration::from_secs(3), runtime.run()).await?;

    let launched = launched.lock().unwrap().clone();
    Ok(RunResult {
        launched,
        snapshot: registry.snapshot_graph(job)?,
        stored: store.load(job)?,
    })
}

fn dep_names(snapshot: &GraphSnapshot, task: &str) -> Vec<String> {
    let view = snapshot.task(task).unwrap();
    view.dependencies
        .iter()
        .map(|d| {
            snapshot
                .tasks
                .iter()
                .find(|t| t.id == *d)
                .map(|t| t.name.clone())
                .unwrap()
        })
        .collect()
}

#[tokio::test]
async fn runs_simple_chain() -> TestResult {
    init_tracing();

    let def = DefinitionBuilder::new()
        .with_task("A", TaskBuilder::new("echo A").build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .build();

    let result = run_job(&def, OutcomePlan::new()).await?;

    assert_eq!(result.launched, vec!["A", "B"]);
    assert_eq!(result.snapshot.status, JobStatus::Finished);
    assert_eq!(result.snapshot.job, JobId(1));

    let stored = result.stored.expect("snapshot persisted");
    assert!(stored.contains("status = \"finished\""), "{stored}");
    Ok(())
}

#[tokio::test]
async fn loop_runs_body_until_script_says_stop() -> TestResult {
    init_tracing();

    let def = DefinitionBuilder::new()
        .with_task("A", TaskBuilder::new("echo A").build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .with_task("C", TaskBuilder::new("echo C").after("B").flow_loop("A").build())
        .with_task("D", TaskBuilder::new("echo D").after("C").build())
        .build();

    let plan = OutcomePlan::new();
    plan.decide("C", FlowDecision::Loop)
        .decide("C", FlowDecision::Loop);

    let result = run_job(&def, plan).await?;

    assert_eq!(
        result.launched,
        vec!["A", "B", "C", "A#1", "B#1", "C#1", "A#2", "B#2", "C#2", "D"]
    );
    assert_eq!(result.snapshot.tasks.len(), 10);
    assert_eq!(result.snapshot.count_with_status(TaskStatus::Finished), 10);
    assert_eq!(dep_names(&result.snapshot, "D"), vec!["C#2"]);
    assert_eq!(dep_names(&result.snapshot, "A#2"), vec!["C#1"]);
    Ok(())
}

#[tokio::test]
async fn if_else_skips_the_then_branch() -> TestResult {
    init_tracing();

    let def = DefinitionBuilder::new()
        .with_task("A", TaskBuilder::new("echo A").flow_if("B", "C", Some("D")).build())
        .with_task("B", TaskBuilder::new("echo B").build())
        .with_task("C", TaskBuilder::new("echo C").build())
        .with_task("D", TaskBuilder::new("echo D").build())
        .build();

    let plan = OutcomePlan::new();
    plan.decide(
        "A",
        FlowDecision::If {
            branch: BranchChoice::Else,
        },
    );

    let result = run_job(&def, plan).await?;

    assert_eq!(result.launched, vec!["A", "C", "D"]);
    assert_eq!(result.snapshot.task("B").unwrap().status, TaskStatus::Skipped);
    assert_eq!(result.snapshot.task("D").unwrap().status, TaskStatus::Finished);
    assert_eq!(result.snapshot.status, JobStatus::Finished);
    Ok(())
}

#[tokio::test]
async fn replicate_default_decision_uses_configured_runs() -> TestResult {
    init_tracing();

    let def = DefinitionBuilder::new()
        .with_task("A", TaskBuilder::new("echo A").flow_replicate(2).build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .with_task("C", TaskBuilder::new("echo C").after("B").build())
        .build();

    let result = run_job(&def, OutcomePlan::new()).await?;

    let mut body: Vec<&str> = result.launched[1..4].iter().map(String::as_str).collect();
    body.sort();
    assert_eq!(body, vec!["B", "B*1", "B*2"]);
    assert_eq!(result.launched.last().map(String::as_str), Some("C"));
    assert_eq!(dep_names(&result.snapshot, "C"), vec!["B", "B*1", "B*2"]);
    Ok(())
}

#[tokio::test]
async fn failing_task_is_retried_then_chain_continues() -> TestResult {
    init_tracing();

    let def = DefinitionBuilder::new()
        .max_executions(2)
        .with_task("A", TaskBuilder::new("flaky").build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .build();

    let plan = OutcomePlan::new();
    plan.push("A", TaskOutcome::ExecutableError("exit 1".into()));

    let result = run_job(&def, plan).await?;

    assert_eq!(result.launched, vec!["A", "A", "B"]);
    assert_eq!(result.snapshot.task("A").unwrap().executions_left, 1);
    Ok(())
}

#[tokio::test]
async fn exhausted_task_ends_the_job_with_aborts() -> TestResult {
    init_tracing();

    let def = DefinitionBuilder::new()
        .with_task("A", TaskBuilder::new("broken").build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .build();

    let plan = OutcomePlan::new();
    plan.push("A", TaskOutcome::ExecutableError("exit 1".into()));

    let result = run_job(&def, plan).await?;

    assert_eq!(result.launched, vec!["A"]);
    assert_eq!(result.snapshot.task("A").unwrap().status, TaskStatus::Faulty);
    assert_eq!(result.snapshot.task("B").unwrap().status, TaskStatus::Aborted);
    Ok(())
}

#[tokio::test]
async fn failing_flow_script_makes_the_task_faulty() -> TestResult {
    init_tracing();

    let def = DefinitionBuilder::new()
        .with_task("A", TaskBuilder::new("echo A").flow_loop("A").build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .build();

    let result = run_job_with(&def, OutcomePlan::new(), FailingResolver).await?;

    assert_eq!(result.launched, vec!["A"]);
    assert_eq!(result.snapshot.tasks.len(), 2);
    assert_eq!(result.snapshot.task("A").unwrap().status, TaskStatus::Faulty);
    assert_eq!(result.snapshot.task("B").unwrap().status, TaskStatus::Aborted);
    assert_eq!(result.snapshot.status, JobStatus::Finished);
    Ok(())
}
