// tests/core_runtime.rs

use std::sync::Arc;

use flowgraph::dag::TaskId;
use flowgraph::engine::{
    CoreCommand, CoreRuntime, JobId, JobRegistry, LaunchRequest, RuntimeEvent, RuntimeOptions,
    TaskOutcome,
};
use flowgraph::types::OnTaskError;
use flowgraph_test_utils::builders::{DefinitionBuilder, TaskBuilder};
use flowgraph_test_utils::init_tracing;

fn core_with_chain(exit_when_idle: bool) -> (CoreRuntime, JobId) {
    let def = DefinitionBuilder::new()
        .on_task_error(OnTaskError::Suspend)
        .max_executions(2)
        .with_task("A", TaskBuilder::new("echo A").build())
        .with_task("B", TaskBuilder::new("echo B").after("A").build())
        .build();
    let registry = Arc::new(JobRegistry::new());
    let (job, _) = registry.submit_job(&def).unwrap();
    let core = CoreRuntime::new(registry, RuntimeOptions { exit_when_idle });
    (core, job)
}

fn launched(commands: &[CoreCommand]) -> Vec<LaunchRequest> {
    commands
        .iter()
        .filter_map(|c| match c {
            CoreCommand::Launch(tasks) => Some(tasks.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

fn finished(job: JobId, task: TaskId, outcome: TaskOutcome) -> RuntimeEvent {
    RuntimeEvent::TaskFinished { job, task, outcome }
}

#[test]
fn job_submission_launches_roots_and_persists() {
    init_tracing();
    let (mut core, job) = core_with_chain(true);

    let step = core.step(RuntimeEvent::JobSubmitted { job });

    assert!(step.keep_running);
    let launch = launched(&step.commands);
    assert_eq!(launch.len(), 1);
    assert_eq!(launch[0].name, "A");
    assert_eq!(step.commands.last(), Some(&CoreCommand::Persist(job)));
}

#[test]
fn completion_walks_the_chain_then_requests_exit() {
    let (mut core, job) = core_with_chain(true);
    let a = launched(&core.step(RuntimeEvent::JobSubmitted { job }).commands)[0].task;

    let step = core.step(finished(job, a, TaskOutcome::Success { decision: None }));
    let launch = launched(&step.commands);
    assert_eq!(launch[0].name, "B");
    assert!(step.keep_running);
    assert!(!core.is_idle());

    let step = core.step(finished(
        job,
        launch[0].task,
        TaskOutcome::Success { decision: None },
    ));
    assert!(!step.keep_running);
    assert_eq!(
        step.commands,
        vec![CoreCommand::Persist(job), CoreCommand::RequestExit]
    );
    assert!(core.is_idle());
}

#[test]
fn without_exit_when_idle_the_core_keeps_running() {
    let (mut core, job) = core_with_chain(false);
    let a = launched(&core.step(RuntimeEvent::JobSubmitted { job }).commands)[0].task;
    let b = launched(
        &core
            .step(finished(job, a, TaskOutcome::Success { decision: None }))
            .commands,
    )[0]
        .task;

    let step = core.step(finished(job, b, TaskOutcome::Success { decision: None }));

    assert!(step.keep_running);
    assert!(!step.commands.contains(&CoreCommand::RequestExit));
    assert!(core.is_idle());
}

#[test]
fn restart_event_relaunches_suspended_task() {
    let (mut core, job) = core_with_chain(true);
    let a = launched(&core.step(RuntimeEvent::JobSubmitted { job }).commands)[0].task;

    let step = core.step(finished(job, a, TaskOutcome::ExecutableError("boom".into())));
    assert!(launched(&step.commands).is_empty());
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::RestartInError { job, task: a });
    let launch = launched(&step.commands);
    assert_eq!(launch.len(), 1);
    assert_eq!(launch[0].task, a);
}

#[test]
fn kill_event_finishes_idle_job() {
    let (mut core, job) = core_with_chain(true);

    let step = core.step(RuntimeEvent::KillJob { job });

    assert!(!step.keep_running);
    assert!(step.commands.contains(&CoreCommand::Persist(job)));
    assert!(core.is_idle());
}

#[test]
fn reports_for_unknown_jobs_are_ignored() {
    let (mut core, job) = core_with_chain(true);
    core.step(RuntimeEvent::JobSubmitted { job });

    let step = core.step(finished(
        JobId(99),
        TaskId(0),
        TaskOutcome::Success { decision: None },
    ));

    assert!(step.commands.is_empty());
    assert!(step.keep_running);
}

#[test]
fn shutdown_stops_the_core() {
    let (mut core, _job) = core_with_chain(true);
    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(!step.keep_running);
    assert!(step.commands.is_empty());
}
