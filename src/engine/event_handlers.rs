// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, warn};

use crate::dag::TaskId;
use crate::engine::{JobId, JobRegistry, LaunchRequest, RuntimeOptions, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Hand these tasks to the launcher.
    Launch(Vec<LaunchRequest>),
    /// Write a snapshot of this job to the job store.
    Persist(JobId),
    /// Request that the process exits (every job is done).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn running(commands: Vec<CoreCommand>) -> Self {
        Self {
            commands,
            keep_running: true,
        }
    }
}

/// Launch the roots of a freshly submitted job.
pub fn handle_job_submitted(registry: &JobRegistry, job: JobId) -> CoreStep {
    let mut commands = Vec::new();

    match registry.dispatch_ready(job) {
        Ok(launch) => {
            debug!(job = %job, launched = launch.len(), "initial dispatch");
            if !launch.is_empty() {
                commands.push(CoreCommand::Launch(launch));
            }
            commands.push(CoreCommand::Persist(job));
        }
        Err(err) => warn!(job = %job, error = %err, "cannot dispatch submitted job"),
    }

    CoreStep::running(commands)
}

/// Apply a task report.
///
/// Errors are logged and otherwise ignored: a bad report (unknown job,
/// stale task) must not take the runtime down.
pub fn handle_task_finished(
    registry: &JobRegistry,
    options: &RuntimeOptions,
    job: JobId,
    task: TaskId,
    outcome: TaskOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    match registry.on_task_finished(job, task, outcome) {
        Ok(step) => {
            if step.exhausted {
                warn!(job = %job, task = %task, status = ?step.status, "task out of executions");
            }
            if !step.launch.is_empty() {
                commands.push(CoreCommand::Launch(step.launch));
            }
            commands.push(CoreCommand::Persist(job));
        }
        Err(err) => {
            warn!(job = %job, task = %task, error = %err, "ignoring task report");
        }
    }

    finish_step(registry, options, commands)
}

pub fn handle_kill_job(registry: &JobRegistry, options: &RuntimeOptions, job: JobId) -> CoreStep {
    let mut commands = Vec::new();

    match registry.kill_job(job) {
        Ok(_) => commands.push(CoreCommand::Persist(job)),
        Err(err) => warn!(job = %job, error = %err, "cannot kill job"),
    }

    finish_step(registry, options, commands)
}

pub fn handle_restart_in_error(registry: &JobRegistry, job: JobId, task: TaskId) -> CoreStep {
    let mut commands = Vec::new();

    match registry.restart_in_error(job, task) {
        Ok(launch) => {
            commands.push(CoreCommand::Launch(vec![launch]));
            commands.push(CoreCommand::Persist(job));
        }
        Err(err) => warn!(job = %job, task = %task, error = %err, "cannot restart task"),
    }

    CoreStep::running(commands)
}

// With `exit_when_idle`, stop once every job is done.
fn finish_step(
    registry: &JobRegistry,
    options: &RuntimeOptions,
    mut commands: Vec<CoreCommand>,
) -> CoreStep {
    let mut keep_running = true;
    if options.exit_when_idle && registry.all_done() {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
