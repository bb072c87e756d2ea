// src/engine/registry.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::model::DefinitionFile;
use crate::dag::{FlowChanges, TaskId, TaskStatus, flow};
use crate::engine::job::{GraphSnapshot, Job, JobHandle, JobId, JobStatus};
use crate::engine::{FlowRequest, LaunchRequest, TaskOutcome};
use crate::errors::{FlowgraphError, Result};

/// Result of reporting a task completion to its job.
#[derive(Debug, Clone, Default)]
pub struct JobStep {
    /// Status the reported task ended up in.
    pub status: Option<TaskStatus>,
    /// The task ran out of executions.
    pub exhausted: bool,
    /// Graph changes made by the task's flow action.
    pub flow: Option<FlowChanges>,
    /// Tasks aborted because of this report.
    pub aborted: Vec<TaskId>,
    /// Tasks to hand to the launcher now.
    pub launch: Vec<LaunchRequest>,
    /// Every task of the job is terminal.
    pub job_done: bool,
}

/// All jobs known to this process.
///
/// The map itself is behind a `RwLock`; each job carries its own lock, so
/// different jobs progress independently.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<JobHandle>>>,
    next_id: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job built from `def`. Returns its id and its root tasks.
    ///
    /// Nothing is dispatched yet; see [`dispatch_ready`](Self::dispatch_ready).
    pub fn submit_job(&self, def: &DefinitionFile) -> Result<(JobId, Vec<TaskId>)> {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let job = Job::new(id, def)?;
        let roots = job.graph().roots();

        info!(job = %id, name = %job.name(), tasks = job.graph().len(), "job submitted");

        self.jobs
            .write()
            .map_err(|_| FlowgraphError::Other(anyhow::anyhow!("job registry lock poisoned")))?
            .insert(id, Arc::new(JobHandle::new(job)));

        Ok((id, roots))
    }

    pub fn handle(&self, job: JobId) -> Result<Arc<JobHandle>> {
        self.jobs
            .read()
            .map_err(|_| FlowgraphError::Other(anyhow::anyhow!("job registry lock poisoned")))?
            .get(&job)
            .cloned()
            .ok_or_else(|| FlowgraphError::JobNotFound(job.to_string()))
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .read()
            .map(|jobs| jobs.keys().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Whether every registered job is finished or killed.
    pub fn all_done(&self) -> bool {
        self.job_ids().into_iter().all(|id| {
            self.handle(id)
                .and_then(|h| h.lock().map(|job| job.status() != JobStatus::Running))
                .unwrap_or(true)
        })
    }

    /// Promote ready tasks and hand back everything that should be launched.
    pub fn dispatch_ready(&self, job: JobId) -> Result<Vec<LaunchRequest>> {
        let handle = self.handle(job)?;
        if handle.is_killed() {
            return Ok(Vec::new());
        }
        let mut guard = handle.lock()?;
        guard.promote_ready()?;
        guard.dispatch_pending(Utc::now())
    }

    /// Apply a task's outcome to its job.
    ///
    /// Runs the state machine transition, the task's flow action on success,
    /// failure propagation, and dispatch of whatever became ready.
    pub fn on_task_finished(&self, job: JobId, task: TaskId, outcome: TaskOutcome) -> Result<JobStep> {
        let handle = self.handle(job)?;
        let mut guard = handle.lock()?;
        let now = Utc::now();
        let mut step = JobStep::default();

        let policy = guard.on_task_error;
        match outcome {
            TaskOutcome::Success { decision } => {
                let node = guard.graph.node(task)?;
                if node.status() != TaskStatus::Running {
                    return Err(FlowgraphError::InvalidTransition {
                        task: node.name().to_string(),
                        from: node.status(),
                        to: "Finished",
                    });
                }
                let action = node.flow_action().clone();

                if action.is_none() || handle.is_killed() {
                    guard.graph.node_mut(task)?.on_success(now)?;
                } else {
                    let decision = decision.unwrap_or_else(|| action.default_decision());
                    match flow::apply(&mut guard.graph, task, decision) {
                        Ok(changes) => {
                            guard.graph.node_mut(task)?.on_success(now)?;
                            step.flow = Some(changes);
                        }
                        Err(err) => {
                            warn!(job = %job, task = %task, error = %err, "flow action failed");
                            guard.graph.node_mut(task)?.on_flow_error(now)?;
                            step.aborted = guard.abort_downstream(task, now)?;
                        }
                    }
                }
            }
            TaskOutcome::FlowError(message) => {
                warn!(job = %job, task = %task, error = %message, "flow script failed");
                guard.graph.node_mut(task)?.on_flow_error(now)?;
                step.aborted = guard.abort_downstream(task, now)?;
            }
            TaskOutcome::ExecutableError(message) => {
                debug!(job = %job, task = %task, error = %message, "executable error reported");
                let status = guard.graph.node_mut(task)?.on_executable_error(policy, now)?;
                if status == TaskStatus::Faulty {
                    step.exhausted = true;
                    step.aborted = guard.abort_downstream(task, now)?;
                }
            }
            TaskOutcome::NodeFailure(message) => {
                debug!(job = %job, task = %task, error = %message, "node failure reported");
                let status = guard.graph.node_mut(task)?.on_node_failure()?;
                if status == TaskStatus::Failed {
                    step.exhausted = true;
                    step.aborted = guard.abort_downstream(task, now)?;
                }
            }
        }

        step.status = Some(guard.graph.node(task)?.status());

        if handle.is_killed() {
            step.aborted.extend(guard.abort_idle(now)?);
        } else {
            guard.promote_ready()?;
            step.launch = guard.dispatch_pending(now)?;
        }

        step.job_done = guard.refresh_status(handle.is_killed());
        if step.job_done {
            info!(job = %job, status = ?guard.status(), "job complete");
        }

        Ok(step)
    }

    /// Flow script evaluation needed before `task`'s outcome can be applied,
    /// if any.
    pub fn flow_request(&self, job: JobId, task: TaskId) -> Result<Option<FlowRequest>> {
        let handle = self.handle(job)?;
        if handle.is_killed() {
            return Ok(None);
        }
        let guard = handle.lock()?;
        let node = guard.graph.node(task)?;
        if node.flow_action().is_none() {
            return Ok(None);
        }
        Ok(Some(FlowRequest {
            job,
            task,
            name: node.name().to_string(),
            action: node.flow_action().clone(),
            script: node.flow_script().map(str::to_string),
        }))
    }

    /// Raise the kill flag and abort everything not already running.
    ///
    /// Running tasks still report back; their flow actions are ignored.
    pub fn kill_job(&self, job: JobId) -> Result<Vec<TaskId>> {
        let handle = self.handle(job)?;
        handle.kill();

        let mut guard = handle.lock()?;
        let aborted = guard.abort_idle(Utc::now())?;
        guard.refresh_status(true);
        info!(job = %job, aborted = aborted.len(), "job killed");
        Ok(aborted)
    }

    /// Relaunch a task parked `InError`.
    pub fn restart_in_error(&self, job: JobId, task: TaskId) -> Result<LaunchRequest> {
        let handle = self.handle(job)?;
        let mut guard = handle.lock()?;
        let node = guard.graph.node_mut(task)?;
        if node.status() != TaskStatus::InError {
            return Err(FlowgraphError::InvalidTransition {
                task: node.name().to_string(),
                from: node.status(),
                to: "Running",
            });
        }
        node.on_dispatch(Utc::now())?;
        debug!(job = %job, task = %task, "task restarted");
        guard.launch_request(task)
    }

    /// Copy of the job graph as it is right now.
    pub fn snapshot_graph(&self, job: JobId) -> Result<Arc<GraphSnapshot>> {
        let handle = self.handle(job)?;
        let guard = handle.lock()?;
        Ok(Arc::new(guard.snapshot()))
    }
}
