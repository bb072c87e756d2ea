// src/engine/job.rs

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::model::DefinitionFile;
use crate::dag::{TaskGraph, TaskId, TaskNode, TaskStatus};
use crate::engine::LaunchRequest;
use crate::errors::{FlowgraphError, Result};
use crate::types::OnTaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
    Killed,
}

/// One submitted workflow and its live graph.
#[derive(Debug, Clone)]
pub struct Job {
    pub(crate) id: JobId,
    pub(crate) name: String,
    pub(crate) on_task_error: OnTaskError,
    pub(crate) graph: TaskGraph,
    pub(crate) status: JobStatus,
    pub(crate) submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(id: JobId, def: &DefinitionFile) -> Result<Self> {
        Ok(Self {
            id,
            name: def.job.name.clone(),
            on_task_error: def.job.on_task_error,
            graph: TaskGraph::from_definition(def)?,
            status: JobStatus::Running,
            submitted_at: Utc::now(),
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Move every ready `Submitted` task to `Pending`.
    pub(crate) fn promote_ready(&mut self) -> Result<Vec<TaskId>> {
        let ready: Vec<TaskId> = self
            .graph
            .task_ids()
            .iter()
            .copied()
            .filter(|id| self.graph.is_ready(*id))
            .collect();

        for id in ready.iter() {
            self.graph.node_mut(*id)?.mark_pending()?;
        }
        Ok(ready)
    }

    /// Dispatch every `Pending` task.
    pub(crate) fn dispatch_pending(&mut self, now: DateTime<Utc>) -> Result<Vec<LaunchRequest>> {
        let pending: Vec<TaskId> = self
            .graph
            .tasks()
            .filter(|t| t.status() == TaskStatus::Pending)
            .map(TaskNode::id)
            .collect();

        let mut launches = Vec::with_capacity(pending.len());
        for id in pending {
            let node = self.graph.node_mut(id)?;
            node.on_dispatch(now)?;
            launches.push(self.launch_request(id)?);
        }
        Ok(launches)
    }

    pub(crate) fn launch_request(&self, task: TaskId) -> Result<LaunchRequest> {
        let node = self.graph.node(task)?;
        Ok(LaunchRequest {
            job: self.id,
            task,
            name: node.name().to_string(),
            command: node.command().map(str::to_string),
        })
    }

    /// Abort every task still waiting downstream of `failed`.
    pub(crate) fn abort_downstream(&mut self, failed: TaskId, now: DateTime<Utc>) -> Result<Vec<TaskId>> {
        let mut aborted = Vec::new();
        let mut frontier = vec![failed];

        while let Some(id) = frontier.pop() {
            for next in self.graph.downstream_of(id) {
                let node = self.graph.node_mut(next)?;
                if matches!(node.status(), TaskStatus::Submitted | TaskStatus::Pending) {
                    node.abort(now)?;
                    aborted.push(next);
                    frontier.push(next);
                }
            }
        }

        if !aborted.is_empty() {
            warn!(job = %self.id, count = aborted.len(), "aborted tasks downstream of a failure");
        }
        Ok(aborted)
    }

    /// Abort everything that has not started; running tasks are left to
    /// report back.
    pub(crate) fn abort_idle(&mut self, now: DateTime<Utc>) -> Result<Vec<TaskId>> {
        let idle: Vec<TaskId> = self
            .graph
            .tasks()
            .filter(|t| !t.status().is_terminal() && t.status() != TaskStatus::Running)
            .map(TaskNode::id)
            .collect();

        for id in idle.iter() {
            self.graph.node_mut(*id)?.abort(now)?;
        }
        Ok(idle)
    }

    /// Update the job status once every task is terminal.
    pub(crate) fn refresh_status(&mut self, killed: bool) -> bool {
        if self.status == JobStatus::Running && self.graph.all_terminal() {
            self.status = if killed {
                JobStatus::Killed
            } else {
                JobStatus::Finished
            };
            debug!(job = %self.id, status = ?self.status, "job done");
        }
        self.status != JobStatus::Running
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            job: self.id,
            name: self.name.clone(),
            status: self.status,
            submitted_at: self.submitted_at,
            taken_at: Utc::now(),
            tasks: self.graph.tasks().map(TaskView::from).collect(),
        }
    }
}

/// Shared, lockable handle on a job.
///
/// All graph mutation happens under `job`; `killed` can be raised without
/// taking the lock.
#[derive(Debug)]
pub struct JobHandle {
    job: Mutex<Job>,
    killed: AtomicBool,
}

impl JobHandle {
    pub fn new(job: Job) -> Self {
        Self {
            job: Mutex::new(job),
            killed: AtomicBool::new(false),
        }
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Job>> {
        self.job
            .lock()
            .map_err(|_| FlowgraphError::Other(anyhow::anyhow!("job lock poisoned")))
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

/// Point-in-time copy of a job graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub job: JobId,
    pub name: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
    pub tasks: Vec<TaskView>,
}

impl GraphSnapshot {
    pub fn task(&self, name: &str) -> Option<&TaskView> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskView {
    pub id: TaskId,
    pub name: String,
    pub iteration: u32,
    pub replication: u32,
    pub status: TaskStatus,
    pub dependencies: Vec<TaskId>,
    pub if_branch: Option<TaskId>,
    pub joined_branches: Vec<TaskId>,
    pub executions_left: u32,
    pub executions_on_failure_left: u32,
    pub replicated_from: Option<TaskId>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
}

impl From<&TaskNode> for TaskView {
    fn from(node: &TaskNode) -> Self {
        let info = node.info();
        Self {
            id: node.id(),
            name: node.name().to_string(),
            iteration: node.iteration_index(),
            replication: node.replication_index(),
            status: node.status(),
            dependencies: node.dependencies().to_vec(),
            if_branch: node.if_branch(),
            joined_branches: node.joined_branches().to_vec(),
            executions_left: info.executions_left,
            executions_on_failure_left: info.executions_on_failure_left,
            replicated_from: node.replicated_from(),
            start_time: info.start_time,
            finished_time: info.finished_time,
        }
    }
}
