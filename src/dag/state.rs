// src/dag/state.rs

//! Per-task execution state machine.
//!
//! ```text
//! Submitted -> Pending -> Running -> Finished | Faulty | Failed | Aborted
//!                 ^          |
//!                 +----------+   retry while budget remains
//!                            |
//!                         InError -> Running   (OnTaskError::Suspend)
//! ```
//!
//! `Skipped` marks the tasks of an IF branch that was not taken.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::dag::task::{ExecutionLimits, TaskNode};
use crate::errors::{FlowgraphError, Result};
use crate::types::OnTaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created; waiting for its dependencies.
    Submitted,
    /// Dependencies satisfied; waiting to be dispatched.
    Pending,
    /// Handed to the launcher.
    Running,
    /// Executable failed and the task is parked until restarted.
    InError,
    Finished,
    /// Executable failed with no executions left.
    Faulty,
    /// Execution node failed with no executions left.
    Failed,
    /// Will never run (upstream failure or killed job).
    Aborted,
    /// Part of an IF branch that was not taken.
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished
                | TaskStatus::Faulty
                | TaskStatus::Failed
                | TaskStatus::Aborted
                | TaskStatus::Skipped
        )
    }

    /// Whether a dependent may consider this task done.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Skipped)
    }

    /// Finished or skipped tasks are not candidates for flow targets.
    pub fn is_settled(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Skipped)
    }
}

/// Mutable execution information of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskInfo {
    pub status: TaskStatus,
    pub executions_left: u32,
    pub executions_on_failure_left: u32,
    pub progress: u8,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub finished_time: Option<DateTime<Utc>>,
    pub in_error_time: Option<DateTime<Utc>>,
}

impl TaskInfo {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            status: TaskStatus::Submitted,
            executions_left: limits.max_executions,
            executions_on_failure_left: limits.max_executions_on_failure,
            progress: 0,
            scheduled_time: None,
            start_time: None,
            finished_time: None,
            in_error_time: None,
        }
    }
}

impl TaskNode {
    pub fn status(&self) -> TaskStatus {
        self.info.status
    }

    /// `Submitted -> Pending`, once dependencies are satisfied.
    pub fn mark_pending(&mut self) -> Result<()> {
        self.expect_status(&[TaskStatus::Submitted], "Pending")?;
        self.info.status = TaskStatus::Pending;
        Ok(())
    }

    /// `Pending | InError -> Running`.
    pub fn on_dispatch(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect_status(&[TaskStatus::Pending, TaskStatus::InError], "Running")?;
        self.info.status = TaskStatus::Running;
        self.info.scheduled_time = Some(now);
        self.info.start_time = Some(now);
        self.info.in_error_time = None;
        debug!(task = %self.name, id = %self.id, "task dispatched");
        Ok(())
    }

    /// The node executing the task went down.
    ///
    /// Consumes one execution-on-failure; returns the resulting status
    /// (`Pending` for redispatch, `Failed` once the budget is exhausted).
    pub fn on_node_failure(&mut self) -> Result<TaskStatus> {
        self.expect_status(&[TaskStatus::Running], "Pending|Failed")?;
        self.info.executions_on_failure_left =
            self.info.executions_on_failure_left.saturating_sub(1);

        if self.info.executions_on_failure_left > 0 {
            self.info.status = TaskStatus::Pending;
            debug!(
                task = %self.name,
                left = self.info.executions_on_failure_left,
                "node failure; task will be redispatched"
            );
        } else {
            self.info.status = TaskStatus::Failed;
            warn!(task = %self.name, "node failure; retry budget exhausted");
        }
        Ok(self.info.status)
    }

    /// The task's executable raised an error.
    ///
    /// Consumes one execution; returns the resulting status (`Pending` or
    /// `InError` depending on `policy`, `Faulty` once the budget is
    /// exhausted).
    pub fn on_executable_error(
        &mut self,
        policy: OnTaskError,
        now: DateTime<Utc>,
    ) -> Result<TaskStatus> {
        self.expect_status(&[TaskStatus::Running], "Pending|InError|Faulty")?;
        self.info.executions_left = self.info.executions_left.saturating_sub(1);

        if self.info.executions_left > 0 {
            match policy {
                OnTaskError::Continue => {
                    self.info.status = TaskStatus::Pending;
                }
                OnTaskError::Suspend => {
                    self.info.status = TaskStatus::InError;
                    self.info.in_error_time = Some(now);
                }
            }
            debug!(
                task = %self.name,
                left = self.info.executions_left,
                status = ?self.info.status,
                "executable error; task may run again"
            );
        } else {
            self.info.status = TaskStatus::Faulty;
            self.info.finished_time = Some(now);
            warn!(task = %self.name, "executable error; retry budget exhausted");
        }
        Ok(self.info.status)
    }

    /// `Running -> Finished`.
    pub fn on_success(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect_status(&[TaskStatus::Running], "Finished")?;
        self.info.status = TaskStatus::Finished;
        self.info.progress = 100;
        self.info.finished_time = Some(now);
        Ok(())
    }

    /// `Running -> Faulty` when the task's flow action could not be applied.
    pub fn on_flow_error(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect_status(&[TaskStatus::Running], "Faulty")?;
        self.info.status = TaskStatus::Faulty;
        self.info.finished_time = Some(now);
        Ok(())
    }

    /// Any non-terminal state `-> Aborted`.
    pub fn abort(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.info.status.is_terminal() {
            return Err(self.invalid("Aborted"));
        }
        self.info.status = TaskStatus::Aborted;
        self.info.finished_time = Some(now);
        Ok(())
    }

    /// `Submitted | Pending -> Skipped`.
    pub fn skip(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.expect_status(&[TaskStatus::Submitted, TaskStatus::Pending], "Skipped")?;
        self.info.status = TaskStatus::Skipped;
        self.info.finished_time = Some(now);
        Ok(())
    }

    fn expect_status(&self, allowed: &[TaskStatus], to: &'static str) -> Result<()> {
        if allowed.contains(&self.info.status) {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn invalid(&self, to: &'static str) -> FlowgraphError {
        FlowgraphError::InvalidTransition {
            task: self.name.clone(),
            from: self.info.status,
            to,
        }
    }
}
