// src/engine/mod.rs

//! Orchestration engine for flowgraph.
//!
//! This module ties together:
//! - the job registry (one locked graph per job, kill flags, snapshots)
//! - the main runtime event loop that reacts to:
//!   - job submissions
//!   - task completion reports from the launcher
//!   - kill / restart requests
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::dag::{FlowAction, FlowDecision, TaskId};

/// How a launched task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The executable succeeded. `decision` is what its flow script decided,
    /// when it has one and it was already evaluated.
    Success { decision: Option<FlowDecision> },
    /// The executable succeeded but its flow script failed or timed out.
    FlowError(String),
    /// The executable itself failed.
    ExecutableError(String),
    /// The node running the task failed.
    NodeFailure(String),
}

/// A task handed to the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub job: JobId,
    pub task: TaskId,
    pub name: String,
    pub command: Option<String>,
}

/// A finished task whose flow script must be evaluated before its action
/// can be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRequest {
    pub job: JobId,
    pub task: TaskId,
    pub name: String,
    pub action: FlowAction,
    pub script: Option<String>,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once every submitted job is done.
    pub exit_when_idle: bool,
}

/// Events flowing into the runtime from the CLI, launchers, signals.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A job was registered; its root tasks should be launched.
    JobSubmitted { job: JobId },
    /// A launched task reported back.
    TaskFinished {
        job: JobId,
        task: TaskId,
        outcome: TaskOutcome,
    },
    KillJob { job: JobId },
    /// Relaunch a task parked `InError`.
    RestartInError { job: JobId, task: TaskId },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod job;
pub mod registry;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use job::{GraphSnapshot, Job, JobHandle, JobId, JobStatus, TaskView};
pub use registry::{JobRegistry, JobStep};
pub use runtime::Runtime;
