// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces a list of "commands" describing
//! what the IO shell should do next.
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - evaluating flow scripts
//! - sending `LaunchRequest`s to the launcher
//! - persisting snapshots
//!
//! The core is intended to be extensively tested without any Tokio,
//! channels, filesystem, or processes.

use std::sync::Arc;

use crate::engine::event_handlers::{
    CoreStep, handle_job_submitted, handle_kill_job, handle_restart_in_error,
    handle_task_finished,
};
use crate::engine::{JobRegistry, RuntimeEvent, RuntimeOptions};

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    registry: Arc<JobRegistry>,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(registry: Arc<JobRegistry>, options: RuntimeOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Whether every job known to the registry is done (for tests).
    pub fn is_idle(&self) -> bool {
        self.registry.all_done()
    }

    /// Handle a single runtime event and return the resulting commands for
    /// the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::JobSubmitted { job } => handle_job_submitted(&self.registry, job),
            RuntimeEvent::TaskFinished { job, task, outcome } => {
                handle_task_finished(&self.registry, &self.options, job, task, outcome)
            }
            RuntimeEvent::KillJob { job } => handle_kill_job(&self.registry, &self.options, job),
            RuntimeEvent::RestartInError { job, task } => {
                handle_restart_in_error(&self.registry, job, task)
            }
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
