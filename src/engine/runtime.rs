// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::{JobStore, Launcher, ScriptResolver};

use super::core::CoreRuntime;
use super::{CoreCommand, JobId, LaunchRequest, RuntimeEvent, TaskOutcome};

/// Drives the job registry in response to `RuntimeEvent`s, and delegates
/// actual work to its collaborators:
///
/// - a [`Launcher`] that runs tasks,
/// - a [`ScriptResolver`] that evaluates flow scripts,
/// - a [`JobStore`] that keeps job snapshots.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics.
pub struct Runtime<L: Launcher, S: ScriptResolver, J: JobStore> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    launcher: L,
    resolver: S,
    store: J,
}

impl<L: Launcher, S: ScriptResolver, J: JobStore> fmt::Debug for Runtime<L, S, J> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<L: Launcher, S: ScriptResolver, J: JobStore> Runtime<L, S, J> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        launcher: L,
        resolver: S,
        store: J,
    ) -> Self {
        Self {
            core,
            event_rx,
            launcher,
            resolver,
            store,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Evaluates pending flow scripts.
    /// - Feeds events into the core runtime.
    /// - Executes commands returned by the core (launch, persist, exit).
    pub async fn run(mut self) -> Result<()> {
        info!("flowgraph runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let event = self.resolve_flow(event).await;
            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(())
    }

    /// Fill in the flow decision of a successful task that has a flow script.
    ///
    /// The script runs outside the job lock; a failing script is reported as
    /// a flow error.
    async fn resolve_flow(&mut self, event: RuntimeEvent) -> RuntimeEvent {
        let RuntimeEvent::TaskFinished {
            job,
            task,
            outcome: TaskOutcome::Success { decision: None },
        } = event
        else {
            return event;
        };

        let request = match self.core.registry().flow_request(job, task) {
            Ok(Some(request)) => request,
            Ok(None) => return event,
            Err(err) => {
                warn!(job = %job, task = %task, error = %err, "cannot build flow request");
                return event;
            }
        };

        let name = request.name.clone();
        let outcome = match self.resolver.resolve(request).await {
            Ok(decision) => {
                debug!(task = %name, ?decision, "flow decision resolved");
                TaskOutcome::Success {
                    decision: Some(decision),
                }
            }
            Err(err) => {
                warn!(task = %name, error = %err, "flow script failed");
                TaskOutcome::FlowError(format!("{err:#}"))
            }
        };

        RuntimeEvent::TaskFinished { job, task, outcome }
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Launch(tasks) => {
                self.launch(tasks).await?;
            }
            CoreCommand::Persist(job) => {
                self.persist(job);
            }
            CoreCommand::RequestExit => {
                // keep_running is already false; nothing else to do.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn launch(&mut self, tasks: Vec<LaunchRequest>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, "launching ready tasks");

        self.launcher.launch_tasks(tasks).await
    }

    // Persistence failures are logged; the job keeps running.
    fn persist(&mut self, job: JobId) {
        let snapshot = match self.core.registry().snapshot_graph(job) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(job = %job, error = %err, "cannot snapshot job");
                return;
            }
        };
        if let Err(err) = self.store.persist(&snapshot) {
            warn!(job = %job, error = %err, "cannot persist job snapshot");
        }
    }
}
