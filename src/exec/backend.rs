// src/exec/backend.rs

//! Pluggable launcher abstraction.
//!
//! The runtime talks to a `Launcher` instead of a raw mpsc sender. This makes
//! it easy to swap in a fake launcher in tests while keeping the production
//! process runner in [`executor_loop`](super::executor_loop).
//!
//! - `LocalLauncher` is the default implementation used by `flowgraph`. It
//!   wraps the executor loop and just forwards launch requests over an mpsc
//!   channel.
//! - Tests can provide their own `Launcher` that, for example, records which
//!   tasks were launched and directly emits `TaskFinished` events.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::engine::{LaunchRequest, RuntimeEvent};
use crate::errors::{Error, Result};

use super::executor_loop::spawn_executor;

/// Trait abstracting where and how tasks run.
///
/// Implementations report back with `RuntimeEvent::TaskFinished`.
pub trait Launcher: Send {
    fn launch_tasks(
        &mut self,
        tasks: Vec<LaunchRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Runs tasks as local shell processes.
pub struct LocalLauncher {
    tx: mpsc::Sender<LaunchRequest>,
}

impl LocalLauncher {
    /// Create a launcher reporting to `runtime_tx`.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_executor(runtime_tx);
        Self { tx }
    }
}

impl Launcher for LocalLauncher {
    fn launch_tasks(
        &mut self,
        tasks: Vec<LaunchRequest>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for task in tasks {
                tx.send(task).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}
