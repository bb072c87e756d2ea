// src/exec/executor_loop.rs

//! Main executor loop that manages running task processes.

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::{LaunchRequest, RuntimeEvent};
use crate::exec::task_runner::run_task;

/// Spawn the background executor loop.
///
/// The returned `mpsc::Sender<LaunchRequest>` is what `LocalLauncher` feeds.
/// Each request runs in its own Tokio task, so independent tasks run in
/// parallel. The job graph guarantees a task is never launched while it is
/// already running.
pub fn spawn_executor(runtime_tx: mpsc::Sender<RuntimeEvent>) -> mpsc::Sender<LaunchRequest> {
    let (tx, mut rx) = mpsc::channel::<LaunchRequest>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        while let Some(request) = rx.recv().await {
            debug!(job = %request.job, task = %request.name, "launch request received");
            let rt_tx = runtime_tx.clone();
            tokio::spawn(async move {
                run_task(request, rt_tx).await;
            });
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}
