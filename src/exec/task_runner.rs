// src/exec/task_runner.rs

//! Individual task process runner.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::{LaunchRequest, RuntimeEvent, TaskOutcome};

/// Run a single task and report a `TaskFinished` event.
///
/// - exit status 0: `Success` (the flow decision is left to the runtime)
/// - non-zero exit: `ExecutableError`
/// - the process could not be started or waited on: `NodeFailure`
///
/// A task without a command succeeds immediately.
pub async fn run_task(request: LaunchRequest, runtime_tx: mpsc::Sender<RuntimeEvent>) {
    let outcome = match request.command.as_deref() {
        None => TaskOutcome::Success { decision: None },
        Some(cmd) => match run_process(&request, cmd).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(task = %request.name, error = %err, "task execution error");
                TaskOutcome::NodeFailure(format!("{err:#}"))
            }
        },
    };

    let sent = runtime_tx
        .send(RuntimeEvent::TaskFinished {
            job: request.job,
            task: request.task,
            outcome,
        })
        .await;
    if sent.is_err() {
        debug!(task = %request.name, "runtime gone; dropping task report");
    }
}

async fn run_process(request: &LaunchRequest, cmd_line: &str) -> Result<TaskOutcome> {
    info!(job = %request.job, task = %request.name, cmd = %cmd_line, "starting task process");

    let mut cmd = shell_command(cmd_line);
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", request.name))?;

    // Always consume both pipes so buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        let task_name = request.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stdout: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        let task_name = request.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %task_name, "stderr: {}", line);
            }
        });
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", request.name))?;

    let code = status.code().unwrap_or(-1);
    info!(
        task = %request.name,
        exit_code = code,
        success = status.success(),
        "task process exited"
    );

    Ok(if status.success() {
        TaskOutcome::Success { decision: None }
    } else {
        TaskOutcome::ExecutableError(format!("exit code {code}"))
    })
}

/// Build a shell command appropriate for the platform.
pub(crate) fn shell_command(cmd_line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd_line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd_line);
        c
    }
}
