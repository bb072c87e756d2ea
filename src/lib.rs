// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{default_definition_path, load_and_validate};
use crate::config::model::DefinitionFile;
use crate::dag::{FlowAction, TaskGraph, TaskStatus};
use crate::engine::{CoreRuntime, JobRegistry, JobStatus, Runtime, RuntimeEvent, RuntimeOptions};
use crate::exec::{CommandScriptResolver, LocalLauncher, store_for_mode};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - definition loading
/// - job registry / core / runtime
/// - launcher, flow script resolver and job store
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let definition_path = args
        .definition
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(default_definition_path);
    let def = load_and_validate(&definition_path)?;

    if args.dry_run {
        print_dry_run(&def)?;
        return Ok(());
    }

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let launcher = LocalLauncher::new(rt_tx.clone());
    let resolver = CommandScriptResolver::default();
    let store_root = args
        .store_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| definition_root_dir(&definition_path));
    let store = store_for_mode(def.job.store, store_root);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    let registry = Arc::new(JobRegistry::new());
    let (job, roots) = registry.submit_job(&def)?;
    info!(job = %job, ?roots, "initial roots");
    rt_tx.send(RuntimeEvent::JobSubmitted { job }).await?;

    let options = RuntimeOptions {
        exit_when_idle: true,
    };

    // Construct the pure core runtime (single source of truth for semantics).
    let core = CoreRuntime::new(Arc::clone(&registry), options);

    // Construct the async IO shell around the core.
    let runtime = Runtime::new(core, rt_rx, launcher, resolver, store);
    runtime.run().await?;

    let snapshot = registry.snapshot_graph(job)?;
    let failed = snapshot.count_with_status(TaskStatus::Faulty)
        + snapshot.count_with_status(TaskStatus::Failed);
    info!(
        job = %job,
        status = ?snapshot.status,
        tasks = snapshot.tasks.len(),
        failed,
        "job summary"
    );

    if snapshot.status != JobStatus::Finished {
        bail!("job '{}' did not finish (status {:?})", snapshot.name, snapshot.status);
    }
    if failed > 0 {
        bail!("job '{}' finished with {} failed task(s)", snapshot.name, failed);
    }
    Ok(())
}

/// Directory holding the definition file, or "." for a bare filename.
fn definition_root_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Simple dry-run output: print tasks, edges and flow actions.
fn print_dry_run(def: &DefinitionFile) -> Result<()> {
    let graph = TaskGraph::from_definition(def)?;

    println!("flowgraph dry-run");
    println!("  job.name = {}", def.job.name);
    println!("  job.on_task_error = {:?}", def.job.on_task_error);
    println!("  job.store = {:?}", def.job.store);
    println!();

    println!("tasks ({}):", graph.len());
    for task in graph.tasks() {
        println!("  - {}", task.name());
        if let Some(cmd) = task.command() {
            println!("      cmd: {cmd}");
        }
        let after: Vec<&str> = task
            .dependencies()
            .iter()
            .filter_map(|d| graph.get(*d).map(|t| t.name()))
            .collect();
        if !after.is_empty() {
            println!("      after: {:?}", after);
        }
        if let Some(initiator) = task.if_branch().and_then(|i| graph.get(i)) {
            println!("      branch of: {}", initiator.name());
        }
        let joined: Vec<&str> = task
            .joined_branches()
            .iter()
            .filter_map(|b| graph.get(*b).map(|t| t.name()))
            .collect();
        if !joined.is_empty() {
            println!("      joins: {:?}", joined);
        }
        if let Some(block) = task.matching_block() {
            println!("      block: {:?} (matching {block})", task.flow_block());
        }
        match task.flow_action() {
            FlowAction::None => {}
            action => println!("      flow: {:?}", action),
        }
        if let Some(script) = task.flow_script() {
            println!("      script: {script}");
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
