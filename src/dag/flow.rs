// src/dag/flow.rs

//! Control-flow actions.
//!
//! When a task with a flow action finishes, its script yields a
//! [`FlowDecision`]. [`apply`] interprets that decision against the task's
//! [`FlowAction`] and grows or prunes the job graph accordingly:
//!
//! - LOOP: a new generation of the loop body is appended
//! - REPLICATE: the block following the task is copied once per run
//! - IF: the chosen branch is plugged in, the other one is skipped
//!
//! All changes are staged on a copy of the graph and committed only if the
//! whole action succeeds.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::dag::graph::TaskGraph;
use crate::dag::naming;
use crate::dag::replicate::{ReplicatedTree, replicate_tree};
use crate::dag::state::TaskStatus;
use crate::dag::task::{FlowAction, TaskId, TaskNode};
use crate::errors::{FlowgraphError, Result};
use crate::types::FlowBlock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchChoice {
    Then,
    Else,
}

/// What a finished task's flow script decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FlowDecision {
    /// Do nothing; for a LOOP this means "stop looping".
    Continue,
    /// Run the loop body once more.
    Loop,
    Replicate { runs: u32 },
    If { branch: BranchChoice },
}

impl FlowAction {
    /// Decision used when the task has no script, or the script said
    /// nothing usable.
    pub fn default_decision(&self) -> FlowDecision {
        match self {
            FlowAction::None | FlowAction::Loop { .. } => FlowDecision::Continue,
            FlowAction::If { .. } => FlowDecision::If {
                branch: BranchChoice::Then,
            },
            FlowAction::Replicate { runs } => FlowDecision::Replicate { runs: *runs },
        }
    }
}

/// What [`apply`] did to the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowChanges {
    /// Newly merged tasks, ascending.
    pub added: Vec<TaskId>,
    /// Pre-existing tasks whose edges changed.
    pub updated: Vec<TaskId>,
    /// Tasks moved to `Skipped`.
    pub skipped: Vec<TaskId>,
}

impl FlowChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.skipped.is_empty()
    }
}

/// Apply `decision` for the flow action of `initiator`.
///
/// On error the graph is left exactly as it was.
pub fn apply(graph: &mut TaskGraph, initiator: TaskId, decision: FlowDecision) -> Result<FlowChanges> {
    let node = graph.node(initiator)?;
    let action = node.flow_action().clone();
    let initiator_name = node.name().to_string();

    let mut staged = graph.clone();
    let changes = match (&action, decision) {
        (FlowAction::None, _) | (_, FlowDecision::Continue) => return Ok(FlowChanges::default()),
        (FlowAction::Loop { target }, FlowDecision::Loop) => {
            apply_loop(&mut staged, initiator, target)?
        }
        (FlowAction::Replicate { .. }, FlowDecision::Replicate { runs }) => {
            apply_replicate(&mut staged, initiator, runs)?
        }
        (
            FlowAction::If {
                target,
                target_else,
                join,
            },
            FlowDecision::If { branch },
        ) => apply_if(
            &mut staged,
            initiator,
            target,
            target_else,
            join.as_deref(),
            branch,
        )?,
        (action, decision) => {
            return Err(FlowgraphError::InvalidFlowTarget(format!(
                "task '{}' has a {} action but its script decided {:?}",
                initiator_name,
                action.kind(),
                decision
            )));
        }
    };

    *graph = staged;

    info!(
        task = %initiator_name,
        action = action.kind(),
        added = changes.added.len(),
        updated = changes.updated.len(),
        skipped = changes.skipped.len(),
        "flow action applied"
    );

    Ok(changes)
}

fn apply_loop(graph: &mut TaskGraph, initiator: TaskId, target_name: &str) -> Result<FlowChanges> {
    let target = if graph.node(initiator)?.name() == target_name {
        initiator
    } else {
        graph.find_task_up(target_name, initiator).ok_or_else(|| {
            FlowgraphError::InvalidFlowTarget(format!(
                "LOOP target '{}' is not upstream of {}",
                target_name, initiator
            ))
        })?
    };

    let mut alloc = graph.allocator();
    let mut tree = replicate_tree(graph, &mut alloc, initiator, target, true)?;

    let target_clone = tree.clone_of(target).ok_or_else(|| {
        FlowgraphError::GraphReplication(format!("LOOP target '{}' was not replicated", target_name))
    })?;
    let initiator_clone = tree.clone_of(initiator).ok_or_else(|| {
        FlowgraphError::GraphReplication(format!("LOOP initiator {} was not replicated", initiator))
    })?;

    // An inner loop may already have produced a task with the next
    // generation's name. The whole generation moves ahead by the same
    // amount so flow targets keep naming tasks of their own generation.
    let shift = free_generation_shift(graph, &tree)?;
    if shift > 0 {
        for copy in tree.clones_mut() {
            let next = copy.iteration_index() + shift;
            copy.set_iteration_index(next).map_err(|e| {
                FlowgraphError::GraphReplication(format!("cannot rename loop clone: {}", e))
            })?;
        }
    }

    if let Some(copy) = tree.get_mut(target) {
        copy.add_dependency(initiator);
    }
    debug!(target = %target, clone = %target_clone, "loop body re-entered");

    // Tasks waiting on the loop end now wait on the last generation.
    let mergers: Vec<TaskId> = graph.dependents_of(initiator);
    for id in mergers.iter() {
        if let Some(node) = graph.get_mut(*id) {
            node.remove_dependency(initiator);
            node.add_dependency(initiator_clone);
        }
    }

    let added = graph.merge(tree.into_nodes());

    Ok(FlowChanges {
        added,
        updated: mergers,
        skipped: Vec::new(),
    })
}

/// Smallest iteration shift at which no clone of `tree` collides with a
/// task name already in `graph`.
fn free_generation_shift(graph: &TaskGraph, tree: &ReplicatedTree) -> Result<u32> {
    let taken: HashSet<&str> = graph.tasks().map(TaskNode::name).collect();
    let mut shift = 0u32;

    loop {
        let mut clash = false;
        for copy in tree.clones() {
            let name = naming::render(
                copy.name(),
                copy.iteration_index() + shift,
                copy.replication_index(),
            )
            .map_err(|e| {
                FlowgraphError::GraphReplication(format!("cannot rename loop clone: {}", e))
            })?;
            if taken.contains(name.as_str()) {
                clash = true;
                break;
            }
        }
        if !clash {
            return Ok(shift);
        }
        shift += 1;
    }
}

/// Upper bound on the runs a single REPLICATE decision may ask for.
pub const MAX_REPLICATION_RUNS: u32 = 1024;

fn apply_replicate(graph: &mut TaskGraph, initiator: TaskId, runs: u32) -> Result<FlowChanges> {
    let mut changes = FlowChanges::default();
    if runs == 0 {
        return Ok(changes);
    }

    if runs > MAX_REPLICATION_RUNS {
        return Err(FlowgraphError::InvalidFlowTarget(format!(
            "REPLICATE of {} asked for {} runs (at most {})",
            initiator, runs, MAX_REPLICATION_RUNS
        )));
    }

    let overflow =
        || FlowgraphError::GraphReplication(format!("replication index overflow below {}", initiator));
    let replication = graph.node(initiator)?.replication_index();
    let base = runs
        .checked_add(1)
        .and_then(|width| replication.checked_mul(width))
        .ok_or_else(overflow)?;
    base.checked_add(runs).ok_or_else(overflow)?;

    for start in graph.dependents_of(initiator) {
        let end = live_block_end(graph, start)?;
        let merge_points = graph.dependents_of(end);

        let mut originals = Vec::new();
        for k in 1..=runs {
            let mut alloc = graph.allocator();
            let mut tree = replicate_tree(graph, &mut alloc, end, start, false)?;

            for copy in tree.clones_mut() {
                copy.set_replication_index(base + k).map_err(|e| {
                    FlowgraphError::GraphReplication(format!("cannot rename replica: {}", e))
                })?;
            }

            let start_clone = tree.clone_of(start);
            let end_clone = tree.clone_of(end).ok_or_else(|| {
                FlowgraphError::GraphReplication(format!("block end {} was not replicated", end))
            })?;
            if let Some(copy) = tree.get_mut(start) {
                copy.add_dependency(initiator);
            }
            debug!(start = %start, replica = k, clone = ?start_clone, "block replicated");

            for id in merge_points.iter() {
                if let Some(node) = graph.get_mut(*id) {
                    node.add_dependency(end_clone);
                }
            }

            if originals.is_empty() {
                originals = tree.originals().collect();
            }
            changes.added.extend(graph.merge(tree.into_nodes()));
        }

        for id in originals {
            graph.node_mut(id)?.set_replication_index(base).map_err(|e| {
                FlowgraphError::GraphReplication(format!("cannot rename replicated block: {}", e))
            })?;
            changes.updated.push(id);
        }
        changes.updated.extend(merge_points);
    }

    Ok(changes)
}

fn apply_if(
    graph: &mut TaskGraph,
    initiator: TaskId,
    target: &str,
    target_else: &str,
    join: Option<&str>,
    branch: BranchChoice,
) -> Result<FlowChanges> {
    let if_start = find_live(graph, target)?;
    let else_start = find_live(graph, target_else)?;
    let join = join.map(|j| find_live(graph, j)).transpose()?;

    let if_end = live_block_end(graph, if_start)?;
    let else_end = live_block_end(graph, else_start)?;

    let (chosen_start, chosen_end, other_start) = match branch {
        BranchChoice::Then => (if_start, if_end, else_start),
        BranchChoice::Else => (else_start, else_end, if_start),
    };

    let mut updated = vec![if_start, else_start];

    graph.node_mut(if_start)?.set_if_branch(Some(initiator));
    graph.node_mut(else_start)?.set_if_branch(Some(initiator));
    graph.node_mut(chosen_start)?.add_dependency(initiator);
    graph.node_mut(other_start)?.add_dependency(initiator);

    if let Some(join) = join {
        let node = graph.node_mut(join)?;
        node.set_joined_branches(vec![if_end, else_end]);
        node.add_dependency(chosen_end);
        updated.push(join);
    }

    let doomed: Vec<TaskId> = graph
        .tasks()
        .filter(|t| matches!(t.status(), TaskStatus::Submitted | TaskStatus::Pending))
        .map(TaskNode::id)
        .filter(|id| graph.depends_on(*id, other_start))
        .collect();

    let now = Utc::now();
    for id in doomed.iter() {
        graph.node_mut(*id)?.skip(now)?;
    }
    debug!(branch = ?branch, skipped = doomed.len(), "IF branch selected");

    Ok(FlowChanges {
        added: Vec::new(),
        updated,
        skipped: doomed,
    })
}

/// First task named `name` that has neither finished nor been skipped.
fn find_live(graph: &TaskGraph, name: &str) -> Result<TaskId> {
    graph
        .tasks()
        .find(|t| t.name() == name && !t.status().is_settled())
        .map(TaskNode::id)
        .ok_or_else(|| {
            FlowgraphError::InvalidFlowTarget(format!("no pending task named '{}'", name))
        })
}

/// End of the block opened by `start` in the current generation, or `start`
/// itself when it does not open a block.
pub(crate) fn live_block_end(graph: &TaskGraph, start: TaskId) -> Result<TaskId> {
    let node = graph.node(start)?;
    if node.flow_block() != FlowBlock::Start {
        return Ok(start);
    }
    let Some(end_name) = node.matching_block() else {
        return Ok(start);
    };

    graph
        .tasks()
        .find(|t| {
            t.name() == end_name && !t.status().is_settled() && graph.depends_on(t.id(), start)
        })
        .map(TaskNode::id)
        .ok_or_else(|| {
            FlowgraphError::GraphReplication(format!(
                "no live end '{}' for block started by '{}'",
                end_name,
                node.name()
            ))
        })
}
