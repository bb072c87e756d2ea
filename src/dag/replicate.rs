// src/dag/replicate.rs

//! Subgraph replication.
//!
//! Copies every task reachable upstream from a *trigger* task, stopping at a
//! *target* task, then rebuilds the edges between the copies. Used by LOOP
//! (a new generation of the loop body) and REPLICATE (one copy of a block per
//! run).
//!
//! The live graph is only read here; the caller decides how the returned
//! [`ReplicatedTree`] gets connected and merged.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::dag::graph::{IdAllocator, TaskGraph};
use crate::dag::task::{TaskId, TaskNode};
use crate::errors::{FlowgraphError, Result};

/// Clones produced by one replication, keyed by the id of their original.
#[derive(Debug, Clone, Default)]
pub struct ReplicatedTree {
    clones: BTreeMap<TaskId, TaskNode>,
}

impl ReplicatedTree {
    pub fn len(&self) -> usize {
        self.clones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clones.is_empty()
    }

    /// Id of the clone made of `original`, if it survived deduplication.
    pub fn clone_of(&self, original: TaskId) -> Option<TaskId> {
        self.clones.get(&original).map(TaskNode::id)
    }

    pub fn get(&self, original: TaskId) -> Option<&TaskNode> {
        self.clones.get(&original)
    }

    pub(crate) fn get_mut(&mut self, original: TaskId) -> Option<&mut TaskNode> {
        self.clones.get_mut(&original)
    }

    /// Ids of the replicated originals, ascending.
    pub fn originals(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.clones.keys().copied()
    }

    pub fn clones(&self) -> impl Iterator<Item = &TaskNode> {
        self.clones.values()
    }

    pub(crate) fn clones_mut(&mut self) -> impl Iterator<Item = &mut TaskNode> {
        self.clones.values_mut()
    }

    pub(crate) fn into_nodes(self) -> impl Iterator<Item = TaskNode> {
        self.clones.into_values()
    }
}

/// Replicate the subgraph between `trigger` and `target`.
///
/// Clone ids are drawn from `alloc`. With `is_loop`, every clone is one
/// iteration ahead of its original. The clone of `target` is produced but
/// its upstream edges are left for the caller to wire.
///
/// Fails with `GraphReplication` when an edge leads nowhere, or with
/// `DependencyCycle` when the upstream walk comes back to a task it is still
/// expanding. Nothing is produced on failure.
pub fn replicate_tree(
    graph: &TaskGraph,
    alloc: &mut IdAllocator,
    trigger: TaskId,
    target: TaskId,
    is_loop: bool,
) -> Result<ReplicatedTree> {
    let mut raw = BTreeMap::new();
    let mut stack = Vec::new();
    clone_pass(graph, alloc, trigger, target, is_loop, &mut raw, &mut stack)?;

    let mut clones = dedup_generations(raw);

    let mut visited = HashSet::new();
    reconstruct_pass(graph, &mut clones, trigger, target, &mut visited)?;

    debug!(
        trigger = %trigger,
        target = %target,
        is_loop,
        clones = clones.len(),
        "replicated subgraph"
    );

    Ok(ReplicatedTree { clones })
}

fn lookup(graph: &TaskGraph, id: TaskId) -> Result<&TaskNode> {
    graph.get(id).ok_or_else(|| {
        FlowgraphError::GraphReplication(format!("edge points at unknown task {}", id))
    })
}

fn clone_pass(
    graph: &TaskGraph,
    alloc: &mut IdAllocator,
    at: TaskId,
    target: TaskId,
    is_loop: bool,
    acc: &mut BTreeMap<TaskId, TaskNode>,
    stack: &mut Vec<TaskId>,
) -> Result<()> {
    if stack.contains(&at) {
        let name = graph.get(at).map(TaskNode::name).unwrap_or_default();
        return Err(FlowgraphError::DependencyCycle(format!(
            "task '{}' is its own ancestor",
            name
        )));
    }
    if acc.contains_key(&at) {
        return Ok(());
    }

    let node = lookup(graph, at)?;
    let mut copy = node.replicate(alloc.next_id());
    if is_loop {
        copy.set_iteration_index(node.iteration_index() + 1)
            .map_err(|e| {
                FlowgraphError::GraphReplication(format!(
                    "cannot rename clone of '{}': {}",
                    node.name(),
                    e
                ))
            })?;
    }
    acc.insert(at, copy);

    if at == target {
        return Ok(());
    }

    stack.push(at);
    for parent in lowest_replication_parents(graph, node.dependencies())? {
        clone_pass(graph, alloc, parent, target, is_loop, acc, stack)?;
    }
    for parent in node.joined_branches() {
        clone_pass(graph, alloc, *parent, target, is_loop, acc, stack)?;
    }
    if let Some(initiator) = node.if_branch() {
        clone_pass(graph, alloc, initiator, target, is_loop, acc, stack)?;
    }
    stack.pop();

    Ok(())
}

/// Among parents sharing an ambiguous name, keep the one with the lowest
/// replication index. Order of first occurrence is preserved.
fn lowest_replication_parents(graph: &TaskGraph, parents: &[TaskId]) -> Result<Vec<TaskId>> {
    let mut kept: Vec<(&str, u32, TaskId)> = Vec::with_capacity(parents.len());

    for id in parents {
        let parent = lookup(graph, *id)?;
        let ambiguous = parent.ambiguous_name();
        match kept.iter_mut().find(|(name, _, _)| *name == ambiguous) {
            Some(slot) => {
                if slot.1 > parent.replication_index() {
                    *slot = (ambiguous, parent.replication_index(), *id);
                }
            }
            None => kept.push((ambiguous, parent.replication_index(), *id)),
        }
    }

    Ok(kept.into_iter().map(|(_, _, id)| id).collect())
}

/// Joined branches keyed by ambiguous name; a later branch replaces an
/// earlier one with the same name, in the earlier one's slot.
fn join_parents(graph: &TaskGraph, branches: &[TaskId]) -> Result<Vec<TaskId>> {
    let mut kept: Vec<(&str, TaskId)> = Vec::with_capacity(branches.len());

    for id in branches {
        let ambiguous = lookup(graph, *id)?.ambiguous_name();
        match kept.iter_mut().find(|(name, _)| *name == ambiguous) {
            Some(slot) => slot.1 = *id,
            None => kept.push((ambiguous, *id)),
        }
    }

    Ok(kept.into_iter().map(|(_, id)| id).collect())
}

/// Nested LOOP actions can clone several generations of the same template
/// task; only the earliest generation is kept. Ties go to the lowest
/// original id.
fn dedup_generations(raw: BTreeMap<TaskId, TaskNode>) -> BTreeMap<TaskId, TaskNode> {
    let mut by_name: BTreeMap<String, (TaskId, TaskNode)> = BTreeMap::new();

    for (original, copy) in raw {
        let name = copy.ambiguous_name().to_string();
        let replace = by_name
            .get(&name)
            .map(|(_, cur)| copy.iteration_index() < cur.iteration_index())
            .unwrap_or(true);
        if replace {
            by_name.insert(name, (original, copy));
        }
    }

    by_name.into_values().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Upstream {
    IfBranch,
    Join,
    Hard,
}

fn reconstruct_pass(
    graph: &TaskGraph,
    acc: &mut BTreeMap<TaskId, TaskNode>,
    at: TaskId,
    target: TaskId,
    visited: &mut HashSet<TaskId>,
) -> Result<()> {
    if at == target || !visited.insert(at) {
        return Ok(());
    }

    let node = lookup(graph, at)?;

    // Exactly one edge kind is copied. A task that was an IF branch also has
    // a hard edge to its initiator once the IF fired; only the weak one is
    // replicated.
    let (kind, parents) = if let Some(initiator) = node.if_branch() {
        (Upstream::IfBranch, vec![initiator])
    } else if node.joined_branches().len() == 2 {
        (
            Upstream::Join,
            join_parents(graph, node.joined_branches())?,
        )
    } else if node.has_dependencies() {
        (
            Upstream::Hard,
            lowest_replication_parents(graph, node.dependencies())?,
        )
    } else {
        return Ok(());
    };

    let has_clone = acc.contains_key(&at);

    for mut parent in parents {
        if has_clone {
            if !acc.contains_key(&parent) {
                // The parent's generation was dropped by deduplication:
                // attach to the closest replicated ancestor instead.
                parent = collapse(graph, acc, parent)?;
                let upstream = clone_id(acc, parent)?;
                if let Some(copy) = acc.get_mut(&at) {
                    copy.add_dependency(upstream);
                }
            } else {
                attach(acc, at, parent, kind)?;
            }
        }

        if parent != target {
            reconstruct_pass(graph, acc, parent, target, visited)?;
        }
    }

    Ok(())
}

fn clone_id(acc: &BTreeMap<TaskId, TaskNode>, original: TaskId) -> Result<TaskId> {
    acc.get(&original).map(TaskNode::id).ok_or_else(|| {
        FlowgraphError::GraphReplication(format!("no clone recorded for task {}", original))
    })
}

fn clone_name(acc: &BTreeMap<TaskId, TaskNode>, clone: TaskId) -> Option<&str> {
    acc.values().find(|c| c.id() == clone).map(TaskNode::name)
}

fn attach(
    acc: &mut BTreeMap<TaskId, TaskNode>,
    child: TaskId,
    parent: TaskId,
    kind: Upstream,
) -> Result<()> {
    let upstream = clone_id(acc, parent)?;
    let upstream_name = acc
        .get(&parent)
        .map(|c| c.name().to_string())
        .unwrap_or_default();

    let Some(copy) = acc.get(&child) else {
        return Ok(());
    };

    match kind {
        Upstream::Hard => {
            let already = copy
                .dependencies()
                .iter()
                .any(|d| clone_name(acc, *d) == Some(upstream_name.as_str()));
            if !already {
                if let Some(copy) = acc.get_mut(&child) {
                    copy.add_dependency(upstream);
                }
            }
        }
        Upstream::IfBranch => {
            if let Some(copy) = acc.get_mut(&child) {
                copy.set_if_branch(Some(upstream));
            }
        }
        Upstream::Join => {
            let already = copy
                .joined_branches()
                .iter()
                .any(|b| clone_name(acc, *b) == Some(upstream_name.as_str()));
            if !already {
                if let Some(copy) = acc.get_mut(&child) {
                    copy.joined_branches.push(upstream);
                }
            }
        }
    }
    Ok(())
}

/// Walk up from `from` through the first upstream edge of each task until a
/// task with a recorded clone is found.
fn collapse(graph: &TaskGraph, acc: &BTreeMap<TaskId, TaskNode>, from: TaskId) -> Result<TaskId> {
    let mut at = from;
    let mut steps = 0usize;

    while !acc.contains_key(&at) {
        let node = lookup(graph, at)?;
        let next = node
            .dependencies()
            .first()
            .copied()
            .or(node.if_branch())
            .or_else(|| node.joined_branches().first().copied());

        at = next.ok_or_else(|| {
            FlowgraphError::GraphReplication(format!(
                "no replicated ancestor above '{}'",
                node.name()
            ))
        })?;

        steps += 1;
        if steps > graph.len() {
            return Err(FlowgraphError::GraphReplication(format!(
                "upstream walk from {} does not terminate",
                from
            )));
        }
    }

    Ok(at)
}
