// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::model::DefinitionFile;
use crate::dag::task::{ExecutionLimits, FlowAction, TaskId, TaskNode};
use crate::errors::{FlowgraphError, Result};
use crate::types::FlowBlock;

/// Hands out fresh task identities for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn next_id(&mut self) -> TaskId {
        let id = TaskId(self.next);
        self.next += 1;
        id
    }
}

/// Job-scoped node table.
///
/// Owns every [`TaskNode`] of a job. Edges are `TaskId`s; traversal always
/// goes through this table, never through node-to-node references.
///
/// `order` is the job's task list: definition order first, then tasks in the
/// order they were merged in by control-flow actions.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    nodes: HashMap<TaskId, TaskNode>,
    order: Vec<TaskId>,
    next_id: u64,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the initial graph of a job from a validated [`DefinitionFile`].
    ///
    /// Assumes that:
    /// - all `after` references and flow targets are valid
    /// - there are no cycles
    ///
    /// Besides hard dependencies this wires the weak IF edges: both branch
    /// starts point at their initiator, and the join lists the two branch
    /// ends.
    pub fn from_definition(def: &DefinitionFile) -> Result<Self> {
        let mut graph = TaskGraph::new();
        let mut ids: BTreeMap<&str, TaskId> = BTreeMap::new();

        // First pass: nodes and their static metadata.
        for (name, td) in def.task.iter() {
            let id = graph.add_task(name, td.effective_limits(&def.job))?;
            ids.insert(name.as_str(), id);

            let node = graph.node_mut(id)?;
            node.set_command(td.cmd.clone());
            node.set_flow_block(td.block);
            node.set_matching_block(td.matching_block.as_deref());
            if let Some(flow) = td.flow.as_ref() {
                node.set_flow_action(flow.to_action());
                node.set_flow_script(flow.script().map(str::to_string));
            }
        }

        let lookup = |name: &str| -> Result<TaskId> {
            ids.get(name)
                .copied()
                .ok_or_else(|| FlowgraphError::TaskNotFound(name.to_string()))
        };

        // Second pass: hard dependencies.
        for (name, td) in def.task.iter() {
            let id = lookup(name)?;
            for dep in td.after.iter() {
                let dep_id = lookup(dep)?;
                graph.node_mut(id)?.add_dependency(dep_id);
            }
        }

        // Third pass: weak IF edges.
        for (name, td) in def.task.iter() {
            let Some(flow) = td.flow.as_ref() else {
                continue;
            };
            if let FlowAction::If {
                target,
                target_else,
                join,
            } = flow.to_action()
            {
                let initiator = lookup(name)?;
                let if_start = lookup(&target)?;
                let else_start = lookup(&target_else)?;
                graph.node_mut(if_start)?.set_if_branch(Some(initiator));
                graph.node_mut(else_start)?.set_if_branch(Some(initiator));

                if let Some(join) = join {
                    let join = lookup(&join)?;
                    let ends = vec![graph.block_end(if_start), graph.block_end(else_start)];
                    graph.node_mut(join)?.set_joined_branches(ends);
                }
            }
        }

        Ok(graph)
    }

    /// Add a fresh, unconnected task.
    pub fn add_task(&mut self, name: &str, limits: ExecutionLimits) -> Result<TaskId> {
        let id = self.allocator().next_id();
        let node = TaskNode::new(id, name, limits)?;
        self.next_id = id.0 + 1;
        self.nodes.insert(id, node);
        self.order.push(id);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.nodes.get_mut(&id)
    }

    /// Like [`get`](Self::get), but a missing node is an error.
    pub fn node(&self, id: TaskId) -> Result<&TaskNode> {
        self.nodes
            .get(&id)
            .ok_or_else(|| FlowgraphError::TaskNotFound(id.to_string()))
    }

    pub fn node_mut(&mut self, id: TaskId) -> Result<&mut TaskNode> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| FlowgraphError::TaskNotFound(id.to_string()))
    }

    /// Task ids in job order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.order
    }

    /// Tasks in job order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// First task (in job order) whose display name is exactly `name`.
    pub fn find_by_name(&self, name: &str) -> Option<TaskId> {
        self.tasks().find(|t| t.name() == name).map(TaskNode::id)
    }

    /// Tasks with a hard dependency on `id`, in job order.
    pub fn dependents_of(&self, id: TaskId) -> Vec<TaskId> {
        self.tasks()
            .filter(|t| t.dependencies().contains(&id))
            .map(TaskNode::id)
            .collect()
    }

    /// Tasks pointing at `id` through any edge kind, in job order.
    pub fn downstream_of(&self, id: TaskId) -> Vec<TaskId> {
        self.tasks()
            .filter(|t| {
                t.dependencies().contains(&id)
                    || t.if_branch() == Some(id)
                    || t.joined_branches().contains(&id)
            })
            .map(TaskNode::id)
            .collect()
    }

    /// Whether every task has reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.tasks().all(|t| t.status().is_terminal())
    }

    /// Tasks with no upstream edge of any kind.
    pub fn roots(&self) -> Vec<TaskId> {
        self.tasks()
            .filter(|t| {
                !t.has_dependencies() && t.if_branch().is_none() && t.joined_branches().is_empty()
            })
            .map(TaskNode::id)
            .collect()
    }

    /// The task closing the block opened by `start`, or `start` itself when
    /// it does not open a block (or its partner cannot be found).
    pub fn block_end(&self, start: TaskId) -> TaskId {
        let Some(node) = self.get(start) else {
            return start;
        };
        if node.flow_block() != FlowBlock::Start {
            return start;
        }
        node.matching_block()
            .and_then(|m| self.find_by_name(m))
            .unwrap_or(start)
    }

    /// Search upward from `from` (inclusive) for a task named `name`.
    ///
    /// Walks hard dependencies first, then the IF initiator, then joined
    /// branches, depth-first.
    pub fn find_task_up(&self, name: &str, from: TaskId) -> Option<TaskId> {
        let mut visited = HashSet::new();
        self.find_task_up_inner(name, from, &mut visited)
    }

    fn find_task_up_inner(
        &self,
        name: &str,
        at: TaskId,
        visited: &mut HashSet<TaskId>,
    ) -> Option<TaskId> {
        if !visited.insert(at) {
            return None;
        }
        let node = self.get(at)?;
        if node.name() == name {
            return Some(at);
        }
        for dep in node.dependencies() {
            if let Some(found) = self.find_task_up_inner(name, *dep, visited) {
                return Some(found);
            }
        }
        if let Some(initiator) = node.if_branch() {
            if let Some(found) = self.find_task_up_inner(name, initiator, visited) {
                return Some(found);
            }
        }
        for branch in node.joined_branches() {
            if let Some(found) = self.find_task_up_inner(name, *branch, visited) {
                return Some(found);
            }
        }
        None
    }

    /// Whether `child` depends, directly or through IF edges, on `parent`.
    ///
    /// Exactly one edge kind is followed per node, in this order: joined
    /// branches, IF initiator, hard dependencies. Every followed edge must
    /// lead to `parent` (the children are AND-combined), and a signed depth
    /// goes up through IF initiators and down through joins; `parent` only
    /// counts when reached at a depth `>= 0`. A task with no upstream edge at
    /// all does not depend on anything.
    ///
    /// This is an "every path passes through `parent`, inside the same IF
    /// scope" test rather than plain ancestry.
    pub fn depends_on(&self, child: TaskId, parent: TaskId) -> bool {
        self.depends_on_inner(child, parent, 0)
    }

    fn depends_on_inner(&self, at: TaskId, parent: TaskId, depth: i32) -> bool {
        if at == parent {
            return depth >= 0;
        }
        let Some(node) = self.get(at) else {
            return false;
        };
        if !node.has_dependencies() && node.joined_branches().is_empty() && node.if_branch().is_none()
        {
            return false;
        }
        if !node.joined_branches().is_empty() {
            for branch in node.joined_branches() {
                if !self.depends_on_inner(*branch, parent, depth - 1) {
                    return false;
                }
            }
        } else if let Some(initiator) = node.if_branch() {
            if !self.depends_on_inner(initiator, parent, depth + 1) {
                return false;
            }
        } else {
            for dep in node.dependencies() {
                if !self.depends_on_inner(*dep, parent, depth) {
                    return false;
                }
            }
        }
        true
    }

    /// Whether a `Submitted` task may become `Pending`.
    ///
    /// Every hard dependency must be done, an IF branch must have been
    /// plugged to its initiator, and a join must have been plugged to one of
    /// its branches.
    pub fn is_ready(&self, id: TaskId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        if node.status() != crate::dag::TaskStatus::Submitted {
            return false;
        }
        let deps_done = node.dependencies().iter().all(|d| {
            self.get(*d)
                .map(|p| p.status().satisfies_dependents())
                .unwrap_or(false)
        });
        let branch_plugged = node
            .if_branch()
            .map(|initiator| node.dependencies().contains(&initiator))
            .unwrap_or(true);
        let join_plugged = node.joined_branches().is_empty()
            || node
                .joined_branches()
                .iter()
                .any(|b| node.dependencies().contains(b));

        deps_done && branch_plugged && join_plugged
    }

    /// Allocator continuing after the highest id handed out so far.
    pub fn allocator(&self) -> IdAllocator {
        IdAllocator { next: self.next_id }
    }

    /// Append new nodes to the table and the job's task list.
    ///
    /// Nodes are appended in ascending id order. Returns their ids.
    pub(crate) fn merge(&mut self, nodes: impl IntoIterator<Item = TaskNode>) -> Vec<TaskId> {
        let mut nodes: Vec<TaskNode> = nodes.into_iter().collect();
        nodes.sort_by_key(TaskNode::id);

        let mut added = Vec::with_capacity(nodes.len());
        for node in nodes {
            let id = node.id();
            self.next_id = self.next_id.max(id.0 + 1);
            self.nodes.insert(id, node);
            self.order.push(id);
            added.push(id);
        }
        added
    }
}
