// src/dag/task.rs

//! Task nodes of a job graph.

use std::fmt;

use serde::Serialize;

use crate::dag::naming;
use crate::dag::state::TaskInfo;
use crate::errors::Result;
use crate::types::FlowBlock;

/// Identity of a task, unique within its job.
///
/// Edges between tasks are expressed as `TaskId`s resolved through the
/// owning [`TaskGraph`](crate::dag::TaskGraph); nodes never own each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Control-flow action attached to a task's post-execution script.
///
/// The action only names the targets; whether (and how) it fires is decided
/// when the task finishes, see [`FlowDecision`](crate::dag::FlowDecision).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FlowAction {
    #[default]
    None,
    If {
        target: String,
        target_else: String,
        join: Option<String>,
    },
    Replicate {
        runs: u32,
    },
    Loop {
        target: String,
    },
}

impl FlowAction {
    pub fn is_none(&self) -> bool {
        matches!(self, FlowAction::None)
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FlowAction::None => "none",
            FlowAction::If { .. } => "if",
            FlowAction::Replicate { .. } => "replicate",
            FlowAction::Loop { .. } => "loop",
        }
    }
}

/// Retry budget a task is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Executions allowed when the executable itself fails.
    pub max_executions: u32,
    /// Executions allowed when the node running the task fails.
    pub max_executions_on_failure: u32,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_executions: 1,
            max_executions_on_failure: 2,
        }
    }
}

/// A single task of a job: identity, edges, control-flow metadata and
/// execution state.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) iteration: u32,
    pub(crate) replication: u32,

    /// Hard dependencies, in declaration order, without duplicates.
    pub(crate) dependencies: Vec<TaskId>,
    /// The task whose IF action this task is a branch of.
    pub(crate) if_branch: Option<TaskId>,
    /// When this task joins an IF/ELSE: the two branch end-points.
    pub(crate) joined_branches: Vec<TaskId>,

    pub(crate) flow_block: FlowBlock,
    pub(crate) matching_block: Option<String>,
    pub(crate) flow_action: FlowAction,
    pub(crate) flow_script: Option<String>,
    pub(crate) command: Option<String>,

    pub(crate) limits: ExecutionLimits,
    pub(crate) info: TaskInfo,

    /// Diagnostics only; not an edge of the graph.
    pub(crate) replicated_from: Option<TaskId>,
}

impl TaskNode {
    /// Create a fresh, unreplicated task.
    pub fn new(id: TaskId, name: &str, limits: ExecutionLimits) -> Result<Self> {
        let name = naming::render(name, 0, 0)?;
        Ok(Self {
            id,
            name,
            iteration: 0,
            replication: 0,
            dependencies: Vec::new(),
            if_branch: None,
            joined_branches: Vec::new(),
            flow_block: FlowBlock::None,
            matching_block: None,
            flow_action: FlowAction::None,
            flow_script: None,
            command: None,
            limits,
            info: TaskInfo::new(limits),
            replicated_from: None,
        })
    }

    /// Value copy of this task under a new identity.
    ///
    /// The copy carries no edges and starts over as never executed, with the
    /// full retry budget of the original.
    pub(crate) fn replicate(&self, id: TaskId) -> Self {
        Self {
            id,
            name: self.name.clone(),
            iteration: self.iteration,
            replication: self.replication,
            dependencies: Vec::new(),
            if_branch: None,
            joined_branches: Vec::new(),
            flow_block: self.flow_block,
            matching_block: self.matching_block.clone(),
            flow_action: self.flow_action.clone(),
            flow_script: self.flow_script.clone(),
            command: self.command.clone(),
            limits: self.limits,
            info: TaskInfo::new(self.limits),
            replicated_from: Some(self.id),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template name shared by every generation and replica of this task.
    ///
    /// Not an identifier: several live tasks may return the same value.
    pub fn ambiguous_name(&self) -> &str {
        naming::strip_suffix(&self.name)
    }

    pub fn iteration_index(&self) -> u32 {
        self.iteration
    }

    pub fn replication_index(&self) -> u32 {
        self.replication
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn if_branch(&self) -> Option<TaskId> {
        self.if_branch
    }

    pub fn joined_branches(&self) -> &[TaskId] {
        &self.joined_branches
    }

    pub fn flow_block(&self) -> FlowBlock {
        self.flow_block
    }

    pub fn matching_block(&self) -> Option<&str> {
        self.matching_block.as_deref()
    }

    pub fn flow_action(&self) -> &FlowAction {
        &self.flow_action
    }

    pub fn flow_script(&self) -> Option<&str> {
        self.flow_script.as_deref()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn limits(&self) -> ExecutionLimits {
        self.limits
    }

    pub fn info(&self) -> &TaskInfo {
        &self.info
    }

    pub fn replicated_from(&self) -> Option<TaskId> {
        self.replicated_from
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }

    /// Add a hard dependency; adding the same task twice is a no-op.
    pub fn add_dependency(&mut self, parent: TaskId) {
        if !self.dependencies.contains(&parent) {
            self.dependencies.push(parent);
        }
    }

    pub fn remove_dependency(&mut self, parent: TaskId) -> bool {
        let before = self.dependencies.len();
        self.dependencies.retain(|d| *d != parent);
        before != self.dependencies.len()
    }

    pub fn set_if_branch(&mut self, initiator: Option<TaskId>) {
        self.if_branch = initiator;
    }

    pub fn set_joined_branches(&mut self, branches: Vec<TaskId>) {
        self.joined_branches = branches;
    }

    pub fn set_flow_block(&mut self, block: FlowBlock) {
        self.flow_block = block;
    }

    pub fn set_command(&mut self, command: Option<String>) {
        self.command = command;
    }

    pub fn set_flow_script(&mut self, script: Option<String>) {
        self.flow_script = script;
    }

    /// Set the matching block, aligned on this task's own generation.
    pub fn set_matching_block(&mut self, block: Option<&str>) {
        self.matching_block = block.map(|b| self.with_own_suffix(b));
    }

    /// Set the flow action, aligned on this task's own generation.
    pub fn set_flow_action(&mut self, action: FlowAction) {
        self.flow_action = action;
        self.propagate_suffix();
    }

    pub fn set_max_executions(&mut self, max: u32) {
        self.limits.max_executions = max;
        self.info.executions_left = max;
        self.info.executions_on_failure_left = self.limits.max_executions_on_failure;
    }

    pub fn set_max_executions_on_failure(&mut self, max: u32) {
        self.limits.max_executions_on_failure = max;
        self.info.executions_on_failure_left = max;
    }

    /// Rename the task.
    ///
    /// Any suffix in `new_name` is dropped and replaced by the one matching
    /// this task's indexes. On error the previous name is retained.
    pub fn set_name(&mut self, new_name: &str) -> Result<()> {
        self.name = naming::render(new_name, self.iteration, self.replication)?;
        self.propagate_suffix();
        Ok(())
    }

    /// Set the LOOP generation of this task and re-render its name.
    pub fn set_iteration_index(&mut self, iteration: u32) -> Result<()> {
        self.name = naming::render(&self.name, iteration, self.replication)?;
        self.iteration = iteration;
        self.propagate_suffix();
        Ok(())
    }

    /// Set the REPLICATE index of this task and re-render its name.
    pub fn set_replication_index(&mut self, replication: u32) -> Result<()> {
        self.name = naming::render(&self.name, self.iteration, replication)?;
        self.replication = replication;
        self.propagate_suffix();
        Ok(())
    }

    // Block partners and flow targets share this task's scope, so they carry
    // the same iteration / replication suffix.
    fn propagate_suffix(&mut self) {
        if let Some(block) = self.matching_block.take() {
            self.matching_block = if block.is_empty() {
                Some(block)
            } else {
                Some(self.with_own_suffix(&block))
            };
        }

        let action = std::mem::take(&mut self.flow_action);
        self.flow_action = match action {
            FlowAction::Loop { target } => FlowAction::Loop {
                target: self.with_own_suffix(&target),
            },
            FlowAction::If {
                target,
                target_else,
                join,
            } => FlowAction::If {
                target: self.with_own_suffix(&target),
                target_else: self.with_own_suffix(&target_else),
                join: join.map(|j| self.with_own_suffix(&j)),
            },
            other => other,
        };
    }

    fn with_own_suffix(&self, name: &str) -> String {
        format!(
            "{}{}",
            naming::strip_suffix(name),
            naming::suffix(self.iteration, self.replication)
        )
    }
}
