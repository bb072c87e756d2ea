// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::dag::{ExecutionLimits, FlowAction};
use crate::types::{FlowBlock, JobStoreMode, OnTaskError};

/// Workflow definition exactly as read from a TOML file.
///
/// ```toml
/// [job]
/// name = "nightly"
/// max_executions_on_failure = 2
///
/// [task.A]
/// cmd = "echo A"
///
/// [task.B]
/// cmd = "echo B"
/// after = ["A"]
/// ```
///
/// Nothing has been checked yet; convert it into a [`DefinitionFile`] with
/// `DefinitionFile::try_from` (see `config::validate`).
#[derive(Debug, Clone, Deserialize)]
pub struct RawDefinitionFile {
    /// Job-level settings from `[job]`.
    #[serde(default)]
    pub job: JobSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskDefinition>,
}

/// A validated workflow definition.
///
/// Only obtainable through validation, so the rest of the crate can assume
/// that dependencies resolve, flow targets exist and the graph is acyclic.
#[derive(Debug, Clone)]
pub struct DefinitionFile {
    pub job: JobSection,
    pub task: BTreeMap<String, TaskDefinition>,
}

impl DefinitionFile {
    pub(crate) fn new_unchecked(job: JobSection, task: BTreeMap<String, TaskDefinition>) -> Self {
        Self { job, task }
    }
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    /// Human-readable job name.
    #[serde(default = "default_job_name")]
    pub name: String,

    /// `"continue"` (default) or `"suspend"`.
    #[serde(default)]
    pub on_task_error: OnTaskError,

    /// Default number of executions per task when its executable fails.
    #[serde(default = "default_max_executions")]
    pub max_executions: u32,

    /// Default number of executions per task when its execution node fails.
    #[serde(default = "default_max_executions_on_failure")]
    pub max_executions_on_failure: u32,

    /// Where job snapshots are persisted.
    #[serde(default)]
    pub store: JobStoreMode,
}

fn default_job_name() -> String {
    "job".to_string()
}

fn default_max_executions() -> u32 {
    1
}

fn default_max_executions_on_failure() -> u32 {
    2
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            on_task_error: OnTaskError::default(),
            max_executions: default_max_executions(),
            max_executions_on_failure: default_max_executions_on_failure(),
            store: JobStoreMode::default(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskDefinition {
    /// Command handed to the launcher.
    #[serde(default)]
    pub cmd: Option<String>,

    /// Hard dependencies: this task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// `"start"` / `"end"` when this task opens or closes a block.
    #[serde(default)]
    pub block: FlowBlock,

    /// Name of the task closing (or opening) the block started (or ended)
    /// here.
    #[serde(default)]
    pub matching_block: Option<String>,

    /// Control-flow action performed after this task finishes.
    #[serde(default)]
    pub flow: Option<FlowConfig>,

    /// Overrides `[job].max_executions`.
    #[serde(default)]
    pub max_executions: Option<u32>,

    /// Overrides `[job].max_executions_on_failure`.
    #[serde(default)]
    pub max_executions_on_failure: Option<u32>,
}

impl TaskDefinition {
    /// Retry budget for this task given the job defaults.
    pub fn effective_limits(&self, job: &JobSection) -> ExecutionLimits {
        ExecutionLimits {
            max_executions: self.max_executions.unwrap_or(job.max_executions),
            max_executions_on_failure: self
                .max_executions_on_failure
                .unwrap_or(job.max_executions_on_failure),
        }
    }
}

/// `flow = { type = "...", ... }` inline table.
///
/// ```toml
/// flow = { type = "if", target = "B", else = "C", join = "D" }
/// flow = { type = "loop", target = "A", script = "./again.sh" }
/// flow = { type = "replicate", runs = 3 }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FlowConfig {
    If {
        target: String,
        #[serde(rename = "else")]
        target_else: String,
        #[serde(default)]
        join: Option<String>,
        #[serde(default)]
        script: Option<String>,
    },
    Loop {
        target: String,
        #[serde(default)]
        script: Option<String>,
    },
    Replicate {
        #[serde(default = "default_runs")]
        runs: u32,
        #[serde(default)]
        script: Option<String>,
    },
}

fn default_runs() -> u32 {
    1
}

impl FlowConfig {
    /// Script whose evaluation decides the action, if any.
    pub fn script(&self) -> Option<&str> {
        match self {
            FlowConfig::If { script, .. }
            | FlowConfig::Loop { script, .. }
            | FlowConfig::Replicate { script, .. } => script.as_deref(),
        }
    }

    /// Names of the tasks this action refers to.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            FlowConfig::If {
                target,
                target_else,
                join,
                ..
            } => {
                let mut v = vec![target.as_str(), target_else.as_str()];
                if let Some(j) = join {
                    v.push(j.as_str());
                }
                v
            }
            FlowConfig::Loop { target, .. } => vec![target.as_str()],
            FlowConfig::Replicate { .. } => Vec::new(),
        }
    }

    pub fn to_action(&self) -> FlowAction {
        match self {
            FlowConfig::If {
                target,
                target_else,
                join,
                ..
            } => FlowAction::If {
                target: target.clone(),
                target_else: target_else.clone(),
                join: join.clone(),
            },
            FlowConfig::Loop { target, .. } => FlowAction::Loop {
                target: target.clone(),
            },
            FlowConfig::Replicate { runs, .. } => FlowAction::Replicate { runs: *runs },
        }
    }
}
