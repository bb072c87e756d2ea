#![allow(dead_code)]

use std::collections::BTreeMap;

use flowgraph::config::{DefinitionFile, FlowConfig, JobSection, RawDefinitionFile, TaskDefinition};
use flowgraph::errors::Result;
use flowgraph::types::{FlowBlock, OnTaskError};

/// Builder for `DefinitionFile` to simplify test setup.
pub struct DefinitionBuilder {
    raw: RawDefinitionFile,
}

impl DefinitionBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawDefinitionFile {
                job: JobSection::default(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn job_name(mut self, name: &str) -> Self {
        self.raw.job.name = name.to_string();
        self
    }

    pub fn on_task_error(mut self, policy: OnTaskError) -> Self {
        self.raw.job.on_task_error = policy;
        self
    }

    pub fn max_executions(mut self, n: u32) -> Self {
        self.raw.job.max_executions = n;
        self
    }

    pub fn max_executions_on_failure(mut self, n: u32) -> Self {
        self.raw.job.max_executions_on_failure = n;
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskDefinition) -> Self {
        self.raw.task.insert(name.to_string(), task);
        self
    }

    pub fn raw(self) -> RawDefinitionFile {
        self.raw
    }

    pub fn try_build(self) -> Result<DefinitionFile> {
        DefinitionFile::try_from(self.raw)
    }

    pub fn build(self) -> DefinitionFile {
        self.try_build()
            .expect("Failed to build valid definition from builder")
    }
}

impl Default for DefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskDefinition`.
pub struct TaskBuilder {
    task: TaskDefinition,
}

impl TaskBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskDefinition {
                cmd: Some(cmd.to_string()),
                ..TaskDefinition::default()
            },
        }
    }

    /// A task with nothing to execute.
    pub fn noop() -> Self {
        Self {
            task: TaskDefinition::default(),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn block_start(mut self, end: &str) -> Self {
        self.task.block = FlowBlock::Start;
        self.task.matching_block = Some(end.to_string());
        self
    }

    pub fn block_end(mut self, start: &str) -> Self {
        self.task.block = FlowBlock::End;
        self.task.matching_block = Some(start.to_string());
        self
    }

    pub fn flow_if(mut self, target: &str, target_else: &str, join: Option<&str>) -> Self {
        self.task.flow = Some(FlowConfig::If {
            target: target.to_string(),
            target_else: target_else.to_string(),
            join: join.map(str::to_string),
            script: None,
        });
        self
    }

    pub fn flow_loop(mut self, target: &str) -> Self {
        self.task.flow = Some(FlowConfig::Loop {
            target: target.to_string(),
            script: None,
        });
        self
    }

    pub fn flow_replicate(mut self, runs: u32) -> Self {
        self.task.flow = Some(FlowConfig::Replicate { runs, script: None });
        self
    }

    /// Attach a flow script to the flow action set earlier.
    pub fn script(mut self, cmd: &str) -> Self {
        match self.task.flow.as_mut() {
            Some(FlowConfig::If { script, .. })
            | Some(FlowConfig::Loop { script, .. })
            | Some(FlowConfig::Replicate { script, .. }) => *script = Some(cmd.to_string()),
            None => panic!("script() needs a flow action first"),
        }
        self
    }

    pub fn max_executions(mut self, n: u32) -> Self {
        self.task.max_executions = Some(n);
        self
    }

    pub fn max_executions_on_failure(mut self, n: u32) -> Self {
        self.task.max_executions_on_failure = Some(n);
        self
    }

    pub fn build(self) -> TaskDefinition {
        self.task
    }
}
