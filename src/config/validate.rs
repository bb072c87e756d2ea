use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{DefinitionFile, FlowConfig, RawDefinitionFile};
use crate::dag::naming::{self, MAX_TASK_NAME_LENGTH};
use crate::errors::{FlowgraphError, Result};
use crate::types::FlowBlock;

impl TryFrom<RawDefinitionFile> for DefinitionFile {
    type Error = crate::errors::FlowgraphError;

    fn try_from(raw: RawDefinitionFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_definition(&raw)?;
        Ok(DefinitionFile::new_unchecked(raw.job, raw.task))
    }
}

fn validate_raw_definition(def: &RawDefinitionFile) -> Result<()> {
    ensure_has_tasks(def)?;
    validate_job_section(def)?;
    validate_task_names(def)?;
    validate_task_dependencies(def)?;
    validate_blocks(def)?;
    validate_flow_targets(def)?;
    validate_dag(def)?;
    validate_loops(def)?;
    Ok(())
}

fn ensure_has_tasks(def: &RawDefinitionFile) -> Result<()> {
    if def.task.is_empty() {
        return Err(FlowgraphError::ConfigError(
            "definition must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_job_section(def: &RawDefinitionFile) -> Result<()> {
    if def.job.max_executions == 0 {
        return Err(FlowgraphError::ConfigError(
            "[job].max_executions must be >= 1 (got 0)".to_string(),
        ));
    }

    for (name, task) in def.task.iter() {
        if task.max_executions == Some(0) {
            return Err(FlowgraphError::ConfigError(format!(
                "task '{}' has max_executions = 0 (must be >= 1)",
                name
            )));
        }
    }

    Ok(())
}

fn validate_task_names(def: &RawDefinitionFile) -> Result<()> {
    for name in def.task.keys() {
        if name.trim().is_empty() {
            return Err(FlowgraphError::ConfigError(
                "task names must not be empty".to_string(),
            ));
        }
        if naming::has_separator(name) {
            return Err(FlowgraphError::ConfigError(format!(
                "task '{}' uses a reserved character ('{}' or '{}')",
                name,
                naming::ITERATION_SEPARATOR,
                naming::REPLICATION_SEPARATOR
            )));
        }
        let len = name.chars().count();
        if len > MAX_TASK_NAME_LENGTH {
            return Err(FlowgraphError::NameTooLong {
                name: name.clone(),
                len,
                max: MAX_TASK_NAME_LENGTH,
            });
        }
    }
    Ok(())
}

fn validate_task_dependencies(def: &RawDefinitionFile) -> Result<()> {
    for (name, task) in def.task.iter() {
        for dep in task.after.iter() {
            if !def.task.contains_key(dep) {
                return Err(FlowgraphError::ConfigError(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
            if dep == name {
                return Err(FlowgraphError::ConfigError(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
        }
    }
    Ok(())
}

fn validate_blocks(def: &RawDefinitionFile) -> Result<()> {
    for (name, task) in def.task.iter() {
        match (task.block, task.matching_block.as_deref()) {
            (FlowBlock::None, None) => {}
            (FlowBlock::None, Some(m)) => {
                return Err(FlowgraphError::ConfigError(format!(
                    "task '{}' has matching_block '{}' but is not a block start or end",
                    name, m
                )));
            }
            (_, None) => {
                return Err(FlowgraphError::ConfigError(format!(
                    "task '{}' opens or closes a block but has no matching_block",
                    name
                )));
            }
            (block, Some(m)) => {
                let partner = def.task.get(m).ok_or_else(|| {
                    FlowgraphError::ConfigError(format!(
                        "task '{}' has unknown matching_block '{}'",
                        name, m
                    ))
                })?;
                let expected = match block {
                    FlowBlock::Start => FlowBlock::End,
                    _ => FlowBlock::Start,
                };
                if partner.block != expected || partner.matching_block.as_deref() != Some(name) {
                    return Err(FlowgraphError::ConfigError(format!(
                        "block '{}' / '{}' is not a matched start/end pair",
                        name, m
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_flow_targets(def: &RawDefinitionFile) -> Result<()> {
    for (name, task) in def.task.iter() {
        let Some(flow) = task.flow.as_ref() else {
            continue;
        };

        for target in flow.targets() {
            if !def.task.contains_key(target) {
                return Err(FlowgraphError::InvalidFlowTarget(format!(
                    "task '{}' refers to unknown task '{}' in its {} action",
                    name,
                    target,
                    flow_kind(flow)
                )));
            }
        }

        if let FlowConfig::If {
            target,
            target_else,
            ..
        } = flow
        {
            if target == target_else {
                return Err(FlowgraphError::InvalidFlowTarget(format!(
                    "task '{}' uses '{}' as both IF and ELSE branch",
                    name, target
                )));
            }
            for branch in [target, target_else] {
                if !def.task[branch].after.is_empty() {
                    return Err(FlowgraphError::InvalidFlowTarget(format!(
                        "IF branch '{}' of task '{}' must not declare `after`",
                        branch, name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Build the dependency graph used for cycle and reachability checks.
///
/// Edge direction: dependency -> task. IF branches are wired to their
/// initiator and the branch ends to the join, so weak edges participate too.
fn definition_graph(def: &RawDefinitionFile) -> DiGraphMap<&str, ()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in def.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in def.task.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }

        if let Some(FlowConfig::If {
            target,
            target_else,
            join,
            ..
        }) = task.flow.as_ref()
        {
            graph.add_edge(name.as_str(), target.as_str(), ());
            graph.add_edge(name.as_str(), target_else.as_str(), ());
            if let Some(join) = join {
                graph.add_edge(branch_end(def, target), join.as_str(), ());
                graph.add_edge(branch_end(def, target_else), join.as_str(), ());
            }
        }
    }

    graph
}

fn branch_end<'a>(def: &'a RawDefinitionFile, start: &'a str) -> &'a str {
    match def.task.get(start) {
        Some(t) if t.block == FlowBlock::Start => t.matching_block.as_deref().unwrap_or(start),
        _ => start,
    }
}

fn validate_dag(def: &RawDefinitionFile) -> Result<()> {
    let graph = definition_graph(def);

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(FlowgraphError::DependencyCycle(format!(
                "cycle detected in task graph involving task '{}'",
                node
            )))
        }
    }
}

fn validate_loops(def: &RawDefinitionFile) -> Result<()> {
    let graph = definition_graph(def);

    for (name, task) in def.task.iter() {
        if let Some(FlowConfig::Loop { target, .. }) = task.flow.as_ref() {
            if target != name && !has_path_connecting(&graph, target.as_str(), name.as_str(), None)
            {
                return Err(FlowgraphError::InvalidFlowTarget(format!(
                    "LOOP target '{}' of task '{}' is not upstream of it",
                    target, name
                )));
            }
        }
    }
    Ok(())
}

fn flow_kind(flow: &FlowConfig) -> &'static str {
    match flow {
        FlowConfig::If { .. } => "IF",
        FlowConfig::Loop { .. } => "LOOP",
        FlowConfig::Replicate { .. } => "REPLICATE",
    }
}
