use serde::{Deserialize, Serialize};

/// What happens when a task's executable raises an error while it still has
/// executions left.
///
/// - `Continue`: put the task back to `Pending` so it is redispatched right
///   away (default behaviour).
/// - `Suspend`: park the task `InError` until it is explicitly restarted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnTaskError {
    #[default]
    Continue,
    Suspend,
}

/// Position of a task inside a control-flow block.
///
/// Blocks always come in matched START/END pairs; see `matching_block`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowBlock {
    #[default]
    None,
    Start,
    End,
}

/// Mode for storing job snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStoreMode {
    /// Write snapshots as TOML files (`.flowgraph/jobs/<id>.toml`).
    File,
    /// Keep snapshots in memory only (lost on restart).
    #[default]
    Memory,
}
