// src/dag/mod.rs

//! Job dependency graph.
//!
//! - [`naming`] encodes iteration / replication suffixes in task names.
//! - [`task`] holds a single task node and its edges.
//! - [`state`] is the per-task execution state machine.
//! - [`graph`] is the job-scoped node table, lookup and readiness.
//! - [`replicate`] copies an upstream subgraph.
//! - [`flow`] applies IF / LOOP / REPLICATE decisions to a graph.

pub mod flow;
pub mod graph;
pub mod naming;
pub mod replicate;
pub mod state;
pub mod task;

pub use flow::{BranchChoice, FlowChanges, FlowDecision};
pub use graph::{IdAllocator, TaskGraph};
pub use replicate::{ReplicatedTree, replicate_tree};
pub use state::{TaskInfo, TaskStatus};
pub use task::{ExecutionLimits, FlowAction, TaskId, TaskNode};
