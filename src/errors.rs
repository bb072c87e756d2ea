// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowgraphError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("Graph replication failed: {0}")]
    GraphReplication(String),

    #[error("Invalid flow target: {0}")]
    InvalidFlowTarget(String),

    #[error("Task name is too long ({len} > {max} chars): {name}")]
    NameTooLong { name: String, len: usize, max: usize },

    #[error("Invalid transition for task '{task}': {from:?} -> {to}")]
    InvalidTransition {
        task: String,
        from: crate::dag::TaskStatus,
        to: &'static str,
    },

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowgraphError>;
