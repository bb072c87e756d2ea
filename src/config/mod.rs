// src/config/mod.rs

//! Workflow definition loading and validation for flowgraph.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a definition file from disk (`loader.rs`).
//! - Validate basic invariants like graph correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{DefinitionFile, FlowConfig, JobSection, RawDefinitionFile, TaskDefinition};
