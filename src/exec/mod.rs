// src/exec/mod.rs

//! Collaborators of the engine.
//!
//! - [`backend`] provides the `Launcher` trait and `LocalLauncher`, which the
//!   runtime uses in production and which tests replace with a fake.
//! - [`executor_loop`] owns the loop that receives launch requests.
//! - [`task_runner`] runs one task as a shell process and reports back.
//! - [`script`] evaluates flow scripts into decisions.
//! - [`store`] persists job snapshots.

pub mod backend;
pub mod executor_loop;
pub mod script;
pub mod store;
pub mod task_runner;

pub use backend::{Launcher, LocalLauncher};
pub use executor_loop::spawn_executor;
pub use script::{CommandScriptResolver, ScriptResolver, parse_decision};
pub use store::{FileJobStore, JOB_DIR_PATH, JobStore, MemoryJobStore, store_for_mode};
