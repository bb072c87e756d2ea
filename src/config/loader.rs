use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{DefinitionFile, RawDefinitionFile};
use crate::errors::Result;

/// Load a workflow definition from a given path and return the raw
/// `RawDefinitionFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (dependencies, flow targets, cycles). Use [`load_and_validate`]
/// for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawDefinitionFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Parse a workflow definition from TOML text without validating it.
pub fn load_from_str(contents: &str) -> Result<RawDefinitionFile> {
    let definition: RawDefinitionFile = toml::from_str(contents)?;
    Ok(definition)
}

/// Load a workflow definition from path and validate it.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown `after` references and flow targets,
///   - dependency cycles,
///   - malformed blocks and task names.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<DefinitionFile> {
    let raw = load_from_path(&path)?;
    DefinitionFile::try_from(raw)
}

/// Helper to resolve a default definition path.
pub fn default_definition_path() -> PathBuf {
    PathBuf::from("Flowgraph.toml")
}
