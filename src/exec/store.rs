// src/exec/store.rs

//! Job snapshot persistence.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow};
use tracing::{debug, info};

use crate::engine::{GraphSnapshot, JobId};
use crate::errors::Result;
use crate::types::JobStoreMode;

/// Relative path (from the store root) of the snapshot directory.
///
/// The effective path on disk is `<root>/.flowgraph/jobs/<job>.toml`.
pub const JOB_DIR_PATH: &str = ".flowgraph/jobs";

/// Abstract storage for job snapshots.
pub trait JobStore: Send + Sync {
    fn persist(&self, snapshot: &GraphSnapshot) -> Result<()>;
    /// Last persisted snapshot of `job`, as stored.
    fn load(&self, job: JobId) -> Result<Option<String>>;
}

/// Build the store selected by `[job].store`.
pub fn store_for_mode(mode: JobStoreMode, root: PathBuf) -> Box<dyn JobStore> {
    match mode {
        JobStoreMode::File => Box::new(FileJobStore::new(root)),
        JobStoreMode::Memory => Box::new(MemoryJobStore::new()),
    }
}

impl JobStore for Box<dyn JobStore> {
    fn persist(&self, snapshot: &GraphSnapshot) -> Result<()> {
        (**self).persist(snapshot)
    }

    fn load(&self, job: JobId) -> Result<Option<String>> {
        (**self).load(job)
    }
}

impl<T: JobStore + ?Sized> JobStore for Arc<T> {
    fn persist(&self, snapshot: &GraphSnapshot) -> Result<()> {
        (**self).persist(snapshot)
    }

    fn load(&self, job: JobId) -> Result<Option<String>> {
        (**self).load(job)
    }
}

fn render(snapshot: &GraphSnapshot) -> Result<String> {
    Ok(toml::to_string_pretty(snapshot)?)
}

/// Stores snapshots as TOML files under `.flowgraph/jobs`.
#[derive(Debug, Clone)]
pub struct FileJobStore {
    root: PathBuf,
}

impl FileJobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn path_for(&self, job: JobId) -> PathBuf {
        job_file_path(&self.root, job)
    }
}

fn job_file_path(root: &Path, job: JobId) -> PathBuf {
    root.join(JOB_DIR_PATH).join(format!("{}.toml", job))
}

impl JobStore for FileJobStore {
    fn persist(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let path = self.path_for(snapshot.job);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating snapshot directory {:?}", parent))?;
        }

        // Write to a temp file first, then rename for atomicity.
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, render(snapshot)?)
            .with_context(|| format!("writing job snapshot {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("renaming {:?} to {:?}", tmp, path))?;

        info!(job = %snapshot.job, path = ?path, "stored job snapshot (file)");
        Ok(())
    }

    fn load(&self, job: JobId) -> Result<Option<String>> {
        let path = self.path_for(job);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("reading job snapshot {:?}", path))?;
        Ok(Some(contents))
    }
}

/// Stores snapshots in memory only.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    map: Mutex<HashMap<JobId, String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn persist(&self, snapshot: &GraphSnapshot) -> Result<()> {
        let rendered = render(snapshot)?;
        self.map
            .lock()
            .map_err(|_| anyhow!("memory job store lock poisoned"))?
            .insert(snapshot.job, rendered);
        debug!(job = %snapshot.job, "stored job snapshot (memory)");
        Ok(())
    }

    fn load(&self, job: JobId) -> Result<Option<String>> {
        let map = self
            .map
            .lock()
            .map_err(|_| anyhow!("memory job store lock poisoned"))?;
        Ok(map.get(&job).cloned())
    }
}
