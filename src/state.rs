//! Durable fleet state.
//!
//! The whole fleet is stored as one pretty-printed JSON object keyed by
//! server name. Every save replaces the file through a temporary sibling and
//! a rename, so readers see either the previous or the new contents.

use crate::error::{Error, Result};
use crate::server::ServerDescriptor;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Persisted mapping from server name to descriptor.
pub type FleetState = BTreeMap<String, ServerDescriptor>;

/// Reads and atomically rewrites the fleet state file.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the fleet. A missing file is an empty fleet.
    pub fn load(&self) -> Result<FleetState> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No state file, starting with an empty fleet");
                return Ok(FleetState::new());
            }
            Err(e) => {
                return Err(Error::State(format!(
                    "Failed to read {}: {}",
                    self.path.display(),
                    e
                )));
            }
        };

        let fleet: FleetState = serde_json::from_str(&content)
            .map_err(|e| Error::State(format!("Failed to parse {}: {}", self.path.display(), e)))?;

        if let Some((key, descriptor)) = fleet.iter().find(|(key, d)| **key != d.name) {
            return Err(Error::State(format!(
                "State entry '{}' holds descriptor for '{}'",
                key, descriptor.name
            )));
        }

        tracing::debug!(servers = fleet.len(), "Loaded fleet state");
        Ok(fleet)
    }

    /// Serialize and atomically replace the state file.
    pub fn save(&self, fleet: &FleetState) -> Result<()> {
        let content = serde_json::to_vec_pretty(fleet)
            .map_err(|e| Error::State(format!("Failed to serialize fleet: {}", e)))?;

        write_atomic(&self.path, &content).map_err(|e| {
            Error::State(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

/// Replace `path` with `contents` via a synced temporary file in the same directory.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
