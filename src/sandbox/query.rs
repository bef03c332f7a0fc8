//! Read-only views of the registry.
//!
//! These read a point-in-time snapshot without taking the registry lock, so a
//! listing may miss a creation that is still in flight.

use std::path::PathBuf;

use crate::error::{Error, Result};

use super::model::{SandboxRecord, SANDBOX_PREFIX};
use super::state::StateStore;

/// All registered sandboxes, oldest first.
pub fn list_sandboxes(store: &StateStore) -> Result<Vec<SandboxRecord>> {
    Ok(store.load()?.sorted_by_created())
}

/// The record for `name`.
pub fn sandbox_info(store: &StateStore, name: &str) -> Result<SandboxRecord> {
    store
        .load()?
        .get(name)
        .cloned()
        .ok_or_else(|| Error::SandboxNotFound(name.to_string()))
}

/// Sandbox directories under the workspace root that no record points at,
/// typically left by an interrupted `create`. Sorted by path.
pub fn orphaned_directories(store: &StateStore) -> Result<Vec<PathBuf>> {
    let registry = store.load()?;
    let root = store.workspace_root();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::filesystem(root, "read workspace", e)),
    };

    let mut orphans = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::filesystem(root, "read workspace entry", e))?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|n| n.strip_prefix(SANDBOX_PREFIX)) else {
            continue;
        };
        if !entry.path().is_dir() {
            continue;
        }

        let path = entry.path();
        let tracked = registry.get(name).is_some_and(|r| r.sandbox_path == path);
        if !tracked {
            orphans.push(path);
        }
    }

    orphans.sort();
    Ok(orphans)
}
