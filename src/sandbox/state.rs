//! Persistent registry of sandboxes.
//!
//! The registry is a single JSON document at
//! `{workspace_root}/.sandbox-state.json`. Mutations run inside
//! [`StateStore::with_lock`], which holds an exclusive advisory lock on a
//! sidecar lock file for the whole read-modify-write cycle. Writes go to a
//! temp file in the same directory that is then renamed over the registry, so
//! readers see either the old document or the new one, never a torn write.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::model::SandboxRecord;

/// Registry file name under the workspace root.
pub const STATE_FILE_NAME: &str = ".sandbox-state.json";

/// Lock file name under the workspace root.
pub const LOCK_FILE_NAME: &str = ".sandbox-state.lock";

/// Registry format written by this version.
pub const STATE_VERSION: &str = "1.0";

/// Format versions this version can read.
const SUPPORTED_VERSIONS: &[&str] = &[STATE_VERSION];

/// In-memory snapshot of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Format version of the document.
    pub version: String,
    /// Records keyed by sandbox name.
    pub sandboxes: BTreeMap<String, SandboxRecord>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::empty()
    }
}

impl Registry {
    /// An empty registry at the current format version.
    pub fn empty() -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            sandboxes: BTreeMap::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sandboxes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SandboxRecord> {
        self.sandboxes.get(name)
    }

    pub fn len(&self) -> usize {
        self.sandboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sandboxes.is_empty()
    }

    /// Returns the registry with `record` inserted.
    ///
    /// Fails with [`Error::SandboxExists`] if the name is already taken.
    pub fn add(mut self, record: SandboxRecord) -> Result<Self> {
        if self.sandboxes.contains_key(&record.name) {
            return Err(Error::SandboxExists(record.name));
        }
        self.sandboxes.insert(record.name.clone(), record);
        Ok(self)
    }

    /// Returns the registry with `name` removed.
    ///
    /// Fails with [`Error::SandboxNotFound`] if there is no such record.
    pub fn remove(mut self, name: &str) -> Result<Self> {
        if self.sandboxes.remove(name).is_none() {
            return Err(Error::SandboxNotFound(name.to_string()));
        }
        Ok(self)
    }

    /// All records, oldest first. Ties fall back to name order.
    pub fn sorted_by_created(&self) -> Vec<SandboxRecord> {
        let mut records: Vec<SandboxRecord> = self.sandboxes.values().cloned().collect();
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });
        records
    }
}

/// Durable store for the sandbox registry of one workspace.
#[derive(Debug, Clone)]
pub struct StateStore {
    workspace_root: PathBuf,
    state_file: PathBuf,
    lock_file: PathBuf,
}

impl StateStore {
    /// Creates a store for the registry under `workspace_root`.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            state_file: workspace_root.join(STATE_FILE_NAME),
            lock_file: workspace_root.join(LOCK_FILE_NAME),
            workspace_root,
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Reads the registry from disk.
    ///
    /// A missing file is an empty registry. A malformed file is a
    /// [`Error::StateFile`] error, an unreadable one a [`Error::Filesystem`]
    /// error. Neither is ever partially applied.
    pub fn load(&self) -> Result<Registry> {
        let content = match std::fs::read_to_string(&self.state_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Registry::empty()),
            Err(e) => return Err(Error::filesystem(&self.state_file, "read state file", e)),
        };

        self.parse(&content)
    }

    fn parse(&self, content: &str) -> Result<Registry> {
        let value: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| self.corrupt(format!("invalid JSON: {}", e)))?;

        let obj = value
            .as_object()
            .ok_or_else(|| self.corrupt("top level must be a JSON object"))?;

        let version = match obj.get("version") {
            Some(serde_json::Value::String(v)) => v.clone(),
            Some(_) => return Err(self.corrupt("'version' must be a string")),
            None => return Err(self.corrupt("missing 'version' field")),
        };
        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(Error::UnsupportedStateVersion {
                path: self.state_file.clone(),
                version,
            });
        }

        match obj.get("sandboxes") {
            Some(serde_json::Value::Object(_)) => {}
            Some(_) => return Err(self.corrupt("'sandboxes' must be an object")),
            None => return Err(self.corrupt("missing 'sandboxes' field")),
        }

        let registry: Registry = serde_json::from_value(value)
            .map_err(|e| self.corrupt(format!("invalid sandbox record: {}", e)))?;

        if let Some((key, record)) = registry
            .sandboxes
            .iter()
            .find(|(key, record)| **key != record.name)
        {
            return Err(self.corrupt(format!(
                "record under '{}' is named '{}'",
                key, record.name
            )));
        }

        Ok(registry)
    }

    /// Runs `f` against a freshly loaded registry while holding the exclusive
    /// registry lock.
    ///
    /// `f` persists changes through [`StoreLock::save`]. The lock is released
    /// when this returns, whether `f` succeeded, failed, or panicked.
    pub fn with_lock<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&StoreLock<'_>, Registry) -> Result<T>,
    {
        let guard = self.acquire()?;
        let registry = self.load()?;
        f(&guard, registry)
    }

    fn acquire(&self) -> Result<StoreLock<'_>> {
        std::fs::create_dir_all(&self.workspace_root)
            .map_err(|e| Error::filesystem(&self.workspace_root, "create workspace", e))?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)
            .map_err(|e| Error::filesystem(&self.lock_file, "open lock file", e))?;

        // Blocks while another process holds the lock.
        file.lock_exclusive()
            .map_err(|e| Error::filesystem(&self.lock_file, "lock", e))?;

        tracing::debug!(lock = ?self.lock_file, "acquired registry lock");

        Ok(StoreLock { store: self, file })
    }

    /// Writes `registry` atomically: temp file in the same directory, fsync,
    /// then rename over the registry path.
    fn write_atomic(&self, registry: &Registry) -> Result<()> {
        let mut json = serde_json::to_string_pretty(registry)
            .map_err(|e| self.corrupt(format!("failed to serialize: {}", e)))?;
        json.push('\n');

        let mut temp = tempfile::Builder::new()
            .prefix(".sandbox-state.")
            .suffix(".tmp")
            .tempfile_in(&self.workspace_root)
            .map_err(|e| Error::filesystem(&self.workspace_root, "create temp state file", e))?;

        temp.write_all(json.as_bytes())
            .map_err(|e| Error::filesystem(temp.path(), "write temp state file", e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| Error::filesystem(temp.path(), "sync temp state file", e))?;

        // The temp file is removed on drop if persist fails.
        temp.persist(&self.state_file)
            .map_err(|e| Error::filesystem(&self.state_file, "replace state file", e.error))?;

        #[cfg(unix)]
        {
            if let Ok(dir) = File::open(&self.workspace_root) {
                let _ = dir.sync_all();
            }
        }

        tracing::debug!(
            path = ?self.state_file,
            sandboxes = registry.len(),
            "saved registry"
        );
        Ok(())
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::StateFile {
            path: self.state_file.clone(),
            reason: reason.into(),
        }
    }
}

/// Proof that the registry lock is held. Only obtainable inside
/// [`StateStore::with_lock`].
pub struct StoreLock<'a> {
    store: &'a StateStore,
    file: File,
}

impl StoreLock<'_> {
    /// Persists `registry` as the new registry contents.
    pub fn save(&self, registry: &Registry) -> Result<()> {
        self.store.write_atomic(registry)
    }
}

impl Drop for StoreLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, lock = ?self.store.lock_file, "failed to release registry lock");
        }
    }
}
