//! Sandbox lifecycle: create and remove.
//!
//! Creation is a sequence of external steps followed by a registry commit.
//! Every mutation runs under the registry lock, so concurrent invocations of
//! the tool against one workspace serialize. If any step fails, the directory
//! this run created is removed and the registry is left untouched.

use std::path::Path;

use chrono::Utc;

use crate::error::{Error, Result};

use super::backend::SandboxBackend;
use super::metadata;
use super::model::{validate_name, SandboxConfig, SandboxRecord};
use super::query;
use super::state::StateStore;

/// Creates and removes sandboxes in one workspace.
pub struct SandboxManager<B: SandboxBackend> {
    store: StateStore,
    backend: B,
}

impl<B: SandboxBackend> SandboxManager<B> {
    pub fn new(store: StateStore, backend: B) -> Self {
        Self { store, backend }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates a sandbox and registers it.
    ///
    /// On success the directory exists, the project is checked out on its
    /// feature branch, bootstrap has run, and the record is persisted. On
    /// failure no record is written and the directory is gone, unless it
    /// already existed before this call.
    pub fn create(&self, config: &SandboxConfig) -> Result<SandboxRecord> {
        config.validate()?;
        if config.workspace_root != self.store.workspace_root() {
            return Err(Error::Config(format!(
                "sandbox workspace {} does not match registry workspace {}",
                config.workspace_root.display(),
                self.store.workspace_root().display()
            )));
        }

        tracing::info!(sandbox = %config.name, source = %config.project_source, "creating sandbox");

        self.store.with_lock(|lock, registry| {
            if registry.contains(&config.name) {
                return Err(Error::SandboxExists(config.name.clone()));
            }

            let sandbox_path = config.sandbox_path();
            if sandbox_path.exists() {
                // Not ours to delete: an orphan from an interrupted run or
                // something the user put there.
                return Err(Error::Git {
                    operation: "git clone".to_string(),
                    detail: format!(
                        "target directory already exists but is not registered: {}",
                        sandbox_path.display()
                    ),
                });
            }

            let committed = self.build(config).and_then(|record| {
                let updated = registry.add(record.clone())?;
                lock.save(&updated)?;
                Ok(record)
            });

            match committed {
                Ok(record) => {
                    tracing::info!(
                        sandbox = %record.name,
                        path = ?record.sandbox_path,
                        commit = %record.short_commit(),
                        "sandbox created"
                    );
                    Ok(record)
                }
                Err(e) => Err(discard_partial(&sandbox_path, e)),
            }
        })
    }

    /// Runs the external steps. Returns the record to commit.
    fn build(&self, config: &SandboxConfig) -> Result<SandboxRecord> {
        let sandbox_path = config.sandbox_path();
        let project_name = config.project_name()?;

        self.backend.clone_base(&sandbox_path)?;
        let base_commit = self.backend.resolve_commit(&sandbox_path)?;
        tracing::debug!(commit = %base_commit, "resolved base commit");

        self.backend
            .add_project(&sandbox_path, &config.project_source, &project_name)?;
        self.backend
            .create_branch(&sandbox_path.join(&project_name), &config.branch_name())?;
        self.backend.bootstrap(&sandbox_path)?;

        let record = SandboxRecord::from_config(config, Utc::now(), base_commit)?;
        metadata::write(&record)?;
        Ok(record)
    }

    /// Deletes a sandbox directory and its record.
    ///
    /// The record is dropped only after the directory is gone. A directory
    /// that is already missing is logged and the record is still dropped.
    pub fn remove(&self, name: &str) -> Result<SandboxRecord> {
        validate_name(name)?;

        self.store.with_lock(|lock, registry| {
            let record = registry
                .get(name)
                .cloned()
                .ok_or_else(|| Error::SandboxNotFound(name.to_string()))?;

            if record.sandbox_path.exists() {
                std::fs::remove_dir_all(&record.sandbox_path).map_err(|e| {
                    tracing::error!(sandbox = %name, path = ?record.sandbox_path, error = %e, "failed to delete sandbox directory");
                    Error::filesystem(&record.sandbox_path, "remove sandbox directory", e)
                })?;
            } else {
                tracing::warn!(
                    sandbox = %name,
                    path = ?record.sandbox_path,
                    "sandbox directory already missing, dropping record"
                );
            }

            let updated = registry.remove(name)?;
            lock.save(&updated)?;

            tracing::info!(sandbox = %name, "sandbox removed");
            Ok(record)
        })
    }

    /// All registered sandboxes, oldest first.
    pub fn list(&self) -> Result<Vec<SandboxRecord>> {
        query::list_sandboxes(&self.store)
    }

    /// The record for `name`.
    pub fn info(&self, name: &str) -> Result<SandboxRecord> {
        query::sandbox_info(&self.store, name)
    }
}

/// Removes the directory a failed creation left behind and returns the error
/// to report.
fn discard_partial(sandbox_path: &Path, error: Error) -> Error {
    tracing::warn!(path = ?sandbox_path, error = %error, "sandbox creation failed, cleaning up");

    if !sandbox_path.exists() {
        return error;
    }

    match std::fs::remove_dir_all(sandbox_path) {
        Ok(()) => {
            tracing::info!(path = ?sandbox_path, "removed partial sandbox");
            error
        }
        Err(cleanup) => {
            tracing::error!(
                path = ?sandbox_path,
                error = %cleanup,
                "failed to remove partial sandbox; delete it manually"
            );
            Error::CleanupFailed {
                source: Box::new(error),
                cleanup: format!("{}: {}", sandbox_path.display(), cleanup),
            }
        }
    }
}
