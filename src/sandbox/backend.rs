//! Backend trait for the external steps of sandbox setup.

use std::path::Path;

use crate::error::Result;

/// External collaborators invoked while building a sandbox.
///
/// Each method either succeeds or returns a typed error; the lifecycle
/// manager treats that as the only source of truth. Implementations must not
/// touch the sandbox registry.
pub trait SandboxBackend: Send + Sync {
    /// Clones the base workspace into `target`, which must not exist yet.
    fn clone_base(&self, target: &Path) -> Result<()>;

    /// Returns the checked-out revision of the repository at `repo`.
    fn resolve_commit(&self, repo: &Path) -> Result<String>;

    /// Attaches the project at `source` as a submodule named `project_name`.
    fn add_project(&self, sandbox_dir: &Path, source: &str, project_name: &str) -> Result<()>;

    /// Creates and checks out `branch` inside the project directory.
    fn create_branch(&self, project_dir: &Path, branch: &str) -> Result<()>;

    /// Runs the install/bootstrap procedure inside the sandbox.
    fn bootstrap(&self, sandbox_dir: &Path) -> Result<()>;
}
