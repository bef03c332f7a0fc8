//! Sandbox lifecycle management.
//!
//! A sandbox is a directory `amplifier-sandbox.<name>` under the workspace
//! root holding a clone of the base workspace, the project attached as a
//! submodule on branch `feature/<name>`, and a bootstrapped toolchain. The
//! [`StateStore`] registry is the source of truth for which sandboxes exist;
//! [`SandboxManager`] keeps it consistent with what is on disk.

mod backend;
mod git;
mod manager;
mod metadata;
mod model;
mod query;
mod state;

pub use backend::SandboxBackend;
pub use git::GitBackend;
pub use manager::SandboxManager;
pub use metadata::METADATA_FILE_NAME;
pub use model::{
    derive_branch_name, derive_project_name, derive_sandbox_path, validate_name, SandboxConfig,
    SandboxRecord, BRANCH_PREFIX, SANDBOX_PREFIX,
};
pub use query::{list_sandboxes, orphaned_directories, sandbox_info};
pub use state::{Registry, StateStore, StoreLock, LOCK_FILE_NAME, STATE_FILE_NAME, STATE_VERSION};
