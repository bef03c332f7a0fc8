//! sandbox-env - isolated feature sandboxes on a shared base workspace
//!
//! Each sandbox clones the base workspace, attaches a project as a submodule
//! on a dedicated feature branch and bootstraps it. A JSON registry in the
//! workspace root tracks every sandbox and is only mutated under an
//! exclusive file lock.

pub mod cli;
pub mod config;
pub mod error;
pub mod process;
pub mod sandbox;

pub use config::{resolve_workspace_root, Settings, Validate, ValidationResult};
pub use error::{Error, ErrorKind, Result};
pub use sandbox::{
    GitBackend, Registry, SandboxBackend, SandboxConfig, SandboxManager, SandboxRecord, StateStore,
};
