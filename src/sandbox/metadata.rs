//! Human-readable `SANDBOX.md` written into each new sandbox.
//!
//! The file is informational only; the registry stays authoritative.

use std::path::PathBuf;

use crate::error::{Error, Result};

use super::model::SandboxRecord;

/// File name of the metadata summary inside a sandbox.
pub const METADATA_FILE_NAME: &str = "SANDBOX.md";

/// Renders the metadata document for `record`.
pub fn render(record: &SandboxRecord) -> String {
    format!(
        "# Sandbox: {name}\n\
         \n\
         | Field | Value |\n\
         |-------|-------|\n\
         | Feature | `{name}` |\n\
         | Project | `{project}` |\n\
         | Project source | `{source}` |\n\
         | Branch | `{branch}` |\n\
         | Base commit | `{commit}` |\n\
         | Created | {created} |\n\
         | Location | `{path}` |\n\
         | Status | Active |\n\
         \n\
         ## Getting started\n\
         \n\
         Project code lives in `{project}/` on branch `{branch}`.\n\
         Commit and push from inside `{project}/`; the surrounding workspace is a\n\
         disposable clone.\n\
         \n\
         Remove this sandbox with `sandbox-env remove {name}` when the feature is done.\n",
        name = record.name,
        project = record.project_name,
        source = record.project_source,
        branch = record.branch_name,
        commit = record.base_commit,
        created = record.created_at.to_rfc3339(),
        path = record.sandbox_path.display(),
    )
}

/// Writes `SANDBOX.md` into the record's sandbox directory.
pub fn write(record: &SandboxRecord) -> Result<PathBuf> {
    let path = record.sandbox_path.join(METADATA_FILE_NAME);
    std::fs::write(&path, render(record))
        .map_err(|e| Error::filesystem(&path, "write metadata", e))?;
    Ok(path)
}
