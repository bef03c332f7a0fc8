//! Sandbox configuration and registry record types.
//!
//! Everything here is pure: names are validated and paths derived without
//! touching the filesystem.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Directory name prefix for every sandbox under the workspace root.
pub const SANDBOX_PREFIX: &str = "amplifier-sandbox.";

/// Branch prefix for the feature branch created in the project.
pub const BRANCH_PREFIX: &str = "feature/";

/// Suffix stripped from project sources when deriving the project name.
const VCS_SUFFIX: &str = ".git";

/// Checks that `name` is non-empty and only uses `[A-Za-z0-9_-]`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: "name cannot be empty".to_string(),
        });
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(Error::InvalidName {
            name: name.to_string(),
            reason: format!(
                "character '{}' not allowed; use only letters, digits, hyphens and underscores",
                bad
            ),
        });
    }

    Ok(())
}

/// Derives the project directory name from a project source locator.
///
/// Trailing slashes and a trailing `.git` are removed, then the segment after
/// the last `/` or `:` is taken. So `git@host:user/site.git`,
/// `https://host/user/site` and `/srv/repos/site.git` all give `site`.
pub fn derive_project_name(source: &str) -> Result<String> {
    let invalid = |reason: &str| Error::InvalidProjectSource {
        value: source.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = source.trim();
    if trimmed.is_empty() {
        return Err(invalid("project source cannot be empty"));
    }

    let without_slash = trimmed.trim_end_matches('/');
    let stem = without_slash
        .strip_suffix(VCS_SUFFIX)
        .unwrap_or(without_slash);
    let segment = stem
        .rsplit(|c: char| c == '/' || c == ':')
        .next()
        .unwrap_or(stem);

    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(invalid("no project name in final path segment"));
    }

    Ok(segment.to_string())
}

/// Returns `feature/{name}`.
pub fn derive_branch_name(name: &str) -> String {
    format!("{}{}", BRANCH_PREFIX, name)
}

/// Returns `{workspace_root}/amplifier-sandbox.{name}`.
pub fn derive_sandbox_path(workspace_root: &Path, name: &str) -> PathBuf {
    workspace_root.join(format!("{}{}", SANDBOX_PREFIX, name))
}

/// Request to create a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Feature name, e.g. `add-tags`.
    pub name: String,
    /// Locator of the project attached as a submodule.
    pub project_source: String,
    /// Directory holding all sandboxes and the registry.
    pub workspace_root: PathBuf,
}

impl SandboxConfig {
    pub fn new(
        name: impl Into<String>,
        project_source: impl Into<String>,
        workspace_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            project_source: project_source.into(),
            workspace_root: workspace_root.into(),
        }
    }

    /// Validates name and project source. Performs no IO.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        derive_project_name(&self.project_source)?;
        Ok(())
    }

    pub fn project_name(&self) -> Result<String> {
        derive_project_name(&self.project_source)
    }

    pub fn branch_name(&self) -> String {
        derive_branch_name(&self.name)
    }

    pub fn sandbox_path(&self) -> PathBuf {
        derive_sandbox_path(&self.workspace_root, &self.name)
    }
}

/// A registered sandbox. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord")]
pub struct SandboxRecord {
    pub name: String,
    /// Creation time in UTC.
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    pub project_name: String,
    #[serde(rename = "git_url")]
    pub project_source: String,
    pub branch_name: String,
    pub sandbox_path: PathBuf,
    /// Revision of the base workspace that was cloned.
    #[serde(rename = "amplifier_commit")]
    pub base_commit: String,
}

/// On-disk shape of a record, including fields only older registries wrote.
#[derive(Deserialize)]
struct StoredRecord {
    name: String,
    #[serde(deserialize_with = "deserialize_created")]
    created: DateTime<Utc>,
    project_name: String,
    #[serde(default)]
    git_url: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    branch_name: String,
    sandbox_path: PathBuf,
    amplifier_commit: String,
}

impl TryFrom<StoredRecord> for SandboxRecord {
    type Error = String;

    fn try_from(stored: StoredRecord) -> std::result::Result<Self, Self::Error> {
        let project_source = stored
            .git_url
            .or(stored.project_path)
            .ok_or_else(|| "record has neither 'git_url' nor 'project_path'".to_string())?;

        Ok(Self {
            name: stored.name,
            created_at: stored.created,
            project_name: stored.project_name,
            project_source,
            branch_name: stored.branch_name,
            sandbox_path: stored.sandbox_path,
            base_commit: stored.amplifier_commit,
        })
    }
}

impl SandboxRecord {
    /// Builds the record for a freshly created sandbox.
    pub fn from_config(
        config: &SandboxConfig,
        created_at: DateTime<Utc>,
        base_commit: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: config.name.clone(),
            created_at,
            project_name: config.project_name()?,
            project_source: config.project_source.clone(),
            branch_name: config.branch_name(),
            sandbox_path: config.sandbox_path(),
            base_commit: base_commit.into(),
        })
    }

    /// First eight characters of the base commit, for display.
    pub fn short_commit(&self) -> &str {
        let end = self
            .base_commit
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.base_commit.len());
        &self.base_commit[..end]
    }
}

/// Accepts RFC 3339 timestamps and legacy offset-less ones (read as UTC).
fn deserialize_created<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{}': {}", raw, e)))
}
