//! Tool settings and workspace resolution.
//!
//! Settings come from an optional `.sandbox-env.toml` in the workspace root,
//! then environment overrides. Validation runs before any sandbox work starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Workspace root used inside the development container.
pub const CONTAINER_WORKSPACE_ROOT: &str = "/workspace";

/// Settings file name under the workspace root.
pub const SETTINGS_FILE_NAME: &str = ".sandbox-env.toml";

/// Overrides the default workspace root.
pub const ENV_WORKSPACE: &str = "SANDBOX_ENV_WORKSPACE";

/// Overrides [`Settings::base_repo_url`].
pub const ENV_REPO_URL: &str = "SANDBOX_ENV_REPO_URL";

/// Overrides [`Settings::command_timeout_secs`].
pub const ENV_TIMEOUT_SECS: &str = "SANDBOX_ENV_TIMEOUT_SECS";

/// Timeouts above this only produce a warning.
const LONG_TIMEOUT_SECS: u64 = 7200;

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Settings shared by every sandbox in a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Base workspace repository cloned into each sandbox.
    #[serde(default = "default_base_repo_url")]
    pub base_repo_url: String,

    /// Program and arguments run inside a new sandbox after checkout.
    #[serde(default = "default_bootstrap_command")]
    pub bootstrap_command: Vec<String>,

    /// Upper bound for each external command, in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_base_repo_url() -> String {
    "https://github.com/qhanam/amplifier.git".to_string()
}

fn default_bootstrap_command() -> Vec<String> {
    vec!["make".to_string(), "install".to_string()]
}

fn default_command_timeout_secs() -> u64 {
    600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_repo_url: default_base_repo_url(),
            bootstrap_command: default_bootstrap_command(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

impl Settings {
    /// Loads settings for `workspace_root` and validates them.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let mut settings = Self::from_file(&workspace_root.join(SETTINGS_FILE_NAME))?;
        settings.apply_overrides(|key| std::env::var(key).ok())?;

        for warning in settings.validate().into_result()? {
            tracing::warn!(warning = %warning, "settings");
        }
        Ok(settings)
    }

    /// Reads a settings file; a missing file yields defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::filesystem(path, "read settings", e)),
        };

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid settings in {}: {}", path.display(), e)))
    }

    /// Applies environment-style overrides looked up through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REPO_URL) {
            self.base_repo_url = url;
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.command_timeout_secs = raw.trim().parse().map_err(|_| {
                Error::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_TIMEOUT_SECS, raw
                ))
            })?;
        }

        Ok(())
    }

    /// Returns the bound applied to each external command.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Validate for Settings {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.base_repo_url.trim().is_empty() {
            result.add_error("base_repo_url cannot be empty");
        }

        match self.bootstrap_command.first() {
            None => result.add_error("bootstrap_command cannot be empty"),
            Some(program) if program.trim().is_empty() => {
                result.add_error("bootstrap_command program cannot be blank")
            }
            Some(_) => {}
        }

        if self.command_timeout_secs == 0 {
            result.add_error("command_timeout_secs must be at least 1");
        }

        if self.command_timeout_secs > LONG_TIMEOUT_SECS {
            result.add_warning("command_timeout_secs over 2 hours may indicate a misconfiguration");
        }

        result
    }
}

/// Picks the workspace root: explicit path, then `SANDBOX_ENV_WORKSPACE`,
/// then `/workspace` in a container, else `./workspace`.
///
/// Relative paths are resolved against the current directory.
pub fn resolve_workspace_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    let chosen = explicit
        .or_else(|| std::env::var_os(ENV_WORKSPACE).map(PathBuf::from))
        .unwrap_or_else(|| {
            if in_container() {
                PathBuf::from(CONTAINER_WORKSPACE_ROOT)
            } else {
                PathBuf::from("workspace")
            }
        });

    if chosen.is_absolute() {
        return Ok(chosen);
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(chosen))
}

/// Detects whether this process runs inside a Docker container.
pub fn in_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }

    std::fs::read_to_string("/proc/1/cgroup")
        .map(|cgroup| cgroup.contains("docker"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_valid());
        assert_eq!(settings.bootstrap_command, vec!["make", "install"]);
        assert_eq!(settings.command_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::from_file(&dir.path().join(SETTINGS_FILE_NAME)).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn settings_deserialize_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"
                base_repo_url = "file:///srv/base.git"
                bootstrap_command = ["uv", "sync"]
            "#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.base_repo_url, "file:///srv/base.git");
        assert_eq!(settings.bootstrap_command, vec!["uv", "sync"]);
        assert_eq!(settings.command_timeout_secs, 600);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, "command_timeout_secs = \"soon\"").unwrap();

        assert!(matches!(Settings::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut settings = Settings::default();
        settings
            .apply_overrides(lookup_from(&[
                (ENV_REPO_URL, "git@host:me/base.git"),
                (ENV_TIMEOUT_SECS, " 42 "),
            ]))
            .unwrap();

        assert_eq!(settings.base_repo_url, "git@host:me/base.git");
        assert_eq!(settings.command_timeout_secs, 42);
    }

    #[test]
    fn non_numeric_timeout_override_fails() {
        let mut settings = Settings::default();
        let err = settings
            .apply_overrides(lookup_from(&[(ENV_TIMEOUT_SECS, "ten")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TIMEOUT_SECS));
    }

    #[test]
    fn empty_bootstrap_and_zero_timeout_fail() {
        let settings = Settings {
            base_repo_url: String::new(),
            bootstrap_command: vec![],
            command_timeout_secs: 0,
        };
        let result = settings.validate();
        assert!(!result.is_valid());
        assert_eq!(result.errors.len(), 3);
        assert!(result.into_result().is_err());
    }

    #[test]
    fn very_long_timeout_only_warns() {
        let settings = Settings {
            command_timeout_secs: 3 * 3600,
            ..Default::default()
        };
        let result = settings.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("2 hours")));
    }

    #[test]
    fn explicit_absolute_workspace_wins() {
        let dir = TempDir::new().unwrap();
        let root = resolve_workspace_root(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(root, dir.path());
    }

    #[test]
    fn explicit_relative_workspace_is_made_absolute() {
        let root = resolve_workspace_root(Some(PathBuf::from("ws"))).unwrap();
        assert!(root.is_absolute());
        assert!(root.ends_with("ws"));
    }
}
