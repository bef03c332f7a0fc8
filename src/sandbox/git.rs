//! Git CLI implementation of [`SandboxBackend`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::process::{command_line, run_command, CommandFailure};

use super::backend::SandboxBackend;

/// Builds sandboxes with the `git` command-line tool.
#[derive(Debug, Clone)]
pub struct GitBackend {
    /// Base workspace repository cloned into each sandbox.
    base_repo_url: String,
    /// Program and arguments for the bootstrap step.
    bootstrap_command: Vec<String>,
    /// Upper bound for each spawned command.
    timeout: Duration,
    /// `-c key=value` pairs passed to every git invocation.
    git_config: Vec<String>,
}

impl GitBackend {
    /// Creates a backend cloning `base_repo_url` and bootstrapping with
    /// `bootstrap_command`.
    pub fn new(
        base_repo_url: impl Into<String>,
        bootstrap_command: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_repo_url: base_repo_url.into(),
            bootstrap_command,
            timeout,
            git_config: Vec::new(),
        }
    }

    /// Creates a backend from workspace settings.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.base_repo_url.clone(),
            settings.bootstrap_command.clone(),
            settings.command_timeout(),
        )
    }

    /// Adds a `git -c key=value` option to every git command.
    pub fn with_git_config(mut self, key: &str, value: &str) -> Self {
        self.git_config.push(format!("{}={}", key, value));
        self
    }

    pub fn base_repo_url(&self) -> &str {
        &self.base_repo_url
    }

    fn git(&self, cwd: &Path, args: &[&str]) -> Result<String> {
        let mut full: Vec<&str> = Vec::with_capacity(self.git_config.len() * 2 + args.len());
        for pair in &self.git_config {
            full.push("-c");
            full.push(pair);
        }
        full.extend_from_slice(args);

        run_command("git", &full, cwd, self.timeout).map_err(|failure| {
            let operation = command_line("git", args);
            tracing::error!(operation = %operation, cwd = ?cwd, error = %failure, "git command failed");
            Error::Git {
                operation,
                detail: failure.to_string(),
            }
        })
    }
}

impl SandboxBackend for GitBackend {
    fn clone_base(&self, target: &Path) -> Result<()> {
        if target.exists() {
            return Err(Error::Git {
                operation: "git clone".to_string(),
                detail: format!("target directory already exists: {}", target.display()),
            });
        }

        let parent = target.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        // Concurrent creators may race on the shared parent; create_dir_all tolerates that.
        std::fs::create_dir_all(&parent)
            .map_err(|e| Error::filesystem(&parent, "create directory", e))?;

        let target_arg = target.to_string_lossy();
        self.git(&parent, &["clone", self.base_repo_url.as_str(), target_arg.as_ref()])?;

        tracing::info!(repo = %self.base_repo_url, path = ?target, "cloned base workspace");
        Ok(())
    }

    fn resolve_commit(&self, repo: &Path) -> Result<String> {
        let stdout = self.git(repo, &["rev-parse", "HEAD"])?;
        let commit = stdout.trim();

        if commit.is_empty() || commit.contains(char::is_whitespace) {
            return Err(Error::Git {
                operation: "git rev-parse HEAD".to_string(),
                detail: format!("unexpected output: '{}'", commit),
            });
        }

        Ok(commit.to_string())
    }

    fn add_project(&self, sandbox_dir: &Path, source: &str, project_name: &str) -> Result<()> {
        self.git(sandbox_dir, &["submodule", "add", source, project_name])?;
        self.git(sandbox_dir, &["submodule", "update", "--init", "--recursive"])?;

        tracing::info!(source = %source, project = %project_name, "added project submodule");
        Ok(())
    }

    fn create_branch(&self, project_dir: &Path, branch: &str) -> Result<()> {
        self.git(project_dir, &["checkout", "-b", branch])?;

        tracing::info!(branch = %branch, path = ?project_dir, "created feature branch");
        Ok(())
    }

    fn bootstrap(&self, sandbox_dir: &Path) -> Result<()> {
        let Some((program, args)) = self.bootstrap_command.split_first() else {
            return Err(Error::Config("bootstrap_command cannot be empty".to_string()));
        };
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        run_command(program, &args, sandbox_dir, self.timeout).map_err(|failure| {
            let detail = match &failure {
                CommandFailure::Spawn(_) => format!("{} (is '{}' installed?)", failure, program),
                _ => failure.to_string(),
            };
            Error::Command {
                program: command_line(program, &args),
                detail,
            }
        })?;

        tracing::info!(path = ?sandbox_dir, "bootstrap finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    const LIMIT: Duration = Duration::from_secs(60);

    /// Helper to create a temp git repo for testing.
    fn create_temp_git_repo() -> TempDir {
        let temp_dir = TempDir::new().expect("failed to create temp dir");

        for args in [
            vec!["init"],
            vec!["config", "user.email", "test@test.com"],
            vec!["config", "user.name", "Test User"],
        ] {
            Command::new("git")
                .args(&args)
                .current_dir(temp_dir.path())
                .output()
                .expect("failed to configure git repo");
        }

        std::fs::write(temp_dir.path().join("README.md"), "# Test Repo\n")
            .expect("failed to write README");

        Command::new("git")
            .args(["add", "."])
            .current_dir(temp_dir.path())
            .output()
            .expect("failed to add files");

        Command::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(temp_dir.path())
            .output()
            .expect("failed to create initial commit");

        temp_dir
    }

    fn backend_for(base: &Path) -> GitBackend {
        GitBackend::new(
            base.to_string_lossy(),
            vec!["true".to_string()],
            LIMIT,
        )
        .with_git_config("protocol.file.allow", "always")
    }

    #[test]
    fn from_settings_copies_values() {
        let settings = Settings {
            base_repo_url: "file:///srv/base.git".to_string(),
            bootstrap_command: vec!["uv".to_string(), "sync".to_string()],
            command_timeout_secs: 30,
        };
        let backend = GitBackend::from_settings(&settings);

        assert_eq!(backend.base_repo_url(), "file:///srv/base.git");
        assert_eq!(backend.bootstrap_command, vec!["uv", "sync"]);
        assert_eq!(backend.timeout, Duration::from_secs(30));
    }

    #[test]
    fn clone_and_resolve_commit() {
        let base = create_temp_git_repo();
        let out = TempDir::new().unwrap();
        let target = out.path().join("nested").join("amplifier-sandbox.x");
        let backend = backend_for(base.path());

        backend.clone_base(&target).expect("clone failed");
        assert!(target.join("README.md").exists());

        let commit = backend.resolve_commit(&target).unwrap();
        let expected = backend.resolve_commit(base.path()).unwrap();
        assert_eq!(commit, expected);
        assert_eq!(commit.len(), 40);
    }

    #[test]
    fn clone_refuses_existing_target() {
        let base = create_temp_git_repo();
        let out = TempDir::new().unwrap();
        let target = out.path().join("taken");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("keep.txt"), "mine").unwrap();

        let err = backend_for(base.path()).clone_base(&target).unwrap_err();
        assert!(matches!(err, Error::Git { .. }));
        assert!(err.to_string().contains("already exists"));
        assert!(target.join("keep.txt").exists());
    }

    #[test]
    fn clone_of_missing_repo_is_git_error() {
        let out = TempDir::new().unwrap();
        let backend = backend_for(&out.path().join("no-such-repo"));

        let err = backend.clone_base(&out.path().join("target")).unwrap_err();
        assert!(matches!(err, Error::Git { ref operation, .. } if operation.starts_with("git clone")));
    }

    #[test]
    fn add_project_and_create_branch() {
        let base = create_temp_git_repo();
        let project = create_temp_git_repo();
        let out = TempDir::new().unwrap();
        let target = out.path().join("sandbox");
        let backend = backend_for(base.path());

        backend.clone_base(&target).unwrap();
        backend
            .add_project(&target, &project.path().to_string_lossy(), "site")
            .expect("submodule add failed");
        assert!(target.join("site").join("README.md").exists());
        assert!(target.join(".gitmodules").exists());

        let project_dir = target.join("site");
        backend
            .create_branch(&project_dir, "feature/add-tags")
            .expect("branch failed");

        let head = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(&project_dir)
            .output()
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&head.stdout).trim(), "feature/add-tags");
    }

    #[test]
    fn duplicate_branch_is_git_error() {
        let repo = create_temp_git_repo();
        let backend = backend_for(repo.path());

        backend.create_branch(repo.path(), "feature/x").unwrap();
        let err = backend.create_branch(repo.path(), "feature/x").unwrap_err();
        assert!(matches!(err, Error::Git { .. }));
    }

    #[test]
    fn bootstrap_runs_configured_command() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::new(
            "unused",
            vec!["sh".to_string(), "-c".to_string(), "touch bootstrapped".to_string()],
            LIMIT,
        );

        backend.bootstrap(dir.path()).unwrap();
        assert!(dir.path().join("bootstrapped").exists());
    }

    #[test]
    fn failing_bootstrap_is_command_error() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::new("unused", vec!["false".to_string()], LIMIT);

        let err = backend.bootstrap(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Command { ref program, .. } if program == "false"));
    }

    #[test]
    fn missing_bootstrap_program_mentions_install() {
        let dir = TempDir::new().unwrap();
        let backend = GitBackend::new("unused", vec!["no-such-make-xyz".to_string()], LIMIT);

        let err = backend.bootstrap(dir.path()).unwrap_err();
        assert!(err.to_string().contains("installed"));
    }
}
