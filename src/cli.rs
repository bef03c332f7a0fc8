//! Command-line interface.
//!
//! Parsing is done with clap; each subcommand resolves the workspace, builds
//! a [`SandboxManager`] and prints a human-readable result to stdout.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{resolve_workspace_root, Settings, Validate};
use crate::error::Result;
use crate::sandbox::{
    list_sandboxes, orphaned_directories, sandbox_info, GitBackend, SandboxConfig,
    SandboxManager, SandboxRecord, StateStore,
};

/// Manage isolated feature sandboxes built on a shared base workspace.
#[derive(Parser, Debug)]
#[command(name = "sandbox-env", version, about, long_about = None)]
pub struct Cli {
    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a sandbox for a feature
    Create {
        /// Feature name (letters, digits, '-' and '_')
        name: String,

        /// Project repository URL or path
        project_source: String,

        /// Workspace root holding sandboxes and the registry
        #[arg(long)]
        workspace: Option<PathBuf>,

        /// Base workspace repository to clone instead of the configured one
        #[arg(long)]
        repo_url: Option<String>,
    },

    /// List registered sandboxes, oldest first
    List {
        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Show everything recorded about a sandbox
    Info {
        name: String,

        #[arg(long)]
        workspace: Option<PathBuf>,
    },

    /// Delete a sandbox directory and its record
    Remove {
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        force: bool,

        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

impl Commands {
    /// The sandbox the command targets, if any.
    pub fn sandbox_name(&self) -> Option<&str> {
        match self {
            Commands::Create { name, .. }
            | Commands::Info { name, .. }
            | Commands::Remove { name, .. } => Some(name.as_str()),
            Commands::List { .. } => None,
        }
    }
}

/// Runs a parsed command against the process's stdin and stdout.
pub fn run(cli: Cli) -> Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    execute(cli.command, &mut stdin.lock(), &mut stdout.lock())
}

/// Runs `command`, reading confirmations from `input` and writing results to
/// `out`.
pub fn execute<R: BufRead, W: Write>(command: Commands, input: &mut R, out: &mut W) -> Result<()> {
    match command {
        Commands::Create {
            name,
            project_source,
            workspace,
            repo_url,
        } => {
            let root = resolve_workspace_root(workspace)?;
            let config = SandboxConfig::new(name, project_source, root.clone());
            // Reject bad input before reading settings from disk.
            config.validate()?;

            let mut settings = Settings::load(&root)?;
            if let Some(url) = repo_url {
                settings.base_repo_url = url;
                settings.validate().into_result()?;
            }

            let backend = GitBackend::from_settings(&settings);
            let manager = SandboxManager::new(StateStore::new(root), backend);
            let record = manager.create(&config)?;
            print_created(out, &record)?;
        }

        Commands::List { workspace } => {
            let store = StateStore::new(resolve_workspace_root(workspace)?);
            let records = list_sandboxes(&store)?;
            print_list(out, &records)?;

            let orphans = orphaned_directories(&store)?;
            if !orphans.is_empty() {
                writeln!(out)?;
                writeln!(out, "Unregistered sandbox directories (inspect and delete manually):")?;
                for path in orphans {
                    writeln!(out, "  {}", path.display())?;
                }
            }
        }

        Commands::Info { name, workspace } => {
            let store = StateStore::new(resolve_workspace_root(workspace)?);
            let record = sandbox_info(&store, &name)?;
            print_info(out, &record)?;
        }

        Commands::Remove {
            name,
            force,
            workspace,
        } => {
            let store = StateStore::new(resolve_workspace_root(workspace)?);
            // Fail on unknown names before asking anything.
            let record = sandbox_info(&store, &name)?;

            if !force {
                writeln!(out, "Sandbox location: {}", record.sandbox_path.display())?;
                if !confirm(input, out, &format!("Remove sandbox '{}'?", name))? {
                    writeln!(out, "Cancelled.")?;
                    return Ok(());
                }
            }

            // Removal never runs a backend step.
            let manager = SandboxManager::new(store, GitBackend::from_settings(&Settings::default()));
            let removed = manager.remove(&name)?;
            writeln!(out, "Removed sandbox '{}' ({})", removed.name, removed.sandbox_path.display())?;
        }
    }

    Ok(())
}

/// Asks a yes/no question; only `y` or `yes` counts as consent.
fn confirm<R: BufRead, W: Write>(input: &mut R, out: &mut W, question: &str) -> Result<bool> {
    write!(out, "{} [y/N]: ", question)?;
    out.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    let answer = answer.trim().to_lowercase();

    Ok(answer == "y" || answer == "yes")
}

fn print_created<W: Write>(out: &mut W, record: &SandboxRecord) -> Result<()> {
    writeln!(out, "Sandbox '{}' created.", record.name)?;
    writeln!(out)?;
    writeln!(out, "  Location:    {}", record.sandbox_path.display())?;
    writeln!(out, "  Project:     {}", record.project_name)?;
    writeln!(out, "  Branch:      {}", record.branch_name)?;
    writeln!(out, "  Base commit: {}", record.short_commit())?;
    writeln!(out)?;
    writeln!(out, "Next steps:")?;
    writeln!(out, "  cd {}", record.sandbox_path.join(&record.project_name).display())?;
    writeln!(out, "  sandbox-env remove {}   # when the feature is done", record.name)?;
    Ok(())
}

fn print_list<W: Write>(out: &mut W, records: &[SandboxRecord]) -> Result<()> {
    if records.is_empty() {
        writeln!(out, "No sandboxes found.")?;
        return Ok(());
    }

    writeln!(out, "Found {} sandbox(es):", records.len())?;
    for record in records {
        writeln!(out)?;
        writeln!(out, "  {}", record.name)?;
        writeln!(out, "    Project: {}", record.project_name)?;
        writeln!(out, "    Branch:  {}", record.branch_name)?;
        writeln!(out, "    Created: {}", record.created_at.format("%Y-%m-%d %H:%M"))?;
    }
    Ok(())
}

fn print_info<W: Write>(out: &mut W, record: &SandboxRecord) -> Result<()> {
    writeln!(out, "Sandbox: {}", record.name)?;
    writeln!(out, "  Project:        {}", record.project_name)?;
    writeln!(out, "  Project source: {}", record.project_source)?;
    writeln!(out, "  Branch:         {}", record.branch_name)?;
    writeln!(out, "  Location:       {}", record.sandbox_path.display())?;
    writeln!(out, "  Base commit:    {}", record.base_commit)?;
    writeln!(out, "  Created:        {}", record.created_at.to_rfc3339())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, ErrorKind};
    use chrono::{TimeZone, Utc};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn seed(root: &std::path::Path, name: &str) -> SandboxRecord {
        let store = StateStore::new(root);
        let config = SandboxConfig::new(name, "https://github.com/user/site.git", root);
        let created = Utc.with_ymd_and_hms(2025, 3, 4, 15, 6, 0).unwrap();
        let record = SandboxRecord::from_config(&config, created, "0123456789abcdef").unwrap();
        std::fs::create_dir_all(&record.sandbox_path).unwrap();

        store
            .with_lock(|lock, registry| lock.save(&registry.add(record.clone())?))
            .unwrap();
        record
    }

    fn exec(command: Commands, input: &str) -> (Result<()>, String) {
        let mut out = Vec::new();
        let result = execute(command, &mut Cursor::new(input.as_bytes()), &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn parses_create_with_options() {
        let cli = Cli::try_parse_from([
            "sandbox-env",
            "--verbose",
            "create",
            "add-tags",
            "git@host:u/site.git",
            "--workspace",
            "/tmp/ws",
            "--repo-url",
            "file:///srv/base.git",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.command.sandbox_name(), Some("add-tags"));
        match cli.command {
            Commands::Create {
                project_source,
                workspace,
                repo_url,
                ..
            } => {
                assert_eq!(project_source, "git@host:u/site.git");
                assert_eq!(workspace, Some(PathBuf::from("/tmp/ws")));
                assert_eq!(repo_url.as_deref(), Some("file:///srv/base.git"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parses_remove_force() {
        let cli = Cli::try_parse_from(["sandbox-env", "remove", "x", "-f"]).unwrap();
        assert!(matches!(cli.command, Commands::Remove { force: true, .. }));
    }

    #[test]
    fn create_requires_source() {
        assert!(Cli::try_parse_from(["sandbox-env", "create", "x"]).is_err());
    }

    #[test]
    fn list_empty() {
        let dir = TempDir::new().unwrap();
        let (result, out) = exec(
            Commands::List {
                workspace: Some(dir.path().to_path_buf()),
            },
            "",
        );
        result.unwrap();
        assert_eq!(out, "No sandboxes found.\n");
    }

    #[test]
    fn list_shows_summary_and_orphans() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "add-tags");
        std::fs::create_dir_all(dir.path().join("amplifier-sandbox.stray")).unwrap();

        let (result, out) = exec(
            Commands::List {
                workspace: Some(dir.path().to_path_buf()),
            },
            "",
        );
        result.unwrap();
        assert!(out.contains("Found 1 sandbox(es):"));
        assert!(out.contains("Project: site"));
        assert!(out.contains("Branch:  feature/add-tags"));
        assert!(out.contains("Created: 2025-03-04 15:06"));
        assert!(out.contains("amplifier-sandbox.stray"));
    }

    #[test]
    fn info_prints_every_field() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "add-tags");

        let (result, out) = exec(
            Commands::Info {
                name: "add-tags".to_string(),
                workspace: Some(dir.path().to_path_buf()),
            },
            "",
        );
        result.unwrap();
        for needle in [
            "Sandbox: add-tags",
            "https://github.com/user/site.git",
            "feature/add-tags",
            "0123456789abcdef",
            "2025-03-04T15:06:00+00:00",
        ] {
            assert!(out.contains(needle), "missing {}", needle);
        }
    }

    #[test]
    fn remove_declined_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let record = seed(dir.path(), "keep");

        let (result, out) = exec(
            Commands::Remove {
                name: "keep".to_string(),
                force: false,
                workspace: Some(dir.path().to_path_buf()),
            },
            "n\n",
        );
        result.unwrap();
        assert!(out.contains("Remove sandbox 'keep'? [y/N]"));
        assert!(out.ends_with("Cancelled.\n"));
        assert!(record.sandbox_path.exists());
    }

    #[test]
    fn remove_confirmed_deletes() {
        let dir = TempDir::new().unwrap();
        let record = seed(dir.path(), "bye");

        let (result, out) = exec(
            Commands::Remove {
                name: "bye".to_string(),
                force: false,
                workspace: Some(dir.path().to_path_buf()),
            },
            "YES\n",
        );
        result.unwrap();
        assert!(out.contains("Removed sandbox 'bye'"));
        assert!(!record.sandbox_path.exists());
    }

    #[test]
    fn remove_unknown_fails_without_prompt() {
        let dir = TempDir::new().unwrap();

        let (result, out) = exec(
            Commands::Remove {
                name: "ghost".to_string(),
                force: false,
                workspace: Some(dir.path().to_path_buf()),
            },
            "y\n",
        );
        assert!(matches!(result, Err(Error::SandboxNotFound(_))));
        assert!(out.is_empty());
    }

    #[test]
    fn create_with_bad_name_is_invalid_input() {
        let dir = TempDir::new().unwrap();

        let (result, _) = exec(
            Commands::Create {
                name: "no spaces".to_string(),
                project_source: "https://host/u/p.git".to_string(),
                workspace: Some(dir.path().to_path_buf()),
                repo_url: None,
            },
            "",
        );
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InvalidInput);
        assert!(!dir.path().join(".sandbox-state.json").exists());
    }

    #[test]
    fn blank_repo_url_override_is_invalid_input() {
        let dir = TempDir::new().unwrap();

        let (result, out) = exec(
            Commands::Create {
                name: "fine".to_string(),
                project_source: "https://host/u/p.git".to_string(),
                workspace: Some(dir.path().to_path_buf()),
                repo_url: Some("  ".to_string()),
            },
            "",
        );
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().contains("base_repo_url"));
        assert!(out.is_empty());
        assert!(!dir.path().join("amplifier-sandbox.fine").exists());
    }
}
