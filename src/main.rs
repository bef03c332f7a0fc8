//! sandbox-env CLI
//!
//! Creates, lists, inspects and removes feature sandboxes.

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use sandbox_env::cli::{self, Cli};

fn main() {
    let args = Cli::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let sandbox = args.command.sandbox_name().map(str::to_string);

    if let Err(e) = cli::run(args) {
        match sandbox {
            Some(name) => eprintln!("error[{}]: sandbox '{}': {}", e.kind(), name, e),
            None => eprintln!("error[{}]: {}", e.kind(), e),
        }
        std::process::exit(1);
    }
}
