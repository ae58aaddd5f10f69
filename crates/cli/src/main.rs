/// Entry point for the cloakref CLI, a reference hiding obfuscator for textual IR modules.
///
/// This module parses command-line arguments and dispatches to subcommands for obfuscating,
/// interpreting or auditing a module. It initializes logging and handles the main execution
/// flow.
use clap::Parser;
use cloakref_cli::commands::{Cmd, Command};
use tracing_subscriber::EnvFilter;

/// Command-line interface for cloakref.
///
/// cloakref hides direct references to globals and routines behind a per-build encoded
/// address table, runs modules in a reference interpreter and audits what stays exposed.
#[derive(Parser)]
#[command(name = "cloakref")]
#[command(about = "cloakref: global reference hiding for IR modules")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Runs the cloakref CLI with the provided arguments.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    cli.command.execute()
}
