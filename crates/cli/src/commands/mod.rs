use clap::Subcommand;
use cloakref_utils::errors::ObfuscateError;
use std::error::Error;
use std::fs;
use std::path::Path;

pub mod audit;
pub mod obfuscate;
pub mod run;

#[derive(Subcommand)]
pub enum Cmd {
    /// Hide global references in a module
    Obfuscate(obfuscate::ObfuscateArgs),

    /// Interpret a module and print the result of its entry routine
    Run(run::RunArgs),

    /// List direct references left in a module as JSON
    Audit(audit::AuditArgs),
}

pub trait Command {
    fn execute(self) -> Result<(), Box<dyn Error>>;
}

impl Command for Cmd {
    fn execute(self) -> Result<(), Box<dyn Error>> {
        match self {
            Cmd::Obfuscate(args) => args.execute(),
            Cmd::Run(args) => args.execute(),
            Cmd::Audit(args) => args.execute(),
        }
    }
}

/// Reads a module file into a string.
pub(crate) fn read_input(path: &Path) -> Result<String, ObfuscateError> {
    Ok(fs::read_to_string(path)?)
}
