use crate::commands::{read_input, Command};
use clap::Args;
use cloakref_analysis::{audit, collect_metrics, AuditReport, Metrics};
use cloakref_core::parse_module;
use cloakref_utils::errors::TransformError;
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;

/// Arguments for the `audit` subcommand.
#[derive(Args)]
pub struct AuditArgs {
    /// Input module (.cir text)
    pub input: PathBuf,
    /// Exit with an error if any hideable reference remains
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Serialize)]
struct AuditOutput {
    audit: AuditReport,
    metrics: Metrics,
    hideable: usize,
}

impl Command for AuditArgs {
    /// Executes the `audit` subcommand.
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let text = read_input(&self.input)?;
        let module = parse_module(&text)?;
        let metrics = collect_metrics(&module).map_err(TransformError::from)?;
        let report = audit(&module);
        let hideable = report.hideable().count();

        let output = AuditOutput {
            audit: report,
            metrics,
            hideable,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);

        if self.strict && hideable > 0 {
            return Err(format!("{hideable} hideable references remain").into());
        }
        Ok(())
    }
}
