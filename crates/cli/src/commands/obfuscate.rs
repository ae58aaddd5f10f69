//! Module for the `obfuscate` subcommand, which hides global references in a module.
//!
//! The input module is parsed, run through the selected pass pipeline and printed back. A JSON
//! report with metrics and the output fingerprint can be written next to the module.
use crate::commands::{read_input, Command};
use chrono::{DateTime, Utc};
use clap::Args;
use cloakref_analysis::Metrics;
use cloakref_transform::obfuscator::{
    obfuscate_module, print_obfuscation_analysis, ObfuscationConfig, ObfuscationResult,
};
use cloakref_transform::pass::{self, PassRecord};
use cloakref_transform::PassConfig;
use cloakref_utils::errors::ObfuscateError;
use serde::Serialize;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the `obfuscate` subcommand.
#[derive(Args)]
pub struct ObfuscateArgs {
    /// Input module (.cir text)
    pub input: PathBuf,
    /// Random seed; a fresh one is drawn and logged when omitted
    #[arg(long)]
    seed: Option<u64>,
    /// Comma separated pass pipeline
    #[arg(long, default_value = pass::GLOBAL_VALUE_HIDE)]
    passes: String,
    /// Xor/increment rounds per decode sequence (overrides --config)
    #[arg(long)]
    guard_rounds: Option<usize>,
    /// JSON file with pass configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the transformed module here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Write a JSON report of the run
    #[arg(long)]
    emit: Option<PathBuf>,
    /// Print the full result as JSON instead of the module text
    #[arg(long)]
    json: bool,
}

/// JSON report written by `--emit`.
#[derive(Debug, Serialize)]
struct Report<'a> {
    generated_at: DateTime<Utc>,
    input: String,
    seed: u64,
    fingerprint: &'a str,
    original_instructions: usize,
    final_instructions: usize,
    size_increase_percentage: f64,
    metrics_before: &'a Metrics,
    metrics_after: &'a Metrics,
    passes: &'a [PassRecord],
}

impl<'a> Report<'a> {
    fn new(args: &ObfuscateArgs, result: &'a ObfuscationResult) -> Self {
        Self {
            generated_at: Utc::now(),
            input: args.input.display().to_string(),
            seed: result.metadata.seed_used,
            fingerprint: &result.fingerprint,
            original_instructions: result.original_instructions,
            final_instructions: result.final_instructions,
            size_increase_percentage: result.size_increase_percentage,
            metrics_before: &result.metrics_before,
            metrics_after: &result.metrics_after,
            passes: &result.passes,
        }
    }
}

impl ObfuscateArgs {
    fn pass_config(&self) -> Result<PassConfig, ObfuscateError> {
        let mut cfg = match &self.config {
            Some(path) => PassConfig::from_json(&fs::read_to_string(path)?)?,
            None => PassConfig::default(),
        };
        if let Some(rounds) = self.guard_rounds {
            cfg.guard_rounds = rounds;
        }
        Ok(cfg)
    }
}

impl Command for ObfuscateArgs {
    /// Executes the `obfuscate` subcommand.
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let text = read_input(&self.input)?;
        let pass_config = self.pass_config()?;
        let transforms = pass::parse_pipeline(&self.passes, &pass_config)?;
        if transforms.is_empty() {
            return Err(ObfuscateError::InvalidArgument("empty pass pipeline".into()).into());
        }

        let seed = self.seed.unwrap_or_else(|| {
            let seed = rand::random();
            info!("No seed given, using {seed}");
            seed
        });

        let result = obfuscate_module(
            &text,
            ObfuscationConfig {
                seed,
                transforms,
                pass_config,
            },
        )?;

        if let Some(path) = &self.emit {
            let report = Report::new(&self, &result);
            fs::write(path, serde_json::to_string_pretty(&report)?)?;
            info!("Report written to {}", path.display());
        }

        match &self.output {
            Some(path) => {
                fs::write(path, &result.module_text)?;
                info!("Module written to {}", path.display());
                if self.json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    print_obfuscation_analysis(&result);
                }
            }
            None if self.json => println!("{}", serde_json::to_string_pretty(&result)?),
            None => print!("{}", result.module_text),
        }
        Ok(())
    }
}
