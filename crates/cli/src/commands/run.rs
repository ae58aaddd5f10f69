use crate::commands::{read_input, Command};
use clap::Args;
use cloakref_core::{parse_module, InterpConfig, Machine};
use cloakref_utils::errors::ObfuscateError;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

/// Arguments for the `run` subcommand.
#[derive(Args)]
pub struct RunArgs {
    /// Input module (.cir text)
    pub input: PathBuf,
    /// Routine to call
    #[arg(long, default_value = "main")]
    entry: String,
    /// Comma separated integer arguments, decimal or 0x hex
    #[arg(long, default_value = "")]
    args: String,
    /// Instruction budget for the call
    #[arg(long)]
    max_steps: Option<usize>,
    /// Bind every external routine to a stub that prints its arguments and returns 0
    #[arg(long)]
    stub_externals: bool,
    /// Print the final contents of writable globals
    #[arg(long)]
    dump_globals: bool,
}

/// Parses `"1, 0x2a"` into `[1, 42]`. Negative decimals wrap to their two's complement.
pub fn parse_args(raw: &str) -> Result<Vec<u64>, ObfuscateError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let parsed = if let Some(hex) = s.strip_prefix("0x") {
                u64::from_str_radix(hex, 16).ok()
            } else if s.starts_with('-') {
                s.parse::<i64>().ok().map(|v| v as u64)
            } else {
                s.parse::<u64>().ok()
            };
            parsed.ok_or_else(|| ObfuscateError::InvalidArgument(format!("bad integer `{s}`")))
        })
        .collect()
}

impl Command for RunArgs {
    /// Executes the `run` subcommand.
    fn execute(self) -> Result<(), Box<dyn Error>> {
        let text = read_input(&self.input)?;
        let module = parse_module(&text)?;
        let args = parse_args(&self.args)?;

        let mut config = InterpConfig::default();
        if let Some(max_steps) = self.max_steps {
            config.max_steps = max_steps;
        }
        let mut machine = Machine::new(&module)
            .map_err(ObfuscateError::from)?
            .with_config(config);

        if self.stub_externals {
            for func in module.functions.iter().filter(|f| f.is_declaration()) {
                let name = func.name.clone();
                machine.register_host(
                    func.name.clone(),
                    Box::new(move |args: &[u64]| {
                        println!("@{name}{args:?}");
                        0
                    }),
                );
            }
        }

        let result = machine
            .call(&self.entry, &args)
            .map_err(ObfuscateError::from)?;
        info!("@{} executed {} instructions", self.entry, machine.steps());
        match result {
            Some(value) => println!("{value}"),
            None => println!("(void)"),
        }

        if self.dump_globals {
            for (name, bytes) in machine.writable_state() {
                println!("@{name} = 0x{}", hex::encode(bytes));
            }
        }
        Ok(())
    }
}
