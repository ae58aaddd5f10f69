use crate::pass::{self, PassRecord};
use crate::{PassConfig, Transform};
use cloakref_analysis::{collect_metrics, Metrics};
use cloakref_core::{fingerprint, parse_module, print_module};
use cloakref_utils::errors::{ObfuscateError, TransformError};
use serde::{Deserialize, Serialize};

/// Configuration for the obfuscation pipeline
pub struct ObfuscationConfig {
    /// Random seed for deterministic obfuscation
    pub seed: u64,
    /// List of transforms to apply; empty selects the default pipeline
    pub transforms: Vec<Box<dyn Transform>>,
    /// Pass configuration for transform behavior
    pub pass_config: PassConfig,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            transforms: Vec::new(),
            pass_config: PassConfig::default(),
        }
    }
}

impl std::fmt::Debug for ObfuscationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObfuscationConfig")
            .field("seed", &self.seed)
            .field(
                "transforms",
                &format!("{} transforms", self.transforms.len()),
            )
            .field("pass_config", &self.pass_config)
            .finish()
    }
}

/// Result of the obfuscation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationResult {
    /// The transformed module in textual form
    pub module_text: String,
    /// Keccak-256 of `module_text`, 0x-prefixed hex
    pub fingerprint: String,
    /// Instruction count of the input
    pub original_instructions: usize,
    /// Instruction count of the output
    pub final_instructions: usize,
    /// Instruction growth as percentage
    pub size_increase_percentage: f64,
    pub metrics_before: Metrics,
    pub metrics_after: Metrics,
    /// Per-pass outcome, in pipeline order
    pub passes: Vec<PassRecord>,
    /// Metadata about the obfuscation process
    pub metadata: ObfuscationMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationMetadata {
    /// Names of transforms that were kept
    pub transforms_applied: Vec<String>,
    /// Seed used for the obfuscation
    pub seed_used: u64,
}

/// Main obfuscation pipeline: parse, transform, print.
pub fn obfuscate_module(
    input: &str,
    config: ObfuscationConfig,
) -> Result<ObfuscationResult, ObfuscateError> {
    let mut module = parse_module(input)?;
    module.validate().map_err(TransformError::from)?;

    tracing::debug!("Starting obfuscation pipeline:");
    tracing::debug!("  Module: {}", module.name);
    tracing::debug!("  Seed: 0x{:x}", config.seed);
    tracing::debug!("  User transforms: {}", config.transforms.len());

    let metrics_before = collect_metrics(&module).map_err(TransformError::from)?;
    let passes = if config.transforms.is_empty() {
        pass::default_pipeline(&config.pass_config, Vec::new())
    } else {
        config.transforms
    };

    let records = pass::run(&mut module, &passes, &config.pass_config, config.seed)?;
    for record in &records {
        tracing::debug!(
            "  {}: mutated={}, delta={:+.2}, kept={}",
            record.name,
            record.mutated,
            record.delta,
            record.kept
        );
    }

    let metrics_after = collect_metrics(&module).map_err(TransformError::from)?;
    let module_text = print_module(&module);
    let original_instructions = metrics_before.inst_cnt;
    let final_instructions = metrics_after.inst_cnt;
    let size_increase_percentage = if original_instructions > 0 {
        ((final_instructions as f64 - original_instructions as f64) / original_instructions as f64)
            * 100.0
    } else {
        0.0
    };

    tracing::debug!(
        "  Instructions: {} -> {} ({:+.1}%)",
        original_instructions,
        final_instructions,
        size_increase_percentage
    );

    Ok(ObfuscationResult {
        fingerprint: format!("0x{}", hex::encode(fingerprint(&module))),
        module_text,
        original_instructions,
        final_instructions,
        size_increase_percentage,
        metrics_before,
        metrics_after,
        metadata: ObfuscationMetadata {
            transforms_applied: records
                .iter()
                .filter(|r| r.kept)
                .map(|r| r.name.clone())
                .collect(),
            seed_used: config.seed,
        },
        passes: records,
    })
}

/// Prints a short human readable summary of an obfuscation run.
pub fn print_obfuscation_analysis(result: &ObfuscationResult) {
    let before = &result.metrics_before;
    let after = &result.metrics_after;
    println!("Seed: 0x{:x}", result.metadata.seed_used);
    println!("Transforms: {}", result.metadata.transforms_applied.join(", "));
    println!(
        "Instructions: {} -> {} ({:+.1}%)",
        result.original_instructions, result.final_instructions, result.size_increase_percentage
    );
    println!(
        "Direct data references: {} -> {}",
        before.direct_data_refs, after.direct_data_refs
    );
    println!(
        "Direct calls: {} -> {}",
        before.direct_calls, after.direct_calls
    );
    println!("Decode sites: {}", after.decode_sites);
    println!("Potency: {:.2} -> {:.2}", before.potency, after.potency);
    println!("Fingerprint: {}", result.fingerprint);
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIT: &str = r#"
module sample
@total = global i64 0
define void @add(i64) {
entry:
  %1 = load i64, @total
  %2 = add i64 %1, %0
  store i64 %2, @total
  ret void
}
define i64 @main() {
entry:
  call fn(i64) -> void @add(3)
  call fn(i64) -> void @add(4)
  %0 = load i64, @total
  ret %0
}
"#;

    #[test]
    fn hides_all_hideable_references() {
        let result = obfuscate_module(UNIT, ObfuscationConfig::default()).unwrap();
        assert_eq!(result.metrics_before.direct_data_refs, 3);
        assert_eq!(result.metrics_before.direct_calls, 2);
        assert_eq!(result.metrics_after.direct_data_refs, 0);
        assert_eq!(result.metrics_after.direct_calls, 0);
        assert_eq!(result.metrics_after.decode_sites, 5);
        assert_eq!(result.metrics_after.encoded_tables, 1);
        assert_eq!(result.metadata.transforms_applied, vec!["GlobalValueHide"]);
        assert!(result.size_increase_percentage > 0.0);
        assert!(result.fingerprint.starts_with("0x"));
        assert_eq!(result.fingerprint.len(), 66);
    }

    #[test]
    fn output_is_reproducible_per_seed() {
        let run = |seed| {
            obfuscate_module(
                UNIT,
                ObfuscationConfig {
                    seed,
                    ..Default::default()
                },
            )
            .unwrap()
        };
        let (a, b, c) = (run(1), run(1), run(2));
        assert_eq!(a.module_text, b.module_text);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
    }

    #[test]
    fn parse_errors_surface() {
        assert!(matches!(
            obfuscate_module("define", ObfuscationConfig::default()),
            Err(ObfuscateError::Parse(_))
        ));
    }
}
