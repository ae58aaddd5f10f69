use crate::global_value_hide::GlobalValueHide;
use crate::{PassConfig, Transform};
use cloakref_analysis::{collect_metrics, compare};
use cloakref_core::ir::Module;
use cloakref_utils::errors::TransformError;
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Pipeline name of the global value hiding transform.
pub const GLOBAL_VALUE_HIDE: &str = "global-value-hide";

/// Every name accepted by [`transform_by_name`].
pub const REGISTERED: &[&str] = &[GLOBAL_VALUE_HIDE];

/// Builds the transform registered under `name`.
pub fn transform_by_name(name: &str, cfg: &PassConfig) -> Result<Box<dyn Transform>, TransformError> {
    match name {
        GLOBAL_VALUE_HIDE => Ok(Box::new(GlobalValueHide::new(cfg.clone()))),
        other => Err(TransformError::UnknownPass(other.to_string())),
    }
}

/// Resolves a comma separated list of pass names, e.g. `"global-value-hide"`.
pub fn parse_pipeline(pipeline: &str, cfg: &PassConfig) -> Result<Vec<Box<dyn Transform>>, TransformError> {
    pipeline
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| transform_by_name(name, cfg))
        .collect()
}

/// The default pipeline: global value hiding first, then `rest`.
pub fn default_pipeline(cfg: &PassConfig, rest: Vec<Box<dyn Transform>>) -> Vec<Box<dyn Transform>> {
    let mut passes = rest;
    passes.insert(0, Box::new(GlobalValueHide::new(cfg.clone())));
    passes
}

/// Outcome of one pass in a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassRecord {
    pub name: String,
    pub mutated: bool,
    pub delta: f64,
    pub kept: bool,
}

/// Trait for running a sequence of transforms on a module.
pub trait Pass {
    fn run(
        &self,
        module: &mut Module,
        passes: &[Box<dyn Transform>],
        cfg: &PassConfig,
        seed: u64,
    ) -> Result<Vec<PassRecord>, TransformError>;
}

/// Default implementation of the Pass trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPass;

impl Pass for DefaultPass {
    fn run(
        &self,
        module: &mut Module,
        passes: &[Box<dyn Transform>],
        cfg: &PassConfig,
        seed: u64,
    ) -> Result<Vec<PassRecord>, TransformError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut records = Vec::with_capacity(passes.len());

        for pass in passes {
            let before = collect_metrics(module)?;
            let mut snapshot = module.clone();

            let mutated = pass.apply(&mut snapshot, &mut rng)?;
            if !mutated {
                records.push(PassRecord {
                    name: pass.name().to_string(),
                    mutated,
                    delta: 0.0,
                    kept: false,
                });
                continue;
            }

            snapshot.validate()?;
            let after = collect_metrics(&snapshot)?;
            let delta = compare(&before, &after);

            let keep = delta >= cfg.accept_threshold || cfg.aggressive;
            info!(
                "{:>14} Δ{:+.2} {}",
                pass.name(),
                delta,
                if keep { "✓" } else { "×" }
            );

            if keep {
                *module = snapshot;
            }
            records.push(PassRecord {
                name: pass.name().to_string(),
                mutated,
                delta,
                kept: keep,
            });
        }
        Ok(records)
    }
}

/// Convenience function to run the default pass.
pub fn run(
    module: &mut Module,
    passes: &[Box<dyn Transform>],
    cfg: &PassConfig,
    seed: u64,
) -> Result<Vec<PassRecord>, TransformError> {
    DefaultPass.run(module, passes, cfg, seed)
}
