pub mod global_value_hide;
pub mod obfuscator;
pub mod pass;

use cloakref_core::ir::Module;
use cloakref_utils::errors::TransformError;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

pub use global_value_hide::GlobalValueHide;

/// Trait for module obfuscation transforms.
pub trait Transform: Send + Sync {
    /// Returns the transform's name for logging and identification.
    fn name(&self) -> &'static str;
    /// Applies the transform to the module, returning whether changes were made.
    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool, TransformError>;
}

/// Configuration for transform passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PassConfig {
    /// Minimum quality threshold for accepting transforms
    pub accept_threshold: f64,
    /// Apply transforms aggressively without quality gates
    pub aggressive: bool,
    /// Number of xor/increment rounds emitted into every decode sequence
    pub guard_rounds: usize,
}

impl Default for PassConfig {
    fn default() -> Self {
        Self {
            accept_threshold: 0.0,
            aggressive: true,
            guard_rounds: 3,
        }
    }
}

impl PassConfig {
    /// Reads a configuration from JSON; missing fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
