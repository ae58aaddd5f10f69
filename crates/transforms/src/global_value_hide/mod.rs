//! Hides direct references to globals and routines behind an encoded address table.
//!
//! The transform runs three phases exactly once, in order:
//!
//! 1. [`collector::collect`] lists every global and routine of the module.
//! 2. [`encryptor::encrypt`] draws a key per symbol and appends a private read-only table of
//!    `address + key` entries.
//! 3. [`replacer::replace`] rewrites every data use and every direct call to load the entry
//!    and decode it with a randomly chosen [`substitution::Substitution`].
//!
//! Nothing is removed from the module; the only new global is the table.
pub mod collector;
pub mod encryptor;
pub mod replacer;
pub mod substitution;

use crate::{PassConfig, Transform};
use cloakref_core::ir::Module;
use cloakref_utils::errors::TransformError;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use collector::{collect, CollectedSymbols};
pub use encryptor::{encode_address, encrypt, EncryptedValue, EncryptionResult};
pub use replacer::{replace, ReplaceStats};
pub use substitution::{DecodeSite, Substitution, SubstitutionLibrary};

/// What one run of the transform did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HideSummary {
    /// Name of the emitted table, if any.
    pub table: Option<String>,
    pub globals: usize,
    pub functions: usize,
    pub data_sites: usize,
    pub call_sites: usize,
}

/// Global value hiding transform.
#[derive(Debug)]
pub struct GlobalValueHide {
    config: PassConfig,
    library: SubstitutionLibrary,
}

impl GlobalValueHide {
    pub fn new(config: PassConfig) -> Self {
        Self::with_library(config, SubstitutionLibrary::builtin())
    }

    pub fn with_library(config: PassConfig, library: SubstitutionLibrary) -> Self {
        Self { config, library }
    }

    /// Runs collect, encrypt and replace over `module`.
    pub fn run(&self, module: &mut Module, rng: &mut StdRng) -> Result<HideSummary, TransformError> {
        if self.library.is_empty() {
            return Err(TransformError::EmptyRegistry);
        }
        module.validate()?;
        let symbols = collect(module);
        debug!(
            "Collected {} globals and {} routines",
            symbols.globals.len(),
            symbols.functions.len()
        );

        let encrypted = encrypt(module, &symbols, rng);
        let stats = replace(module, &encrypted, &self.library, self.config.guard_rounds, rng)?;

        let summary = HideSummary {
            table: encrypted.table.map(|id| module.global(id).name.clone()),
            globals: encrypted.globals.len(),
            functions: encrypted.functions.len(),
            data_sites: stats.data_sites,
            call_sites: stats.call_sites,
        };
        info!(
            "Hid {} globals and {} routines behind {} ({} data sites, {} call sites)",
            summary.globals,
            summary.functions,
            summary.table.as_deref().unwrap_or("no table"),
            summary.data_sites,
            summary.call_sites
        );
        Ok(summary)
    }
}

impl Transform for GlobalValueHide {
    fn name(&self) -> &'static str {
        "GlobalValueHide"
    }

    fn apply(&self, module: &mut Module, rng: &mut StdRng) -> Result<bool, TransformError> {
        self.run(module, rng)?;
        Ok(true)
    }
}
