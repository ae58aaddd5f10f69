//! Interchangeable formulas that recover a symbol address from its encoded table entry.
//!
//! Every formula computes the same thing, `encoded - key`, through a different instruction
//! shape. None of them mentions the key as a literal; each site samples its own constants,
//! reads the table slot through a volatile load and runs a short xor/increment sequence so
//! that no two sites, and no two builds, look alike.
use cloakref_core::ir::{InstBuilder, ValueId, DECODE_TAG};
use cloakref_utils::errors::TransformError;
use rand::{rngs::StdRng, Rng};

mod add_xor_chain;
mod complement_split;
mod guards;
mod mba_negate;

pub use add_xor_chain::AddXorChain;
pub use complement_split::ComplementSplit;
pub use mba_negate::MbaNegate;

/// Metadata key marking a recovered address; metrics count decode sites by it.
pub const OBF_MD: &str = DECODE_TAG;
/// Metadata key naming the formula that produced a recovered address.
pub const OBF_SUB: &str = "obf.sub";

/// Inputs available to a formula at one use site.
#[derive(Debug, Clone, Copy)]
pub struct DecodeSite {
    /// Encoded address, freshly loaded from the table.
    pub encoded: ValueId,
    /// Pointer to the table slot holding the encoded address.
    pub slot: ValueId,
    pub key: u64,
    /// Number of xor/increment rounds to emit.
    pub guard_rounds: usize,
}

impl DecodeSite {
    /// Offset that turns the encoded address back into the real one.
    pub const fn offset(&self) -> u64 {
        self.key.wrapping_neg()
    }
}

/// An address recovery formula.
pub trait Substitution: Send + Sync + std::fmt::Debug {
    /// Stable name, recorded on the final instruction of every decode sequence.
    fn name(&self) -> &'static str;

    /// Emits instructions evaluating to [`DecodeSite::offset`]. `zero` is a run-time value
    /// that always holds zero and must flow into the computation.
    fn offset(
        &self,
        b: &mut InstBuilder<'_>,
        site: &DecodeSite,
        zero: ValueId,
        rng: &mut StdRng,
    ) -> ValueId;

    /// Emits the complete decode sequence and returns the recovered address.
    fn decode(&self, b: &mut InstBuilder<'_>, site: &DecodeSite, rng: &mut StdRng) -> ValueId {
        let zero = guards::volatile_zero(b, site.slot, rng);
        let offset = self.offset(b, site, zero, rng);
        let offset = guards::lane_rounds(b, offset, site.offset(), site.guard_rounds, rng);
        let addr = b.gep(site.encoded, offset, 1, false);
        b.tag(OBF_MD, "obfuscated");
        b.tag(OBF_SUB, self.name());
        addr
    }
}

/// Fixed, ordered registry of formulas.
#[derive(Debug)]
pub struct SubstitutionLibrary {
    subs: Vec<Box<dyn Substitution>>,
}

impl Default for SubstitutionLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SubstitutionLibrary {
    /// All formulas shipped with the transform.
    pub fn builtin() -> Self {
        Self::with(vec![
            Box::new(AddXorChain),
            Box::new(ComplementSplit),
            Box::new(MbaNegate),
        ])
    }

    pub fn with(subs: Vec<Box<dyn Substitution>>) -> Self {
        Self { subs }
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.subs.iter().map(|s| s.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Substitution> {
        self.subs
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// Picks a formula uniformly at random.
    pub fn choose(&self, rng: &mut StdRng) -> Result<&dyn Substitution, TransformError> {
        if self.subs.is_empty() {
            return Err(TransformError::EmptyRegistry);
        }
        Ok(self.subs[rng.random_range(0..self.subs.len())].as_ref())
    }
}
