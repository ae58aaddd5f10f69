use super::{DecodeSite, Substitution};
use cloakref_core::ir::{InstBuilder, Type, ValueId};
use rand::{rngs::StdRng, Rng};

/// Rebuilds `!key` from a masked copy, then negates it as `!key + b - (b - 1)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplementSplit;

impl Substitution for ComplementSplit {
    fn name(&self) -> &'static str {
        "complement-split"
    }

    fn offset(
        &self,
        b: &mut InstBuilder<'_>,
        site: &DecodeSite,
        zero: ValueId,
        rng: &mut StdRng,
    ) -> ValueId {
        let (a, split) = (rng.random::<u64>(), rng.random::<u64>());

        let masked = b.sub(Type::I64, site.key ^ a, zero);
        let complement = b.xor(Type::I64, masked, !a);
        let raised = b.add(Type::I64, complement, split);
        b.sub(Type::I64, raised, split.wrapping_sub(1))
    }
}
