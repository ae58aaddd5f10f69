use super::{DecodeSite, Substitution};
use cloakref_core::ir::{InstBuilder, Type, ValueId};
use rand::{rngs::StdRng, Rng};

/// `d - ((key + a) ^ b)` followed by a correction back to `-key`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddXorChain;

impl Substitution for AddXorChain {
    fn name(&self) -> &'static str {
        "add-xor-chain"
    }

    fn offset(
        &self,
        b: &mut InstBuilder<'_>,
        site: &DecodeSite,
        zero: ValueId,
        rng: &mut StdRng,
    ) -> ValueId {
        let (a, x, d) = (rng.random::<u64>(), rng.random::<u64>(), rng.random::<u64>());
        let seeded = site.key.wrapping_add(a);
        let known = d.wrapping_sub(seeded ^ x);

        let sum = b.add(Type::I64, seeded, zero);
        let mixed = b.xor(Type::I64, sum, x);
        let chain = b.sub(Type::I64, d, mixed);
        b.add(Type::I64, chain, site.offset().wrapping_sub(known))
    }
}
