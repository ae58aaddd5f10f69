use super::{DecodeSite, Substitution};
use cloakref_core::ir::{InstBuilder, Type, ValueId};
use rand::{rngs::StdRng, Rng};

/// Negates the key as `r - ((k ^ r) + 2 (k & r))`, the inner sum being `k + r`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MbaNegate;

impl Substitution for MbaNegate {
    fn name(&self) -> &'static str {
        "mba-negate"
    }

    fn offset(
        &self,
        b: &mut InstBuilder<'_>,
        site: &DecodeSite,
        zero: ValueId,
        rng: &mut StdRng,
    ) -> ValueId {
        let (m, r) = (rng.random::<u64>(), rng.random::<u64>());

        let veiled = b.xor(Type::I64, site.key ^ m, zero);
        let k = b.xor(Type::I64, veiled, m);
        let xor = b.xor(Type::I64, k, r);
        let and = b.and(Type::I64, k, r);
        let carry = b.add(Type::I64, and, and);
        let sum = b.add(Type::I64, xor, carry);
        b.sub(Type::I64, r, sum)
    }
}
