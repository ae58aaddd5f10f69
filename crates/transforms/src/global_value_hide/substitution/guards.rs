//! Anti-optimization pieces shared by every formula.
use cloakref_core::ir::{CastOp, InstBuilder, Type, ValueId};
use rand::{rngs::StdRng, Rng};

const HIGH_LANE: u64 = 0xffff_ffff_0000_0000;

/// Reads one byte through `slot` with a volatile load and turns it into a value that is
/// always zero at run time.
///
/// The byte is combined with a random mask through one of two mixed boolean-arithmetic
/// identities, `(t | m) - (t & m) - (t ^ m)` or `(t ^ m) + 2 (t & m) - (t + m)`. Both cancel
/// for every `t`, but only after the load has executed.
pub(super) fn volatile_zero(b: &mut InstBuilder<'_>, slot: ValueId, rng: &mut StdRng) -> ValueId {
    let byte = b.load(Type::I8, slot, true);
    let t = b.cast(CastOp::ZExt, byte, Type::I64);
    let m = rng.random::<u64>();
    if rng.random::<bool>() {
        let or = b.or(Type::I64, t, m);
        let and = b.and(Type::I64, t, m);
        let xor = b.xor(Type::I64, t, m);
        let diff = b.sub(Type::I64, or, and);
        b.sub(Type::I64, diff, xor)
    } else {
        let xor = b.xor(Type::I64, t, m);
        let and = b.and(Type::I64, t, m);
        let once = b.add(Type::I64, xor, and);
        let twice = b.add(Type::I64, once, and);
        let sum = b.add(Type::I64, t, m);
        b.sub(Type::I64, twice, sum)
    }
}

/// Runs `rounds` xor/increment steps over the low 32 bits of `value`, which is known to
/// equal `target` at run time, and returns a value still equal to `target`.
///
/// Before the rounds the value is shifted by a correction constant so that the low lane
/// enters the rounds as their pre-image. The high lane passes through untouched.
pub(super) fn lane_rounds(
    b: &mut InstBuilder<'_>,
    value: ValueId,
    target: u64,
    rounds: usize,
    rng: &mut StdRng,
) -> ValueId {
    let masks: Vec<u32> = (0..rounds).map(|_| rng.random()).collect();
    let preimage = masks
        .iter()
        .rev()
        .fold(target as u32, |x, &r| x.wrapping_sub(1) ^ r);
    let entry = (target & HIGH_LANE) | u64::from(preimage);

    let shifted = b.add(Type::I64, value, entry.wrapping_sub(target));
    let mut lane = b.cast(CastOp::Trunc, shifted, Type::I32);
    for r in masks {
        lane = b.xor(Type::I32, lane, u64::from(r));
        lane = b.add(Type::I32, lane, 1u64);
    }
    let high = b.and(Type::I64, shifted, HIGH_LANE);
    let low = b.cast(CastOp::ZExt, lane, Type::I64);
    b.or(Type::I64, high, low)
}
