use super::encryptor::{EncryptedValue, EncryptionResult};
use super::substitution::{DecodeSite, SubstitutionLibrary};
use cloakref_core::ir::{BlockId, Inst, InstBuilder, Module, Symbol, Type, ValueId};
use cloakref_utils::errors::TransformError;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of rewritten use sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceStats {
    pub data_sites: usize,
    pub call_sites: usize,
}

/// Rewrites the module so that no instruction names an encrypted symbol directly.
///
/// Every instruction using a data symbol gets a fresh decode sequence inserted right before
/// it, and each of its operands naming the symbol is pointed at the recovered address. For
/// routines only direct calls are rewritten: the recovered address is cast to the routine's
/// signature and becomes the callee. Other routine uses are left alone.
pub fn replace(
    module: &mut Module,
    encrypted: &EncryptionResult,
    library: &SubstitutionLibrary,
    guard_rounds: usize,
    rng: &mut StdRng,
) -> Result<ReplaceStats, TransformError> {
    let mut stats = ReplaceStats::default();

    for record in &encrypted.globals {
        let symbol = record.symbol();
        let sites = rewrite_sites(
            module,
            record,
            library,
            guard_rounds,
            rng,
            |inst| inst.uses_symbol(symbol),
            |_, inst, addr| {
                inst.replace_symbol(symbol, addr.into());
            },
        )?;
        debug!("@{}: {} data sites", module.symbol_name(symbol), sites);
        stats.data_sites += sites;
    }

    for record in &encrypted.functions {
        let symbol = record.symbol();
        let sig = module.function(record.original).sig.clone();
        let sites = rewrite_sites(
            module,
            record,
            library,
            guard_rounds,
            rng,
            |inst| inst.is_call_to(symbol),
            |b, inst, addr| {
                let callee = b.fn_cast(addr, sig.clone());
                inst.set_callee(callee.into());
            },
        )?;
        debug!("@{}: {} call sites", module.symbol_name(symbol), sites);
        stats.call_sites += sites;
    }

    Ok(stats)
}

/// Inserts a decode sequence before every instruction accepted by `matches`, then lets
/// `rewrite` patch that instruction with the recovered address.
fn rewrite_sites<T: Copy + Into<Symbol>>(
    module: &mut Module,
    record: &EncryptedValue<T>,
    library: &SubstitutionLibrary,
    guard_rounds: usize,
    rng: &mut StdRng,
    matches: impl Fn(&Inst) -> bool,
    mut rewrite: impl FnMut(&mut InstBuilder<'_>, &mut Inst, ValueId),
) -> Result<usize, TransformError> {
    let mut sites = 0;
    for fid in module.function_ids() {
        let func = module.function_mut(fid);
        for block in 0..func.blocks.len() {
            if !func.blocks[block].insts.iter().any(&matches) {
                continue;
            }
            let (insts, next_value) = func.split_block_mut(BlockId(block));
            let original = std::mem::take(insts);
            let mut b = InstBuilder::new(next_value);
            for mut inst in original {
                if matches(&inst) {
                    let slot = b.gep(Symbol::Global(record.table), record.index as u64, 8, true);
                    let encoded = b.load(Type::Ptr, slot, false);
                    let site = DecodeSite {
                        encoded,
                        slot,
                        key: record.key,
                        guard_rounds,
                    };
                    let addr = library.choose(rng)?.decode(&mut b, &site, rng);
                    rewrite(&mut b, &mut inst, addr);
                    sites += 1;
                }
                b.push(inst);
            }
            *insts = b.finish();
        }
    }
    Ok(sites)
}
