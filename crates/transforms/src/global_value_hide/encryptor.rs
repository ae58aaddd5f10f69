use super::collector::CollectedSymbols;
use cloakref_core::ir::{
    ConstExpr, FuncId, Global, GlobalId, Initializer, Linkage, Module, Symbol, Type,
};
use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Base name of the table holding encoded addresses.
pub const TABLE_NAME: &str = "__encrypted_globals";

/// Where one symbol's encoded address lives and how to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedValue<T> {
    pub table: GlobalId,
    pub key: u64,
    /// Slot within the table.
    pub index: usize,
    pub original: T,
}

impl<T: Copy + Into<Symbol>> EncryptedValue<T> {
    pub fn symbol(&self) -> Symbol {
        self.original.into()
    }
}

/// Output of [`encrypt`], consumed by the replacer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionResult {
    /// `None` when the module has no symbols at all.
    pub table: Option<GlobalId>,
    pub globals: Vec<EncryptedValue<GlobalId>>,
    pub functions: Vec<EncryptedValue<FuncId>>,
}

impl EncryptionResult {
    pub fn len(&self) -> usize {
        self.globals.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_none()
    }
}

/// Encoding applied to every table entry. Decoding subtracts `key` with the same wrapping.
pub const fn encode_address(address: u64, key: u64) -> u64 {
    address.wrapping_add(key)
}

/// Draws a key per symbol and appends one private constant table of `symbol + key` entries.
///
/// Data symbols take the first slots, routines the following ones, both in collection order.
/// The entries stay symbolic until load time, so the plain address never appears as a literal.
pub fn encrypt(module: &mut Module, symbols: &CollectedSymbols, rng: &mut StdRng) -> EncryptionResult {
    if symbols.is_empty() {
        debug!("No symbols to encrypt");
        return EncryptionResult::default();
    }

    let table = GlobalId(module.globals.len());
    let mut entries = Vec::with_capacity(symbols.len());
    let mut result = EncryptionResult {
        table: Some(table),
        ..Default::default()
    };

    for &original in &symbols.globals {
        let key = rng.random::<u64>();
        entries.push(ConstExpr::SymbolAddr {
            symbol: Symbol::Global(original),
            offset: key,
        });
        result.globals.push(EncryptedValue {
            table,
            key,
            index: entries.len() - 1,
            original,
        });
    }
    for &original in &symbols.functions {
        let key = rng.random::<u64>();
        entries.push(ConstExpr::SymbolAddr {
            symbol: Symbol::Func(original),
            offset: key,
        });
        result.functions.push(EncryptedValue {
            table,
            key,
            index: entries.len() - 1,
            original,
        });
    }

    let name = module.unique_symbol_name(TABLE_NAME);
    debug!("Emitting @{} with {} slots", name, entries.len());
    let id = module.add_global(Global {
        name,
        ty: Type::array(Type::Ptr, entries.len() as u64),
        linkage: Linkage::Private,
        constant: true,
        init: Some(Initializer::Array(entries)),
    });
    debug_assert_eq!(id, table);

    result
}
