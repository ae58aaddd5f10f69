use cloakref_core::ir::{FuncId, GlobalId, Module};
use serde::{Deserialize, Serialize};

/// Symbols eligible for hiding, each list in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedSymbols {
    pub globals: Vec<GlobalId>,
    pub functions: Vec<FuncId>,
}

impl CollectedSymbols {
    pub fn len(&self) -> usize {
        self.globals.len() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty() && self.functions.is_empty()
    }
}

/// Enumerates every global and every routine of the module.
///
/// Nothing is filtered: declarations, private symbols and symbols without a single use are
/// all collected, so the table layout depends only on what the unit declares.
pub fn collect(module: &Module) -> CollectedSymbols {
    CollectedSymbols {
        globals: module.global_ids().collect(),
        functions: module.function_ids().collect(),
    }
}
