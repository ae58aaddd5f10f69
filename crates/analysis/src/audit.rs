use crate::metrics::{DECODE_TAG, is_encoded_table};
use crate::refgraph::RefKind;
use cloakref_core::ir::{InstKind, Module, Operand, Symbol};
use serde::{Deserialize, Serialize};

/// One instruction operand that names a symbol directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposedRef {
    pub function: String,
    pub block: String,
    pub index: usize,
    pub symbol: String,
    /// Whether the symbol is a routine rather than a global.
    pub routine: bool,
    pub kind: RefKind,
}

/// Every direct reference left in a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub module: String,
    pub exposed: Vec<ExposedRef>,
    pub encoded_tables: Vec<String>,
    pub decode_sites: usize,
}

impl AuditReport {
    /// Exposed references a reference hiding pass is expected to remove: uses of globals and
    /// direct calls.
    pub fn hideable(&self) -> impl Iterator<Item = &ExposedRef> {
        self.exposed
            .iter()
            .filter(|r| !r.routine || r.kind == RefKind::Call)
    }
}

/// Lists every direct reference to a global or routine in instruction operands. Operands
/// naming an encoded table are not reported.
pub fn audit(module: &Module) -> AuditReport {
    let is_table = |symbol: Symbol| match symbol {
        Symbol::Global(id) => module
            .globals
            .get(id.0)
            .is_some_and(is_encoded_table),
        Symbol::Func(_) => false,
    };

    let mut exposed = Vec::new();
    let mut decode_sites = 0;
    for func in &module.functions {
        for block in &func.blocks {
            for (index, inst) in block.insts.iter().enumerate() {
                if inst.metadata.contains_key(DECODE_TAG) {
                    decode_sites += 1;
                }
                let is_call = matches!(inst.kind, InstKind::Call { .. });
                for (pos, op) in inst.operands().into_iter().enumerate() {
                    let Operand::Symbol(symbol) = *op else {
                        continue;
                    };
                    if is_table(symbol) {
                        continue;
                    }
                    exposed.push(ExposedRef {
                        function: func.name.clone(),
                        block: block.label.clone(),
                        index,
                        symbol: module.symbol_name(symbol).to_string(),
                        routine: matches!(symbol, Symbol::Func(_)),
                        kind: if is_call && pos == 0 {
                            RefKind::Call
                        } else {
                            RefKind::Address
                        },
                    });
                }
            }
        }
    }

    AuditReport {
        module: module.name.clone(),
        exposed,
        encoded_tables: module
            .globals
            .iter()
            .filter(|g| is_encoded_table(g))
            .map(|g| g.name.clone())
            .collect(),
        decode_sites,
    }
}
