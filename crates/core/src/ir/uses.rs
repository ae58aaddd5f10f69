use super::{BlockId, FuncId, Inst, InstKind, Module, Operand, Symbol};
use serde::{Deserialize, Serialize};

/// Location of an instruction inside a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UseSite {
    pub func: FuncId,
    pub block: BlockId,
    pub index: usize,
}

impl Inst {
    /// All operands in a fixed order. The callee of a call comes first.
    pub fn operands(&self) -> Vec<&Operand> {
        match &self.kind {
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Cast { val, .. } | InstKind::FnCast { val, .. } => vec![val],
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { val, ptr, .. } => vec![val, ptr],
            InstKind::Gep { base, index, .. } => vec![base, index],
            InstKind::Call { callee, args, .. } => {
                let mut ops = Vec::with_capacity(args.len() + 1);
                ops.push(callee);
                ops.extend(args.iter());
                ops
            }
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { val } => val.iter().collect(),
            InstKind::Br { .. } => Vec::new(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match &mut self.kind {
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Cast { val, .. } | InstKind::FnCast { val, .. } => vec![val],
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::Store { val, ptr, .. } => vec![val, ptr],
            InstKind::Gep { base, index, .. } => vec![base, index],
            InstKind::Call { callee, args, .. } => {
                let mut ops = Vec::with_capacity(args.len() + 1);
                ops.push(callee);
                ops.extend(args.iter_mut());
                ops
            }
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { val } => val.iter_mut().collect(),
            InstKind::Br { .. } => Vec::new(),
        }
    }

    /// Whether any operand names `symbol` directly.
    pub fn uses_symbol(&self, symbol: Symbol) -> bool {
        self.operands()
            .into_iter()
            .any(|op| *op == Operand::Symbol(symbol))
    }

    /// Whether this is a call whose callee operand is `symbol`.
    pub fn is_call_to(&self, symbol: Symbol) -> bool {
        matches!(&self.kind, InstKind::Call { callee, .. } if *callee == Operand::Symbol(symbol))
    }

    /// Replaces every operand naming `symbol` with `with`, returning how many were replaced.
    pub fn replace_symbol(&mut self, symbol: Symbol, with: Operand) -> usize {
        let mut replaced = 0;
        for op in self.operands_mut() {
            if *op == Operand::Symbol(symbol) {
                *op = with;
                replaced += 1;
            }
        }
        replaced
    }

    /// Points the callee of a call at `with`. Returns `false` for non-call instructions.
    pub fn set_callee(&mut self, with: Operand) -> bool {
        match &mut self.kind {
            InstKind::Call { callee, .. } => {
                *callee = with;
                true
            }
            _ => false,
        }
    }
}

impl Module {
    /// Every instruction that names `symbol` in any operand position.
    pub fn use_sites(&self, symbol: Symbol) -> Vec<UseSite> {
        self.sites_matching(|inst| inst.uses_symbol(symbol))
    }

    /// Every call instruction whose callee is `symbol`.
    pub fn call_sites(&self, symbol: Symbol) -> Vec<UseSite> {
        self.sites_matching(|inst| inst.is_call_to(symbol))
    }

    pub fn inst(&self, site: UseSite) -> &Inst {
        &self.functions[site.func.0].blocks[site.block.0].insts[site.index]
    }

    fn sites_matching(&self, pred: impl Fn(&Inst) -> bool) -> Vec<UseSite> {
        let mut sites = Vec::new();
        for (f, func) in self.functions.iter().enumerate() {
            for (b, block) in func.blocks.iter().enumerate() {
                for (i, inst) in block.insts.iter().enumerate() {
                    if pred(inst) {
                        sites.push(UseSite {
                            func: FuncId(f),
                            block: BlockId(b),
                            index: i,
                        });
                    }
                }
            }
        }
        sites
    }
}
