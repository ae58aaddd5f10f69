use super::{
    BinOp, BlockId, CastOp, CmpPred, Inst, InstKind, Operand, Signature, Type, ValueId,
};

/// Accumulates a straight-line instruction sequence for later splicing into a block.
///
/// The builder borrows the owning function's value counter, so every value it defines is
/// fresh within that function. Instructions are not inserted anywhere until the caller takes
/// them with [`InstBuilder::finish`].
#[derive(Debug)]
pub struct InstBuilder<'a> {
    next_value: &'a mut u32,
    insts: Vec<Inst>,
}

impl<'a> InstBuilder<'a> {
    pub const fn new(next_value: &'a mut u32) -> Self {
        Self {
            next_value,
            insts: Vec::new(),
        }
    }

    // Validated functions stay below `MAX_VALUE_ID`, leaving the rest of the range to builders.
    fn define(&mut self, kind: InstKind) -> ValueId {
        let id = ValueId(*self.next_value);
        *self.next_value += 1;
        self.insts.push(Inst::new(Some(id), kind));
        id
    }

    fn emit(&mut self, kind: InstKind) {
        self.insts.push(Inst::new(None, kind));
    }

    pub fn binary(
        &mut self,
        op: BinOp,
        ty: Type,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> ValueId {
        self.define(InstKind::Binary {
            op,
            ty,
            lhs: lhs.into(),
            rhs: rhs.into(),
        })
    }

    pub fn add(&mut self, ty: Type, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Add, ty, lhs, rhs)
    }

    pub fn sub(&mut self, ty: Type, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Sub, ty, lhs, rhs)
    }

    pub fn xor(&mut self, ty: Type, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Xor, ty, lhs, rhs)
    }

    pub fn and(&mut self, ty: Type, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::And, ty, lhs, rhs)
    }

    pub fn or(&mut self, ty: Type, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> ValueId {
        self.binary(BinOp::Or, ty, lhs, rhs)
    }

    pub fn icmp(
        &mut self,
        pred: CmpPred,
        ty: Type,
        lhs: impl Into<Operand>,
        rhs: impl Into<Operand>,
    ) -> ValueId {
        self.define(InstKind::ICmp {
            pred,
            ty,
            lhs: lhs.into(),
            rhs: rhs.into(),
        })
    }

    pub fn cast(&mut self, op: CastOp, val: impl Into<Operand>, to: Type) -> ValueId {
        self.define(InstKind::Cast {
            op,
            val: val.into(),
            to,
        })
    }

    pub fn load(&mut self, ty: Type, ptr: impl Into<Operand>, volatile: bool) -> ValueId {
        self.define(InstKind::Load {
            ty,
            ptr: ptr.into(),
            volatile,
        })
    }

    pub fn store(&mut self, ty: Type, val: impl Into<Operand>, ptr: impl Into<Operand>) {
        self.emit(InstKind::Store {
            ty,
            val: val.into(),
            ptr: ptr.into(),
            volatile: false,
        });
    }

    pub fn gep(
        &mut self,
        base: impl Into<Operand>,
        index: impl Into<Operand>,
        stride: u64,
        inbounds: bool,
    ) -> ValueId {
        self.define(InstKind::Gep {
            base: base.into(),
            index: index.into(),
            stride,
            inbounds,
        })
    }

    pub fn fn_cast(&mut self, val: impl Into<Operand>, sig: Signature) -> ValueId {
        self.define(InstKind::FnCast {
            val: val.into(),
            sig,
        })
    }

    /// Emits a call; returns the result value when the signature returns something.
    pub fn call(
        &mut self,
        callee: impl Into<Operand>,
        sig: Signature,
        args: Vec<Operand>,
    ) -> Option<ValueId> {
        let kind = InstKind::Call {
            callee: callee.into(),
            sig: sig.clone(),
            args,
        };
        if sig.ret.is_some() {
            Some(self.define(kind))
        } else {
            self.emit(kind);
            None
        }
    }

    pub fn br(&mut self, target: BlockId) {
        self.emit(InstKind::Br { target });
    }

    pub fn cond_br(&mut self, cond: impl Into<Operand>, then_bb: BlockId, else_bb: BlockId) {
        self.emit(InstKind::CondBr {
            cond: cond.into(),
            then_bb,
            else_bb,
        });
    }

    pub fn ret(&mut self, val: Option<Operand>) {
        self.emit(InstKind::Ret { val });
    }

    /// Appends an existing instruction unchanged.
    pub fn push(&mut self, inst: Inst) {
        self.insts.push(inst);
    }

    /// Attaches a metadata entry to the most recently emitted instruction.
    pub fn tag(&mut self, key: &str, value: &str) {
        if let Some(last) = self.insts.last_mut() {
            last.metadata.insert(key.to_string(), value.to_string());
        }
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn insts(&self) -> &[Inst] {
        &self.insts
    }

    pub fn finish(self) -> Vec<Inst> {
        self.insts
    }
}
