//! In-memory representation of a compilation unit.
//!
//! A [`Module`] is an ordered list of globals and an ordered list of functions. Functions hold
//! basic blocks of instructions in a register-based SSA form: every instruction producing a
//! value defines a fresh [`ValueId`], and operands refer to those values, to integer constants,
//! or directly to a global or function [`Symbol`]. Direct symbol operands are what the hiding
//! transform removes from instruction streams.
//!
//! Declaration order is significant everywhere: symbol ids are indices into the module vectors
//! and are never invalidated, since nothing in the workspace removes a global or a function.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use self::builder::InstBuilder;
pub use self::uses::UseSite;

mod builder;
mod uses;
mod validate;

/// Metadata key placed on the last instruction of every decode sequence.
pub const DECODE_TAG: &str = "obf.md";

/// Upper bound for [`Function::next_value`] in parsed or validated modules. The space above
/// it is reserved for values inserted by transforms.
pub const MAX_VALUE_ID: u32 = u32::MAX / 2;

/// Index of a global in [`Module::globals`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalId(pub usize);

/// Index of a function in [`Module::functions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub usize);

/// Index of a block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

/// An SSA value local to one function. Parameters occupy `%0..%n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

/// A named entity of the module whose address can be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Symbol {
    /// A global data item.
    Global(GlobalId),
    /// A routine, defined or only declared.
    Func(FuncId),
}

impl From<GlobalId> for Symbol {
    fn from(id: GlobalId) -> Self {
        Self::Global(id)
    }
}

impl From<FuncId> for Symbol {
    fn from(id: FuncId) -> Self {
        Self::Func(id)
    }
}

/// First-class types. Pointers are opaque and 64 bits wide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    I1,
    I8,
    I32,
    I64,
    Ptr,
    /// Fixed-length array, only valid as the type of a global.
    Array { elem: Box<Type>, len: u64 },
}

impl Type {
    /// Builds an array type.
    pub fn array(elem: Type, len: u64) -> Self {
        Self::Array {
            elem: Box::new(elem),
            len,
        }
    }

    /// Storage size in bytes, or `None` if it does not fit in a `u64`.
    pub fn checked_size(&self) -> Option<u64> {
        match self {
            Self::I1 | Self::I8 => Some(1),
            Self::I32 => Some(4),
            Self::I64 | Self::Ptr => Some(8),
            Self::Array { elem, len } => elem.checked_size()?.checked_mul(*len),
        }
    }

    /// Storage size in bytes, saturating at `u64::MAX`.
    pub fn size(&self) -> u64 {
        self.checked_size().unwrap_or(u64::MAX)
    }

    /// Width of a scalar in bits. Arrays report the width of a pointer.
    pub const fn bits(&self) -> u32 {
        match self {
            Self::I1 => 1,
            Self::I8 => 8,
            Self::I32 => 32,
            Self::I64 | Self::Ptr | Self::Array { .. } => 64,
        }
    }

    /// Truncates `value` to the width of this type.
    pub const fn mask(&self, value: u64) -> u64 {
        match self.bits() {
            64 => value,
            bits => value & ((1u64 << bits) - 1),
        }
    }
}

/// Parameter and return types of a routine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Type>,
    /// `None` for routines returning nothing.
    pub ret: Option<Type>,
}

impl Signature {
    pub const fn new(params: Vec<Type>, ret: Option<Type>) -> Self {
        Self { params, ret }
    }
}

/// Symbol visibility outside the compilation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Linkage {
    #[default]
    External,
    Internal,
    Private,
}

/// A constant element of an array initializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstExpr {
    Int(u64),
    /// `address(symbol) + offset`, resolved at load time, never a literal in the artifact.
    SymbolAddr { symbol: Symbol, offset: u64 },
}

/// Initial contents of a global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Initializer {
    Zero,
    Int(u64),
    Bytes(Vec<u8>),
    Array(Vec<ConstExpr>),
}

/// A global data item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Global {
    pub name: String,
    pub ty: Type,
    pub linkage: Linkage,
    /// Constant globals are mapped read-only.
    pub constant: bool,
    /// `None` marks a declaration defined in another unit.
    pub init: Option<Initializer>,
}

impl Global {
    pub fn is_declaration(&self) -> bool {
        self.init.is_none()
    }
}

/// An instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Value(ValueId),
    Const(u64),
    Symbol(Symbol),
}

impl From<ValueId> for Operand {
    fn from(value: ValueId) -> Self {
        Self::Value(value)
    }
}

impl From<Symbol> for Operand {
    fn from(symbol: Symbol) -> Self {
        Self::Symbol(symbol)
    }
}

impl From<u64> for Operand {
    fn from(value: u64) -> Self {
        Self::Const(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Xor,
    And,
    Or,
    Shl,
    LShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpPred {
    Eq,
    Ne,
    Ult,
    Ule,
    Ugt,
    Uge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CastOp {
    Trunc,
    ZExt,
    PtrToInt,
    IntToPtr,
}

/// Operation performed by an [`Inst`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstKind {
    Binary {
        op: BinOp,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    ICmp {
        pred: CmpPred,
        ty: Type,
        lhs: Operand,
        rhs: Operand,
    },
    Cast {
        op: CastOp,
        val: Operand,
        to: Type,
    },
    Load {
        ty: Type,
        ptr: Operand,
        volatile: bool,
    },
    Store {
        ty: Type,
        val: Operand,
        ptr: Operand,
        volatile: bool,
    },
    /// `base + index * stride`, a byte-addressed pointer offset.
    Gep {
        base: Operand,
        index: Operand,
        stride: u64,
        inbounds: bool,
    },
    /// Adapts an untyped pointer to a routine signature before an indirect call.
    FnCast { val: Operand, sig: Signature },
    Call {
        callee: Operand,
        sig: Signature,
        args: Vec<Operand>,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Operand,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    Ret {
        val: Option<Operand>,
    },
}

/// A single instruction with its optional result and attached metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inst {
    pub result: Option<ValueId>,
    pub kind: InstKind,
    /// Free-form annotations; not consumed at run time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Inst {
    pub const fn new(result: Option<ValueId>, kind: InstKind) -> Self {
        Self {
            result,
            kind,
            metadata: BTreeMap::new(),
        }
    }

    pub const fn is_terminator(&self) -> bool {
        matches!(
            self.kind,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. }
        )
    }

    /// Block indices this instruction may transfer control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match &self.kind {
            InstKind::Br { target } => vec![*target],
            InstKind::CondBr {
                then_bb, else_bb, ..
            } => vec![*then_bb, *else_bb],
            _ => Vec::new(),
        }
    }
}

/// A labelled straight-line sequence ending in a terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub label: String,
    pub insts: Vec<Inst>,
}

/// A routine. A function without blocks is a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub sig: Signature,
    pub linkage: Linkage,
    pub blocks: Vec<Block>,
    /// Next free value number.
    pub next_value: u32,
}

impl Function {
    /// Creates a declaration with no body.
    pub fn declaration(name: impl Into<String>, sig: Signature) -> Self {
        let next_value = sig.params.len() as u32;
        Self {
            name: name.into(),
            sig,
            linkage: Linkage::External,
            blocks: Vec::new(),
            next_value,
        }
    }

    /// Creates a definition with a single empty `entry` block.
    pub fn definition(name: impl Into<String>, sig: Signature, linkage: Linkage) -> Self {
        let mut func = Self::declaration(name, sig);
        func.linkage = linkage;
        func.add_block("entry");
        func
    }

    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Values bound to the parameters, in order.
    pub fn params(&self) -> impl Iterator<Item = ValueId> + use<> {
        (0..self.sig.params.len() as u32).map(ValueId)
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let id = ValueId(self.next_value);
        self.next_value += 1;
        id
    }

    pub fn add_block(&mut self, label: impl Into<String>) -> BlockId {
        self.blocks.push(Block {
            label: label.into(),
            insts: Vec::new(),
        });
        BlockId(self.blocks.len() - 1)
    }

    pub fn block_by_label(&self, label: &str) -> Option<BlockId> {
        self.blocks.iter().position(|b| b.label == label).map(BlockId)
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Inst> {
        self.blocks.iter().flat_map(|b| b.insts.iter())
    }

    /// Mutable access to one block together with the value counter, so that a builder can
    /// allocate values while the block is being rewritten.
    pub fn split_block_mut(&mut self, block: BlockId) -> (&mut Vec<Inst>, &mut u32) {
        (&mut self.blocks[block.0].insts, &mut self.next_value)
    }
}

/// A compilation unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub globals: Vec<Global>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_global(&mut self, global: Global) -> GlobalId {
        self.globals.push(global);
        GlobalId(self.globals.len() - 1)
    }

    pub fn add_function(&mut self, function: Function) -> FuncId {
        self.functions.push(function);
        FuncId(self.functions.len() - 1)
    }

    pub fn global(&self, id: GlobalId) -> &Global {
        &self.globals[id.0]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0]
    }

    pub fn global_by_name(&self, name: &str) -> Option<GlobalId> {
        self.globals.iter().position(|g| g.name == name).map(GlobalId)
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(FuncId)
    }

    pub fn global_ids(&self) -> impl Iterator<Item = GlobalId> + use<> {
        (0..self.globals.len()).map(GlobalId)
    }

    pub fn function_ids(&self) -> impl Iterator<Item = FuncId> + use<> {
        (0..self.functions.len()).map(FuncId)
    }

    /// Name of a symbol, without the `@` sigil.
    pub fn symbol_name(&self, symbol: Symbol) -> &str {
        match symbol {
            Symbol::Global(id) => &self.global(id).name,
            Symbol::Func(id) => &self.function(id).name,
        }
    }

    /// Returns `base` if no global or function uses it, otherwise `base.N` for the smallest
    /// free `N`.
    pub fn unique_symbol_name(&self, base: &str) -> String {
        let taken = |name: &str| {
            self.globals.iter().any(|g| g.name == name)
                || self.functions.iter().any(|f| f.name == name)
        };
        if !taken(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}.{n}"))
            .find(|candidate| !taken(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    /// Total number of instructions across all function bodies.
    pub fn instruction_count(&self) -> usize {
        self.functions.iter().map(|f| f.instructions().count()).sum()
    }
}
