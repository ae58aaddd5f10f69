//! Renders a [`Module`] in the textual form accepted by [`crate::parser`].
//!
//! The output is stable: printing, parsing and printing again yields identical text. Value
//! numbers are printed as-is, so the printed form of a transformed module shows exactly which
//! values the transform introduced.
use crate::ir::{
    BinOp, BlockId, CastOp, CmpPred, ConstExpr, Function, Global, Initializer, Inst, InstKind, Linkage,
    Module, Operand, Signature, Symbol, Type,
};
use sha3::{Digest, Keccak256};
use std::fmt::{self, Write};

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I1 => f.write_str("i1"),
            Self::I8 => f.write_str("i8"),
            Self::I32 => f.write_str("i32"),
            Self::I64 => f.write_str("i64"),
            Self::Ptr => f.write_str("ptr"),
            Self::Array { elem, len } => write!(f, "[{len} x {elem}]"),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("fn(")?;
        write_list(f, &self.params)?;
        f.write_str(") -> ")?;
        match &self.ret {
            Some(ty) => write!(f, "{ty}"),
            None => f.write_str("void"),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Xor => "xor",
            Self::And => "and",
            Self::Or => "or",
            Self::Shl => "shl",
            Self::LShr => "lshr",
        })
    }
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Ult => "ult",
            Self::Ule => "ule",
            Self::Ugt => "ugt",
            Self::Uge => "uge",
        })
    }
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Trunc => "trunc",
            Self::ZExt => "zext",
            Self::PtrToInt => "ptrtoint",
            Self::IntToPtr => "inttoptr",
        })
    }
}

fn write_list<T: fmt::Display>(f: &mut impl Write, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn linkage_prefix(linkage: Linkage) -> &'static str {
    match linkage {
        Linkage::External => "",
        Linkage::Internal => "internal ",
        Linkage::Private => "private ",
    }
}

/// Prints the whole module.
pub fn print_module(module: &Module) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_module(&mut out, module);
    out
}

/// Keccak-256 of the printed module; two builds with equal fingerprints are identical.
pub fn fingerprint(module: &Module) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(print_module(module).as_bytes());
    hasher.finalize().into()
}

fn write_module(out: &mut String, module: &Module) -> fmt::Result {
    writeln!(out, "module {}", module.name)?;
    if !module.globals.is_empty() {
        writeln!(out)?;
    }
    for global in &module.globals {
        write_global(out, module, global)?;
    }
    for func in &module.functions {
        writeln!(out)?;
        write_function(out, module, func)?;
    }
    Ok(())
}

fn write_global(out: &mut String, module: &Module, global: &Global) -> fmt::Result {
    write!(out, "@{} = ", global.name)?;
    let Some(init) = &global.init else {
        return writeln!(out, "external global {}", global.ty);
    };
    let kind = if global.constant { "constant" } else { "global" };
    write!(
        out,
        "{}{kind} {} ",
        linkage_prefix(global.linkage),
        global.ty
    )?;
    match init {
        Initializer::Zero => out.write_str("zeroinitializer")?,
        Initializer::Int(v) => write!(out, "{v}")?,
        Initializer::Bytes(bytes) => write!(out, "x\"{}\"", hex::encode(bytes))?,
        Initializer::Array(elems) => {
            out.write_str("[")?;
            for (i, elem) in elems.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                match elem {
                    ConstExpr::Int(v) => write!(out, "{v}")?,
                    ConstExpr::SymbolAddr { symbol, offset: 0 } => {
                        write!(out, "@{}", module.symbol_name(*symbol))?
                    }
                    ConstExpr::SymbolAddr { symbol, offset } => {
                        write!(out, "@{} + {offset:#x}", module.symbol_name(*symbol))?
                    }
                }
            }
            out.write_str("]")?;
        }
    }
    writeln!(out)
}

fn write_function(out: &mut String, module: &Module, func: &Function) -> fmt::Result {
    let ret = match &func.sig.ret {
        Some(ty) => ty.to_string(),
        None => "void".to_string(),
    };
    if func.is_declaration() {
        write!(out, "declare {ret} @{}(", func.name)?;
        write_list(out, &func.sig.params)?;
        return writeln!(out, ")");
    }
    write!(
        out,
        "define {}{ret} @{}(",
        linkage_prefix(func.linkage),
        func.name
    )?;
    write_list(out, &func.sig.params)?;
    writeln!(out, ") {{")?;
    for block in &func.blocks {
        writeln!(out, "{}:", block.label)?;
        for inst in &block.insts {
            out.write_str("  ")?;
            write_inst(out, module, func, inst)?;
            writeln!(out)?;
        }
    }
    writeln!(out, "}}")
}

struct Op<'a>(&'a Module, Operand);

impl fmt::Display for Op<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            Operand::Value(v) => write!(f, "%{}", v.0),
            Operand::Const(c) => write!(f, "{c}"),
            Operand::Symbol(Symbol::Global(id)) => write!(f, "@{}", self.0.global(id).name),
            Operand::Symbol(Symbol::Func(id)) => write!(f, "@{}", self.0.function(id).name),
        }
    }
}

fn write_inst(out: &mut String, module: &Module, func: &Function, inst: &Inst) -> fmt::Result {
    let op = |o: &Operand| Op(module, *o);
    let label = |b: BlockId| func.blocks[b.0].label.as_str();
    if let Some(result) = inst.result {
        write!(out, "%{} = ", result.0)?;
    }
    match &inst.kind {
        InstKind::Binary { op: bin, ty, lhs, rhs } => {
            write!(out, "{bin} {ty} {}, {}", op(lhs), op(rhs))?
        }
        InstKind::ICmp { pred, ty, lhs, rhs } => {
            write!(out, "icmp {pred} {ty} {}, {}", op(lhs), op(rhs))?
        }
        InstKind::Cast { op: cast, val, to } => write!(out, "{cast} {} to {to}", op(val))?,
        InstKind::Load { ty, ptr, volatile } => {
            let v = if *volatile { "volatile " } else { "" };
            write!(out, "load {v}{ty}, {}", op(ptr))?
        }
        InstKind::Store {
            ty,
            val,
            ptr,
            volatile,
        } => {
            let v = if *volatile { "volatile " } else { "" };
            write!(out, "store {v}{ty} {}, {}", op(val), op(ptr))?
        }
        InstKind::Gep {
            base,
            index,
            stride,
            inbounds,
        } => {
            let ib = if *inbounds { "inbounds " } else { "" };
            write!(out, "gep {ib}{}, {} x {stride}", op(base), op(index))?
        }
        InstKind::FnCast { val, sig } => write!(out, "fncast {} to {sig}", op(val))?,
        InstKind::Call { callee, sig, args } => {
            write!(out, "call {sig} {}(", op(callee))?;
            let args: Vec<Op<'_>> = args.iter().map(op).collect();
            write_list(out, &args)?;
            out.write_str(")")?;
        }
        InstKind::Br { target } => write!(out, "br {}", label(*target))?,
        InstKind::CondBr {
            cond,
            then_bb,
            else_bb,
        } => write!(
            out,
            "br {}, {}, {}",
            op(cond),
            label(*then_bb),
            label(*else_bb)
        )?,
        InstKind::Ret { val: Some(val) } => write!(out, "ret {}", op(val))?,
        InstKind::Ret { val: None } => out.write_str("ret void")?,
    }
    for (key, value) in &inst.metadata {
        write!(out, " !{key} \"{value}\"")?;
    }
    Ok(())
}
