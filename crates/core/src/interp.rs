//! Reference interpreter for [`Module`]s.
//!
//! Globals are laid out in declaration order from [`DATA_BASE`], each aligned to 16 bytes.
//! Routines get synthetic addresses from [`CODE_BASE`] so that they can be loaded from memory
//! and called indirectly. Array initializers holding `symbol + offset` entries are resolved
//! when the machine is created, the way a loader would apply relocations.
//!
//! The interpreter is used to check that a transformed module behaves exactly like the input:
//! same return values, same host calls, same final contents of writable globals.
use crate::ir::{
    BinOp, CastOp, CmpPred, ConstExpr, FuncId, Initializer, InstKind, Module, Operand, Symbol,
    Type,
};
use cloakref_utils::errors::InterpError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// First data address.
pub const DATA_BASE: u64 = 0x0001_0000;
/// First routine address.
pub const CODE_BASE: u64 = 0x7000_0000;
const ALIGN: u64 = 16;

/// Execution limits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct InterpConfig {
    /// Maximum number of instructions executed by one top-level call.
    pub max_steps: usize,
    /// Maximum nesting of calls.
    pub max_depth: usize,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_depth: 256,
        }
    }
}

/// Callback standing in for an external routine. Receives the arguments masked to the
/// parameter types; the return value is ignored for routines returning nothing.
pub type HostFn = Box<dyn FnMut(&[u64]) -> u64>;

/// Addresses assigned to every symbol of a module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    globals: Vec<u64>,
    functions: Vec<u64>,
}

impl Layout {
    /// Places globals back to back from [`DATA_BASE`]. Fails if a global would reach into
    /// the code region.
    pub fn compute(module: &Module) -> Result<Self, InterpError> {
        let mut next = DATA_BASE;
        let mut globals = Vec::with_capacity(module.globals.len());
        for g in &module.globals {
            let end = g
                .ty
                .checked_size()
                .and_then(|size| size.max(1).checked_next_multiple_of(ALIGN))
                .and_then(|size| next.checked_add(size))
                .filter(|end| *end <= CODE_BASE)
                .ok_or_else(|| InterpError::LayoutOverflow(g.name.clone()))?;
            globals.push(next);
            next = end;
        }
        let functions = (0..module.functions.len() as u64)
            .map(|i| CODE_BASE + i * ALIGN)
            .collect();
        Ok(Self { globals, functions })
    }

    pub fn address(&self, symbol: Symbol) -> u64 {
        match symbol {
            Symbol::Global(id) => self.globals[id.0],
            Symbol::Func(id) => self.functions[id.0],
        }
    }

    /// The routine whose entry address is exactly `addr`.
    pub fn function_at(&self, addr: u64) -> Option<FuncId> {
        if addr < CODE_BASE || (addr - CODE_BASE) % ALIGN != 0 {
            return None;
        }
        let index = ((addr - CODE_BASE) / ALIGN) as usize;
        (index < self.functions.len()).then_some(FuncId(index))
    }
}

#[derive(Debug)]
struct Region {
    name: String,
    start: u64,
    bytes: Vec<u8>,
    writable: bool,
}

impl Region {
    fn end(&self) -> u64 {
        self.start + self.bytes.len() as u64
    }
}

/// Byte-addressed memory made of one region per global.
#[derive(Debug)]
struct Memory {
    regions: Vec<Region>,
}

impl Memory {
    fn locate(&self, addr: u64, size: u64) -> Result<(usize, usize), InterpError> {
        let idx = self.regions.partition_point(|r| r.start <= addr);
        let region = idx
            .checked_sub(1)
            .map(|i| (i, &self.regions[i]))
            .filter(|(_, r)| addr.checked_add(size).is_some_and(|end| end <= r.end()));
        match region {
            Some((i, r)) if size <= 8 => Ok((i, (addr - r.start) as usize)),
            _ => Err(InterpError::InvalidAddress(addr)),
        }
    }

    fn read(&self, addr: u64, size: u64) -> Result<u64, InterpError> {
        let (i, off) = self.locate(addr, size)?;
        let mut buf = [0u8; 8];
        buf[..size as usize].copy_from_slice(&self.regions[i].bytes[off..off + size as usize]);
        Ok(u64::from_le_bytes(buf))
    }

    fn write(&mut self, addr: u64, size: u64, value: u64) -> Result<(), InterpError> {
        let (i, off) = self.locate(addr, size)?;
        let region = &mut self.regions[i];
        if !region.writable {
            return Err(InterpError::ReadOnlyWrite {
                name: region.name.clone(),
                addr,
            });
        }
        put(&mut region.bytes, off, size as usize, value);
        Ok(())
    }
}

fn put(bytes: &mut [u8], at: usize, size: usize, value: u64) {
    let size = size.min(8).min(bytes.len().saturating_sub(at));
    bytes[at..at + size].copy_from_slice(&value.to_le_bytes()[..size]);
}

fn initial_bytes(layout: &Layout, ty: &Type, init: Option<&Initializer>) -> Vec<u8> {
    let size = ty.size().max(1) as usize;
    let mut bytes = vec![0u8; size];
    match init {
        None | Some(Initializer::Zero) => {}
        Some(Initializer::Int(v)) => put(&mut bytes, 0, size, *v),
        Some(Initializer::Bytes(data)) => {
            let n = data.len().min(size);
            bytes[..n].copy_from_slice(&data[..n]);
        }
        Some(Initializer::Array(elems)) => {
            let stride = match ty {
                Type::Array { elem, .. } => elem.size() as usize,
                other => other.size() as usize,
            };
            for (i, elem) in elems.iter().enumerate() {
                let value = match elem {
                    ConstExpr::Int(v) => *v,
                    ConstExpr::SymbolAddr { symbol, offset } => {
                        layout.address(*symbol).wrapping_add(*offset)
                    }
                };
                if i * stride < size {
                    put(&mut bytes, i * stride, stride, value);
                }
            }
        }
    }
    bytes
}

/// Executes routines of one module against a private copy of its memory.
pub struct Machine<'m> {
    module: &'m Module,
    layout: Layout,
    memory: Memory,
    hosts: HashMap<String, HostFn>,
    config: InterpConfig,
    steps: usize,
}

impl std::fmt::Debug for Machine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("module", &self.module.name)
            .field("hosts", &self.hosts.keys().collect::<Vec<_>>())
            .field("steps", &self.steps)
            .finish()
    }
}

impl<'m> Machine<'m> {
    /// Validates the module, lays it out and initializes memory.
    pub fn new(module: &'m Module) -> Result<Self, InterpError> {
        module.validate()?;
        let layout = Layout::compute(module)?;
        let regions = module
            .globals
            .iter()
            .enumerate()
            .map(|(i, g)| Region {
                name: g.name.clone(),
                start: layout.globals[i],
                bytes: initial_bytes(&layout, &g.ty, g.init.as_ref()),
                writable: !g.constant,
            })
            .collect();
        Ok(Self {
            module,
            layout,
            memory: Memory { regions },
            hosts: HashMap::new(),
            config: InterpConfig::default(),
            steps: 0,
        })
    }

    pub fn with_config(mut self, config: InterpConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds a callback to the declaration named `name`.
    pub fn register_host(&mut self, name: impl Into<String>, host: HostFn) {
        self.hosts.insert(name.into(), host);
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Instructions executed by the last top-level call.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Current scalar value of a global, read with the width of its type (at most 8 bytes).
    pub fn read_global(&self, name: &str) -> Result<u64, InterpError> {
        let id = self
            .module
            .global_by_name(name)
            .ok_or_else(|| InterpError::UnknownGlobal(name.to_string()))?;
        let size = self.module.global(id).ty.size().clamp(1, 8);
        self.memory.read(self.layout.globals[id.0], size)
    }

    /// Contents of every writable global, keyed by name.
    pub fn writable_state(&self) -> Vec<(String, Vec<u8>)> {
        self.memory
            .regions
            .iter()
            .filter(|r| r.writable)
            .map(|r| (r.name.clone(), r.bytes.clone()))
            .collect()
    }

    /// Calls the routine `name` with `args`; returns its result, if it has one.
    pub fn call(&mut self, name: &str, args: &[u64]) -> Result<Option<u64>, InterpError> {
        let id = self
            .module
            .function_by_name(name)
            .ok_or_else(|| InterpError::UnknownFunction(name.to_string()))?;
        debug!("Calling @{} with {:?}", name, args);
        self.steps = 0;
        let result = self.invoke(id, args, 0);
        debug!("@{} finished after {} steps: {:?}", name, self.steps, result);
        result
    }

    fn invoke(&mut self, id: FuncId, args: &[u64], depth: usize) -> Result<Option<u64>, InterpError> {
        if depth > self.config.max_depth {
            return Err(InterpError::CallDepth(self.config.max_depth));
        }
        let module = self.module;
        let func = module.function(id);
        if args.len() != func.sig.params.len() {
            return Err(InterpError::ArgumentCount {
                name: func.name.clone(),
                expected: func.sig.params.len(),
                got: args.len(),
            });
        }
        let args: Vec<u64> = args
            .iter()
            .zip(&func.sig.params)
            .map(|(v, ty)| ty.mask(*v))
            .collect();

        if func.is_declaration() {
            let host = self
                .hosts
                .get_mut(&func.name)
                .ok_or_else(|| InterpError::UnresolvedExternal(func.name.clone()))?;
            let ret = host(&args);
            return Ok(func.sig.ret.as_ref().map(|ty| ty.mask(ret)));
        }

        let mut values: HashMap<u32, u64> = func.params().map(|v| v.0).zip(args).collect();
        let mut block = 0;
        'blocks: loop {
            for inst in &func.blocks[block].insts {
                self.steps += 1;
                if self.steps > self.config.max_steps {
                    return Err(InterpError::StepLimit(self.config.max_steps));
                }
                let eval = |op: &Operand| -> Result<u64, InterpError> {
                    match op {
                        Operand::Value(v) => values
                            .get(&v.0)
                            .copied()
                            .ok_or(InterpError::UndefinedValue(v.0)),
                        Operand::Const(c) => Ok(*c),
                        Operand::Symbol(s) => Ok(self.layout.address(*s)),
                    }
                };

                let result = match &inst.kind {
                    InstKind::Binary { op, ty, lhs, rhs } => {
                        let (a, b) = (ty.mask(eval(lhs)?), ty.mask(eval(rhs)?));
                        Some(ty.mask(binary(*op, ty.bits(), a, b)))
                    }
                    InstKind::ICmp { pred, ty, lhs, rhs } => {
                        let (a, b) = (ty.mask(eval(lhs)?), ty.mask(eval(rhs)?));
                        let holds = match pred {
                            CmpPred::Eq => a == b,
                            CmpPred::Ne => a != b,
                            CmpPred::Ult => a < b,
                            CmpPred::Ule => a <= b,
                            CmpPred::Ugt => a > b,
                            CmpPred::Uge => a >= b,
                        };
                        Some(u64::from(holds))
                    }
                    InstKind::Cast { op, val, to } => {
                        let v = eval(val)?;
                        Some(match op {
                            CastOp::ZExt => v,
                            CastOp::Trunc | CastOp::PtrToInt | CastOp::IntToPtr => to.mask(v),
                        })
                    }
                    InstKind::Load { ty, ptr, .. } => Some(self.memory.read(eval(ptr)?, ty.size())?),
                    InstKind::Store { ty, val, ptr, .. } => {
                        let (v, p) = (ty.mask(eval(val)?), eval(ptr)?);
                        self.memory.write(p, ty.size(), v)?;
                        None
                    }
                    InstKind::Gep {
                        base,
                        index,
                        stride,
                        ..
                    } => Some(eval(base)?.wrapping_add(eval(index)?.wrapping_mul(*stride))),
                    InstKind::FnCast { val, .. } => Some(eval(val)?),
                    InstKind::Call { callee, sig, args } => {
                        let target = match callee {
                            Operand::Symbol(Symbol::Func(f)) => *f,
                            other => {
                                let addr = eval(other)?;
                                self.layout
                                    .function_at(addr)
                                    .ok_or(InterpError::NotCallable(addr))?
                            }
                        };
                        let target_fn = module.function(target);
                        if target_fn.sig != *sig {
                            return Err(InterpError::SignatureMismatch(target_fn.name.clone()));
                        }
                        let args = args.iter().map(eval).collect::<Result<Vec<_>, _>>()?;
                        self.invoke(target, &args, depth + 1)?
                    }
                    InstKind::Br { target } => {
                        block = target.0;
                        continue 'blocks;
                    }
                    InstKind::CondBr {
                        cond,
                        then_bb,
                        else_bb,
                    } => {
                        block = if eval(cond)? & 1 == 1 {
                            then_bb.0
                        } else {
                            else_bb.0
                        };
                        continue 'blocks;
                    }
                    InstKind::Ret { val } => {
                        let ret = val.as_ref().map(eval).transpose()?;
                        return Ok(match (&func.sig.ret, ret) {
                            (Some(ty), Some(v)) => Some(ty.mask(v)),
                            _ => None,
                        });
                    }
                };

                if let (Some(id), Some(v)) = (inst.result, result) {
                    values.insert(id.0, v);
                }
            }
            return Err(InterpError::MissingTerminator(func.blocks[block].label.clone()));
        }
    }
}

fn binary(op: BinOp, bits: u32, a: u64, b: u64) -> u64 {
    match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Sub => a.wrapping_sub(b),
        BinOp::Mul => a.wrapping_mul(b),
        BinOp::Xor => a ^ b,
        BinOp::And => a & b,
        BinOp::Or => a | b,
        // Oversized shift amounts produce zero.
        BinOp::Shl if b < u64::from(bits) => a << b,
        BinOp::LShr if b < u64::from(bits) => a >> b,
        BinOp::Shl | BinOp::LShr => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Global, Linkage};
    use crate::parser::parse_module;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn module(text: &str) -> Module {
        parse_module(text).unwrap()
    }

    #[test]
    fn runs_arithmetic_and_updates_globals() {
        let m = module(
            r#"
@counter = global i64 40
define i64 @bump(i64) {
entry:
  %1 = load i64, @counter
  %2 = add i64 %1, %0
  store i64 %2, @counter
  %3 = icmp ugt i64 %2, 100
  br %3, big, small
big:
  ret 1
small:
  ret 0
}
"#,
        );
        let mut machine = Machine::new(&m).unwrap();
        assert_eq!(machine.call("bump", &[2]).unwrap(), Some(0));
        assert_eq!(machine.read_global("counter").unwrap(), 42);
        assert_eq!(machine.call("bump", &[100]).unwrap(), Some(1));
        assert_eq!(machine.read_global("counter").unwrap(), 142);
    }

    #[test]
    fn oversized_globals_fail_layout() {
        let m = module("@big = global [268435456 x i64] zeroinitializer\n");
        assert!(matches!(
            Machine::new(&m),
            Err(InterpError::LayoutOverflow(name)) if name == "big"
        ));

        let mut m = Module::new("huge");
        m.add_global(Global {
            name: "huge".into(),
            ty: Type::array(Type::array(Type::I64, 1 << 40), 1 << 30),
            linkage: Linkage::Private,
            constant: false,
            init: Some(Initializer::Zero),
        });
        assert!(matches!(Layout::compute(&m), Err(InterpError::LayoutOverflow(_))));
    }

    #[test]
    fn resolves_symbol_offsets_in_initializers() {
        let m = module(
            r#"
@table = private constant [2 x ptr] [@value + 0x10, @seven + 0x20]
@value = global i64 9
define i64 @seven() {
entry:
  ret 7
}
define i64 @main() {
entry:
  %0 = gep inbounds @table, 0 x 8
  %1 = load ptr, %0
  %2 = gep %1, 0xfffffffffffffff0 x 1
  %3 = load i64, %2
  %4 = gep inbounds @table, 1 x 8
  %5 = load ptr, %4
  %6 = sub i64 %5, 0x20
  %7 = fncast %6 to fn() -> i64
  %8 = call fn() -> i64 %7()
  %9 = add i64 %3, %8
  ret %9
}
"#,
        );
        let mut machine = Machine::new(&m).unwrap();
        assert_eq!(machine.call("main", &[]).unwrap(), Some(16));
        let value = Symbol::Global(m.global_by_name("value").unwrap());
        assert_eq!(
            machine.layout().address(value) % ALIGN,
            0,
            "globals are 16-byte aligned"
        );
    }

    #[test]
    fn rejects_writes_to_constants() {
        let m = module(
            r#"
@k = constant i64 1
define void @main() {
entry:
  store i64 2, @k
  ret void
}
"#,
        );
        let mut machine = Machine::new(&m).unwrap();
        assert!(matches!(
            machine.call("main", &[]),
            Err(InterpError::ReadOnlyWrite { name, .. }) if name == "k"
        ));
    }

    #[test]
    fn dispatches_externals_to_hosts() {
        let m = module(
            r#"
@ext = external global i64
declare i64 @double(i64)
define i64 @main(i64) {
entry:
  store i64 %0, @ext
  %1 = call fn(i64) -> i64 @double(%0)
  ret %1
}
"#,
        );
        let mut machine = Machine::new(&m).unwrap();
        assert!(matches!(
            machine.call("main", &[3]),
            Err(InterpError::UnresolvedExternal(name)) if name == "double"
        ));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        machine.register_host(
            "double",
            Box::new(move |args: &[u64]| {
                log.borrow_mut().push(args.to_vec());
                args[0] * 2
            }),
        );
        assert_eq!(machine.call("main", &[21]).unwrap(), Some(42));
        assert_eq!(machine.read_global("ext").unwrap(), 21);
        assert_eq!(*seen.borrow(), vec![vec![21]]);
    }

    #[test]
    fn enforces_step_and_depth_limits() {
        let m = module(
            r#"
define void @spin() {
entry:
  br entry
}
define void @recurse() {
entry:
  call fn() -> void @recurse()
  ret void
}
"#,
        );
        let mut machine = Machine::new(&m).unwrap().with_config(InterpConfig {
            max_steps: 50,
            max_depth: 8,
        });
        assert!(matches!(
            machine.call("spin", &[]),
            Err(InterpError::StepLimit(50))
        ));
        assert!(matches!(
            machine.call("recurse", &[]),
            Err(InterpError::CallDepth(8))
        ));
    }

    #[test]
    fn rejects_calls_to_non_routines() {
        let m = module(
            r#"
@data = global i64 0
define void @main() {
entry:
  %0 = fncast @data to fn() -> void
  call fn() -> void %0()
  ret void
}
"#,
        );
        let mut machine = Machine::new(&m).unwrap();
        assert!(matches!(
            machine.call("main", &[]),
            Err(InterpError::NotCallable(DATA_BASE))
        ));
    }

    #[test]
    fn truncating_arithmetic_wraps() {
        let m = module(
            r#"
define i32 @main(i64) {
entry:
  %1 = trunc %0 to i32
  %2 = add i32 %1, 1
  ret %2
}
"#,
        );
        let mut machine = Machine::new(&m).unwrap();
        assert_eq!(machine.call("main", &[0x1_ffff_ffff]).unwrap(), Some(0));
    }
}
