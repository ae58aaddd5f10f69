use thiserror::Error;

/// Error type for reading the textual IR.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A line could not be parsed.
    #[error("parse error at line {line}: {msg} ⇒ `{raw}`")]
    Syntax {
        line: usize,
        msg: String,
        raw: String,
    },
    /// Two globals or functions share a name.
    #[error("duplicate symbol @{0}")]
    DuplicateSymbol(String),
    /// An operand names a symbol that is never declared.
    #[error("unknown symbol @{name} at line {line}")]
    UnknownSymbol { line: usize, name: String },
    /// A branch names a label that does not exist in the function.
    #[error("unknown label {label} in @{function}")]
    UnknownLabel { function: String, label: String },
    /// A byte-string initializer is not valid hex.
    #[error("hex decode failed: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

/// Error type for structural validation of a module.
#[derive(Debug, Error)]
pub enum IrError {
    /// An operand references a global index outside the module.
    #[error("global #{0} does not exist")]
    UnknownGlobal(usize),
    /// An operand references a function index outside the module.
    #[error("function #{0} does not exist")]
    UnknownFunction(usize),
    /// A value is used in a function that never defines it.
    #[error("value %{value} used but not defined in @{function}")]
    UndefinedValue { function: String, value: u32 },
    /// A value is defined twice in the same function.
    #[error("value %{value} defined twice in @{function}")]
    RedefinedValue { function: String, value: u32 },
    /// A branch targets a block index outside the function.
    #[error("block {block} does not exist in @{function}")]
    UnknownBlock { function: String, block: usize },
    /// A function numbers its values too close to `u32::MAX` for transforms to add more.
    #[error("@{0} numbers values past the transform headroom")]
    ValueSpaceExhausted(String),
    /// A block does not end in `br` or `ret`.
    #[error("block {block} of @{function} has no terminator")]
    MissingTerminator { function: String, block: String },
}

/// Error type for executing a module in the interpreter.
#[derive(Debug, Error)]
pub enum InterpError {
    /// The requested entry function does not exist.
    #[error("no function named @{0}")]
    UnknownFunction(String),
    /// A global looked up by name does not exist.
    #[error("no global named @{0}")]
    UnknownGlobal(String),
    /// A memory access falls outside every mapped region.
    #[error("global @{0} does not fit in the data region")]
    LayoutOverflow(String),

    #[error("invalid memory access at {0:#x}")]
    InvalidAddress(u64),
    /// A store targets a constant global.
    #[error("write to read-only global @{name} at {addr:#x}")]
    ReadOnlyWrite { name: String, addr: u64 },
    /// An instruction reads a value that has not been computed yet.
    #[error("value %{0} read before definition")]
    UndefinedValue(u32),
    /// A call reached a declaration with no registered host callback.
    #[error("unresolved external routine @{0}")]
    UnresolvedExternal(String),
    /// An indirect call target is not the address of a routine.
    #[error("call target {0:#x} is not a routine")]
    NotCallable(u64),
    /// Call signature disagrees with the callee definition.
    #[error("signature mismatch calling @{0}")]
    SignatureMismatch(String),
    /// Wrong number of arguments supplied to a routine.
    #[error("@{name} expects {expected} arguments, got {got}")]
    ArgumentCount {
        name: String,
        expected: usize,
        got: usize,
    },
    /// Execution ran past the configured step budget.
    #[error("step limit of {0} exceeded")]
    StepLimit(usize),
    /// Nested calls went deeper than the configured limit.
    #[error("call depth limit of {0} exceeded")]
    CallDepth(usize),
    /// Control fell off the end of a block.
    #[error("block {0} has no terminator")]
    MissingTerminator(String),
    /// The module is structurally invalid.
    #[error("invalid module: {0}")]
    Ir(#[from] IrError),
}

/// Error type for module metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// An operand references a symbol missing from the module.
    #[error("dangling symbol reference in @{0}")]
    DanglingSymbol(String),
}

/// Error type for transform operations.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The substitution registry has no formulas to choose from.
    #[error("substitution registry is empty")]
    EmptyRegistry,
    /// A pipeline names a transform that is not registered.
    #[error("unknown pass: {0}")]
    UnknownPass(String),
    #[error("core operation failed: {0}")]
    CoreError(#[from] IrError),
    #[error("metrics computation failed: {0}")]
    MetricsError(#[from] MetricsError),
}

/// Errors that can occur while running the CLI obfuscation flow.
#[derive(Debug, Error)]
pub enum ObfuscateError {
    /// Input text is not a valid module.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    /// File read/write error.
    #[error("file error: {0}")]
    File(#[from] std::io::Error),
    /// Transform application failed.
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),
    /// Interpreting the module failed.
    #[error("execution error: {0}")]
    Interp(#[from] InterpError),
    /// A command line argument could not be interpreted.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// JSON serialization error.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
