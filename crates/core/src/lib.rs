//! Core IR for the cloakref workspace: the module representation, its textual form and a
//! reference interpreter.
pub mod interp;
pub mod ir;
pub mod parser;
pub mod printer;

pub use interp::{InterpConfig, Machine};
pub use ir::Module;
pub use parser::parse_module;
pub use printer::{fingerprint, print_module};
