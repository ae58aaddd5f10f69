/// Module for computing metrics that evaluate reference hiding transforms.
///
/// The metrics count what a static analyst can still read off the instruction stream: direct
/// references to globals, direct calls, routine addresses taken in the open. They also count
/// what the transform leaves behind: tagged decode sites, encoded tables, volatile loads and
/// indirect calls. A composite potency score summarizes both sides so that a pipeline can
/// compare a module before and after a pass.
///
/// # Usage
/// ```rust,ignore
/// let module = cloakref_core::parse_module(text)?;
/// let metrics = metrics::collect_metrics(&module)?;
/// println!("{}", serde_json::to_string_pretty(&metrics)?);
/// ```
use cloakref_core::ir::{ConstExpr, Global, Initializer, InstKind, Module, Operand, Symbol};
use cloakref_utils::errors::MetricsError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub use cloakref_core::ir::DECODE_TAG;

/// Analytical metrics for one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Instructions across all function bodies.
    pub inst_cnt: usize,
    pub global_cnt: usize,
    pub function_cnt: usize,
    /// Operands naming a global directly, encoded tables excluded.
    pub direct_data_refs: usize,
    /// Calls whose callee is a routine symbol.
    pub direct_calls: usize,
    /// Routine symbols used anywhere but the callee position.
    pub fn_address_refs: usize,
    /// Calls through a computed value.
    pub indirect_calls: usize,
    /// Instructions tagged as the result of a decode sequence.
    pub decode_sites: usize,
    pub encoded_tables: usize,
    pub volatile_loads: usize,
    /// Composite potency score (higher means more analyst effort).
    pub potency: f64,
}

/// Whether `global` looks like an encoded address table: a constant array whose every entry
/// is a symbol address displaced by a non-zero offset.
pub fn is_encoded_table(global: &Global) -> bool {
    match &global.init {
        Some(Initializer::Array(entries)) if global.constant && !entries.is_empty() => {
            entries.iter().all(|e| {
                matches!(e, ConstExpr::SymbolAddr { offset, .. } if *offset != 0)
            })
        }
        _ => false,
    }
}

/// Collects metrics from a module.
///
/// Fails if an operand names a symbol outside the module.
pub fn collect_metrics(module: &Module) -> Result<Metrics, MetricsError> {
    let tables: HashSet<usize> = module
        .globals
        .iter()
        .enumerate()
        .filter(|(_, g)| is_encoded_table(g))
        .map(|(i, _)| i)
        .collect();

    let mut m = Metrics {
        inst_cnt: 0,
        global_cnt: module.globals.len(),
        function_cnt: module.functions.len(),
        direct_data_refs: 0,
        direct_calls: 0,
        fn_address_refs: 0,
        indirect_calls: 0,
        decode_sites: 0,
        encoded_tables: tables.len(),
        volatile_loads: 0,
        potency: 0.0,
    };

    for func in &module.functions {
        for inst in func.instructions() {
            m.inst_cnt += 1;
            if inst.metadata.contains_key(DECODE_TAG) {
                m.decode_sites += 1;
            }
            match &inst.kind {
                InstKind::Load { volatile: true, .. } => m.volatile_loads += 1,
                InstKind::Call {
                    callee: Operand::Symbol(Symbol::Func(_)),
                    ..
                } => m.direct_calls += 1,
                InstKind::Call { .. } => m.indirect_calls += 1,
                _ => {}
            }

            let is_call = matches!(inst.kind, InstKind::Call { .. });
            for (pos, op) in inst.operands().into_iter().enumerate() {
                match op {
                    Operand::Symbol(Symbol::Global(id)) => {
                        if id.0 >= module.globals.len() {
                            return Err(MetricsError::DanglingSymbol(func.name.clone()));
                        }
                        if !tables.contains(&id.0) {
                            m.direct_data_refs += 1;
                        }
                    }
                    Operand::Symbol(Symbol::Func(id)) => {
                        if id.0 >= module.functions.len() {
                            return Err(MetricsError::DanglingSymbol(func.name.clone()));
                        }
                        if !(is_call && pos == 0) {
                            m.fn_address_refs += 1;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    m.potency = score(&m);
    Ok(m)
}

/// Composite potency score.
///
/// Grows with code size, with decode sites and indirect calls, and with the fraction of
/// references that went through a decode sequence instead of naming a symbol directly.
fn score(m: &Metrics) -> f64 {
    let exposed = m.direct_data_refs + m.direct_calls;
    let hidden_ratio = if m.decode_sites + exposed == 0 {
        0.0
    } else {
        m.decode_sites as f64 / (m.decode_sites + exposed) as f64
    };
    5.0 * ((m.inst_cnt + 1) as f64).log2()
        + 4.0 * m.decode_sites as f64
        + 2.0 * m.indirect_calls as f64
        + 30.0 * hidden_ratio
}

/// Compares two sets of metrics to evaluate a transform.
///
/// Computes the difference in potency, with a small penalty per added instruction. A positive
/// result indicates the transform increased analyst effort at acceptable size cost.
pub fn compare(before: &Metrics, after: &Metrics) -> f64 {
    after.potency - before.potency - 0.05 * (after.inst_cnt as f64 - before.inst_cnt as f64)
}
