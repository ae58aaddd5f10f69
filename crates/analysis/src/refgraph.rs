use cloakref_core::ir::{ConstExpr, FuncId, GlobalId, Initializer, InstKind, Module, Operand, Symbol};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, EdgeRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How one symbol refers to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    /// A routine calls the target directly.
    Call,
    /// A routine names the target in any other operand position.
    Address,
    /// A global initializer embeds the target's address.
    Initializer,
}

/// Directed graph of direct symbol references: routine -> symbol for instruction operands,
/// global -> symbol for initializer entries.
#[derive(Debug, Clone)]
pub struct ReferenceGraph {
    graph: DiGraph<Symbol, RefKind>,
    nodes: HashMap<Symbol, NodeIndex>,
}

impl ReferenceGraph {
    pub fn build(module: &Module) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for id in module.global_ids() {
            nodes.insert(Symbol::Global(id), graph.add_node(Symbol::Global(id)));
        }
        for id in module.function_ids() {
            nodes.insert(Symbol::Func(id), graph.add_node(Symbol::Func(id)));
        }

        let mut this = Self { graph, nodes };
        for (i, global) in module.globals.iter().enumerate() {
            if let Some(Initializer::Array(entries)) = &global.init {
                for entry in entries {
                    if let ConstExpr::SymbolAddr { symbol, .. } = entry {
                        this.link(Symbol::Global(GlobalId(i)), *symbol, RefKind::Initializer);
                    }
                }
            }
        }
        for (i, func) in module.functions.iter().enumerate() {
            let from = Symbol::Func(FuncId(i));
            for inst in func.instructions() {
                let is_call = matches!(inst.kind, InstKind::Call { .. });
                for (pos, op) in inst.operands().into_iter().enumerate() {
                    if let Operand::Symbol(to) = op {
                        let kind = if is_call && pos == 0 {
                            RefKind::Call
                        } else {
                            RefKind::Address
                        };
                        this.link(from, *to, kind);
                    }
                }
            }
        }
        debug!(
            "Reference graph: {} nodes, {} edges",
            this.graph.node_count(),
            this.graph.edge_count()
        );
        this
    }

    /// Adds one edge per distinct `(from, to, kind)`. Unknown symbols are skipped.
    fn link(&mut self, from: Symbol, to: Symbol, kind: RefKind) {
        let (Some(&a), Some(&b)) = (self.nodes.get(&from), self.nodes.get(&to)) else {
            return;
        };
        if !self.graph.edges_connecting(a, b).any(|e| *e.weight() == kind) {
            self.graph.add_edge(a, b, kind);
        }
    }

    pub fn graph(&self) -> &DiGraph<Symbol, RefKind> {
        &self.graph
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    fn neighbors(&self, symbol: Symbol, dir: Direction) -> Vec<(Symbol, RefKind)> {
        let Some(&node) = self.nodes.get(&symbol) else {
            return Vec::new();
        };
        let mut out: Vec<_> = self
            .graph
            .edges_directed(node, dir)
            .map(|e| {
                let other = match dir {
                    Direction::Incoming => e.source(),
                    Direction::Outgoing => e.target(),
                };
                (self.graph[other], *e.weight())
            })
            .collect();
        out.sort_by_key(|(s, _)| *s);
        out
    }

    /// Symbols that refer to `symbol` directly.
    pub fn referrers(&self, symbol: Symbol) -> Vec<(Symbol, RefKind)> {
        self.neighbors(symbol, Direction::Incoming)
    }

    /// Symbols `symbol` refers to directly.
    pub fn references(&self, symbol: Symbol) -> Vec<(Symbol, RefKind)> {
        self.neighbors(symbol, Direction::Outgoing)
    }

    /// Every symbol reachable from `symbol` through direct references, itself excluded.
    pub fn reachable(&self, symbol: Symbol) -> Vec<Symbol> {
        let Some(&start) = self.nodes.get(&symbol) else {
            return Vec::new();
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut out = Vec::new();
        while let Some(node) = dfs.next(&self.graph) {
            if node != start {
                out.push(self.graph[node]);
            }
        }
        out.sort();
        out
    }
}
