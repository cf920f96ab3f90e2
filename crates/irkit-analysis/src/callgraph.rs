//! Module-level call graph.
//!
//! One node per function, an edge caller → callee for every `call` op
//! whose target is a known module function. The topological order puts
//! callers before their callees; reverse it for bottom-up passes.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use irkit_core::{Module, Opcode, Value};

use crate::error::AnalysisError;

/// Builds the call graph of `module`.
pub fn call_graph(module: &Module) -> DiGraph<String, ()> {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
    for func in module.functions() {
        let idx = graph.add_node(func.name().to_string());
        nodes.insert(func.name().to_string(), idx);
    }
    for func in module.functions() {
        let caller = nodes[func.name()];
        for op in func.op_ids() {
            if func.op(op).opcode != Opcode::Call {
                continue;
            }
            let target = func.op(op).args().first().and_then(|a| a.as_value());
            if let Some(Value::Func(name)) = target {
                if let Some(&callee) = nodes.get(name.as_str()) {
                    graph.update_edge(caller, callee, ());
                }
            }
        }
    }
    graph
}

/// Topologically sorts the call graph: callers before callees. Fails with
/// [`AnalysisError::NotADag`] on recursion cycles.
pub fn topo_order(module: &Module) -> Result<Vec<String>, AnalysisError> {
    let graph = call_graph(module);
    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(|n| graph[n].clone()).collect()),
        Err(cycle) => Err(AnalysisError::NotADag {
            function: graph[cycle.node_id()].clone(),
        }),
    }
}
