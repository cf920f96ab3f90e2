//! Per-function control-flow graph.
//!
//! A directed petgraph over the function's blocks, derived from each
//! block's terminator: `jump` and `cbranch` name their targets, `ret` has
//! none, and `exc_throw` targets every handler named by the block's
//! `exc_setup` leaders. An `exc_throw` with no handler gets an edge to the
//! synthetic per-function exit node (`irkit.exit`), which is a CFG node
//! but not a real block.
//!
//! Every block is a node even if unreachable. Predecessors are the
//! transposed view; both neighbor queries come back in block list order
//! so downstream analyses iterate deterministically.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use irkit_core::{BlockId, Function};

/// A CFG node: a real block, or the synthetic exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgNode {
    Block(BlockId),
    /// Synthetic target of `exc_throw` ops with no matching handler.
    Exit,
}

/// The control-flow graph of one function.
#[derive(Debug)]
pub struct Cfg {
    graph: DiGraph<CfgNode, ()>,
    nodes: HashMap<BlockId, NodeIndex>,
    order: HashMap<BlockId, usize>,
    exit: NodeIndex,
}

/// Builds the CFG for `func`.
pub fn cfg(func: &Function) -> Cfg {
    let mut graph = DiGraph::new();
    let exit = graph.add_node(CfgNode::Exit);
    let mut nodes = HashMap::new();
    let mut order = HashMap::new();

    for (i, block) in func.block_ids().into_iter().enumerate() {
        let idx = graph.add_node(CfgNode::Block(block));
        nodes.insert(block, idx);
        order.insert(block, i);
    }

    for block in func.block_ids() {
        let from = nodes[&block];
        let targets = func.terminator_targets(block);
        let is_throw = func
            .terminator_of(block)
            .map(|t| func.op(t).opcode == irkit_core::Opcode::ExcThrow)
            .unwrap_or(false);
        if is_throw && targets.is_empty() {
            graph.update_edge(from, exit, ());
            continue;
        }
        for target in targets {
            graph.update_edge(from, nodes[&target], ());
        }
    }

    Cfg {
        graph,
        nodes,
        order,
        exit,
    }
}

impl Cfg {
    pub fn graph(&self) -> &DiGraph<CfgNode, ()> {
        &self.graph
    }

    pub fn node(&self, block: BlockId) -> NodeIndex {
        self.nodes[&block]
    }

    /// Whether the block's terminator leads to the synthetic exit.
    pub fn throws_to_exit(&self, block: BlockId) -> bool {
        self.graph
            .neighbors_directed(self.nodes[&block], Direction::Outgoing)
            .any(|n| n == self.exit)
    }

    fn neighbors(&self, block: BlockId, dir: Direction) -> Vec<BlockId> {
        let mut out: Vec<BlockId> = self
            .graph
            .neighbors_directed(self.nodes[&block], dir)
            .filter_map(|n| match self.graph[n] {
                CfgNode::Block(b) => Some(b),
                CfgNode::Exit => None,
            })
            .collect();
        out.sort_by_key(|b| self.order[b]);
        out
    }

    /// Successor blocks, in block list order.
    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        self.neighbors(block, Direction::Outgoing)
    }

    /// Predecessor blocks, in block list order.
    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.neighbors(block, Direction::Incoming)
    }

    /// Blocks with two or more predecessors (the φ insertion points).
    pub fn join_blocks(&self) -> Vec<BlockId> {
        let mut joins: Vec<BlockId> = self
            .nodes
            .keys()
            .copied()
            .filter(|&b| self.predecessors(b).len() >= 2)
            .collect();
        joins.sort_by_key(|b| self.order[b]);
        joins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use irkit_core::{Builder, Constant, Function, Type, Value};

    /// entry -> (then | else) -> exit; scenario A's diamond.
    fn diamond() -> (Function, BlockId, BlockId, BlockId, BlockId) {
        let mut f = Function::new(
            "f",
            Type::function(Type::int32(), vec![Type::Bool]),
            vec!["c".into()],
        )
        .unwrap();
        let entry = f.add_block("entry");
        let then = f.add_block("then");
        let els = f.add_block("else");
        let exit = f.add_block("exit");

        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.cbranch(Value::Arg(irkit_core::ArgId(0)), then, els).unwrap();
        b.at_end(then, |b| b.jump(exit)).unwrap();
        b.at_end(els, |b| b.jump(exit)).unwrap();
        b.at_end(exit, |b| {
            b.ret(Some(Value::Const(Constant::int(0, Type::int32()))))
        })
        .unwrap();
        (f, entry, then, els, exit)
    }

    #[test]
    fn diamond_edges() {
        let (f, entry, then, els, exit) = diamond();
        let cfg = cfg(&f);
        assert_eq!(cfg.successors(entry), vec![then, els]);
        assert_eq!(cfg.successors(then), vec![exit]);
        assert_eq!(cfg.successors(exit), vec![]);
        assert_eq!(cfg.predecessors(exit), vec![then, els]);
        assert_eq!(cfg.predecessors(entry), vec![]);
        assert_eq!(cfg.join_blocks(), vec![exit]);
    }

    #[test]
    fn unreachable_blocks_are_nodes() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let entry = f.add_block("entry");
        let orphan = f.add_block("orphan");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.ret(None).unwrap();
        b.at_end(orphan, |b| b.ret(None)).unwrap();

        let cfg = cfg(&f);
        assert_eq!(cfg.predecessors(orphan), vec![]);
        assert_eq!(cfg.successors(orphan), vec![]);
        // Both blocks plus the synthetic exit are nodes.
        assert_eq!(cfg.graph().node_count(), 3);
    }

    #[test]
    fn throw_with_handler_edges_to_handlers() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let body = f.add_block("body");
        let handler = f.add_block("handler");

        let mut b = Builder::new(&mut f);
        b.position_at_end(body);
        b.exc_setup(vec![handler]).unwrap();
        b.exc_throw(Value::Const(Constant::exception("ZeroDivisionError")))
            .unwrap();
        b.at_end(handler, |b| -> Result<(), irkit_core::IrError> {
            b.exc_catch(vec![Value::Const(Constant::exception("Exception"))])?;
            b.ret(None)?;
            Ok(())
        })
        .unwrap();

        let cfg = cfg(&f);
        assert_eq!(cfg.successors(body), vec![handler]);
        assert!(!cfg.throws_to_exit(body));
    }

    #[test]
    fn unhandled_throw_edges_to_synthetic_exit() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let body = f.add_block("body");
        let mut b = Builder::new(&mut f);
        b.position_at_end(body);
        b.exc_throw(Value::Const(Constant::exception("RuntimeError")))
            .unwrap();

        let cfg = cfg(&f);
        assert_eq!(cfg.successors(body), vec![]);
        assert!(cfg.throws_to_exit(body));
    }
}
