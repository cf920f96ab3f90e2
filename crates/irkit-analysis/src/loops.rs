//! Natural-loop detection from dominators.
//!
//! A back edge is an edge `t → h` whose head `h` dominates its tail `t`.
//! The natural loop of a back edge is `h` plus every block that reaches
//! `t` without passing through `h`. Loops sharing a head are merged. The
//! result is a forest: a loop is a child of the smallest other loop whose
//! block set contains its head.
//!
//! Only reducible control flow is supported: a retreating DFS edge whose
//! target does not dominate its source raises
//! [`AnalysisError::IrreducibleCfg`].

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};

use irkit_core::{BlockId, Function};

use crate::cfg::Cfg;
use crate::dominators::{dominates, DomSets};
use crate::error::AnalysisError;

/// One node of the loop-nesting forest.
#[derive(Debug, Clone)]
pub struct Loop {
    /// The loop header; dominates every block of the loop.
    pub head: BlockId,
    /// Contained blocks in depth-first spanning-tree order, head first.
    pub blocks: Vec<BlockId>,
    /// Loops nested directly within this one.
    pub children: Vec<Loop>,
}

impl Loop {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }

    /// The loop plus all nested loops, pre-order.
    pub fn iter(&self) -> Vec<&Loop> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.iter());
        }
        out
    }
}

/// Flattens a loop forest into pre-order.
pub fn flat_loops(forest: &[Loop]) -> Vec<&Loop> {
    forest.iter().flat_map(Loop::iter).collect()
}

/// Finds the natural-loop forest of `func`.
pub fn find_natural_loops(
    func: &Function,
    cfg: &Cfg,
    doms: &DomSets,
) -> Result<Vec<Loop>, AnalysisError> {
    let blocks = func.block_ids();
    let Some(&entry) = blocks.first() else {
        return Ok(Vec::new());
    };

    let preorder = dfs_preorder(entry, cfg);
    check_reducible(func, cfg, doms, entry)?;

    // Collect back edges and merge loop bodies by head.
    let mut bodies: IndexMap<BlockId, IndexSet<BlockId>> = IndexMap::new();
    for &block in &blocks {
        for succ in cfg.successors(block) {
            if dominates(doms, succ, block) {
                let body = bodies.entry(succ).or_default();
                natural_loop_body(cfg, succ, block, body);
            }
        }
    }

    // Order each body in DFS spanning-tree order, head first.
    let rank = |b: BlockId| preorder.get(&b).copied().unwrap_or(usize::MAX);
    let mut loops: Vec<(BlockId, Vec<BlockId>)> = bodies
        .into_iter()
        .map(|(head, body)| {
            let mut ordered: Vec<BlockId> = body.into_iter().collect();
            ordered.sort_by_key(|&b| rank(b));
            (head, ordered)
        })
        .collect();
    // Smallest loops first, so parents are found innermost-out.
    loops.sort_by_key(|(_, body)| body.len());

    // Parent of L = the smallest other loop whose blocks contain head(L).
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); loops.len()];
    let mut roots: Vec<usize> = Vec::new();
    for i in 0..loops.len() {
        let head = loops[i].0;
        let parent = (0..loops.len())
            .filter(|&j| j != i && loops[j].1.contains(&head))
            .min_by_key(|&j| loops[j].1.len());
        match parent {
            Some(p) => children[p].push(i),
            None => roots.push(i),
        }
    }

    fn materialize(
        index: usize,
        loops: &[(BlockId, Vec<BlockId>)],
        children: &[Vec<usize>],
        rank: &dyn Fn(BlockId) -> usize,
    ) -> Loop {
        let mut kids: Vec<usize> = children[index].clone();
        kids.sort_by_key(|&k| rank(loops[k].0));
        Loop {
            head: loops[index].0,
            blocks: loops[index].1.clone(),
            children: kids
                .into_iter()
                .map(|k| materialize(k, loops, children, rank))
                .collect(),
        }
    }

    roots.sort_by_key(|&i| rank(loops[i].0));
    Ok(roots
        .into_iter()
        .map(|i| materialize(i, &loops, &children, &rank))
        .collect())
}

/// Blocks that can reach `tail` without passing through `head`, plus both.
fn natural_loop_body(cfg: &Cfg, head: BlockId, tail: BlockId, body: &mut IndexSet<BlockId>) {
    body.insert(head);
    if body.insert(tail) {
        let mut stack = vec![tail];
        while let Some(block) = stack.pop() {
            for pred in cfg.predecessors(block) {
                if body.insert(pred) {
                    stack.push(pred);
                }
            }
        }
    }
}

fn dfs_preorder(entry: BlockId, cfg: &Cfg) -> HashMap<BlockId, usize> {
    let mut order = HashMap::new();
    let mut stack = vec![entry];
    while let Some(block) = stack.pop() {
        if order.contains_key(&block) {
            continue;
        }
        let n = order.len();
        order.insert(block, n);
        // Reverse so the first successor is visited first.
        for succ in cfg.successors(block).into_iter().rev() {
            if !order.contains_key(&succ) {
                stack.push(succ);
            }
        }
    }
    order
}

/// Rejects retreating edges that are not back edges.
fn check_reducible(
    func: &Function,
    cfg: &Cfg,
    doms: &DomSets,
    entry: BlockId,
) -> Result<(), AnalysisError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Grey,
        Black,
    }
    let mut color: HashMap<BlockId, Color> = HashMap::new();
    // Explicit DFS with an enter/leave stack so grey marks are exact.
    enum Step {
        Enter(BlockId),
        Leave(BlockId),
    }
    let mut stack = vec![Step::Enter(entry)];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(block) => {
                match color.get(&block).copied().unwrap_or(Color::White) {
                    Color::White => {}
                    _ => continue,
                }
                color.insert(block, Color::Grey);
                stack.push(Step::Leave(block));
                for succ in cfg.successors(block).into_iter().rev() {
                    match color.get(&succ).copied().unwrap_or(Color::White) {
                        Color::White => stack.push(Step::Enter(succ)),
                        Color::Grey => {
                            // A cycle edge: fine only if it is a back edge.
                            if !dominates(doms, succ, block) {
                                return Err(AnalysisError::IrreducibleCfg {
                                    block: func.block(succ).name().to_string(),
                                });
                            }
                        }
                        Color::Black => {}
                    }
                }
            }
            Step::Leave(block) => {
                color.insert(block, Color::Black);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::cfg;
    use crate::dominators::compute_dominators;
    use irkit_core::{Builder, Constant, Function, Type, Value};

    fn analyze(func: &Function) -> Result<Vec<Loop>, AnalysisError> {
        let g = cfg(func);
        let doms = compute_dominators(func, &g);
        find_natural_loops(func, &g, &doms)
    }

    #[test]
    fn no_loops_in_straight_line_code() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let entry = f.add_block("entry");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.ret(None).unwrap();
        assert!(analyze(&f).unwrap().is_empty());
    }

    #[test]
    fn two_sequential_loops_give_a_forest_of_two() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let entry = f.add_block("entry");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let stop = Value::Const(Constant::int(10, Type::int32()));
        let (cond1, body1, exit1) = b.gen_loop(None, stop.clone(), None).unwrap();
        b.position_at_end(exit1);
        let (cond2, body2, exit2) = b.gen_loop(None, stop, None).unwrap();
        b.at_end(exit2, |b| b.ret(None)).unwrap();

        let forest = analyze(&f).unwrap();
        assert_eq!(forest.len(), 2);
        for l in &forest {
            assert!(l.children.is_empty());
        }
        assert_eq!(forest[0].head, cond1);
        assert!(forest[0].contains(body1));
        assert_eq!(forest[1].head, cond2);
        assert!(forest[1].contains(body2));
    }

    #[test]
    fn three_nested_loops_give_depth_three() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let entry = f.add_block("entry");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let stop = Value::Const(Constant::int(10, Type::int32()));
        // gen_loop leaves the builder at the beginning of the body, so each
        // call nests inside the previous one.
        let (outer_cond, _, _) = b.gen_loop(None, stop.clone(), None).unwrap();
        let (mid_cond, _, _) = b.gen_loop(None, stop.clone(), None).unwrap();
        let (inner_cond, _, _) = b.gen_loop(None, stop, None).unwrap();
        let exit = f.exitblock().unwrap();
        let mut b = Builder::new(&mut f);
        b.at_end(exit, |b| b.ret(None)).unwrap();

        let forest = analyze(&f).unwrap();
        assert_eq!(forest.len(), 1);
        let outer = &forest[0];
        assert_eq!(outer.head, outer_cond);
        assert_eq!(outer.children.len(), 1);
        let mid = &outer.children[0];
        assert_eq!(mid.head, mid_cond);
        assert_eq!(mid.children.len(), 1);
        let inner = &mid.children[0];
        assert_eq!(inner.head, inner_cond);
        assert!(inner.children.is_empty());

        assert_eq!(flat_loops(&forest).len(), 3);
    }

    #[test]
    fn loop_head_dominates_its_blocks() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let entry = f.add_block("entry");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let stop = Value::Const(Constant::int(3, Type::int32()));
        b.gen_loop(None, stop, None).unwrap();
        let exit = f.exitblock().unwrap();
        let mut b = Builder::new(&mut f);
        b.at_end(exit, |b| b.ret(None)).unwrap();

        let g = cfg(&f);
        let doms = compute_dominators(&f, &g);
        let forest = find_natural_loops(&f, &g, &doms).unwrap();
        for l in flat_loops(&forest) {
            for &block in &l.blocks {
                assert!(dominates(&doms, l.head, block));
            }
            // Back edges into the head originate inside the loop.
            for pred in g.predecessors(l.head) {
                if dominates(&doms, l.head, pred) {
                    assert!(l.contains(pred));
                }
            }
        }
    }

    #[test]
    fn irreducible_cfg_is_rejected() {
        // entry branches into the middle of a cycle: b <-> c with two
        // entries, neither dominating the other.
        let mut f = Function::new(
            "f",
            Type::function(Type::Void, vec![Type::Bool]),
            vec!["p".into()],
        )
        .unwrap();
        let entry = f.add_block("entry");
        let bb = f.add_block("b");
        let cc = f.add_block("c");
        let done = f.add_block("done");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.cbranch(Value::Arg(irkit_core::ArgId(0)), bb, cc).unwrap();
        b.at_end(bb, |b| b.jump(cc)).unwrap();
        b.at_end(cc, |b| {
            b.cbranch(Value::Arg(irkit_core::ArgId(0)), bb, done)
        })
        .unwrap();
        b.at_end(done, |b| b.ret(None)).unwrap();

        assert!(matches!(
            analyze(&f),
            Err(AnalysisError::IrreducibleCfg { .. })
        ));
    }
}
