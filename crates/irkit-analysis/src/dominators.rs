//! Dominator sets by iterative data-flow fixed point.
//!
//! `dom(entry) = {entry}`; every other block starts at the set of all
//! blocks and is refined by `dom(b) = {b} ∪ ⋂ dom(p)` over its CFG
//! predecessors until a full sweep changes nothing. Straightforward by
//! contract; anything faster must match these results bit for bit.

use std::collections::HashMap;

use indexmap::IndexSet;

use irkit_core::{BlockId, Function, IrError, Opcode, Value};

use crate::cfg::Cfg;

/// Block → set of dominating blocks.
pub type DomSets = HashMap<BlockId, IndexSet<BlockId>>;

/// Computes dominator sets for every block of `func`.
pub fn compute_dominators(func: &Function, cfg: &Cfg) -> DomSets {
    let blocks = func.block_ids();
    let mut doms: DomSets = HashMap::new();
    let Some(&entry) = blocks.first() else {
        return doms;
    };

    let all: IndexSet<BlockId> = blocks.iter().copied().collect();
    for &block in &blocks {
        if block == entry {
            doms.insert(block, IndexSet::from([block]));
        } else {
            doms.insert(block, all.clone());
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for &block in &blocks {
            if block == entry {
                continue;
            }
            let preds = cfg.predecessors(block);
            // Intersection over no predecessors is the ambient top: the
            // block is unreachable and keeps the full set.
            let mut new: IndexSet<BlockId> = match preds.split_first() {
                None => all.clone(),
                Some((&first, rest)) => {
                    let mut acc: IndexSet<BlockId> = doms[&first].clone();
                    for p in rest {
                        let other = &doms[p];
                        acc.retain(|b| other.contains(b));
                    }
                    acc
                }
            };
            new.insert(block);
            if new != doms[&block] {
                doms.insert(block, new);
                changed = true;
            }
        }
    }
    doms
}

/// Whether `a` dominates `b`.
pub fn dominates(doms: &DomSets, a: BlockId, b: BlockId) -> bool {
    doms.get(&b).is_some_and(|set| set.contains(&a))
}

/// SSA dominance check: every non-φ use of an op must be dominated by the
/// op's defining block (and follow it within the same block).
pub fn verify_ssa(func: &Function, doms: &DomSets) -> Result<(), IrError> {
    for block in func.block_ids() {
        let ops = func.ops_of(block);
        let position: HashMap<_, _> = ops.iter().enumerate().map(|(i, &op)| (op, i)).collect();
        for (i, &op) in ops.iter().enumerate() {
            if func.op(op).opcode == Opcode::Phi {
                continue;
            }
            for arg in func.op(op).args() {
                for value in arg.values() {
                    let Value::Op(def) = value else { continue };
                    let def_block = func
                        .op(*def)
                        .block()
                        .expect("verified functions have attached args");
                    let ok = if def_block == block {
                        position.get(def).is_some_and(|&d| d < i)
                    } else {
                        dominates(doms, def_block, block)
                    };
                    if !ok {
                        return Err(IrError::verify(
                            format!(
                                "function {}, block {}, op %{}",
                                func.name(),
                                func.block(block).name(),
                                func.op(op).result()
                            ),
                            format!("use of %{} is not dominated by its definition", func.op(*def).result()),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}
