//! SSA construction: stack-slot promotion.
//!
//! Rewrites `alloca`/`load`/`store` locals into virtual registers joined
//! by `phi` ops:
//!
//! 1. find the promotable slots (used only by loads and stores through
//!    the slot pointer);
//! 2. hoist them to the entry block, preserving relative order;
//! 3. insert one empty φ per slot at the front of every join block;
//! 4. propagate definitions block by block, replacing loads and deleting
//!    stores, then fill every φ from its predecessors' final states;
//! 5. prune φs (unused, or all-incoming-equal) to a fixed point;
//! 6. merge trivial block pairs.
//!
//! Blocks are processed in declared order; a load from a slot with no
//! reaching definition yields `Undef` rather than an error.

use std::collections::{HashMap, HashSet};

use irkit_core::{
    BlockId, Function, IrError, Module, OpId, Opcode, Operand, Type, Value,
};

use irkit_analysis::cfg::{cfg, Cfg};

use crate::env::Env;
use crate::error::PassError;

/// The `passes.cfa` entry point: CFG-driven SSA construction.
pub fn run(func: &mut Function, _module: &Module, _env: &mut Env) -> Result<(), PassError> {
    promote(func)?;
    Ok(())
}

/// Promotes every promotable stack slot of `func` and simplifies the
/// block structure.
pub fn promote(func: &mut Function) -> Result<(), IrError> {
    let slots = find_allocas(func);
    if !slots.is_empty() {
        hoist_allocas(func, &slots)?;
        let graph = cfg(func);
        let phis = insert_phis(func, &graph, &slots);
        propagate(func, &graph, &slots, &phis)?;
    }
    prune_phis(func)?;
    merge_blocks(func)?;
    Ok(())
}

/// Promotable slots in first-appearance order: every use of the alloca
/// is a `load` from it or a `store` through it as the pointer operand.
/// Anything else (address capture, pointer arithmetic, call argument,
/// storing the pointer itself) escapes the slot and disqualifies it.
pub fn find_allocas(func: &Function) -> Vec<OpId> {
    irkit_core::verify::promotable_slots(func)
}

/// Moves the slots to the head of the entry block, keeping their order.
fn hoist_allocas(func: &mut Function, slots: &[OpId]) -> Result<(), IrError> {
    let entry = func
        .startblock()
        .ok_or_else(|| IrError::verify("ssa", "function has no entry block"))?;
    let mut anchor: Option<OpId> = None;
    for &slot in slots {
        func.unlink(slot);
        match anchor {
            Some(prev) => func.insert_op_after(slot, prev),
            None => {
                if let Some(&head) = func.ops_of(entry).first() {
                    func.insert_op_before(slot, head);
                } else {
                    func.append_op(entry, slot);
                }
            }
        }
        anchor = Some(slot);
    }
    Ok(())
}

/// One φ per slot at the front of every block with two or more
/// predecessors, after any existing φs (keeping the leader prefix in
/// declared order). Incoming lists start empty. Returns φ → (block, slot).
fn insert_phis(
    func: &mut Function,
    graph: &Cfg,
    slots: &[OpId],
) -> HashMap<OpId, (BlockId, OpId)> {
    let mut phis = HashMap::new();
    for block in graph.join_blocks() {
        for &slot in slots {
            let pointee = func
                .op(slot)
                .ty
                .pointee()
                .cloned()
                .unwrap_or(Type::Opaque);
            let phi = func.new_op(
                Opcode::Phi,
                pointee,
                vec![Operand::List(Vec::new()), Operand::List(Vec::new())],
                None,
            );
            let last_phi = func
                .ops_of(block)
                .into_iter()
                .take_while(|&o| func.op(o).opcode == Opcode::Phi)
                .last();
            match last_phi {
                Some(prev) => func.insert_op_after(phi, prev),
                None => {
                    if let Some(&head) = func.ops_of(block).first() {
                        func.insert_op_before(phi, head);
                    } else {
                        func.append_op(block, phi);
                    }
                }
            }
            phis.insert(phi, (block, slot));
        }
    }
    phis
}

/// Walks blocks in declared order maintaining `slot → value` states,
/// rewriting loads, consuming stores, then fills the φs from the
/// predecessors' final states and deletes the allocas.
fn propagate(
    func: &mut Function,
    graph: &Cfg,
    slots: &[OpId],
    phis: &HashMap<OpId, (BlockId, OpId)>,
) -> Result<(), IrError> {
    let slot_set: HashSet<OpId> = slots.iter().copied().collect();
    let pointee = |func: &Function, slot: OpId| {
        func.op(slot).ty.pointee().cloned().unwrap_or(Type::Opaque)
    };

    let mut blockvars: HashMap<BlockId, HashMap<OpId, Value>> = HashMap::new();
    for block in func.block_ids() {
        let preds = graph.predecessors(block);
        // A single predecessor hands its state through; join blocks get
        // their state from the φs below. An unprocessed predecessor
        // contributes nothing and reads fall back to Undef.
        let mut vars: HashMap<OpId, Value> = if preds.len() == 1 {
            blockvars.get(&preds[0]).cloned().unwrap_or_default()
        } else {
            HashMap::new()
        };

        for op in func.ops_of(block) {
            match func.op(op).opcode {
                Opcode::Alloca if slot_set.contains(&op) => {
                    let ty = pointee(func, op);
                    vars.insert(op, Value::Undef(ty));
                }
                Opcode::Load => {
                    let ptr = func.op(op).args()[0].as_value().and_then(Value::as_op);
                    let Some(slot) = ptr.filter(|s| slot_set.contains(s)) else {
                        continue;
                    };
                    let replacement = vars
                        .get(&slot)
                        .cloned()
                        .unwrap_or_else(|| Value::Undef(pointee(func, slot)));
                    func.replace_uses(&Value::Op(op), &replacement);
                    func.delete_op(op)?;
                }
                Opcode::Store => {
                    let ptr = func.op(op).args()[1].as_value().and_then(Value::as_op);
                    let Some(slot) = ptr.filter(|s| slot_set.contains(s)) else {
                        continue;
                    };
                    let value = func.op(op).args()[0]
                        .as_value()
                        .cloned()
                        .ok_or_else(|| IrError::verify("ssa", "store without a value operand"))?;
                    vars.insert(slot, value);
                    func.delete_op(op)?;
                }
                Opcode::Phi => {
                    if let Some(&(_, slot)) = phis.get(&op) {
                        vars.insert(slot, Value::Op(op));
                    }
                }
                _ => {}
            }
        }
        blockvars.insert(block, vars);
    }

    // Fill every inserted φ from the predecessors' final states.
    for (&phi, &(block, slot)) in phis {
        let preds = graph.predecessors(block);
        let mut incoming_blocks = Vec::with_capacity(preds.len());
        let mut incoming_values = Vec::with_capacity(preds.len());
        for pred in preds {
            incoming_blocks.push(Value::Block(pred));
            let value = blockvars
                .get(&pred)
                .and_then(|vars| vars.get(&slot))
                .cloned()
                .unwrap_or_else(|| Value::Undef(pointee(func, slot)));
            incoming_values.push(value);
        }
        func.set_args(
            phi,
            vec![
                Operand::List(incoming_blocks),
                Operand::List(incoming_values),
            ],
        );
    }

    // The slots are dead now: every load and store through them is gone.
    for &slot in slots {
        func.delete_op(slot)?;
    }
    Ok(())
}

/// φ pruning to a fixed point: a φ with no uses is deleted; a φ whose
/// incoming values are all the same value collapses to it.
pub fn prune_phis(func: &mut Function) -> Result<(), IrError> {
    loop {
        let mut changed = false;
        for op in func.op_ids() {
            if !func.op_exists(op) || func.op(op).opcode != Opcode::Phi {
                continue;
            }
            if func.use_count(&Value::Op(op)) == 0 {
                func.delete_op(op)?;
                changed = true;
                continue;
            }
            let values = func.op(op).args()[1].as_list().unwrap_or(&[]).to_vec();
            let Some(first) = values.first() else { continue };
            if values.iter().all(|v| v == first) && first != &Value::Op(op) {
                let target = first.clone();
                func.replace_uses(&Value::Op(op), &target);
                func.delete_op(op)?;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    Ok(())
}

/// T2 structural simplification: a block with a lone `jump` successor
/// that itself has a lone predecessor is merged with it, provided the
/// join keeps the leader prefix intact (no leaders in the successor, no
/// `exc_setup` in either block).
pub fn merge_blocks(func: &mut Function) -> Result<(), IrError> {
    loop {
        let graph = cfg(func);
        let mut merged = false;
        for block in func.block_ids() {
            let succs = graph.successors(block);
            if succs.len() != 1 || succs[0] == block {
                continue;
            }
            let succ = succs[0];
            if graph.predecessors(succ).len() != 1 {
                continue;
            }
            let Some(term) = func.terminator_of(block) else {
                continue;
            };
            if func.op(term).opcode != Opcode::Jump {
                continue;
            }
            if !func.leaders_of(succ).is_empty() {
                continue;
            }
            if func
                .leaders_of(block)
                .iter()
                .any(|&l| func.op(l).opcode == Opcode::ExcSetup)
            {
                continue;
            }

            func.delete_op(term)?;
            for op in func.ops_of(succ) {
                func.unlink(op);
                func.append_op(block, op);
            }
            func.replace_uses(&Value::Block(succ), &Value::Block(block));
            func.del_block(succ)?;
            merged = true;
            break;
        }
        if !merged {
            break;
        }
    }
    Ok(())
}
