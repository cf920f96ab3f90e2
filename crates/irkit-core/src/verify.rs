//! Structural IR verification.
//!
//! Checks every invariant of the data model: name uniqueness, terminator
//! placement, the contiguous leader prefix, argument resolution, φ shape
//! against CFG predecessors, and def/use index consistency. The SSA
//! dominance check lives with the dominator analysis; `verify_lowlevel`
//! adds the back-end subset restrictions.

use std::collections::{HashMap, HashSet};

use crate::error::IrError;
use crate::function::Function;
use crate::id::{BlockId, OpId};
use crate::module::Module;
use crate::opcode::Opcode;
use crate::value::Value;

fn location(func: &Function, block: BlockId, op: Option<OpId>) -> String {
    match op {
        Some(op) => format!(
            "function {}, block {}, op %{}",
            func.name(),
            func.block(block).name(),
            func.op(op).result()
        ),
        None => format!("function {}, block {}", func.name(), func.block(block).name()),
    }
}

/// Verifies every function and global of a module.
pub fn verify_module(module: &Module) -> Result<(), IrError> {
    for func in module.functions() {
        verify_function(func)?;
    }
    Ok(())
}

/// Verifies the structural invariants of one function.
pub fn verify_function(func: &Function) -> Result<(), IrError> {
    let blocks = func.block_ids();

    // Uniqueness of block labels and result names is enforced by the
    // arenas' name maps; still cross-check the maps against the lists.
    let mut seen_results = HashSet::new();
    for &block in &blocks {
        if func.find_block(func.block(block).name()) != Some(block) {
            return Err(IrError::verify(
                location(func, block, None),
                "block label does not resolve to this block",
            ));
        }
        for op in func.ops_of(block) {
            if !seen_results.insert(func.op(op).result().to_string()) {
                return Err(IrError::verify(
                    location(func, block, Some(op)),
                    "duplicate result name",
                ));
            }
            if func.result_op(func.op(op).result()) != Some(op) {
                return Err(IrError::verify(
                    location(func, block, Some(op)),
                    "result name does not resolve to this op",
                ));
            }
        }
    }

    for &block in &blocks {
        verify_block(func, block)?;
    }

    // φ predecessor sets must equal the CFG predecessors.
    let preds = predecessor_map(func);
    for &block in &blocks {
        for op in func.ops_of(block) {
            if func.op(op).opcode == Opcode::Phi {
                verify_phi(func, block, op, preds.get(&block).map_or(&[], |v| v.as_slice()))?;
            }
        }
    }

    // The def/use index is the single source of truth; it must agree with
    // a recomputation at every quiescent point.
    if let Err((value, message)) = func.uses_consistent() {
        return Err(IrError::verify(
            format!("function {}, value {}", func.name(), value),
            message,
        ));
    }

    Ok(())
}

fn verify_block(func: &Function, block: BlockId) -> Result<(), IrError> {
    let ops = func.ops_of(block);

    let Some(&last) = ops.last() else {
        return Err(IrError::verify(
            location(func, block, None),
            "block has no terminator",
        ));
    };
    if !func.op(last).is_terminator() {
        return Err(IrError::verify(
            location(func, block, Some(last)),
            "block does not end in a terminator",
        ));
    }
    for &op in &ops[..ops.len() - 1] {
        if func.op(op).is_terminator() {
            return Err(IrError::verify(
                location(func, block, Some(op)),
                "terminator before the end of the block",
            ));
        }
    }

    // Leaders form a contiguous prefix, in declared order.
    let mut past_leaders = false;
    let mut last_order = 0u8;
    for &op in &ops {
        match func.op(op).opcode.leader_order() {
            Some(order) => {
                if past_leaders {
                    return Err(IrError::verify(
                        location(func, block, Some(op)),
                        "leader op after non-leader ops",
                    ));
                }
                if order < last_order {
                    return Err(IrError::verify(
                        location(func, block, Some(op)),
                        "leader ops out of declared order",
                    ));
                }
                last_order = order;
            }
            None => past_leaders = true,
        }
    }

    // Every op arg must resolve within this function.
    for &op in &ops {
        if !func.args_resolve(op) {
            return Err(IrError::verify(
                location(func, block, Some(op)),
                "op argument does not resolve in this function",
            ));
        }
        for arg in func.op(op).args() {
            for value in arg.values() {
                if let Value::Op(id) = value {
                    if func.op(*id).block().is_none() {
                        return Err(IrError::verify(
                            location(func, block, Some(op)),
                            "op argument references a detached op",
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

fn verify_phi(
    func: &Function,
    block: BlockId,
    op: OpId,
    preds: &[BlockId],
) -> Result<(), IrError> {
    let args = func.op(op).args();
    let (blocks, values) = match (args.first().and_then(|a| a.as_list()), args.get(1).and_then(|a| a.as_list())) {
        (Some(b), Some(v)) if args.len() == 2 => (b, v),
        _ => {
            return Err(IrError::verify(
                location(func, block, Some(op)),
                "phi args must be two parallel lists",
            ))
        }
    };
    if blocks.len() != values.len() {
        return Err(IrError::verify(
            location(func, block, Some(op)),
            "phi lists have different lengths",
        ));
    }
    let incoming: HashSet<BlockId> = blocks.iter().filter_map(Value::as_block).collect();
    if incoming.len() != blocks.len() {
        return Err(IrError::verify(
            location(func, block, Some(op)),
            "phi predecessor entries are not distinct blocks",
        ));
    }
    let expected: HashSet<BlockId> = preds.iter().copied().collect();
    if incoming != expected {
        return Err(IrError::verify(
            location(func, block, Some(op)),
            "phi predecessors do not match the CFG predecessors",
        ));
    }
    Ok(())
}

/// Predecessors of every block, from terminator targets.
pub fn predecessor_map(func: &Function) -> HashMap<BlockId, Vec<BlockId>> {
    let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for block in func.block_ids() {
        for target in func.terminator_targets(block) {
            let entry = preds.entry(target).or_default();
            if !entry.contains(&block) {
                entry.push(block);
            }
        }
    }
    preds
}

/// Stack slots whose every use is a `load` from them or a `store`
/// through them as the pointer operand, in first-appearance order.
/// These are exactly the slots SSA construction promotes; their
/// presence disqualifies a function from low-level form.
pub fn promotable_slots(func: &Function) -> Vec<crate::id::OpId> {
    let mut out = Vec::new();
    for op in func.op_ids() {
        if func.op(op).opcode != Opcode::Alloca {
            continue;
        }
        let slot = Value::Op(op);
        let promotable = func.uses(&slot).into_iter().all(|user| {
            let operation = func.op(user);
            match operation.opcode {
                Opcode::Load => true,
                Opcode::Store => {
                    operation.args()[1].as_value() == Some(&slot)
                        && operation.args()[0].as_value() != Some(&slot)
                }
                _ => false,
            }
        });
        if promotable {
            out.push(op);
        }
    }
    out
}

/// Verifies the low-level subset: every opcode and every type must be
/// legal in fully lowered form, and no promotable stack slot remains.
pub fn verify_lowlevel(func: &Function) -> Result<(), IrError> {
    verify_function(func)?;
    if let Some(&slot) = promotable_slots(func).first() {
        let block = func.op(slot).block().expect("verified ops are attached");
        return Err(IrError::verify(
            location(func, block, Some(slot)),
            "promotable stack slot in low-level form",
        ));
    }
    if !func.ty().is_lowlevel() {
        return Err(IrError::verify(
            format!("function {}", func.name()),
            "function signature uses a non-low-level type",
        ));
    }
    for block in func.block_ids() {
        for op in func.ops_of(block) {
            let operation = func.op(op);
            if !operation.opcode.is_lowlevel() {
                return Err(IrError::verify(
                    location(func, block, Some(op)),
                    format!("opcode '{}' is not low-level", operation.opcode.name()),
                ));
            }
            if !operation.ty.is_lowlevel() {
                return Err(IrError::verify(
                    location(func, block, Some(op)),
                    format!("type '{}' is not low-level", operation.ty),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::types::Type;
    use crate::value::{Constant, Operand};

    fn void_func() -> Function {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        f.add_block("entry");
        f
    }

    #[test]
    fn valid_single_block_function() {
        let mut f = void_func();
        let entry = f.startblock().unwrap();
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.ret(None).unwrap();
        verify_function(&f).unwrap();
    }

    #[test]
    fn missing_terminator_is_rejected() {
        let mut f = void_func();
        let entry = f.startblock().unwrap();
        let op = f.new_op(Opcode::Alloca, Type::pointer(Type::int32()), vec![], None);
        f.append_op(entry, op);
        let err = verify_function(&f).unwrap_err();
        assert!(err.to_string().contains("terminator"));
    }

    #[test]
    fn terminator_in_the_middle_is_rejected() {
        let mut f = void_func();
        let entry = f.startblock().unwrap();
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.ret(None).unwrap();
        b.ret(None).unwrap();
        let err = verify_function(&f).unwrap_err();
        assert!(err.to_string().contains("terminator"));
    }

    #[test]
    fn leader_after_body_is_rejected() {
        let mut f = void_func();
        let entry = f.startblock().unwrap();
        let exit = f.add_block("exit");

        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let slot = b.alloca(Type::pointer(Type::int32())).unwrap();
        // A phi after a non-leader op violates the leader prefix.
        b.phi(Type::int32(), vec![], vec![]).unwrap();
        b.jump(exit).unwrap();
        b.at_end(exit, |b| b.ret(None)).unwrap();
        let _ = slot;

        let err = verify_function(&f).unwrap_err();
        assert!(err.to_string().contains("leader"));
    }

    #[test]
    fn phi_preds_must_match_cfg() {
        let mut f = void_func();
        let entry = f.startblock().unwrap();
        let left = f.add_block("left");
        let right = f.add_block("right");
        let join = f.add_block("join");

        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let c = Value::Const(Constant::bool(true));
        b.cbranch(c, left, right).unwrap();
        b.at_end(left, |b| b.jump(join)).unwrap();
        b.at_end(right, |b| b.jump(join)).unwrap();
        b.at_end(join, |b| -> Result<(), IrError> {
            let one = Value::Const(Constant::int(1, Type::int32()));
            let two = Value::Const(Constant::int(2, Type::int32()));
            // Deliberately wrong: only one incoming entry.
            let phi = b.phi(Type::int32(), vec![left], vec![one.clone()])?;
            b.ret(None)?;
            let _ = (phi, two);
            Ok(())
        })
        .unwrap();

        let err = verify_function(&f).unwrap_err();
        assert!(err.to_string().contains("phi"));

        // Fix the phi and the function verifies.
        let join_ops = f.ops_of(join);
        let phi = join_ops[0];
        f.set_args(
            phi,
            vec![
                Operand::List(vec![Value::Block(left), Value::Block(right)]),
                Operand::List(vec![
                    Value::Const(Constant::int(1, Type::int32())),
                    Value::Const(Constant::int(2, Type::int32())),
                ]),
            ],
        );
        verify_function(&f).unwrap();
    }

    #[test]
    fn lowlevel_rejects_container_ops_and_types() {
        let mut f = void_func();
        let entry = f.startblock().unwrap();
        let list_ty = Type::List {
            base: Box::new(Type::int32()),
            count: -1,
        };
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.emit(Opcode::NewList, list_ty, vec![Operand::List(vec![])])
            .unwrap();
        b.ret(None).unwrap();

        verify_function(&f).unwrap();
        let err = verify_lowlevel(&f).unwrap_err();
        assert!(err.to_string().contains("low-level"));
    }

    #[test]
    fn lowlevel_rejects_promotable_slots() {
        let mut f = void_func();
        let entry = f.startblock().unwrap();
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let slot = b.alloca(Type::pointer(Type::int32())).unwrap();
        b.store(
            Value::Const(Constant::int(1, Type::int32())),
            Value::Op(slot),
        )
        .unwrap();
        b.ret(None).unwrap();

        verify_function(&f).unwrap();
        let err = verify_lowlevel(&f).unwrap_err();
        assert!(err.to_string().contains("promotable"));
        assert_eq!(promotable_slots(&f), vec![slot]);
    }
}
