//! Return normalization.
//!
//! Gives a function exactly one `ret`, in a dedicated return block at
//! the tail: a return slot is allocated in the entry block (skipped for
//! `void`), every `ret v` becomes `store v; jump return_block`, and the
//! return block loads the slot and returns it. Precondition for dead
//! code elimination and inlining.

use irkit_core::{Builder, Function, IrError, Module, OpId, Opcode, Type, Value};

use crate::env::Env;
use crate::error::PassError;

pub fn run(func: &mut Function, _module: &Module, _env: &mut Env) -> Result<(), PassError> {
    normalize(func)?;
    Ok(())
}

/// Rewrites every return into a jump to a single return block. Returns
/// the new return block's single `ret` op.
pub fn normalize(func: &mut Function) -> Result<OpId, IrError> {
    let restype = func.restype().clone();
    let entry = func
        .startblock()
        .ok_or_else(|| IrError::verify("ret", "function has no entry block"))?;
    let return_block = func.add_block("irkit.return");

    let return_var = if restype.is_void() {
        None
    } else {
        let mut b = Builder::new(func);
        let var = b.at_front(entry, |b| -> Result<OpId, IrError> {
            let var = b.alloca(Type::pointer(restype.clone()))?;
            b.store(Value::Undef(restype.clone()), Value::Op(var))?;
            Ok(var)
        })?;
        Some(var)
    };

    for op in func.op_ids() {
        if func.op(op).opcode != Opcode::Ret {
            continue;
        }
        let value = func
            .op(op)
            .args()
            .first()
            .and_then(|a| a.as_value())
            .cloned();
        let mut b = Builder::new(func);
        b.position_after(op);
        if let Some(var) = return_var {
            let v = value.unwrap_or(Value::Undef(restype.clone()));
            b.store(v, Value::Op(var))?;
        }
        b.jump(return_block)?;
        func.delete_op(op)?;
    }

    let mut b = Builder::new(func);
    b.position_at_end(return_block);
    let ret = match return_var {
        Some(var) => {
            let value = b.load(restype.clone(), Value::Op(var))?;
            b.ret(Some(Value::Op(value)))?
        }
        None => b.ret(None)?,
    };
    Ok(ret)
}
