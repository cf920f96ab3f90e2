//! Local exception resolution.
//!
//! An `exc_throw` of a constant exception type whose own block sets up a
//! matching handler never needs to unwind: it is rewritten into a plain
//! `jump` to the handler block. The handler match walks the block's
//! `exc_setup` leaders and compares each handler's `exc_catch` types
//! through the exception model.

use irkit_core::{ConstValue, Function, IrError, Module, Opcode, Operand, Value};

use irkit_analysis::interp::{find_handler, ExceptionModel};

use crate::env::Env;
use crate::error::PassError;

pub fn run(func: &mut Function, _module: &Module, _env: &mut Env) -> Result<(), PassError> {
    rewrite_local_throws(func, &ExceptionModel)?;
    Ok(())
}

/// Rewrites every locally-caught constant `exc_throw` into a `jump`.
pub fn rewrite_local_throws(
    func: &mut Function,
    model: &ExceptionModel,
) -> Result<(), IrError> {
    for op in func.op_ids() {
        if func.op(op).opcode != Opcode::ExcThrow {
            continue;
        }
        let thrown = match func.op(op).args().first().and_then(|a| a.as_value()) {
            Some(Value::Const(c)) => match &c.value {
                ConstValue::Exc(name) => name.clone(),
                _ => continue,
            },
            _ => continue,
        };
        let block = func
            .op(op)
            .block()
            .ok_or_else(|| IrError::verify("local_exceptions", "throw op is detached"))?;
        if let Some(handler) = find_handler(func, block, model, &thrown) {
            func.rewrite(
                op,
                Opcode::Jump,
                vec![Operand::Value(Value::Block(handler))],
                None,
            );
        }
    }
    Ok(())
}
