//! Dead code elimination.
//!
//! Deletes ops that are side-effect free (the pure set of the opcode
//! catalogue) and unused, iterating to a fixed point so chains of dead
//! ops unravel. Stores, calls, terminators, `print`, and `exc_throw`
//! are never candidates.

use irkit_core::{Function, IrError, Module, Value};

use crate::env::Env;
use crate::error::PassError;

pub fn run(func: &mut Function, _module: &Module, _env: &mut Env) -> Result<(), PassError> {
    dce(func)?;
    Ok(())
}

/// Deletes dead pure ops until none remain.
pub fn dce(func: &mut Function) -> Result<(), IrError> {
    loop {
        let mut changed = false;
        for op in func.op_ids() {
            if !func.op_exists(op) {
                continue;
            }
            if func.op(op).opcode.is_pure() && func.use_count(&Value::Op(op)) == 0 {
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
