//! Error-check lowering.
//!
//! Expands each `check_error(result, badval)` into the C-style shape
//!
//! ```text
//! if (result == badval)
//!     return <undef>;   // propagate to the caller
//! ```
//!
//! The thread-local exception state was already filled by whoever
//! produced the bad value, so propagation is a plain early return.

use irkit_core::{Builder, Function, IrError, Module, Opcode, Value};

use crate::env::Env;
use crate::error::PassError;

pub fn run(func: &mut Function, _module: &Module, _env: &mut Env) -> Result<(), PassError> {
    lower_costful(func)?;
    Ok(())
}

/// Lowers every `check_error` with explicit compare-and-return checks.
pub fn lower_costful(func: &mut Function) -> Result<(), IrError> {
    let restype = func.restype().clone();
    for op in func.op_ids() {
        if func.op(op).opcode != Opcode::CheckError {
            continue;
        }
        let args = func.op(op).args();
        let (result, badval) = match (
            args.first().and_then(|a| a.as_value()),
            args.get(1).and_then(|a| a.as_value()),
        ) {
            (Some(r), Some(b)) => (r.clone(), b.clone()),
            _ => {
                return Err(IrError::verify(
                    format!("op %{}", func.op(op).result()),
                    "check_error expects a result and a bad value",
                ))
            }
        };

        let mut b = Builder::new(func);
        b.position_after(op);
        let cond = b.eq(result, badval)?;
        let blocks = b.if_(Value::Op(cond))?;
        b.at_end(blocks.then_block, |b| -> Result<(), IrError> {
            if restype.is_void() {
                b.ret(None)?;
            } else {
                b.ret(Some(Value::Undef(restype.clone())))?;
            }
            Ok(())
        })?;
        func.delete_op(op)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower_calls;
    use irkit_core::{parse_module, verify::verify_function, ConstValue};

    #[test]
    fn check_error_becomes_a_compare_and_return() {
        let mut module = parse_module(
            "\
function int32 risky(int32 %x) {
entry:
    %r = (void) ret(-1:int32)
}

function int32 f(int32 %x) {
entry:
    %v = (int32) call(risky, [%x])
    %out = (int32) add(%v, 1:int32)
    %r = (void) ret(%out)
}
",
        )
        .unwrap();
        let func = module.get_function_mut("f").unwrap();
        let call = func
            .op_ids()
            .into_iter()
            .find(|&op| func.op(op).opcode == Opcode::Call)
            .unwrap();
        func.op_mut(call)
            .metadata
            .insert("exc.badval".into(), ConstValue::Int(-1));

        lower_calls::insert_exception_checks(func).unwrap();
        lower_costful(func).unwrap();
        verify_function(func).unwrap();

        // No check_error remains; the entry now branches on the compare.
        for op in func.op_ids() {
            assert_ne!(func.op(op).opcode, Opcode::CheckError);
        }
        let entry = func.startblock().unwrap();
        let term = func.terminator_of(entry).unwrap();
        assert_eq!(func.op(term).opcode, Opcode::Cbranch);

        // Two rets now: the propagation and the original.
        let rets = func
            .op_ids()
            .into_iter()
            .filter(|&op| func.op(op).opcode == Opcode::Ret)
            .count();
        assert_eq!(rets, 2);
    }

    #[test]
    fn functions_without_checks_are_untouched() {
        let mut module = parse_module(
            "\
function int32 f(int32 %x) {
entry:
    %out = (int32) add(%x, 1:int32)
    %r = (void) ret(%out)
}
",
        )
        .unwrap();
        let func = module.get_function_mut("f").unwrap();
        lower_costful(func).unwrap();
        assert_eq!(func.block_ids().len(), 1);
    }
}
