//! Call lowering: exception checking.
//!
//! Front-ends annotate calls that can fail with metadata:
//!
//! - `exc.badval`: the sentinel result that signals an error;
//! - `exc.raise`: the exception type to raise on the sentinel;
//! - `exc.msg`: an optional message for the raised exception.
//!
//! With `exc.raise`, the call grows a compare-and-throw sequence; with
//! only `exc.badval`, a `check_error` op is inserted for a later lowering
//! to resolve.

use irkit_core::{
    Builder, ConstValue, Constant, Function, IrError, Module, OpId, Opcode, Operand, Type, Value,
};

use crate::env::Env;
use crate::error::PassError;

pub fn run(func: &mut Function, _module: &Module, _env: &mut Env) -> Result<(), PassError> {
    insert_exception_checks(func)?;
    Ok(())
}

/// Expands the `exc.*` metadata of every call into explicit checks.
pub fn insert_exception_checks(func: &mut Function) -> Result<(), IrError> {
    for op in func.op_ids() {
        if func.op(op).opcode != Opcode::Call {
            continue;
        }
        let badval = func.op(op).metadata.get("exc.badval").cloned();
        let raise = match func.op(op).metadata.get("exc.raise") {
            Some(ConstValue::Exc(name)) => Some(name.clone()),
            _ => None,
        };
        match (raise, badval) {
            (Some(exc), Some(badval)) => insert_raise(func, op, badval, exc)?,
            (None, Some(badval)) => insert_check(func, op, badval)?,
            _ => {}
        }
    }
    Ok(())
}

fn badval_constant(func: &Function, call: OpId, badval: ConstValue) -> Constant {
    Constant::new(badval, func.op(call).ty.clone())
}

/// `check_error(result, badval)` directly after the call.
fn insert_check(func: &mut Function, call: OpId, badval: ConstValue) -> Result<(), IrError> {
    let badval = badval_constant(func, call, badval);
    let mut b = Builder::new(func);
    b.position_after(call);
    b.emit(
        Opcode::CheckError,
        Type::Void,
        vec![
            Operand::Value(Value::Op(call)),
            Operand::Value(Value::Const(badval)),
        ],
    )?;
    Ok(())
}

/// `if (result == badval) throw new_exc(exc, [msg...])` after the call.
fn insert_raise(
    func: &mut Function,
    call: OpId,
    badval: ConstValue,
    exc: String,
) -> Result<(), IrError> {
    let badval = badval_constant(func, call, badval);
    let msg = match func.op(call).metadata.get("exc.msg") {
        Some(ConstValue::Str(s)) => Some(Constant::new(ConstValue::Str(s.clone()), Type::Bytes)),
        _ => None,
    };
    let mut b = Builder::new(func);
    b.position_after(call);
    let cond = b.eq(Value::Op(call), Value::Const(badval))?;
    let blocks = b.if_(Value::Op(cond))?;
    b.at_end(blocks.then_block, |b| -> Result<(), IrError> {
        let args = match msg {
            Some(msg) => vec![Value::Const(msg)],
            None => vec![],
        };
        let exc_value = b.emit(
            Opcode::NewExc,
            Type::Exception,
            vec![
                Operand::Value(Value::Const(Constant::exception(exc))),
                Operand::List(args),
            ],
        )?;
        b.exc_throw(Value::Op(exc_value))?;
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use irkit_core::{parse_module, verify::verify_function};

    fn call_with_metadata(meta: &[(&str, ConstValue)]) -> irkit_core::Module {
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
        for (key, value) in meta {
            func.op_mut(call).metadata.insert(key.to_string(), value.clone());
        }
        module
    }

    #[test]
    fn badval_metadata_grows_a_check_error() {
        let mut module = call_with_metadata(&[("exc.badval", ConstValue::Int(-1))]);
        let func = module.get_function_mut("f").unwrap();
        insert_exception_checks(func).unwrap();
        verify_function(func).unwrap();

        let entry = func.startblock().unwrap();
        let ops = func.ops_of(entry);
        assert_eq!(func.op(ops[0]).opcode, Opcode::Call);
        assert_eq!(func.op(ops[1]).opcode, Opcode::CheckError);
    }

    #[test]
    fn raise_metadata_grows_a_throw_branch() {
        let mut module = call_with_metadata(&[
            ("exc.badval", ConstValue::Int(-1)),
            ("exc.raise", ConstValue::Exc("ValueError".into())),
            ("exc.msg", ConstValue::Str("risky failed".into())),
        ]);
        let func = module.get_function_mut("f").unwrap();
        insert_exception_checks(func).unwrap();
        verify_function(func).unwrap();

        let throws: Vec<OpId> = func
            .op_ids()
            .into_iter()
            .filter(|&op| func.op(op).opcode == Opcode::ExcThrow)
            .collect();
        assert_eq!(throws.len(), 1);
        let news: Vec<OpId> = func
            .op_ids()
            .into_iter()
            .filter(|&op| func.op(op).opcode == Opcode::NewExc)
            .collect();
        assert_eq!(news.len(), 1);
        // The message rode along as the constructor argument.
        let args = func.op(news[0]).args()[1].as_list().unwrap();
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn unannotated_calls_are_untouched() {
        let mut module = call_with_metadata(&[]);
        let before: Vec<Opcode> = {
            let func = module.get_function("f").unwrap();
            func.op_ids().into_iter().map(|op| func.op(op).opcode).collect()
        };
        let func = module.get_function_mut("f").unwrap();
        insert_exception_checks(func).unwrap();
        let after: Vec<Opcode> = func.op_ids().into_iter().map(|op| func.op(op).opcode).collect();
        assert_eq!(before, after);
    }
}
