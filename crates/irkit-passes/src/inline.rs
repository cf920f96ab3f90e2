//! Function inlining.
//!
//! Splits the caller at the call site, reproduces a return-normalized
//! copy of the callee between the two halves (fresh names from the
//! caller's temper, arguments substituted), and replaces the call's
//! value with the callee's single return value. Generator-shaped callees
//! (containing `yieldval`) are refused unless the call is consumed by
//! the `getiter`/`next` pair of one loop.

use irkit_core::{
    copy_function, graft_function, Builder, Function, Module, OpId, Opcode, Value,
};

use irkit_analysis::{cfg, compute_dominators, find_natural_loops, flat_loops};

use crate::env::Env;
use crate::error::PassError;
use crate::ret;

/// Pipeline entry point: inlines every call to a known module function.
/// Call sites that cannot be inlined are left as they are.
pub fn run(func: &mut Function, module: &Module, _env: &mut Env) -> Result<(), PassError> {
    for op in func.op_ids() {
        if !func.op_exists(op) || func.op(op).opcode != Opcode::Call {
            continue;
        }
        let callee = match func.op(op).args().first().and_then(|a| a.as_value()) {
            Some(Value::Func(name)) => name.clone(),
            _ => continue,
        };
        if module.get_function(&callee).is_none() {
            continue;
        }
        if assert_inlinable(func, op, module).is_err() {
            continue;
        }
        inline(func, op, module)?;
    }
    Ok(())
}

/// Verifies that `call` may be inlined into `func`.
pub fn assert_inlinable(func: &Function, call: OpId, module: &Module) -> Result<(), PassError> {
    let not_inlinable = |reason: &str| PassError::NotInlinable {
        call: func.op(call).result().to_string(),
        reason: reason.to_string(),
    };
    let callee_name = match func.op(call).args().first().and_then(|a| a.as_value()) {
        Some(Value::Func(name)) => name.clone(),
        _ => return Err(not_inlinable("call target is not a known function")),
    };
    if callee_name == func.name() {
        return Err(not_inlinable("recursive call"));
    }
    let callee = module
        .get_function(&callee_name)
        .ok_or_else(|| not_inlinable("callee is external"))?;
    if callee.startblock().is_none() {
        return Err(not_inlinable("callee has no body"));
    }

    let is_generator = callee
        .op_ids()
        .into_iter()
        .any(|op| callee.op(op).opcode == Opcode::Yieldval);
    if !is_generator {
        return Ok(());
    }

    // A generator may only be inlined when it is consumed by exactly one
    // getiter/next pair sitting in a loop's header and body.
    let uses = func.uses(&Value::Op(call));
    if uses.len() != 2 {
        return Err(not_inlinable("generator call has more than an iter/next use"));
    }
    let mut getiter = None;
    let mut next = None;
    for &user in &uses {
        match func.op(user).opcode {
            Opcode::Getiter => getiter = Some(user),
            Opcode::Next => next = Some(user),
            _ => return Err(not_inlinable("generator call has a non-iteration use")),
        }
    }
    let (Some(getiter), Some(next)) = (getiter, next) else {
        return Err(not_inlinable("generator call needs one getiter and one next"));
    };

    let graph = cfg(func);
    let doms = compute_dominators(func, &graph);
    let forest = find_natural_loops(func, &graph, &doms).map_err(PassError::Analysis)?;
    let iter_block = func.op(getiter).block();
    let next_block = func.op(next).block();
    let consumed_in_one_loop = flat_loops(&forest).into_iter().any(|l| {
        iter_block.is_some_and(|b| graph.successors(b).contains(&l.head) || b == l.head)
            && next_block.is_some_and(|b| l.contains(b))
    });
    if !consumed_in_one_loop {
        return Err(not_inlinable(
            "generator is not consumed by a single loop's iter/next pair",
        ));
    }
    Ok(())
}

/// Inlines one call op into `func`.
pub fn inline(func: &mut Function, call: OpId, module: &Module) -> Result<(), PassError> {
    assert_inlinable(func, call, module)?;
    let callee_name = match func.op(call).args().first().and_then(|a| a.as_value()) {
        Some(Value::Func(name)) => name.clone(),
        _ => unreachable!("checked by assert_inlinable"),
    };
    let callee = module
        .get_function(&callee_name)
        .expect("checked by assert_inlinable");
    let call_args: Vec<Value> = func.op(call).args()[1]
        .as_list()
        .unwrap_or(&[])
        .to_vec();

    // Normalize a private copy of the callee so its exit produces a
    // single value, then strip the ret itself.
    let mut body = copy_function(callee);
    let ret_op = ret::normalize(&mut body)?;
    let result_value = body
        .op(ret_op)
        .args()
        .first()
        .and_then(|a| a.as_value())
        .cloned();
    body.delete_op(ret_op)?;

    // Split the caller at the call: the call and everything after it move
    // to the continuation block.
    let mut b = Builder::new(func);
    b.position_before(call);
    let (header, continuation) = b.splitblock(Some("inline.exit"), false)?;

    // Reproduce the callee between the two halves.
    let map = graft_function(func, &body, &call_args);
    let body_entry = map.blocks[&body.startblock().expect("callee has a body")];
    let body_exit = map.blocks[&body.exitblock().expect("callee has a body")];
    let mut previous = header;
    for src_block in body.block_ids() {
        let grafted = map.blocks[&src_block];
        func.move_block_after(grafted, previous);
        previous = grafted;
    }

    // Wire the halves through the grafted body.
    let mut b = Builder::new(func);
    b.at_end(header, |b| b.jump(body_entry))?;
    b.at_end(body_exit, |b| b.jump(continuation))?;

    // The call's value is the callee's single return value.
    match result_value {
        Some(value) => {
            let replacement = match value {
                Value::Op(id) => Value::Op(map.ops[&id]),
                other => other,
            };
            func.replace_uses(&Value::Op(call), &replacement);
        }
        None => {}
    }
    func.delete_op(call)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use irkit_core::{parse_module, verify::verify_function};
    use irkit_analysis::interp::{run_function, Value as RValue};

    #[test]
    fn inlined_square_computes_the_same_result() {
        let src = "\
function int32 callee(int32 %i) {
entry:
    %sq = (int32) mul(%i, %i)
    %r = (void) ret(%sq)
}

function int32 caller(int32 %i) {
entry:
    %x = (int32) call(callee, [%i])
    %r = (void) ret(%x)
}
";
        let mut module = parse_module(src).unwrap();
        let mut caller = module.take_function("caller").unwrap();
        let call = caller
            .op_ids()
            .into_iter()
            .find(|&op| caller.op(op).opcode == Opcode::Call)
            .unwrap();
        inline(&mut caller, call, &module).unwrap();
        verify_function(&caller).unwrap();

        // No call remains.
        for op in caller.op_ids() {
            assert_ne!(caller.op(op).opcode, Opcode::Call);
        }
        module.put_function(caller);
        let (v, _) = run_function(&module, "caller", vec![RValue::Int(10)]).unwrap();
        assert_eq!(v, RValue::Int(100));
    }

    #[test]
    fn void_callee_call_is_deleted() {
        let src = "\
function void callee(int32 %x) {
entry:
    %p = (void) print(%x)
    %r = (void) ret()
}

function int32 caller(int32 %x) {
entry:
    %c = (void) call(callee, [%x])
    %r = (void) ret(%x)
}
";
        let mut module = parse_module(src).unwrap();
        let mut caller = module.take_function("caller").unwrap();
        let call = caller
            .op_ids()
            .into_iter()
            .find(|&op| caller.op(op).opcode == Opcode::Call)
            .unwrap();
        inline(&mut caller, call, &module).unwrap();
        verify_function(&caller).unwrap();
        module.put_function(caller);

        let (v, output) = run_function(&module, "caller", vec![RValue::Int(5)]).unwrap();
        assert_eq!(v, RValue::Int(5));
        assert_eq!(output, vec!["5".to_string()]);
    }

    #[test]
    fn recursive_calls_are_refused() {
        let src = "\
function int32 f(int32 %x) {
entry:
    %v = (int32) call(f, [%x])
    %r = (void) ret(%v)
}
";
        let mut module = parse_module(src).unwrap();
        let func = module.get_function("f").unwrap();
        let call = func
            .op_ids()
            .into_iter()
            .find(|&op| func.op(op).opcode == Opcode::Call)
            .unwrap();
        assert!(matches!(
            assert_inlinable(func, call, &module),
            Err(PassError::NotInlinable { .. })
        ));
    }

    #[test]
    fn generators_are_refused_outside_iteration() {
        let src = "\
function int32 gen() {
entry:
    %y = (int32) yieldval(1:int32)
    %r = (void) ret(%y)
}

function int32 caller() {
entry:
    %g = (int32) call(gen, [])
    %r = (void) ret(%g)
}
";
        let module = parse_module(src).unwrap();
        let caller = module.get_function("caller").unwrap();
        let call = caller
            .op_ids()
            .into_iter()
            .find(|&op| caller.op(op).opcode == Opcode::Call)
            .unwrap();
        assert!(matches!(
            assert_inlinable(caller, call, &module),
            Err(PassError::NotInlinable { .. })
        ));
    }

    #[test]
    fn inline_pass_handles_nested_calls() {
        let src = "\
function int32 addone(int32 %x) {
entry:
    %v = (int32) add(%x, 1:int32)
    %r = (void) ret(%v)
}

function int32 caller(int32 %x) {
entry:
    %a = (int32) call(addone, [%x])
    %b = (int32) call(addone, [%a])
    %r = (void) ret(%b)
}
";
        let mut module = parse_module(src).unwrap();
        let mut caller = module.take_function("caller").unwrap();
        let mut env = crate::env::fresh_env();
        run(&mut caller, &module, &mut env).unwrap();
        verify_function(&caller).unwrap();
        module.put_function(caller);

        let (v, _) = run_function(&module, "caller", vec![RValue::Int(40)]).unwrap();
        assert_eq!(v, RValue::Int(42));
    }
}
