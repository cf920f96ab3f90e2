//! Reference interpreter over the typed IR.
//!
//! An oracle for the IR's semantics, used to validate transformations:
//! it walks blocks and ops in list order, honors `phi` by remembering the
//! previously executed block, and models `Undef` as a sentinel that is
//! legal to pass around but illegal to observe.
//!
//! The interpreted subset covers scalars, memory (`alloca`/`load`/
//! `store`), control flow including locally handled exceptions, direct
//! calls, `convert`, and `print` (captured into [`Interpreter::output`]).
//! Containers, threads, and gc ops are representable IR but trap with
//! [`RuntimeError::Unsupported`].

pub mod error;
pub mod value;

pub use error::RuntimeError;
pub use value::Value;

use std::collections::HashMap;

use irkit_core::{BlockId, ConstValue, Function, Module, OpId, Opcode};

/// Decides whether a handler's exception type catches a thrown exception.
///
/// The default model matches on type-name equality, with `Exception` as
/// the catch-all base.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionModel;

impl ExceptionModel {
    pub fn exc_match(&self, catch_type: &str, thrown: &str) -> bool {
        catch_type == "Exception" || catch_type == thrown
    }
}

/// Convenience entry point: runs `name` and returns its result plus the
/// captured `print` output.
pub fn run_function(
    module: &Module,
    name: &str,
    args: Vec<Value>,
) -> Result<(Value, Vec<String>), RuntimeError> {
    let mut interp = Interpreter::new(module);
    let result = interp.run(name, args)?;
    Ok((result, interp.output))
}

/// The interpreter: module-wide state (memory, output) plus the call
/// stack driven through recursion.
pub struct Interpreter<'m> {
    module: &'m Module,
    /// Lines captured from `print` ops.
    pub output: Vec<String>,
    memory: Vec<Value>,
    max_depth: usize,
    exc_model: ExceptionModel,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m Module) -> Interpreter<'m> {
        Interpreter {
            module,
            output: Vec::new(),
            memory: Vec::new(),
            max_depth: 256,
            exc_model: ExceptionModel,
        }
    }

    pub fn run(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let module = self.module;
        let func = module
            .get_function(name)
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
            })?;
        self.eval_function(func, args, 0)
    }

    fn eval_function(
        &mut self,
        func: &Function,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value, RuntimeError> {
        if depth > self.max_depth {
            return Err(RuntimeError::CallDepthExceeded { depth });
        }
        let mut values: HashMap<OpId, Value> = HashMap::new();
        let mut prev_block: Option<BlockId> = None;
        let mut block = func.startblock().ok_or_else(|| RuntimeError::NoEntryBlock {
            function: func.name().to_string(),
        })?;
        let mut current_exc: Option<String> = None;

        'blocks: loop {
            for op in func.ops_of(block) {
                let operation = func.op(op);
                let opname = || operation.result().to_string();
                let resolve = |values: &HashMap<OpId, Value>, v: &irkit_core::Value| {
                    resolve_value(func, &args, values, v, operation.result())
                };

                match operation.opcode {
                    Opcode::Phi => {
                        let blocks = operation.args()[0].as_list().unwrap_or(&[]);
                        let incoming = operation.args()[1].as_list().unwrap_or(&[]);
                        let Some(prev) = prev_block else {
                            return Err(RuntimeError::PhiMismatch { op: opname() });
                        };
                        let index = blocks
                            .iter()
                            .position(|b| b == &irkit_core::Value::Block(prev))
                            .ok_or_else(|| RuntimeError::PhiMismatch { op: opname() })?;
                        let value = resolve(&values, &incoming[index])?;
                        values.insert(op, value);
                    }
                    Opcode::ExcSetup => {
                        values.insert(op, Value::Void);
                    }
                    Opcode::ExcCatch => {
                        let exc = current_exc.clone().unwrap_or_else(|| "Exception".into());
                        values.insert(op, Value::Exc(exc));
                    }
                    Opcode::Alloca => {
                        self.memory.push(Value::Undef);
                        values.insert(op, Value::Pointer(self.memory.len() - 1));
                    }
                    Opcode::Load => {
                        let ptr = resolve(&values, required(operation.args(), 0, &opname())?)?;
                        let Value::Pointer(slot) = ptr else {
                            return Err(type_mismatch(&opname(), "load expects a pointer"));
                        };
                        let value = self.memory[slot].clone();
                        if value.is_undef() {
                            // A load that returns Undef aborts.
                            return Err(RuntimeError::UndefObserved { op: opname() });
                        }
                        values.insert(op, value);
                    }
                    Opcode::Store => {
                        let value = resolve(&values, required(operation.args(), 0, &opname())?)?;
                        let ptr = resolve(&values, required(operation.args(), 1, &opname())?)?;
                        let Value::Pointer(slot) = ptr else {
                            return Err(type_mismatch(&opname(), "store expects a pointer"));
                        };
                        self.memory[slot] = value;
                    }
                    Opcode::Jump => {
                        let target = operation.args()[0]
                            .as_value()
                            .and_then(irkit_core::Value::as_block)
                            .ok_or_else(|| type_mismatch(&opname(), "jump expects a block"))?;
                        prev_block = Some(block);
                        block = target;
                        continue 'blocks;
                    }
                    Opcode::Cbranch => {
                        let cond =
                            observe(resolve(&values, required(operation.args(), 0, &opname())?)?, &opname())?;
                        let Value::Bool(flag) = cond else {
                            return Err(type_mismatch(&opname(), "branch condition must be bool"));
                        };
                        let target = operation.args()[if flag { 1 } else { 2 }]
                            .as_value()
                            .and_then(irkit_core::Value::as_block)
                            .ok_or_else(|| type_mismatch(&opname(), "cbranch expects blocks"))?;
                        prev_block = Some(block);
                        block = target;
                        continue 'blocks;
                    }
                    Opcode::Ret => {
                        return match operation.args().first() {
                            Some(arg) => {
                                let v = arg.as_value().ok_or_else(|| {
                                    type_mismatch(&opname(), "ret expects a single value")
                                })?;
                                resolve(&values, v)
                            }
                            None => Ok(Value::Void),
                        };
                    }
                    Opcode::ExcThrow => {
                        let exc =
                            observe(resolve(&values, required(operation.args(), 0, &opname())?)?, &opname())?;
                        let Value::Exc(thrown) = exc else {
                            return Err(type_mismatch(&opname(), "exc_throw expects an exception"));
                        };
                        match find_handler(func, block, &self.exc_model, &thrown) {
                            Some(handler) => {
                                current_exc = Some(thrown);
                                prev_block = Some(block);
                                block = handler;
                                continue 'blocks;
                            }
                            None => {
                                return Err(RuntimeError::UncaughtException { exc: thrown })
                            }
                        }
                    }
                    Opcode::Call => {
                        let target = resolve(&values, required(operation.args(), 0, &opname())?)?;
                        let Value::Func(callee) = target else {
                            return Err(type_mismatch(&opname(), "call target must be a function"));
                        };
                        let arg_list = operation.args()[1].as_list().unwrap_or(&[]);
                        let mut call_args = Vec::with_capacity(arg_list.len());
                        for v in arg_list {
                            call_args.push(resolve(&values, v)?);
                        }
                        let module = self.module;
                        let callee_func =
                            module
                                .get_function(&callee)
                                .ok_or(RuntimeError::UnknownFunction {
                                    name: callee.clone(),
                                })?;
                        let result = self.eval_function(callee_func, call_args, depth + 1)?;
                        values.insert(op, result);
                    }
                    Opcode::Print => {
                        let v =
                            observe(resolve(&values, required(operation.args(), 0, &opname())?)?, &opname())?;
                        self.output.push(v.to_string());
                    }
                    Opcode::Convert => {
                        let v =
                            observe(resolve(&values, required(operation.args(), 0, &opname())?)?, &opname())?;
                        values.insert(op, convert(&operation.ty, v, &opname())?);
                    }
                    opcode if is_unary_arith(opcode) => {
                        let v =
                            observe(resolve(&values, required(operation.args(), 0, &opname())?)?, &opname())?;
                        values.insert(op, eval_unary(opcode, v, &opname())?);
                    }
                    opcode if is_binary_arith(opcode) || is_compare(opcode) => {
                        let lhs =
                            observe(resolve(&values, required(operation.args(), 0, &opname())?)?, &opname())?;
                        let rhs =
                            observe(resolve(&values, required(operation.args(), 1, &opname())?)?, &opname())?;
                        values.insert(op, eval_binary(opcode, lhs, rhs, &opname())?);
                    }
                    opcode => {
                        return Err(RuntimeError::Unsupported {
                            opcode: opcode.name(),
                        })
                    }
                }
            }
            return Err(RuntimeError::Internal {
                op: func.block(block).name().to_string(),
                message: "block fell through without a terminator".to_string(),
            });
        }
    }
}

fn required<'a>(
    args: &'a [irkit_core::Operand],
    index: usize,
    op: &str,
) -> Result<&'a irkit_core::Value, RuntimeError> {
    args.get(index)
        .and_then(|a| a.as_value())
        .ok_or_else(|| type_mismatch(op, "missing operand"))
}

fn type_mismatch(op: &str, message: &str) -> RuntimeError {
    RuntimeError::TypeMismatch {
        op: op.to_string(),
        message: message.to_string(),
    }
}

fn observe(value: Value, op: &str) -> Result<Value, RuntimeError> {
    if value.is_undef() {
        Err(RuntimeError::UndefObserved { op: op.to_string() })
    } else {
        Ok(value)
    }
}

fn resolve_value(
    func: &Function,
    args: &[Value],
    values: &HashMap<OpId, Value>,
    value: &irkit_core::Value,
    op: &str,
) -> Result<Value, RuntimeError> {
    match value {
        irkit_core::Value::Arg(id) => Ok(args
            .get(id.index())
            .cloned()
            .unwrap_or(Value::Undef)),
        irkit_core::Value::Op(id) => values.get(id).cloned().ok_or_else(|| RuntimeError::Internal {
            op: op.to_string(),
            message: format!("%{} used before evaluation", func.op(*id).result()),
        }),
        irkit_core::Value::Const(c) => Ok(match &c.value {
            ConstValue::Bool(v) => Value::Bool(*v),
            ConstValue::Int(v) => Value::Int(*v),
            ConstValue::Real(v) => Value::Real(*v),
            ConstValue::Str(s) => Value::Bytes(s.clone()),
            ConstValue::Exc(name) => Value::Exc(name.clone()),
        }),
        irkit_core::Value::Undef(_) => Ok(Value::Undef),
        irkit_core::Value::Func(name) => Ok(Value::Func(name.clone())),
        irkit_core::Value::Global(_) | irkit_core::Value::Block(_) => Err(RuntimeError::Internal {
            op: op.to_string(),
            message: "operand kind is not interpreted as data".to_string(),
        }),
    }
}

/// Walks the throwing block's `exc_setup` leaders for a handler whose
/// `exc_catch` matches the thrown exception.
pub fn find_handler(
    func: &Function,
    block: BlockId,
    model: &ExceptionModel,
    thrown: &str,
) -> Option<BlockId> {
    for leader in func.leaders_of(block) {
        if func.op(leader).opcode != Opcode::ExcSetup {
            continue;
        }
        let handlers = func.op(leader).args()[0].as_list()?.to_vec();
        for handler in handlers.iter().filter_map(irkit_core::Value::as_block) {
            for catch in func.leaders_of(handler) {
                if func.op(catch).opcode != Opcode::ExcCatch {
                    continue;
                }
                let types = func.op(catch).args()[0].as_list().unwrap_or(&[]);
                for ty in types {
                    if let irkit_core::Value::Const(c) = ty {
                        if let ConstValue::Exc(name) = &c.value {
                            if model.exc_match(name, thrown) {
                                return Some(handler);
                            }
                        }
                    }
                }
            }
        }
    }
    None
}

fn is_unary_arith(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Invert | Opcode::Not | Opcode::Uadd | Opcode::Usub
    )
}

fn is_binary_arith(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Add
            | Opcode::Sub
            | Opcode::Mul
            | Opcode::Div
            | Opcode::Mod
            | Opcode::Lshift
            | Opcode::Rshift
            | Opcode::Bitand
            | Opcode::Bitor
            | Opcode::Bitxor
    )
}

fn is_compare(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Opcode::Eq | Opcode::Noteq | Opcode::Lt | Opcode::Lte | Opcode::Gt | Opcode::Gte | Opcode::Is
    )
}

fn eval_unary(opcode: Opcode, v: Value, op: &str) -> Result<Value, RuntimeError> {
    Ok(match (opcode, v) {
        (Opcode::Invert, Value::Int(a)) => Value::Int(!a),
        (Opcode::Not, Value::Bool(a)) => Value::Bool(!a),
        (Opcode::Uadd, v @ (Value::Int(_) | Value::Real(_))) => v,
        (Opcode::Usub, Value::Int(a)) => Value::Int(a.wrapping_neg()),
        (Opcode::Usub, Value::Real(a)) => Value::Real(-a),
        (_, v) => {
            return Err(type_mismatch(
                op,
                &format!("bad operand {} for {}", v.type_name(), opcode.name()),
            ))
        }
    })
}

fn eval_binary(opcode: Opcode, lhs: Value, rhs: Value, op: &str) -> Result<Value, RuntimeError> {
    use Value::{Bool, Int, Real};
    let result = match (opcode, &lhs, &rhs) {
        (Opcode::Add, Int(a), Int(b)) => Int(a.wrapping_add(*b)),
        (Opcode::Sub, Int(a), Int(b)) => Int(a.wrapping_sub(*b)),
        (Opcode::Mul, Int(a), Int(b)) => Int(a.wrapping_mul(*b)),
        (Opcode::Div, Int(a), Int(b)) => {
            if *b == 0 {
                return Err(RuntimeError::DivideByZero { op: op.to_string() });
            }
            Int(a.wrapping_div(*b))
        }
        (Opcode::Mod, Int(a), Int(b)) => {
            if *b == 0 {
                return Err(RuntimeError::DivideByZero { op: op.to_string() });
            }
            Int(a.wrapping_rem(*b))
        }
        (Opcode::Lshift, Int(a), Int(b)) => Int(a.wrapping_shl(*b as u32)),
        (Opcode::Rshift, Int(a), Int(b)) => Int(a.wrapping_shr(*b as u32)),
        (Opcode::Bitand, Int(a), Int(b)) => Int(a & b),
        (Opcode::Bitor, Int(a), Int(b)) => Int(a | b),
        (Opcode::Bitxor, Int(a), Int(b)) => Int(a ^ b),
        (Opcode::Bitand, Bool(a), Bool(b)) => Bool(*a && *b),
        (Opcode::Bitor, Bool(a), Bool(b)) => Bool(*a || *b),

        (Opcode::Add, Real(a), Real(b)) => Real(a + b),
        (Opcode::Sub, Real(a), Real(b)) => Real(a - b),
        (Opcode::Mul, Real(a), Real(b)) => Real(a * b),
        (Opcode::Div, Real(a), Real(b)) => Real(a / b),
        (Opcode::Mod, Real(a), Real(b)) => Real(a % b),

        (Opcode::Eq, a, b) => Bool(a == b),
        (Opcode::Noteq, a, b) => Bool(a != b),
        (Opcode::Is, a, b) => Bool(a == b),
        (Opcode::Lt, Int(a), Int(b)) => Bool(a < b),
        (Opcode::Lte, Int(a), Int(b)) => Bool(a <= b),
        (Opcode::Gt, Int(a), Int(b)) => Bool(a > b),
        (Opcode::Gte, Int(a), Int(b)) => Bool(a >= b),
        (Opcode::Lt, Real(a), Real(b)) => Bool(a < b),
        (Opcode::Lte, Real(a), Real(b)) => Bool(a <= b),
        (Opcode::Gt, Real(a), Real(b)) => Bool(a > b),
        (Opcode::Gte, Real(a), Real(b)) => Bool(a >= b),

        (_, a, b) => {
            return Err(type_mismatch(
                op,
                &format!(
                    "bad operands {} and {} for {}",
                    a.type_name(),
                    b.type_name(),
                    opcode.name()
                ),
            ))
        }
    };
    Ok(result)
}

fn convert(target: &irkit_core::Type, v: Value, op: &str) -> Result<Value, RuntimeError> {
    use irkit_core::Type;
    let target = target.resolve_typedef();
    let out = match (target, &v) {
        (Type::Int { .. }, Value::Int(a)) => Value::Int(*a),
        (Type::Int { .. }, Value::Real(a)) => Value::Int(*a as i64),
        (Type::Int { .. }, Value::Bool(a)) => Value::Int(*a as i64),
        (Type::Real { .. }, Value::Int(a)) => Value::Real(*a as f64),
        (Type::Real { .. }, Value::Real(a)) => Value::Real(*a),
        (Type::Real { .. }, Value::Bool(a)) => Value::Real(*a as i64 as f64),
        (Type::Bool, Value::Int(a)) => Value::Bool(*a != 0),
        (Type::Bool, Value::Bool(a)) => Value::Bool(*a),
        _ => {
            return Err(type_mismatch(
                op,
                &format!("cannot convert {} to {}", v.type_name(), target),
            ))
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use irkit_core::parse_module;

    #[test]
    fn arithmetic_and_return() {
        let src = "\
function int32 f(int32 %x) {
entry:
    %double = (int32) add(%x, %x)
    %minus = (int32) sub(%double, 3:int32)
    %r = (void) ret(%minus)
}
";
        let module = parse_module(src).unwrap();
        let (result, _) = run_function(&module, "f", vec![Value::Int(10)]).unwrap();
        assert_eq!(result, Value::Int(17));
    }

    #[test]
    fn loop_with_memory_sums() {
        // sum = 0; i = 0; while (i < n) { sum += i; i += 1 } return sum
        let src = "\
function int32 sum(int32 %n) {
entry:
    %sum = (ptr[int32]) alloca()
    %i = (ptr[int32]) alloca()
    %s0 = (void) store(0:int32, %sum)
    %s1 = (void) store(0:int32, %i)
    %j0 = (void) jump(cond)
cond:
    %iv = (int32) load(%i)
    %c = (bool) lt(%iv, %n)
    %b = (void) cbranch(%c, body, exit)
body:
    %sv = (int32) load(%sum)
    %sv2 = (int32) add(%sv, %iv)
    %s2 = (void) store(%sv2, %sum)
    %iv2 = (int32) add(%iv, 1:int32)
    %s3 = (void) store(%iv2, %i)
    %j1 = (void) jump(cond)
exit:
    %res = (int32) load(%sum)
    %r = (void) ret(%res)
}
";
        let module = parse_module(src).unwrap();
        let (result, _) = run_function(&module, "sum", vec![Value::Int(5)]).unwrap();
        assert_eq!(result, Value::Int(10));
    }

    #[test]
    fn phi_selects_by_predecessor() {
        let src = "\
function int32 pick(bool %c) {
entry:
    %b = (void) cbranch(%c, left, right)
left:
    %j1 = (void) jump(join)
right:
    %j2 = (void) jump(join)
join:
    %v = (int32) phi([left, right], [1:int32, 2:int32])
    %r = (void) ret(%v)
}
";
        let module = parse_module(src).unwrap();
        let (t, _) = run_function(&module, "pick", vec![Value::Bool(true)]).unwrap();
        let (f, _) = run_function(&module, "pick", vec![Value::Bool(false)]).unwrap();
        assert_eq!(t, Value::Int(1));
        assert_eq!(f, Value::Int(2));
    }

    #[test]
    fn loading_an_uninitialized_slot_aborts() {
        let src = "\
function int32 f() {
entry:
    %p = (ptr[int32]) alloca()
    %v = (int32) load(%p)
    %r = (void) ret(%v)
}
";
        let module = parse_module(src).unwrap();
        assert!(matches!(
            run_function(&module, "f", vec![]),
            Err(RuntimeError::UndefObserved { .. })
        ));
    }

    #[test]
    fn undef_may_flow_but_not_be_observed() {
        let src = "\
function int32 flows() {
entry:
    %r = (void) ret(undef:int32)
}

function int32 observes() {
entry:
    %v = (int32) add(undef:int32, 1:int32)
    %r = (void) ret(%v)
}
";
        let module = parse_module(src).unwrap();
        let (v, _) = run_function(&module, "flows", vec![]).unwrap();
        assert_eq!(v, Value::Undef);
        assert!(matches!(
            run_function(&module, "observes", vec![]),
            Err(RuntimeError::UndefObserved { .. })
        ));
    }

    #[test]
    fn direct_calls_and_print() {
        let src = "\
function int32 square(int32 %x) {
entry:
    %sq = (int32) mul(%x, %x)
    %r = (void) ret(%sq)
}

function int32 main() {
entry:
    %v = (int32) call(square, [7:int32])
    %p = (void) print(%v)
    %r = (void) ret(%v)
}
";
        let module = parse_module(src).unwrap();
        let (result, output) = run_function(&module, "main", vec![]).unwrap();
        assert_eq!(result, Value::Int(49));
        assert_eq!(output, vec!["49".to_string()]);
    }

    #[test]
    fn locally_handled_exception_jumps_to_handler() {
        let src = "\
function int32 f() {
entry:
    %s = (opaque) exc_setup([handler])
    %t = (void) exc_throw(StopIteration:exception)
handler:
    %c = (exception) exc_catch([Exception:exception])
    %r = (void) ret(42:int32)
}
";
        let module = parse_module(src).unwrap();
        let (result, _) = run_function(&module, "f", vec![]).unwrap();
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn unhandled_exception_traps() {
        let src = "\
function int32 f() {
entry:
    %t = (void) exc_throw(ValueError:exception)
}
";
        let module = parse_module(src).unwrap();
        match run_function(&module, "f", vec![]) {
            Err(RuntimeError::UncaughtException { exc }) => assert_eq!(exc, "ValueError"),
            other => panic!("expected UncaughtException, got {:?}", other),
        }
    }

    #[test]
    fn division_by_zero_traps() {
        let src = "\
function int32 f(int32 %x) {
entry:
    %v = (int32) div(%x, 0:int32)
    %r = (void) ret(%v)
}
";
        let module = parse_module(src).unwrap();
        assert!(matches!(
            run_function(&module, "f", vec![Value::Int(1)]),
            Err(RuntimeError::DivideByZero { .. })
        ));
    }
}
