//! Runtime-call lowering.
//!
//! Thread and gc ops are assembly-level stand-ins for runtime library
//! entry points. This pass rewrites each of them into a `call` of a
//! module global named after the opcode; the library loader supplies the
//! address. [`declare_runtime_globals`] adds the matching external
//! declarations to the module.

use irkit_core::{Function, GlobalValue, IrError, Module, OpId, Opcode, Operand, Type, Value};

use crate::env::Env;
use crate::error::PassError;

/// Ops lowered into runtime calls.
pub const RUNTIME_OPS: &[Opcode] = &[
    Opcode::ThreadStart,
    Opcode::ThreadJoin,
    Opcode::ThreadpoolStart,
    Opcode::ThreadpoolSubmit,
    Opcode::ThreadpoolJoin,
    Opcode::ThreadpoolClose,
    Opcode::GcGotref,
    Opcode::GcGiveref,
    Opcode::GcIncref,
    Opcode::GcDecref,
    Opcode::GcAlloc,
    Opcode::GcDealloc,
    Opcode::GcCollect,
    Opcode::GcWriteBarrier,
    Opcode::GcReadBarrier,
    Opcode::GcTraverse,
];

pub fn run(func: &mut Function, _module: &Module, _env: &mut Env) -> Result<(), PassError> {
    lower_ops_into_runtime(func, RUNTIME_OPS)?;
    Ok(())
}

/// Rewrites every op whose opcode is listed in `names` into a runtime
/// call, in place.
pub fn lower_ops_into_runtime(func: &mut Function, names: &[Opcode]) -> Result<(), IrError> {
    for op in func.op_ids() {
        if names.contains(&func.op(op).opcode) {
            lower_into_runtime(func, op)?;
        }
    }
    Ok(())
}

/// Rewrites one op into `call(%<opcode>, [args...])`, keeping its result
/// identity. Nested list arguments have no runtime calling convention.
pub fn lower_into_runtime(func: &mut Function, op: OpId) -> Result<(), IrError> {
    let name = func.op(op).opcode.name().to_string();
    let mut flat = Vec::with_capacity(func.op(op).args().len());
    for arg in func.op(op).args() {
        match arg {
            Operand::Value(v) => flat.push(v.clone()),
            Operand::List(_) => {
                return Err(IrError::verify(
                    format!("op %{}", func.op(op).result()),
                    "runtime call with a list argument",
                ))
            }
        }
    }
    let ty = func.op(op).ty.clone();
    func.rewrite(
        op,
        Opcode::Call,
        vec![
            Operand::Value(Value::Global(name)),
            Operand::List(flat),
        ],
        Some(ty),
    );
    Ok(())
}

/// Adds an external declaration for every runtime global referenced by a
/// call and not yet declared. Signatures are derived from the call site;
/// argument types that cannot be derived locally fall back to `opaque`.
pub fn declare_runtime_globals(module: &mut Module) -> Result<(), IrError> {
    let mut decls: Vec<(String, Type)> = Vec::new();
    for func in module.functions() {
        for op in func.op_ids() {
            if func.op(op).opcode != Opcode::Call {
                continue;
            }
            let Some(Value::Global(name)) = func.op(op).args().first().and_then(|a| a.as_value())
            else {
                continue;
            };
            if module.get_global(name).is_some() || decls.iter().any(|(n, _)| n == name) {
                continue;
            }
            let argtypes: Vec<Type> = func.op(op).args()[1]
                .as_list()
                .unwrap_or(&[])
                .iter()
                .map(|v| func.value_type(v).unwrap_or(Type::Opaque))
                .collect();
            let signature = Type::function(func.op(op).ty.clone(), argtypes);
            decls.push((name.clone(), signature));
        }
    }
    for (name, signature) in decls {
        module.add_global(GlobalValue::external(name, signature, None))?;
    }
    Ok(())
}
