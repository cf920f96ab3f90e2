//! Deep copying of functions, with value remapping.
//!
//! Copying is two-pass: every block and op is created first (args empty),
//! then all args are resolved through the id maps and patched in. φs may
//! reference ops that are copied later (or themselves), so a single
//! forward pass cannot fill args as it goes.
//!
//! [`graft_function`] is the same machinery aimed at a *different*
//! destination function: the callee's body is reproduced inside the
//! caller with fresh names from the caller's temper and the callee's
//! arguments substituted by caller values. The inliner builds on it.

use std::collections::HashMap;

use crate::function::Function;
use crate::id::{ArgId, BlockId, OpId};
use crate::module::Module;
use crate::value::{Operand, Value};

/// Id remapping produced by a copy or graft.
#[derive(Debug, Default)]
pub struct CopyMap {
    pub blocks: HashMap<BlockId, BlockId>,
    pub ops: HashMap<OpId, OpId>,
}

impl CopyMap {
    /// The copied counterpart of a source value. Function arguments are
    /// translated through `map_arg`.
    fn map_value(&self, value: &Value, map_arg: &dyn Fn(ArgId) -> Value) -> Value {
        match value {
            Value::Arg(id) => map_arg(*id),
            Value::Op(id) => Value::Op(self.ops[id]),
            Value::Block(id) => Value::Block(self.blocks[id]),
            other => other.clone(),
        }
    }
}

fn copy_into(
    dst: &mut Function,
    src: &Function,
    map_arg: &dyn Fn(ArgId) -> Value,
) -> CopyMap {
    let mut map = CopyMap::default();

    // Pass 1: create every block and every op, args deferred.
    for block in src.block_ids() {
        let new_block = dst.add_block(src.block(block).name());
        map.blocks.insert(block, new_block);
        for op in src.ops_of(block) {
            let operation = src.op(op);
            let new_op = dst.new_op(
                operation.opcode,
                operation.ty.clone(),
                Vec::new(),
                Some(operation.result()),
            );
            dst.op_mut(new_op).metadata = operation.metadata.clone();
            dst.append_op(new_block, new_op);
            map.ops.insert(op, new_op);
        }
    }

    // Pass 2: resolve args through the maps.
    for block in src.block_ids() {
        for op in src.ops_of(block) {
            let args: Vec<Operand> = src
                .op(op)
                .args()
                .iter()
                .map(|arg| match arg {
                    Operand::Value(v) => Operand::Value(map.map_value(v, map_arg)),
                    Operand::List(vs) => {
                        Operand::List(vs.iter().map(|v| map.map_value(v, map_arg)).collect())
                    }
                })
                .collect();
            dst.set_args(map.ops[&op], args);
        }
    }

    map
}

/// Deep-copies a function: a structurally identical function with its own
/// arenas, preserving names.
pub fn copy_function(func: &Function) -> Function {
    let argnames = func.args().iter().map(|a| a.name.clone()).collect();
    let mut copy = Function::new(func.name(), func.ty().clone(), argnames)
        .expect("source function has a valid signature");
    copy_into(&mut copy, func, &|id| Value::Arg(id));
    copy
}

/// Reproduces `src`'s body inside `dst`. Block labels and result names are
/// re-minted through `dst`'s temper; every use of a `src` argument is
/// replaced by the corresponding value of `arg_values`. Returns the id
/// maps so the caller can wire the grafted blocks in.
pub fn graft_function(dst: &mut Function, src: &Function, arg_values: &[Value]) -> CopyMap {
    debug_assert_eq!(arg_values.len(), src.args().len());
    copy_into(dst, src, &|id| arg_values[id.index()].clone())
}

/// Deep-copies a module: all globals and functions.
pub fn copy_module(module: &Module) -> Module {
    let mut copy = Module::new();
    for global in module.globals() {
        copy.add_global(global.clone())
            .expect("source module has unique global names");
    }
    for func in module.functions() {
        copy.add_function(copy_function(func))
            .expect("source module has unique function names");
    }
    copy
}
