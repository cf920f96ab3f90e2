//! Canonical textual rendering of the IR.
//!
//! One line per op: `%name = (type) opcode(operand, ...)`. The output is
//! the golden format: the companion parser reads it back structurally
//! unchanged. Metadata and comments are not rendered.

use std::fmt::Write;

use crate::function::Function;
use crate::id::OpId;
use crate::module::Module;
use crate::value::{ConstValue, Operand, Value};

/// Renders a whole module: globals, then functions, in insertion order.
pub fn pretty_module(module: &Module) -> String {
    let mut out = String::new();
    for global in module.globals() {
        let _ = writeln!(out, "global %{} = {}", global.name, global.ty);
    }
    if module.globals().next().is_some() {
        out.push('\n');
    }
    for (i, func) in module.functions().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&pretty_function(func));
    }
    out
}

/// Renders one function with its blocks and ops.
pub fn pretty_function(func: &Function) -> String {
    let mut out = String::new();
    let args = func
        .args()
        .iter()
        .map(|a| format!("{} %{}", a.ty, a.name))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "function {} {}({}) {{", func.restype(), func.name(), args);
    for block in func.block_ids() {
        let _ = writeln!(out, "{}:", func.block(block).name());
        for op in func.ops_of(block) {
            let _ = writeln!(out, "{}", pretty_op(func, op));
        }
    }
    out.push_str("}\n");
    out
}

/// Renders one op as its canonical indented line (no trailing newline).
pub fn pretty_op(func: &Function, op: OpId) -> String {
    let operation = func.op(op);
    let args = operation
        .args()
        .iter()
        .map(|arg| format_operand(func, arg))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "    %{} = ({}) {}({})",
        operation.result(),
        operation.ty,
        operation.opcode.name(),
        args
    )
}

fn format_operand(func: &Function, operand: &Operand) -> String {
    match operand {
        Operand::Value(v) => format_value(func, v),
        Operand::List(vs) => {
            let inner = vs
                .iter()
                .map(|v| format_value(func, v))
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{}]", inner)
        }
    }
}

/// Renders one value reference or literal.
pub fn format_value(func: &Function, value: &Value) -> String {
    match value {
        Value::Arg(id) => format!("%{}", func.arg(*id).name),
        Value::Op(id) => format!("%{}", func.op(*id).result()),
        Value::Block(id) => func.block(*id).name().to_string(),
        Value::Func(name) => name.clone(),
        Value::Global(name) => format!("%{}", name),
        Value::Undef(ty) => format!("undef:{}", ty),
        Value::Const(c) => {
            let lit = match &c.value {
                ConstValue::Bool(true) => "true".to_string(),
                ConstValue::Bool(false) => "false".to_string(),
                ConstValue::Int(v) => v.to_string(),
                ConstValue::Real(v) => format!("{:?}", v),
                ConstValue::Str(s) => format!("\"{}\"", escape(s)),
                ConstValue::Exc(name) => name.clone(),
            };
            format!("{}:{}", lit, c.ty)
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::id::ArgId;
    use crate::types::Type;
    use crate::value::{Constant, Operand};

    #[test]
    fn op_line_format() {
        let mut f = Function::new(
            "f",
            Type::function(Type::int32(), vec![Type::int32(), Type::int32()]),
            vec!["a".into(), "b".into()],
        )
        .unwrap();
        let entry = f.add_block("entry");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let sum = b
            .add(
                Type::int32(),
                Value::Arg(ArgId(0)),
                Value::Arg(ArgId(1)),
            )
            .unwrap();
        b.ret(Some(Value::Op(sum))).unwrap();

        assert_eq!(pretty_op(&f, sum), "    %0 = (int32) add(%a, %b)");
    }

    #[test]
    fn function_layout() {
        let mut f = Function::new(
            "square",
            Type::function(Type::int32(), vec![Type::int32()]),
            vec!["i".into()],
        )
        .unwrap();
        let entry = f.add_block("entry");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        let i = Value::Arg(ArgId(0));
        let sq = b.mul(Type::int32(), i.clone(), i).unwrap();
        b.ret(Some(Value::Op(sq))).unwrap();

        insta::assert_snapshot!(pretty_function(&f), @r###"
        function int32 square(int32 %i) {
        entry:
            %0 = (int32) mul(%i, %i)
            %1 = (void) ret(%0)
        }
        "###);
    }

    #[test]
    fn constants_and_lists() {
        let mut f = Function::new("f", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let entry = f.add_block("entry");
        let then = f.add_block("then");
        let other = f.add_block("other");

        let (phi, t, throw, u) = {
            let mut b = Builder::new(&mut f);
            b.position_at_end(entry);
            let phi = b
                .phi(
                    Type::int32(),
                    vec![then, other],
                    vec![
                        Value::Const(Constant::int(5, Type::int32())),
                        Value::Const(Constant::int(-2, Type::int32())),
                    ],
                )
                .unwrap();

            let t = b.emit(
                crate::opcode::Opcode::Is,
                Type::Bool,
                vec![
                    Operand::Value(Value::Const(Constant::bool(true))),
                    Operand::Value(Value::Const(Constant::real(2.5, Type::float64()))),
                ],
            )
            .unwrap();

            let throw = b
                .exc_throw(Value::Const(Constant::exception("StopIteration")))
                .unwrap();

            let u = b.ret(Some(Value::Undef(Type::int32()))).unwrap();

            (phi, t, throw, u)
        };

        assert_eq!(
            pretty_op(&f, phi),
            "    %0 = (int32) phi([then, other], [5:int32, -2:int32])"
        );
        assert_eq!(
            pretty_op(&f, t),
            "    %1 = (bool) is_(true:bool, 2.5:float64)"
        );
        assert_eq!(
            pretty_op(&f, throw),
            "    %2 = (void) exc_throw(StopIteration:exception)"
        );
        assert_eq!(pretty_op(&f, u), "    %3 = (void) ret(undef:int32)");
    }

    #[test]
    fn module_globals_header() {
        let mut m = Module::new();
        m.add_global(crate::module::GlobalValue::new("counter", Type::int64()))
            .unwrap();
        let mut f = Function::new("main", Type::function(Type::Void, vec![]), vec![]).unwrap();
        let entry = f.add_block("entry");
        let mut b = Builder::new(&mut f);
        b.position_at_end(entry);
        b.ret(None).unwrap();
        m.add_function(f).unwrap();

        let text = pretty_module(&m);
        assert!(text.starts_with("global %counter = int64\n"));
        assert!(text.contains("function void main() {"));
    }
}
