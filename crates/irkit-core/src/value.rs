//! First-class IR values.
//!
//! [`Value`] is the tagged union flowing through op arguments: function
//! arguments, operations (by id), blocks (first-class in `jump`/`cbranch`/
//! `phi`), constants, globals and functions (by name), and the distinct
//! semantic [`Value::Undef`].
//!
//! Operand lists nest exactly one level: an op argument is either a single
//! value or a list of values (the variadic slots of `phi` and `call`).

use serde::{Deserialize, Serialize};

use crate::id::{ArgId, BlockId, OpId};
use crate::types::Type;

/// A constant literal payload.
///
/// Reals compare by bit pattern so that value equality (and with it φ
/// collapsing) stays deterministic in the presence of NaN and signed zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    /// A bytes literal.
    Str(String),
    /// An exception type, referenced by name.
    Exc(String),
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &ConstValue) -> bool {
        match (self, other) {
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Real(a), ConstValue::Real(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Str(a), ConstValue::Str(b)) => a == b,
            (ConstValue::Exc(a), ConstValue::Exc(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

/// An immutable, typed constant. Freely shared by clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub value: ConstValue,
    pub ty: Type,
}

impl Constant {
    pub fn new(value: ConstValue, ty: Type) -> Constant {
        Constant { value, ty }
    }

    pub fn bool(v: bool) -> Constant {
        Constant::new(ConstValue::Bool(v), Type::Bool)
    }

    pub fn int(v: i64, ty: Type) -> Constant {
        Constant::new(ConstValue::Int(v), ty)
    }

    pub fn real(v: f64, ty: Type) -> Constant {
        Constant::new(ConstValue::Real(v), ty)
    }

    pub fn exception(name: impl Into<String>) -> Constant {
        Constant::new(ConstValue::Exc(name.into()), Type::Exception)
    }
}

/// Key under which a trackable value appears in the def/use index.
///
/// Only values with stable in-function identity are tracked: function
/// arguments, operations, and blocks. Constants, globals, functions and
/// `Undef` are untracked (immutable or module-scoped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UseKey {
    Arg(ArgId),
    Op(OpId),
    Block(BlockId),
}

/// A first-class IR value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// A function argument of the containing function.
    Arg(ArgId),
    /// The result of an operation in the containing function.
    Op(OpId),
    /// A basic block, as it appears in `jump`/`cbranch`/`phi` args.
    Block(BlockId),
    /// A constant literal.
    Const(Constant),
    /// A module global, by name.
    Global(String),
    /// A module function, by name (e.g. a `call` target).
    Func(String),
    /// The distinct undefined value; equal by type.
    Undef(Type),
}

impl Value {
    /// The def/use key of this value, if it is tracked.
    pub fn use_key(&self) -> Option<UseKey> {
        match self {
            Value::Arg(id) => Some(UseKey::Arg(*id)),
            Value::Op(id) => Some(UseKey::Op(*id)),
            Value::Block(id) => Some(UseKey::Block(*id)),
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Value::Const(_))
    }

    pub fn as_const(&self) -> Option<&Constant> {
        match self {
            Value::Const(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_op(&self) -> Option<OpId> {
        match self {
            Value::Op(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Value::Block(id) => Some(*id),
            _ => None,
        }
    }
}

/// One op argument: a single value, or a one-level list of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Value(Value),
    List(Vec<Value>),
}

impl Operand {
    /// Iterates the values of this operand, treating single values and
    /// lists uniformly.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        match self {
            Operand::Value(v) => std::slice::from_ref(v).iter(),
            Operand::List(vs) => vs.iter(),
        }
    }

    /// Mutable counterpart of [`Operand::values`].
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        match self {
            Operand::Value(v) => std::slice::from_mut(v).iter_mut(),
            Operand::List(vs) => vs.iter_mut(),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Operand::Value(v) => Some(v),
            Operand::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Operand::List(vs) => Some(vs),
            Operand::Value(_) => None,
        }
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Operand {
        Operand::Value(v)
    }
}

impl From<Vec<Value>> for Operand {
    fn from(vs: Vec<Value>) -> Operand {
        Operand::List(vs)
    }
}
