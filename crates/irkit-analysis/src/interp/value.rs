//! Runtime value representation for the reference interpreter.

use std::fmt;

/// A runtime value.
///
/// `Undef` is a first-class sentinel: legal to hold and to pass around,
/// illegal to observe. Integer widths are not modeled; the interpreter is
/// an oracle for IR semantics, not a machine simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Real(f64),
    Bytes(String),
    Exc(String),
    /// Index into interpreter memory.
    Pointer(usize),
    /// A function, by name.
    Func(String),
    Undef,
    Void,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Real(_) => "real",
            Value::Bytes(_) => "bytes",
            Value::Exc(_) => "exception",
            Value::Pointer(_) => "pointer",
            Value::Func(_) => "function",
            Value::Undef => "undef",
            Value::Void => "void",
        }
    }

    pub fn is_undef(&self) -> bool {
        matches!(self, Value::Undef)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Bytes(s) => write!(f, "{}", s),
            Value::Exc(name) => write!(f, "{}", name),
            Value::Pointer(p) => write!(f, "ptr:{}", p),
            Value::Func(name) => write!(f, "fn:{}", name),
            Value::Undef => write!(f, "undef"),
            Value::Void => write!(f, "void"),
        }
    }
}
