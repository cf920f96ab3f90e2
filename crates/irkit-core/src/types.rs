//! The irkit type lattice.
//!
//! Types are immutable, structurally compared algebraic values: scalars
//! (Bool, sized ints, reals), pointers, arrays, structs, tuples, the
//! high-level containers (list/dict), function signatures, and a few
//! opaque leaves (Bytes, Exception, Opaque).
//!
//! `Typedef` is a transparent alias with nominal identity: `Typedef(x)`
//! compares unequal to `x` everywhere except through
//! [`Type::resolve_typedef`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Memory order of a multi-dimensional array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DimOrder {
    /// Row-major.
    C,
    /// Column-major.
    F,
    /// Either.
    A,
}

/// An irkit type. Structural equality throughout; freely shared by clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Void,
    Bool,
    /// Sized integer, bits in {8, 16, 32, 64}.
    Int { bits: u8, signed: bool },
    /// Floating point, bits in {32, 64}.
    Real { bits: u8 },
    Pointer { base: Box<Type> },
    Array {
        base: Box<Type>,
        ndim: u8,
        order: DimOrder,
    },
    /// Field names are unique within the struct.
    Struct {
        names: Vec<String>,
        types: Vec<Type>,
    },
    Tuple { bases: Vec<Type> },
    /// `count == -1` means the length is unknown.
    List { base: Box<Type>, count: i64 },
    Dict {
        key: Box<Type>,
        value: Box<Type>,
        count: i64,
    },
    Function {
        restype: Box<Type>,
        argtypes: Vec<Type>,
    },
    Bytes,
    Exception,
    Opaque,
    /// Transparent alias. Unequal to its base except through
    /// [`Type::resolve_typedef`].
    Typedef { name: String, base: Box<Type> },
}

impl Type {
    pub fn int8() -> Type {
        Type::Int { bits: 8, signed: true }
    }

    pub fn int16() -> Type {
        Type::Int { bits: 16, signed: true }
    }

    pub fn int32() -> Type {
        Type::Int { bits: 32, signed: true }
    }

    pub fn int64() -> Type {
        Type::Int { bits: 64, signed: true }
    }

    pub fn uint8() -> Type {
        Type::Int { bits: 8, signed: false }
    }

    pub fn uint16() -> Type {
        Type::Int { bits: 16, signed: false }
    }

    pub fn uint32() -> Type {
        Type::Int { bits: 32, signed: false }
    }

    pub fn uint64() -> Type {
        Type::Int { bits: 64, signed: false }
    }

    pub fn float32() -> Type {
        Type::Real { bits: 32 }
    }

    pub fn float64() -> Type {
        Type::Real { bits: 64 }
    }

    pub fn pointer(base: Type) -> Type {
        Type::Pointer { base: Box::new(base) }
    }

    pub fn function(restype: Type, argtypes: Vec<Type>) -> Type {
        Type::Function {
            restype: Box::new(restype),
            argtypes,
        }
    }

    pub fn typedef(name: impl Into<String>, base: Type) -> Type {
        Type::Typedef {
            name: name.into(),
            base: Box::new(base),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    pub fn is_real(&self) -> bool {
        matches!(self, Type::Real { .. })
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Type::Exception)
    }

    /// The pointee of a pointer type, if this is one.
    pub fn pointee(&self) -> Option<&Type> {
        match self {
            Type::Pointer { base } => Some(base),
            _ => None,
        }
    }

    /// The return type of a function type, if this is one.
    pub fn restype(&self) -> Option<&Type> {
        match self {
            Type::Function { restype, .. } => Some(restype),
            _ => None,
        }
    }

    /// Peels all typedef layers, yielding the underlying type.
    pub fn resolve_typedef(&self) -> &Type {
        let mut ty = self;
        while let Type::Typedef { base, .. } = ty {
            ty = base;
        }
        ty
    }

    /// Whether this type is legal in low-level (post-lowering) form:
    /// only `Bool | Int | Real | Pointer | Struct | Function | Void`,
    /// recursively.
    pub fn is_lowlevel(&self) -> bool {
        match self {
            Type::Void | Type::Bool | Type::Int { .. } | Type::Real { .. } => true,
            Type::Pointer { base } => base.is_lowlevel(),
            Type::Struct { types, .. } => types.iter().all(Type::is_lowlevel),
            Type::Function { restype, argtypes } => {
                restype.is_lowlevel() && argtypes.iter().all(Type::is_lowlevel)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int { bits, signed: true } => write!(f, "int{}", bits),
            Type::Int { bits, signed: false } => write!(f, "uint{}", bits),
            Type::Real { bits } => write!(f, "float{}", bits),
            Type::Pointer { base } => write!(f, "ptr[{}]", base),
            Type::Array { base, ndim, order } => {
                let order = match order {
                    DimOrder::C => "C",
                    DimOrder::F => "F",
                    DimOrder::A => "A",
                };
                write!(f, "array[{}, {}, {}]", base, ndim, order)
            }
            Type::Struct { names, types } => {
                write!(f, "struct[")?;
                for (i, (name, ty)) in names.iter().zip(types).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "]")
            }
            Type::Tuple { bases } => {
                write!(f, "tuple[")?;
                for (i, ty) in bases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", ty)?;
                }
                write!(f, "]")
            }
            Type::List { base, count } => write!(f, "list[{}, {}]", base, count),
            Type::Dict { key, value, count } => {
                write!(f, "dict[{}, {}, {}]", key, value, count)
            }
            Type::Function { restype, argtypes } => {
                write!(f, "func[{}", restype)?;
                for ty in argtypes {
                    write!(f, ", {}", ty)?;
                }
                write!(f, "]")
            }
            Type::Bytes => write!(f, "bytes"),
            Type::Exception => write!(f, "exception"),
            Type::Opaque => write!(f, "opaque"),
            Type::Typedef { name, base } => write!(f, "typedef[{}, {}]", name, base),
        }
    }
}
