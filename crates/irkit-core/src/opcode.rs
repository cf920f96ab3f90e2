//! The closed opcode catalogue.
//!
//! Every IR operation carries one of these opcodes. Each opcode declares an
//! argument schema (an ordered list of [`ArgToken`]s) which the op factories
//! validate, plus classification predicates: void-producing, terminator,
//! leader, pure (eligible for dead code elimination), and low-level legality
//! for the back-end contract.

use serde::{Deserialize, Serialize};

use crate::error::IrError;
use crate::value::{Operand, Value};

/// One slot in an opcode's argument schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgToken {
    /// A single value.
    Value,
    /// A nested list of values (a variadic slot).
    ValueList,
    /// A single constant value.
    Const,
    /// Any single operand.
    Any,
    /// An opaque object operand.
    Obj,
    /// Zero or more trailing operands of any kind.
    Star,
}

macro_rules! opcodes {
    ($($variant:ident = $name:literal, [$($tok:ident),*];)+) => {
        /// An IR opcode. The set is closed; see the catalogue in the module docs.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Opcode {
            $($variant,)+
        }

        impl Opcode {
            /// Every opcode, in catalogue order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant,)+];

            /// The textual name of this opcode.
            pub fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name,)+
                }
            }

            /// Parses a textual opcode name.
            pub fn parse(name: &str) -> Option<Opcode> {
                match name {
                    $($name => Some(Opcode::$variant),)+
                    _ => None,
                }
            }

            /// The argument schema of this opcode.
            pub fn schema(self) -> &'static [ArgToken] {
                match self {
                    $(Opcode::$variant => &[$(ArgToken::$tok),*],)+
                }
            }
        }
    };
}

opcodes! {
    // Constants
    Constant = "constant", [Const];

    // Locals
    Alloca = "alloca", [];
    Load = "load", [Value];
    Store = "store", [Value, Value];
    Phi = "phi", [ValueList, ValueList];

    // Control
    Jump = "jump", [Value];
    Cbranch = "cbranch", [Value, Value, Value];
    Ret = "ret", [Star];
    ExcSetup = "exc_setup", [ValueList];
    ExcCatch = "exc_catch", [ValueList];
    ExcThrow = "exc_throw", [Value];

    // Arithmetic
    Add = "add", [Value, Value];
    Sub = "sub", [Value, Value];
    Mul = "mul", [Value, Value];
    Div = "div", [Value, Value];
    Mod = "mod", [Value, Value];
    Lshift = "lshift", [Value, Value];
    Rshift = "rshift", [Value, Value];
    Bitand = "bitand", [Value, Value];
    Bitor = "bitor", [Value, Value];
    Bitxor = "bitxor", [Value, Value];
    Invert = "invert", [Value];
    Not = "not_", [Value];
    Uadd = "uadd", [Value];
    Usub = "usub", [Value];

    // Compare
    Eq = "eq", [Value, Value];
    Noteq = "noteq", [Value, Value];
    Lt = "lt", [Value, Value];
    Lte = "lte", [Value, Value];
    Gt = "gt", [Value, Value];
    Gte = "gte", [Value, Value];
    Is = "is_", [Value, Value];

    // Calls
    Call = "call", [Value, ValueList];
    CallMath = "call_math", [Const, ValueList];
    Function = "function", [Obj];
    Partial = "partial", [Value, ValueList];
    Addressof = "addressof", [Value];

    // Pointers
    Ptradd = "ptradd", [Value, Value];
    Ptrload = "ptrload", [Value];
    Ptrstore = "ptrstore", [Value, Value];
    Ptrcast = "ptrcast", [Value];
    PtrIsnull = "ptr_isnull", [Value];

    // Aggregates
    Getfield = "getfield", [Value, Const];
    Setfield = "setfield", [Value, Const, Value];
    Getindex = "getindex", [Value, Star];
    Setindex = "setindex", [Value, Star];
    Getslice = "getslice", [Value, Star];
    Setslice = "setslice", [Value, Star];
    Slice = "slice", [Star];

    // Containers
    NewList = "new_list", [ValueList];
    NewTuple = "new_tuple", [ValueList];
    NewDict = "new_dict", [ValueList, ValueList];
    NewSet = "new_set", [ValueList];
    NewStruct = "new_struct", [ValueList];
    NewData = "new_data", [Value];
    NewExc = "new_exc", [Value, ValueList];
    Concat = "concat", [Value, Value];
    Length = "length", [Value];
    Contains = "contains", [Value, Value];
    ListAppend = "list_append", [Value, Value];
    ListPop = "list_pop", [Value];
    SetAdd = "set_add", [Value, Value];
    SetRemove = "set_remove", [Value, Value];
    DictAdd = "dict_add", [Value, Value, Value];
    DictRemove = "dict_remove", [Value, Value];
    DictKeys = "dict_keys", [Value];
    DictValues = "dict_values", [Value];
    DictItems = "dict_items", [Value];

    // Array and sequence primitives
    Map = "map", [Value, ValueList];
    Reduce = "reduce", [Value, ValueList];
    Filter = "filter", [Value, ValueList];
    Scan = "scan", [Value, ValueList];
    Zip = "zip", [ValueList];
    Allpairs = "allpairs", [Value, ValueList];
    Flatten = "flatten", [Value];

    // Conversion
    Box = "box", [Value];
    Unbox = "unbox", [Value];
    Convert = "convert", [Value];

    // Iteration
    Getiter = "getiter", [Value];
    Next = "next", [Value];
    Yieldval = "yieldval", [Value];

    // Threads
    ThreadStart = "thread_start", [Value, ValueList];
    ThreadJoin = "thread_join", [Value];
    ThreadpoolStart = "threadpool_start", [Star];
    ThreadpoolSubmit = "threadpool_submit", [Star];
    ThreadpoolJoin = "threadpool_join", [Star];
    ThreadpoolClose = "threadpool_close", [Star];

    // Debug
    Print = "print", [Value];

    // Low-level only
    CheckOverflow = "check_overflow", [Value];
    CheckError = "check_error", [Star];
    ExcMatches = "exc_matches", [Value, Value];
    StoreTlExc = "store_tl_exc", [Value];
    LoadTlExc = "load_tl_exc", [];
    LoadVtable = "load_vtable", [Value];
    VtableLookup = "vtable_lookup", [Value, Const];
    GcGotref = "gc_gotref", [Value];
    GcGiveref = "gc_giveref", [Value];
    GcIncref = "gc_incref", [Value];
    GcDecref = "gc_decref", [Value];
    GcAlloc = "gc_alloc", [Value];
    GcDealloc = "gc_dealloc", [Value];
    GcCollect = "gc_collect", [];
    GcWriteBarrier = "gc_write_barrier", [Star];
    GcReadBarrier = "gc_read_barrier", [Star];
    GcTraverse = "gc_traverse", [Value];
}

impl Opcode {
    /// Whether this opcode ends a basic block.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Jump | Opcode::Cbranch | Opcode::Ret | Opcode::ExcThrow
        )
    }

    /// Whether this opcode produces no value. Terminators plus the
    /// side-effect-only ops.
    pub fn is_void(self) -> bool {
        self.is_terminator()
            || matches!(
                self,
                Opcode::Store
                    | Opcode::Print
                    | Opcode::StoreTlExc
                    | Opcode::CheckOverflow
                    | Opcode::CheckError
            )
    }

    /// Whether this opcode may only appear at the head of a block.
    pub fn is_leader(self) -> bool {
        matches!(self, Opcode::Phi | Opcode::ExcSetup | Opcode::ExcCatch)
    }

    /// Relative ordering of leader opcodes within the leader prefix.
    /// Non-leaders have no position.
    pub fn leader_order(self) -> Option<u8> {
        match self {
            Opcode::Phi => Some(0),
            Opcode::ExcSetup => Some(1),
            Opcode::ExcCatch => Some(2),
            _ => None,
        }
    }

    /// Whether this opcode is side-effect free and may be removed by dead
    /// code elimination when its result is unused.
    pub fn is_pure(self) -> bool {
        matches!(
            self,
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
                | Opcode::Invert
                | Opcode::Not
                | Opcode::Uadd
                | Opcode::Usub
                | Opcode::Eq
                | Opcode::Noteq
                | Opcode::Lt
                | Opcode::Lte
                | Opcode::Gt
                | Opcode::Gte
                | Opcode::Is
                | Opcode::Alloca
                | Opcode::Load
                | Opcode::Phi
                | Opcode::NewList
                | Opcode::NewTuple
                | Opcode::NewDict
                | Opcode::NewSet
                | Opcode::NewStruct
                | Opcode::NewData
                | Opcode::NewExc
                | Opcode::Ptrload
                | Opcode::Getfield
                | Opcode::Getindex
                | Opcode::Addressof
                | Opcode::Ptrcast
                | Opcode::PtrIsnull
                | Opcode::ExcSetup
                | Opcode::ExcCatch
        )
    }

    /// Whether a low-level (fully lowered) function may contain this opcode.
    /// Excludes generators, dynamic container ops, and the array/sequence
    /// combinators; thread ops remain legal since they lower to runtime
    /// calls.
    pub fn is_lowlevel(self) -> bool {
        !matches!(
            self,
            Opcode::Map
                | Opcode::Reduce
                | Opcode::Filter
                | Opcode::Scan
                | Opcode::Zip
                | Opcode::Allpairs
                | Opcode::Flatten
                | Opcode::NewList
                | Opcode::NewTuple
                | Opcode::NewDict
                | Opcode::NewSet
                | Opcode::NewData
                | Opcode::NewExc
                | Opcode::Concat
                | Opcode::Length
                | Opcode::Contains
                | Opcode::ListAppend
                | Opcode::ListPop
                | Opcode::SetAdd
                | Opcode::SetRemove
                | Opcode::DictAdd
                | Opcode::DictRemove
                | Opcode::DictKeys
                | Opcode::DictValues
                | Opcode::DictItems
                | Opcode::Box
                | Opcode::Unbox
                | Opcode::Getiter
                | Opcode::Next
                | Opcode::Yieldval
                | Opcode::Getslice
                | Opcode::Setslice
                | Opcode::Slice
        )
    }
}

/// Validates `args` against `opcode`'s schema.
///
/// `Star` accepts all remaining operands; every other token consumes exactly
/// one operand of the matching shape.
pub fn check_args(opcode: Opcode, args: &[Operand]) -> Result<(), IrError> {
    let schema = opcode.schema();
    let mismatch = |message: String| IrError::SchemaMismatch {
        opcode: opcode.name(),
        message,
    };

    let mut pos = 0;
    for (slot, token) in schema.iter().enumerate() {
        if *token == ArgToken::Star {
            return Ok(());
        }
        let arg = args
            .get(pos)
            .ok_or_else(|| mismatch(format!("expected {} argument(s), got {}", schema.len(), args.len())))?;
        match token {
            ArgToken::Value => {
                if !matches!(arg, Operand::Value(_)) {
                    return Err(mismatch(format!("slot {} expects a single value", slot)));
                }
            }
            ArgToken::ValueList => {
                if !matches!(arg, Operand::List(_)) {
                    return Err(mismatch(format!("slot {} expects a value list", slot)));
                }
            }
            ArgToken::Const => {
                if !matches!(arg, Operand::Value(Value::Const(_))) {
                    return Err(mismatch(format!("slot {} expects a constant", slot)));
                }
            }
            ArgToken::Any | ArgToken::Obj => {}
            ArgToken::Star => unreachable!(),
        }
        pos += 1;
    }
    if pos != args.len() {
        return Err(mismatch(format!(
            "expected {} argument(s), got {}",
            schema.len(),
            args.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use crate::value::Constant;

    #[test]
    fn names_roundtrip() {
        for &op in Opcode::ALL {
            assert_eq!(Opcode::parse(op.name()), Some(op), "{:?}", op);
        }
        assert_eq!(Opcode::parse("nonsense"), None);
    }

    #[test]
    fn terminators_are_void() {
        for &op in &[Opcode::Jump, Opcode::Cbranch, Opcode::Ret, Opcode::ExcThrow] {
            assert!(op.is_terminator());
            assert!(op.is_void());
        }
        assert!(!Opcode::Add.is_terminator());
    }

    #[test]
    fn void_non_terminators() {
        for &op in &[
            Opcode::Store,
            Opcode::Print,
            Opcode::StoreTlExc,
            Opcode::CheckOverflow,
            Opcode::CheckError,
        ] {
            assert!(op.is_void());
            assert!(!op.is_terminator());
        }
        assert!(!Opcode::Load.is_void());
    }

    #[test]
    fn leader_ordering() {
        assert!(Opcode::Phi.leader_order() < Opcode::ExcSetup.leader_order());
        assert!(Opcode::ExcSetup.leader_order() < Opcode::ExcCatch.leader_order());
        assert_eq!(Opcode::Jump.leader_order(), None);
    }

    #[test]
    fn pure_set_excludes_side_effects() {
        for &op in &[
            Opcode::Store,
            Opcode::Call,
            Opcode::Print,
            Opcode::ExcThrow,
            Opcode::Ret,
            Opcode::Setfield,
        ] {
            assert!(!op.is_pure(), "{:?} must not be pure", op);
        }
        for &op in &[Opcode::Add, Opcode::Load, Opcode::Alloca, Opcode::Phi] {
            assert!(op.is_pure(), "{:?} must be pure", op);
        }
    }

    #[test]
    fn lowlevel_rejects_high_level_ops() {
        assert!(!Opcode::Map.is_lowlevel());
        assert!(!Opcode::NewList.is_lowlevel());
        assert!(!Opcode::Yieldval.is_lowlevel());
        assert!(Opcode::Add.is_lowlevel());
        assert!(Opcode::Ptrstore.is_lowlevel());
        assert!(Opcode::CheckOverflow.is_lowlevel());
    }

    #[test]
    fn schema_validation() {
        let v = |c: i64| Operand::Value(Value::Const(Constant::int(c, Type::int32())));

        // store wants exactly two single values
        assert!(check_args(Opcode::Store, &[v(1), v(2)]).is_ok());
        assert!(check_args(Opcode::Store, &[v(1)]).is_err());
        assert!(check_args(Opcode::Store, &[v(1), v(2), v(3)]).is_err());

        // phi wants two lists
        assert!(check_args(Opcode::Phi, &[Operand::List(vec![]), Operand::List(vec![])]).is_ok());
        assert!(check_args(Opcode::Phi, &[v(1), v(2)]).is_err());

        // ret takes zero or one operand via Star
        assert!(check_args(Opcode::Ret, &[]).is_ok());
        assert!(check_args(Opcode::Ret, &[v(1)]).is_ok());

        // getfield wants a value then a constant
        assert!(check_args(Opcode::Getfield, &[v(1), v(0)]).is_ok());
        let non_const = Operand::List(vec![]);
        assert!(check_args(Opcode::Getfield, &[v(1), non_const]).is_err());
    }
}
