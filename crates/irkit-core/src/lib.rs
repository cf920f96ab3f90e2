//! irkit-core: the IR data model and its edit machinery.
//!
//! Modules, functions, blocks, operations, and values for a typed SSA-form
//! intermediate representation, plus the positioned [`builder::Builder`],
//! the structural [`verify`] checks, the canonical textual form
//! ([`pretty`] / [`parse`]), and deep [`copy`].

pub mod builder;
pub mod copy;
pub mod error;
pub mod function;
pub mod id;
pub mod module;
pub mod opcode;
pub mod parse;
pub mod pretty;
pub mod types;
pub mod value;
pub mod verify;

// Re-export commonly used types
pub use builder::{Anchor, Builder, IfBlocks};
pub use copy::{copy_function, copy_module, graft_function, CopyMap};
pub use error::IrError;
pub use function::{Block, FuncArg, Function, OpSpec, Operation, Temper};
pub use id::{ArgId, BlockId, OpId};
pub use module::{GlobalValue, Module};
pub use opcode::{check_args, ArgToken, Opcode};
pub use parse::{parse_module, parse_type};
pub use pretty::{format_value, pretty_function, pretty_module, pretty_op};
pub use types::{DimOrder, Type};
pub use value::{ConstValue, Constant, Operand, UseKey, Value};
