//! Core error types for irkit-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering the
//! failure modes of the IR data model, the builder, the verifier, and the
//! textual parser.

use thiserror::Error;

/// Errors produced by the irkit-core crate.
#[derive(Debug, Error)]
pub enum IrError {
    /// An IR invariant failed verification. Carries the offending location
    /// (function, block, op) and a message.
    #[error("verify error at {location}: {message}")]
    Verify { location: String, message: String },

    /// `delete` was called on a value that still has uses.
    #[error("value '{name}' still has {count} use(s)")]
    InUse { name: String, count: usize },

    /// The builder was asked to emit without a current block.
    #[error("builder is not positioned")]
    NotPositioned,

    /// An op factory received arguments that violate the opcode's schema.
    #[error("schema mismatch for opcode '{opcode}': {message}")]
    SchemaMismatch { opcode: &'static str, message: String },

    /// A name (function, global, block, result) is already taken.
    #[error("duplicate name: '{name}'")]
    DuplicateName { name: String },

    /// A named function was not found in the module.
    #[error("function not found: '{name}'")]
    FunctionNotFound { name: String },

    /// A named global was not found in the module.
    #[error("global not found: '{name}'")]
    GlobalNotFound { name: String },

    /// A function type did not match its argument names.
    #[error("signature mismatch: {message}")]
    SignatureMismatch { message: String },

    /// Textual IR failed to parse.
    #[error("parse error at {line}:{column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },
}

impl IrError {
    /// Shorthand for a [`IrError::Verify`] error.
    pub fn verify(location: impl Into<String>, message: impl Into<String>) -> IrError {
        IrError::Verify {
            location: location.into(),
            message: message.into(),
        }
    }
}
