//! Trap conditions of the reference interpreter.

use thiserror::Error;

/// A runtime trap. Carries the result name of the op that trapped where
/// one exists.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// An undefined value reached an observation point (an operand of an
    /// arithmetic/compare op, a branch condition, a load result, ...).
    #[error("undefined value observed at %{op}")]
    UndefObserved { op: String },

    #[error("division by zero at %{op}")]
    DivideByZero { op: String },

    #[error("type mismatch at %{op}: {message}")]
    TypeMismatch { op: String, message: String },

    /// `exc_throw` with no matching handler in the throwing block.
    #[error("uncaught exception: {exc}")]
    UncaughtException { exc: String },

    /// The op is representable IR but outside the interpreted subset.
    #[error("opcode '{opcode}' is not interpreted")]
    Unsupported { opcode: &'static str },

    #[error("call to unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("call depth exceeded ({depth})")]
    CallDepthExceeded { depth: usize },

    #[error("function '{function}' has no entry block")]
    NoEntryBlock { function: String },

    /// A φ saw a predecessor it has no incoming entry for.
    #[error("phi %{op} has no entry for the executed predecessor")]
    PhiMismatch { op: String },

    #[error("interpreter error at %{op}: {message}")]
    Internal { op: String, message: String },
}
