//! Error types for the analysis crate.

use irkit_core::IrError;
use thiserror::Error;

/// Errors produced by CFG, dominator, loop, and call-graph analyses.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Loop detection encountered a non-natural loop nest.
    #[error("irreducible control flow entering block '{block}'")]
    IrreducibleCfg { block: String },

    /// A topological order was requested on a cyclic call graph.
    #[error("call graph is not a DAG (cycle through '{function}')")]
    NotADag { function: String },

    #[error(transparent)]
    Ir(#[from] IrError),
}
