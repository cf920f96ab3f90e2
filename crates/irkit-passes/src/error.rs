//! Error types for the pass pipeline and transformations.

use irkit_core::IrError;
use irkit_analysis::AnalysisError;
use thiserror::Error;

/// Errors produced by the pipeline driver and the transformations.
#[derive(Debug, Error)]
pub enum PassError {
    /// A pipeline stage names a pass that is not bound in the environment.
    #[error("pass '{name}' is not installed")]
    PassNotInstalled { name: String },

    /// A call site cannot be inlined.
    #[error("cannot inline call %{call}: {reason}")]
    NotInlinable { call: String, reason: String },

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}
