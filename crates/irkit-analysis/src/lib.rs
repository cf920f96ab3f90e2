//! irkit-analysis: derived views over the IR.
//!
//! The per-function control-flow graph, the iterative dominator fixed
//! point, natural-loop detection, the module call graph, and the
//! reference interpreter used as a semantics oracle.

pub mod callgraph;
pub mod cfg;
pub mod dominators;
pub mod error;
pub mod interp;
pub mod loops;

pub use callgraph::{call_graph, topo_order};
pub use cfg::{cfg, Cfg, CfgNode};
pub use dominators::{compute_dominators, dominates, verify_ssa, DomSets};
pub use error::AnalysisError;
pub use interp::{run_function, ExceptionModel, Interpreter, RuntimeError};
pub use loops::{find_natural_loops, flat_loops, Loop};
