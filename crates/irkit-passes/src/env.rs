//! The compile environment: a string-keyed map driving the pipeline.
//!
//! Stage and pass ordering, pass registration, and arbitrary auxiliary
//! keys (`runtime.librarypaths`, `types.typedefmap`, ...) all live here.
//! [`fresh_env`] yields the default configuration with the built-in
//! passes installed.

use std::path::PathBuf;

use indexmap::IndexMap;

use irkit_core::{Function, Module, Type};

use crate::error::PassError;

/// A pass: mutates one function, reading the rest of the module and the
/// environment. The driver removes the function from the module for the
/// duration of the call.
pub type PassFn = fn(&mut Function, &Module, &mut Env) -> Result<(), PassError>;

/// Well-known environment keys.
pub mod keys {
    pub const STAGES: &str = "pipeline.stages";
    pub const ANALYZE: &str = "pipeline.analyze";
    pub const OPTIMIZE: &str = "pipeline.optimize";
    pub const LOWER: &str = "pipeline.lower";
    pub const CODEGEN: &str = "pipeline.codegen";
    /// When set, the verifier runs before and after every pass.
    pub const VERIFY_PARANOID: &str = "verify.paranoid";
    pub const LIBRARY_PATHS: &str = "runtime.librarypaths";
    pub const TYPEDEF_MAP: &str = "types.typedefmap";
}

/// A value in the environment map.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    Str(String),
    Bool(bool),
    Int(i64),
    /// An ordered list of names (stage lists, pass lists).
    Names(Vec<String>),
    Paths(Vec<PathBuf>),
    TypedefMap(IndexMap<String, Type>),
}

/// The per-compile environment: ordered key/value map plus the pass
/// registry. Cloning yields a deep, independent copy.
#[derive(Debug, Clone, Default)]
pub struct Env {
    values: IndexMap<String, EnvValue>,
    passes: IndexMap<String, PassFn>,
}

impl Env {
    pub fn new() -> Env {
        Env::default()
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: EnvValue) {
        self.values.insert(key.into(), value);
    }

    /// The name list under `key`; empty when absent or of another shape.
    pub fn names(&self, key: &str) -> Vec<String> {
        match self.values.get(key) {
            Some(EnvValue::Names(names)) => names.clone(),
            _ => Vec::new(),
        }
    }

    /// The boolean under `key`; false when absent.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(EnvValue::Bool(true)))
    }

    /// Binds a pass name to an implementation.
    pub fn install_pass(&mut self, name: impl Into<String>, pass: PassFn) {
        self.passes.insert(name.into(), pass);
    }

    pub fn pass(&self, name: &str) -> Option<PassFn> {
        self.passes.get(name).copied()
    }

    /// A deep copy of this environment.
    pub fn deep_copy(&self) -> Env {
        self.clone()
    }
}

/// The default environment: the four standard stages with CFG/SSA
/// construction in analyze, and every built-in pass installed.
pub fn fresh_env() -> Env {
    let mut env = Env::new();

    // Pipeline
    env.set(
        keys::STAGES,
        EnvValue::Names(vec![
            keys::ANALYZE.into(),
            keys::OPTIMIZE.into(),
            keys::LOWER.into(),
            keys::CODEGEN.into(),
        ]),
    );
    env.set(keys::ANALYZE, EnvValue::Names(vec!["passes.cfa".into()]));
    env.set(keys::OPTIMIZE, EnvValue::Names(vec![]));
    env.set(
        keys::LOWER,
        EnvValue::Names(vec![
            "passes.lower_calls".into(),
            "passes.lower_errcheck".into(),
        ]),
    );
    env.set(keys::CODEGEN, EnvValue::Names(vec![]));

    // Passes
    env.install_pass("passes.cfa", crate::ssa::run);
    env.install_pass("passes.ret", crate::ret::run);
    env.install_pass("passes.dce", crate::dce::run);
    env.install_pass("passes.inline", crate::inline::run);
    env.install_pass("passes.local_exceptions", crate::local_exceptions::run);
    env.install_pass("passes.lower_calls", crate::lower_calls::run);
    env.install_pass("passes.lower_errcheck", crate::lower_errcheck::run);
    env.install_pass("passes.lower_runtime", crate::runtime::run);

    // Runtime
    env.set(keys::LIBRARY_PATHS, EnvValue::Paths(vec![]));

    env
}
