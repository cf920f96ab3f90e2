//! The pass pipeline driver.
//!
//! Execution is single-threaded and strictly sequential: stage order,
//! then pass order within the stage, then function by function. A pass
//! name with no registered implementation aborts the compile with
//! [`PassError::PassNotInstalled`]. With `verify.paranoid` set, the
//! verifier runs before and after every pass invocation.

use irkit_core::{verify::verify_function, Module};

use crate::env::{keys, Env};
use crate::error::PassError;

/// Runs the configured pipeline over every function of `module`.
pub fn run_pipeline(module: &mut Module, env: &mut Env) -> Result<(), PassError> {
    let stages = env.names(keys::STAGES);
    for stage in stages {
        let _stage_span = tracing::info_span!("stage", name = %stage).entered();
        let passes = env.names(&stage);
        for pass_name in passes {
            let pass = env
                .pass(&pass_name)
                .ok_or_else(|| PassError::PassNotInstalled {
                    name: pass_name.clone(),
                })?;
            let _pass_span = tracing::info_span!("pass", name = %pass_name).entered();
            let paranoid = env.flag(keys::VERIFY_PARANOID);

            for fname in module.function_names() {
                let Some(mut func) = module.take_function(&fname) else {
                    continue;
                };
                tracing::debug!(function = %fname, "running");

                if paranoid {
                    if let Err(e) = verify_function(&func) {
                        module.put_function(func);
                        return Err(e.into());
                    }
                }
                if let Err(e) = pass(&mut func, module, env) {
                    module.put_function(func);
                    return Err(e);
                }
                if paranoid {
                    if let Err(e) = verify_function(&func) {
                        module.put_function(func);
                        return Err(e.into());
                    }
                }
                module.put_function(func);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{fresh_env, EnvValue};
    use irkit_core::parse_module;

    fn sample_module() -> Module {
        parse_module(
            "\
function int32 f(int32 %x) {
entry:
    %p = (ptr[int32]) alloca()
    %s = (void) store(%x, %p)
    %v = (int32) load(%p)
    %r = (void) ret(%v)
}
",
        )
        .unwrap()
    }

    #[test]
    fn default_pipeline_runs_ssa_construction() {
        let mut module = sample_module();
        let mut env = fresh_env();
        env.set(keys::VERIFY_PARANOID, EnvValue::Bool(true));
        run_pipeline(&mut module, &mut env).unwrap();

        let f = module.get_function("f").unwrap();
        // The slot was promoted away.
        for op in f.op_ids() {
            assert_ne!(f.op(op).opcode, irkit_core::Opcode::Alloca);
        }
    }

    #[test]
    fn unknown_pass_is_fatal() {
        let mut module = sample_module();
        let mut env = fresh_env();
        env.set(
            keys::OPTIMIZE,
            EnvValue::Names(vec!["passes.apocrypha".into()]),
        );
        match run_pipeline(&mut module, &mut env) {
            Err(PassError::PassNotInstalled { name }) => assert_eq!(name, "passes.apocrypha"),
            other => panic!("expected PassNotInstalled, got {:?}", other),
        }
        // The module still owns its function after the abort.
        assert!(module.get_function("f").is_some());
    }

    #[test]
    fn stage_order_is_respected() {
        let mut module = sample_module();
        let mut env = fresh_env();
        // Move DCE to a later stage; both must run without error.
        env.set(keys::OPTIMIZE, EnvValue::Names(vec!["passes.dce".into()]));
        env.set(keys::LOWER, EnvValue::Names(vec!["passes.ret".into()]));
        run_pipeline(&mut module, &mut env).unwrap();
    }
}
