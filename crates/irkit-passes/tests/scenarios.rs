//! End-to-end scenarios over the full pass stack: SSA construction on
//! branchy and loopy functions, semantic preservation against the
//! reference interpreter, return normalization, and inlining composed
//! with SSA cleanup.

use irkit_core::{parse_module, verify::verify_function, Module, Opcode, Value};
use irkit_analysis::interp::{run_function, Value as RValue};
use irkit_analysis::{cfg, compute_dominators, verify_ssa};
use irkit_passes::{inline, ret, ssa};

fn count_ops(module: &Module, func: &str, opcode: Opcode) -> usize {
    let f = module.get_function(func).unwrap();
    f.op_ids()
        .into_iter()
        .filter(|&op| f.op(op).opcode == opcode)
        .count()
}

/// `if (y > 5) y = 5; else y = 2; return y` over a stack slot.
const IF_THEN_ELSE: &str = "\
function int32 clamp(int32 %y0) {
entry:
    %y = (ptr[int32]) alloca()
    %s0 = (void) store(%y0, %y)
    %v0 = (int32) load(%y)
    %c = (bool) gt(%v0, 5:int32)
    %br = (void) cbranch(%c, then, else)
then:
    %s1 = (void) store(5:int32, %y)
    %j1 = (void) jump(exit)
else:
    %s2 = (void) store(2:int32, %y)
    %j2 = (void) jump(exit)
exit:
    %v1 = (int32) load(%y)
    %r = (void) ret(%v1)
}
";

#[test]
fn if_then_else_cfg_has_four_blocks_and_one_phi_after_ssa() {
    let mut module = parse_module(IF_THEN_ELSE).unwrap();
    {
        let func = module.get_function("clamp").unwrap();
        let graph = cfg(func);
        assert_eq!(func.block_ids().len(), 4);
        let exit = func.find_block("exit").unwrap();
        let then = func.find_block("then").unwrap();
        let els = func.find_block("else").unwrap();
        assert_eq!(graph.predecessors(exit), vec![then, els]);
    }

    let func = module.get_function_mut("clamp").unwrap();
    ssa::promote(func).unwrap();
    verify_function(func).unwrap();

    // Exactly one φ, in the exit block, merging 5 and 2 from then/else.
    assert_eq!(count_ops(&module, "clamp", Opcode::Phi), 1);
    let func = module.get_function("clamp").unwrap();
    let exit = func.find_block("exit").unwrap();
    let exit_ops = func.ops_of(exit);
    let opcodes: Vec<Opcode> = exit_ops.iter().map(|&op| func.op(op).opcode).collect();
    assert_eq!(opcodes, vec![Opcode::Phi, Opcode::Ret]);

    let phi = exit_ops[0];
    let then = func.find_block("then").unwrap();
    let els = func.find_block("else").unwrap();
    let blocks = func.op(phi).args()[0].as_list().unwrap();
    let values = func.op(phi).args()[1].as_list().unwrap();
    assert_eq!(blocks, &[Value::Block(then), Value::Block(els)]);
    assert_eq!(
        values,
        &[
            Value::Const(irkit_core::Constant::int(5, irkit_core::Type::int32())),
            Value::Const(irkit_core::Constant::int(2, irkit_core::Type::int32())),
        ]
    );

    // SSA dominance holds.
    let graph = cfg(func);
    let doms = compute_dominators(func, &graph);
    verify_ssa(func, &doms).unwrap();
}

#[test]
fn if_then_else_ssa_preserves_semantics() {
    let before = parse_module(IF_THEN_ELSE).unwrap();
    let mut after = parse_module(IF_THEN_ELSE).unwrap();
    ssa::promote(after.get_function_mut("clamp").unwrap()).unwrap();

    for input in [-3, 0, 5, 6, 100] {
        let (expected, _) = run_function(&before, "clamp", vec![RValue::Int(input)]).unwrap();
        let (got, _) = run_function(&after, "clamp", vec![RValue::Int(input)]).unwrap();
        assert_eq!(expected, got, "input {}", input);
    }
}

/// `i = 0; while (i < 10) { if (i > 5) y = i; i = i + 1 } return y`
/// over two stack slots.
const WHILE_WITH_CONDITIONAL_STORE: &str = "\
function int32 last(int32 %n) {
entry:
    %i = (ptr[int32]) alloca()
    %y = (ptr[int32]) alloca()
    %s0 = (void) store(0:int32, %i)
    %j0 = (void) jump(cond)
cond:
    %iv = (int32) load(%i)
    %c = (bool) lt(%iv, %n)
    %br = (void) cbranch(%c, body, exit)
body:
    %iv1 = (int32) load(%i)
    %c2 = (bool) gt(%iv1, 5:int32)
    %br2 = (void) cbranch(%c2, then, endif)
then:
    %iv2 = (int32) load(%i)
    %sy = (void) store(%iv2, %y)
    %j1 = (void) jump(endif)
endif:
    %iv3 = (int32) load(%i)
    %inc = (int32) add(%iv3, 1:int32)
    %si = (void) store(%inc, %i)
    %j2 = (void) jump(cond)
exit:
    %yv = (int32) load(%y)
    %r = (void) ret(%yv)
}
";

#[test]
fn while_loop_yields_exactly_three_phis() {
    let mut module = parse_module(WHILE_WITH_CONDITIONAL_STORE).unwrap();
    let func = module.get_function_mut("last").unwrap();
    ssa::promote(func).unwrap();
    verify_function(func).unwrap();

    // One φ for i and one for y in the loop header, one for y at the
    // merge after the conditional store. The i-φ at the merge collapses.
    assert_eq!(count_ops(&module, "last", Opcode::Phi), 3);

    let func = module.get_function("last").unwrap();
    let cond = func.find_block("cond").unwrap();
    let endif = func.find_block("endif").unwrap();
    let header_phis = func
        .leaders_of(cond)
        .into_iter()
        .filter(|&op| func.op(op).opcode == Opcode::Phi)
        .count();
    let merge_phis = func
        .leaders_of(endif)
        .into_iter()
        .filter(|&op| func.op(op).opcode == Opcode::Phi)
        .count();
    assert_eq!(header_phis, 2);
    assert_eq!(merge_phis, 1);

    // No promoted memory op survives.
    assert_eq!(count_ops(&module, "last", Opcode::Alloca), 0);
    assert_eq!(count_ops(&module, "last", Opcode::Load), 0);
    assert_eq!(count_ops(&module, "last", Opcode::Store), 0);
}

#[test]
fn while_loop_ssa_preserves_semantics() {
    let before = parse_module(WHILE_WITH_CONDITIONAL_STORE).unwrap();
    let mut after = parse_module(WHILE_WITH_CONDITIONAL_STORE).unwrap();
    ssa::promote(after.get_function_mut("last").unwrap()).unwrap();
    let func = after.get_function("last").unwrap();
    let graph = cfg(func);
    let doms = compute_dominators(func, &graph);
    verify_ssa(func, &doms).unwrap();

    let (expected, _) = run_function(&before, "last", vec![RValue::Int(10)]).unwrap();
    let (got, _) = run_function(&after, "last", vec![RValue::Int(10)]).unwrap();
    assert_eq!(expected, RValue::Int(9));
    assert_eq!(got, RValue::Int(9));
}

#[test]
fn ssa_removes_exactly_the_promotable_slots() {
    let module = parse_module(WHILE_WITH_CONDITIONAL_STORE).unwrap();
    let func = module.get_function("last").unwrap();
    let slots = ssa::find_allocas(func);
    assert_eq!(slots.len(), 2);

    let mut transformed = parse_module(WHILE_WITH_CONDITIONAL_STORE).unwrap();
    let func = transformed.get_function_mut("last").unwrap();
    ssa::promote(func).unwrap();
    // Every op of the original except the slots and their loads/stores
    // survives (φ pruning aside, which only removes φs this pass added).
    let func = transformed.get_function("last").unwrap();
    for name in ["c", "br", "c2", "br2", "inc", "j0", "j1", "j2", "r"] {
        assert!(
            func.result_op(name).is_some(),
            "op %{} went missing",
            name
        );
    }
    for name in ["i", "y", "s0", "sy", "si", "iv", "iv1", "iv2", "iv3", "yv"] {
        assert!(
            func.result_op(name).is_none(),
            "op %{} should have been promoted away",
            name
        );
    }
}

#[test]
fn return_normalization_leaves_one_ret_in_the_tail_block() {
    let mut module = parse_module(IF_THEN_ELSE).unwrap();
    let func = module.get_function_mut("clamp").unwrap();
    ret::normalize(func).unwrap();
    verify_function(func).unwrap();
    assert_eq!(count_ops(&module, "clamp", Opcode::Ret), 1);

    let func = module.get_function("clamp").unwrap();
    let exit = func.exitblock().unwrap();
    let term = func.terminator_of(exit).unwrap();
    assert_eq!(func.op(term).opcode, Opcode::Ret);
}

/// Scenario F: inlining `callee(i) = i * i` into a trivial caller, then
/// re-running SSA construction, collapses the caller to `[mul, ret]`.
#[test]
fn inlining_then_ssa_collapses_to_mul_ret() {
    let src = "\
function int32 callee(int32 %i) {
entry:
    %sq = (int32) mul(%i, %i)
    %r = (void) ret(%sq)
}

function int32 caller(int32 %i) {
entry:
    %x = (int32) call(callee, [%i])
    %r = (void) ret(%x)
}
";
    let mut module = parse_module(src).unwrap();
    let mut caller = module.take_function("caller").unwrap();
    let call = caller
        .op_ids()
        .into_iter()
        .find(|&op| caller.op(op).opcode == Opcode::Call)
        .unwrap();
    inline::inline(&mut caller, call, &module).unwrap();
    verify_function(&caller).unwrap();
    ssa::promote(&mut caller).unwrap();
    verify_function(&caller).unwrap();

    let blocks = caller.block_ids();
    assert_eq!(blocks.len(), 1, "blocks: {:?}", caller.block_ids());
    let opcodes: Vec<Opcode> = caller
        .ops_of(blocks[0])
        .into_iter()
        .map(|op| caller.op(op).opcode)
        .collect();
    assert_eq!(opcodes, vec![Opcode::Mul, Opcode::Ret]);

    module.put_function(caller);
    let (v, _) = run_function(&module, "caller", vec![RValue::Int(10)]).unwrap();
    assert_eq!(v, RValue::Int(100));
}

#[test]
fn inlining_equivalence_on_a_pure_callee() {
    let src = "\
function int32 poly(int32 %x) {
entry:
    %sq = (int32) mul(%x, %x)
    %t = (int32) add(%sq, %x)
    %r = (void) ret(%t)
}

function int32 caller(int32 %x) {
entry:
    %a = (int32) call(poly, [%x])
    %b = (int32) add(%a, 1:int32)
    %r = (void) ret(%b)
}
";
    let before = parse_module(src).unwrap();
    let mut after = parse_module(src).unwrap();
    let mut caller = after.take_function("caller").unwrap();
    let call = caller
        .op_ids()
        .into_iter()
        .find(|&op| caller.op(op).opcode == Opcode::Call)
        .unwrap();
    inline::inline(&mut caller, call, &after).unwrap();
    after.put_function(caller);

    for input in [-2, 0, 1, 7] {
        let (expected, _) = run_function(&before, "caller", vec![RValue::Int(input)]).unwrap();
        let (got, _) = run_function(&after, "caller", vec![RValue::Int(input)]).unwrap();
        assert_eq!(expected, got, "input {}", input);
    }
}
