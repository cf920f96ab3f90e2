//! Functions: op and block arenas, the def/use index, and edit primitives.
//!
//! A [`Function`] owns a single arena of [`Operation`]s and one of blocks,
//! addressed by dense ids. Blocks store an intrusive doubly-linked op list;
//! the function stores a doubly-linked block list. The back-references from
//! op to block and the def/use index are non-owning ids, which keeps the
//! cyclic shape of the IR (ops ↔ ops via φ, blocks ↔ ops) free of ownership
//! cycles.
//!
//! The def/use index is the single source of truth for uses: every mutation
//! primitive (`append_op`, `insert_op_before`, `set_args`, `replace_uses`,
//! `delete_op`, `unlink`, ...) updates it synchronously. Callers that edit
//! args behind the primitives' back must call [`Function::reset_uses`]
//! before any subsequent analysis.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use smallvec::SmallVec;

use crate::error::IrError;
use crate::id::{ArgId, BlockId, OpId};
use crate::opcode::Opcode;
use crate::types::Type;
use crate::value::{ConstValue, Operand, UseKey, Value};

/// Mints collision-free names. One per function (results and block labels
/// share it) and one per module (function and global names).
///
/// The first request for a name yields it verbatim; later requests yield
/// `name_N` suffixes. Requests for the empty string yield bare counters.
#[derive(Debug, Clone, Default)]
pub struct Temper {
    counts: HashMap<String, u32>,
    seen: HashSet<String>,
}

impl Temper {
    pub fn new() -> Temper {
        Temper::default()
    }

    /// Returns a fresh name based on `name`.
    pub fn mint(&mut self, name: &str) -> String {
        loop {
            let count = self.counts.entry(name.to_string()).or_insert(0);
            let n = *count;
            *count += 1;
            let candidate = if name.is_empty() {
                n.to_string()
            } else if n == 0 {
                name.to_string()
            } else {
                format!("{}_{}", name, n)
            };
            // A minted suffix can collide with a name that was requested
            // verbatim earlier (or vice versa); keep counting past those.
            if self.seen.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// A named, typed function argument.
#[derive(Debug, Clone, PartialEq)]
pub struct FuncArg {
    pub name: String,
    pub ty: Type,
}

/// A typed n-ary operation, e.g. `%2 = (int32) add(%0, %1)`.
#[derive(Debug, Clone)]
pub struct Operation {
    pub opcode: Opcode,
    /// Result type; `Void` for void ops.
    pub ty: Type,
    /// Per-op metadata consumed by later passes (`exc.badval`, ...).
    pub metadata: indexmap::IndexMap<String, ConstValue>,
    pub(crate) args: SmallVec<[Operand; 2]>,
    pub(crate) result: String,
    pub(crate) block: Option<BlockId>,
    pub(crate) prev: Option<OpId>,
    pub(crate) next: Option<OpId>,
}

impl Operation {
    pub fn args(&self) -> &[Operand] {
        &self.args
    }

    /// The unique result name of this op within its function.
    pub fn result(&self) -> &str {
        &self.result
    }

    /// The containing block, or `None` while detached.
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }

    pub fn is_leader(&self) -> bool {
        self.opcode.is_leader()
    }
}

/// A basic block: a named doubly-linked list of operations.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) name: String,
    pub(crate) head: Option<OpId>,
    pub(crate) tail: Option<OpId>,
    pub(crate) prev: Option<BlockId>,
    pub(crate) next: Option<BlockId>,
}

impl Block {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

/// Specification of a replacement op for [`Function::replace_op`].
#[derive(Debug, Clone)]
pub struct OpSpec {
    pub opcode: Opcode,
    pub ty: Type,
    pub args: Vec<Operand>,
    /// Explicit result name; the entry carrying the replaced op's result
    /// name rewrites it in place, preserving def/use identity.
    pub result: Option<String>,
}

/// A function: typed arguments, an ordered list of blocks, and the def/use
/// index over its operations.
#[derive(Debug, Clone)]
pub struct Function {
    name: String,
    ty: Type,
    args: Vec<FuncArg>,
    ops: Vec<Option<Operation>>,
    blocks: Vec<Option<Block>>,
    first_block: Option<BlockId>,
    last_block: Option<BlockId>,
    uses: HashMap<UseKey, IndexSet<OpId>>,
    results: HashMap<String, OpId>,
    block_names: HashMap<String, BlockId>,
    temper: Temper,
}

impl Function {
    /// Creates an empty function. `ty` must be a `Function` type whose
    /// argument count matches `argnames`; names must be unique.
    pub fn new(
        name: impl Into<String>,
        ty: Type,
        argnames: Vec<String>,
    ) -> Result<Function, IrError> {
        let argtypes = match &ty {
            Type::Function { argtypes, .. } => argtypes.clone(),
            other => {
                return Err(IrError::SignatureMismatch {
                    message: format!("expected a function type, got {}", other),
                })
            }
        };
        if argtypes.len() != argnames.len() {
            return Err(IrError::SignatureMismatch {
                message: format!(
                    "{} argument name(s) for {} argument type(s)",
                    argnames.len(),
                    argtypes.len()
                ),
            });
        }
        let mut temper = Temper::new();
        let mut args = Vec::with_capacity(argnames.len());
        for (name, ty) in argnames.into_iter().zip(argtypes) {
            if temper.mint(&name) != name {
                return Err(IrError::DuplicateName { name });
            }
            args.push(FuncArg { name, ty });
        }
        Ok(Function {
            name: name.into(),
            ty,
            args,
            ops: Vec::new(),
            blocks: Vec::new(),
            first_block: None,
            last_block: None,
            uses: HashMap::new(),
            results: HashMap::new(),
            block_names: HashMap::new(),
            temper,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The function's `Function` type.
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// The declared return type.
    pub fn restype(&self) -> &Type {
        match &self.ty {
            Type::Function { restype, .. } => restype,
            _ => unreachable!("the constructor only accepts function types"),
        }
    }

    pub fn args(&self) -> &[FuncArg] {
        &self.args
    }

    pub fn arg(&self, id: ArgId) -> &FuncArg {
        &self.args[id.index()]
    }

    /// Looks up an argument by name, yielding its [`Value`].
    pub fn arg_value(&self, name: &str) -> Option<Value> {
        self.args
            .iter()
            .position(|a| a.name == name)
            .map(|i| Value::Arg(ArgId(i as u32)))
    }

    /// Mints a fresh name from this function's temper.
    pub fn temp(&mut self, hint: &str) -> String {
        self.temper.mint(hint)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The operation with the given id. Panics on a stale id.
    pub fn op(&self, id: OpId) -> &Operation {
        self.ops[id.index()].as_ref().expect("stale op id")
    }

    /// Mutable access to an op's opcode, type, or metadata. Args must be
    /// changed through [`Function::set_args`].
    pub fn op_mut(&mut self, id: OpId) -> &mut Operation {
        self.ops[id.index()].as_mut().expect("stale op id")
    }

    /// Whether `id` names a live (non-deleted) op. Useful when walking a
    /// snapshot across deletions.
    pub fn op_exists(&self, id: OpId) -> bool {
        self.ops.get(id.index()).is_some_and(|slot| slot.is_some())
    }

    /// The block with the given id. Panics on a stale id.
    pub fn block(&self, id: BlockId) -> &Block {
        self.blocks[id.index()].as_ref().expect("stale block id")
    }

    fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.blocks[id.index()].as_mut().expect("stale block id")
    }

    pub fn block_exists(&self, id: BlockId) -> bool {
        self.blocks.get(id.index()).is_some_and(|slot| slot.is_some())
    }

    /// Finds a block by label.
    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.block_names.get(name).copied()
    }

    /// Finds an op by result name.
    pub fn result_op(&self, name: &str) -> Option<OpId> {
        self.results.get(name).copied()
    }

    /// The entry block (head of the block list).
    pub fn startblock(&self) -> Option<BlockId> {
        self.first_block
    }

    /// The exit block (tail of the block list, by position).
    pub fn exitblock(&self) -> Option<BlockId> {
        self.last_block
    }

    /// Block ids in list order. A snapshot: safe to mutate while walking.
    pub fn block_ids(&self) -> Vec<BlockId> {
        let mut out = Vec::new();
        let mut cur = self.first_block;
        while let Some(b) = cur {
            out.push(b);
            cur = self.block(b).next;
        }
        out
    }

    /// Op ids of one block, in list order. A snapshot.
    pub fn ops_of(&self, block: BlockId) -> Vec<OpId> {
        let mut out = Vec::new();
        let mut cur = self.block(block).head;
        while let Some(op) = cur {
            out.push(op);
            cur = self.op(op).next;
        }
        out
    }

    /// All op ids, blocks in list order, ops in block order. A snapshot.
    pub fn op_ids(&self) -> Vec<OpId> {
        self.block_ids()
            .into_iter()
            .flat_map(|b| self.ops_of(b))
            .collect()
    }

    /// The leader prefix of a block (`phi`, `exc_setup`, `exc_catch`).
    pub fn leaders_of(&self, block: BlockId) -> Vec<OpId> {
        let mut out = Vec::new();
        let mut cur = self.block(block).head;
        while let Some(op) = cur {
            if !self.op(op).is_leader() {
                break;
            }
            out.push(op);
            cur = self.op(op).next;
        }
        out
    }

    /// The block's terminator, if its last op is one.
    pub fn terminator_of(&self, block: BlockId) -> Option<OpId> {
        self.block(block)
            .tail
            .filter(|&op| self.op(op).is_terminator())
    }

    /// Successor blocks implied by the block's terminator: `jump` and
    /// `cbranch` name their targets, `ret` has none, and `exc_throw`
    /// targets every handler named by the block's `exc_setup` leaders
    /// (none if the block sets up no handlers).
    pub fn terminator_targets(&self, block: BlockId) -> Vec<BlockId> {
        let Some(term) = self.terminator_of(block) else {
            return Vec::new();
        };
        let op = self.op(term);
        match op.opcode {
            Opcode::Jump => op.args[0].values().filter_map(Value::as_block).collect(),
            Opcode::Cbranch => op.args[1..]
                .iter()
                .flat_map(Operand::values)
                .filter_map(Value::as_block)
                .collect(),
            Opcode::Ret => Vec::new(),
            Opcode::ExcThrow => self
                .leaders_of(block)
                .into_iter()
                .filter(|&l| self.op(l).opcode == Opcode::ExcSetup)
                .flat_map(|l| {
                    self.op(l).args[0]
                        .values()
                        .filter_map(Value::as_block)
                        .collect::<Vec<_>>()
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The type of a value in this function's scope, when derivable
    /// without the module (globals and function refs yield `None`).
    pub fn value_type(&self, value: &Value) -> Option<Type> {
        match value {
            Value::Arg(id) => Some(self.arg(*id).ty.clone()),
            Value::Op(id) => Some(self.op(*id).ty.clone()),
            Value::Const(c) => Some(c.ty.clone()),
            Value::Undef(ty) => Some(ty.clone()),
            Value::Block(_) | Value::Global(_) | Value::Func(_) => None,
        }
    }

    /// The ops using `value`, in deterministic (insertion) order. Empty for
    /// untracked values.
    pub fn uses(&self, value: &Value) -> Vec<OpId> {
        value
            .use_key()
            .and_then(|k| self.uses.get(&k))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of ops using `value`.
    pub fn use_count(&self, value: &Value) -> usize {
        value
            .use_key()
            .and_then(|k| self.uses.get(&k))
            .map_or(0, IndexSet::len)
    }

    // -----------------------------------------------------------------------
    // Block mutation
    // -----------------------------------------------------------------------

    /// Appends a new block at the tail. The label is uniquified through the
    /// function temper.
    pub fn add_block(&mut self, name: &str) -> BlockId {
        let id = self.alloc_block(name);
        match self.last_block {
            Some(last) => {
                self.block_mut(last).next = Some(id);
                self.block_mut(id).prev = Some(last);
            }
            None => self.first_block = Some(id),
        }
        self.last_block = Some(id);
        id
    }

    /// Inserts a new block directly after `after`.
    pub fn add_block_after(&mut self, name: &str, after: BlockId) -> BlockId {
        let id = self.alloc_block(name);
        let next = self.block(after).next;
        self.block_mut(after).next = Some(id);
        self.block_mut(id).prev = Some(after);
        self.block_mut(id).next = next;
        match next {
            Some(n) => self.block_mut(n).prev = Some(id),
            None => self.last_block = Some(id),
        }
        id
    }

    fn alloc_block(&mut self, name: &str) -> BlockId {
        let name = self.temper.mint(name);
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Some(Block {
            name: name.clone(),
            head: None,
            tail: None,
            prev: None,
            next: None,
        }));
        self.block_names.insert(name, id);
        id
    }

    /// Moves an existing block so it sits directly after `after` in the
    /// block list. Ops and uses are untouched; only the ordering changes.
    pub fn move_block_after(&mut self, block: BlockId, after: BlockId) {
        if block == after || self.block(after).next == Some(block) {
            return;
        }
        // Unhook from the current position.
        let (prev, next) = {
            let b = self.block(block);
            (b.prev, b.next)
        };
        match prev {
            Some(p) => self.block_mut(p).next = next,
            None => self.first_block = next,
        }
        match next {
            Some(n) => self.block_mut(n).prev = prev,
            None => self.last_block = prev,
        }
        // Re-link after the anchor.
        let anchor_next = self.block(after).next;
        self.block_mut(after).next = Some(block);
        self.block_mut(block).prev = Some(after);
        self.block_mut(block).next = anchor_next;
        match anchor_next {
            Some(n) => self.block_mut(n).prev = Some(block),
            None => self.last_block = Some(block),
        }
    }

    /// Detaches and frees an empty, unused block. Fails with `InUse` while
    /// ops still reference it and with a verify error while it has ops.
    pub fn del_block(&mut self, id: BlockId) -> Result<(), IrError> {
        if self.block(id).head.is_some() {
            return Err(IrError::verify(
                format!("block {}", self.block(id).name),
                "cannot delete a non-empty block",
            ));
        }
        let count = self.use_count(&Value::Block(id));
        if count > 0 {
            return Err(IrError::InUse {
                name: self.block(id).name.clone(),
                count,
            });
        }
        let (prev, next) = {
            let b = self.block(id);
            (b.prev, b.next)
        };
        match prev {
            Some(p) => self.block_mut(p).next = next,
            None => self.first_block = next,
        }
        match next {
            Some(n) => self.block_mut(n).prev = prev,
            None => self.last_block = prev,
        }
        let name = self.block(id).name.clone();
        self.block_names.remove(&name);
        self.uses.remove(&UseKey::Block(id));
        self.blocks[id.index()] = None;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Op creation and attachment
    // -----------------------------------------------------------------------

    /// Creates a detached op. The result name is minted through the temper
    /// (pass `None` for a bare counter name). Attach it with
    /// [`Function::append_op`] or the insert primitives.
    pub fn new_op(
        &mut self,
        opcode: Opcode,
        ty: Type,
        args: Vec<Operand>,
        result: Option<&str>,
    ) -> OpId {
        let ty = if opcode.is_void() { Type::Void } else { ty };
        let result = self.temper.mint(result.unwrap_or(""));
        let id = OpId(self.ops.len() as u32);
        self.ops.push(Some(Operation {
            opcode,
            ty,
            metadata: indexmap::IndexMap::new(),
            args: args.into(),
            result: result.clone(),
            block: None,
            prev: None,
            next: None,
        }));
        self.results.insert(result, id);
        id
    }

    /// Appends a detached op at the end of `block`, registering its uses.
    pub fn append_op(&mut self, block: BlockId, op: OpId) {
        debug_assert!(self.op(op).block.is_none(), "op is already attached");
        let tail = self.block(block).tail;
        match tail {
            Some(t) => {
                self.op_mut(t).next = Some(op);
                self.op_mut(op).prev = Some(t);
            }
            None => self.block_mut(block).head = Some(op),
        }
        self.block_mut(block).tail = Some(op);
        self.op_mut(op).block = Some(block);
        self.add_uses(op);
    }

    /// Inserts a detached op directly before `anchor`, registering its uses.
    pub fn insert_op_before(&mut self, op: OpId, anchor: OpId) {
        debug_assert!(self.op(op).block.is_none(), "op is already attached");
        let block = self.op(anchor).block.expect("anchor is detached");
        let prev = self.op(anchor).prev;
        self.op_mut(anchor).prev = Some(op);
        self.op_mut(op).next = Some(anchor);
        self.op_mut(op).prev = prev;
        match prev {
            Some(p) => self.op_mut(p).next = Some(op),
            None => self.block_mut(block).head = Some(op),
        }
        self.op_mut(op).block = Some(block);
        self.add_uses(op);
    }

    /// Inserts a detached op directly after `anchor`, registering its uses.
    pub fn insert_op_after(&mut self, op: OpId, anchor: OpId) {
        debug_assert!(self.op(op).block.is_none(), "op is already attached");
        let block = self.op(anchor).block.expect("anchor is detached");
        let next = self.op(anchor).next;
        self.op_mut(anchor).next = Some(op);
        self.op_mut(op).prev = Some(anchor);
        self.op_mut(op).next = next;
        match next {
            Some(n) => self.op_mut(n).prev = Some(op),
            None => self.block_mut(block).tail = Some(op),
        }
        self.op_mut(op).block = Some(block);
        self.add_uses(op);
    }

    /// Detaches an op from its block without deleting it. Its uses of other
    /// values are unregistered until it is re-attached; uses *of* it remain.
    pub fn unlink(&mut self, op: OpId) {
        let Some(block) = self.op(op).block else {
            return;
        };
        self.remove_uses(op);
        let (prev, next) = {
            let o = self.op(op);
            (o.prev, o.next)
        };
        match prev {
            Some(p) => self.op_mut(p).next = next,
            None => self.block_mut(block).head = next,
        }
        match next {
            Some(n) => self.op_mut(n).prev = prev,
            None => self.block_mut(block).tail = prev,
        }
        let o = self.op_mut(op);
        o.block = None;
        o.prev = None;
        o.next = None;
    }

    /// Deletes an op. Fails with `InUse` while other ops still use it.
    pub fn delete_op(&mut self, op: OpId) -> Result<(), IrError> {
        let count = self.use_count(&Value::Op(op));
        if count > 0 {
            return Err(IrError::InUse {
                name: self.op(op).result.clone(),
                count,
            });
        }
        self.unlink(op);
        let result = self.op(op).result.clone();
        self.results.remove(&result);
        self.uses.remove(&UseKey::Op(op));
        self.ops[op.index()] = None;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Arg mutation
    // -----------------------------------------------------------------------

    /// Replaces an op's args atomically. The use index is updated from the
    /// symmetric difference of the old and new referenced-value sets.
    pub fn set_args(&mut self, op: OpId, args: Vec<Operand>) {
        if self.op(op).block.is_none() {
            self.op_mut(op).args = args.into();
            return;
        }
        let old = self.arg_keys(op);
        self.op_mut(op).args = args.into();
        let new = self.arg_keys(op);
        for key in old.difference(&new) {
            if let Some(set) = self.uses.get_mut(key) {
                set.shift_remove(&op);
            }
        }
        for key in new.difference(&old) {
            self.uses.entry(*key).or_default().insert(op);
        }
    }

    /// Rewrites an op in place: new opcode and args, optionally a new type.
    /// The result name, identity, and position are preserved.
    pub fn rewrite(&mut self, op: OpId, opcode: Opcode, args: Vec<Operand>, ty: Option<Type>) {
        self.set_args(op, args);
        let o = self.op_mut(op);
        o.opcode = opcode;
        if let Some(ty) = ty {
            o.ty = ty;
        } else if opcode.is_void() {
            o.ty = Type::Void;
        }
    }

    /// Substitutes `dst` for `src` in the args of every op using `src`,
    /// including inside inner lists. Does not delete `src`.
    pub fn replace_uses(&mut self, src: &Value, dst: &Value) {
        let Some(key) = src.use_key() else {
            return;
        };
        let users: Vec<OpId> = self
            .uses
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        for user in users {
            let new_args: Vec<Operand> = self
                .op(user)
                .args
                .iter()
                .cloned()
                .map(|mut arg| {
                    for v in arg.values_mut() {
                        if v.use_key() == Some(key) {
                            *v = dst.clone();
                        }
                    }
                    arg
                })
                .collect();
            self.set_args(user, new_args);
        }
    }

    /// Splices `specs` in place of `op`. The entry carrying `op`'s result
    /// name rewrites `op` itself (preserving def/use identity); the others
    /// become new ops around that position. Without a carrier, `op` is
    /// deleted after the new ops are inserted (failing with `InUse` if it
    /// still has uses). Returns the ids, in spec order, with the carrier
    /// mapped to `op`.
    pub fn replace_op(&mut self, op: OpId, specs: Vec<OpSpec>) -> Result<Vec<OpId>, IrError> {
        let result = self.op(op).result.clone();
        let carrier = specs
            .iter()
            .position(|s| s.result.as_deref() == Some(result.as_str()));
        let mut ids = Vec::with_capacity(specs.len());
        match carrier {
            Some(ci) => {
                for (i, spec) in specs.into_iter().enumerate() {
                    if i == ci {
                        self.rewrite(op, spec.opcode, spec.args, Some(spec.ty));
                        ids.push(op);
                    } else {
                        let id =
                            self.new_op(spec.opcode, spec.ty, spec.args, spec.result.as_deref());
                        if i < ci {
                            self.insert_op_before(id, op);
                        } else {
                            // After the carrier: chain behind the previous insert.
                            let anchor = *ids.last().expect("carrier precedes");
                            self.insert_op_after(id, anchor);
                        }
                        ids.push(id);
                    }
                }
            }
            None => {
                for spec in specs {
                    let id = self.new_op(spec.opcode, spec.ty, spec.args, spec.result.as_deref());
                    self.insert_op_before(id, op);
                    ids.push(id);
                }
                self.delete_op(op)?;
            }
        }
        Ok(ids)
    }

    /// Recomputes the whole def/use index from the attached ops. For
    /// callers that bypassed the mutation primitives.
    pub fn reset_uses(&mut self) {
        self.uses.clear();
        for op in self.op_ids() {
            self.add_uses(op);
        }
    }

    fn arg_keys(&self, op: OpId) -> HashSet<UseKey> {
        self.op(op)
            .args
            .iter()
            .flat_map(Operand::values)
            .filter_map(Value::use_key)
            .collect()
    }

    fn add_uses(&mut self, op: OpId) {
        let keys = self.arg_keys(op);
        for key in keys {
            self.uses.entry(key).or_default().insert(op);
        }
    }

    fn remove_uses(&mut self, op: OpId) {
        let keys = self.arg_keys(op);
        for key in keys {
            if let Some(set) = self.uses.get_mut(&key) {
                set.shift_remove(&op);
            }
        }
    }

    /// Internal integrity check: compares the maintained index against a
    /// recomputation. Used by the verifier.
    pub(crate) fn uses_consistent(&self) -> Result<(), (String, String)> {
        let mut fresh: HashMap<UseKey, IndexSet<OpId>> = HashMap::new();
        for op in self.op_ids() {
            for key in self.arg_keys(op) {
                fresh.entry(key).or_default().insert(op);
            }
        }
        for (key, set) in &fresh {
            let have = self.uses.get(key);
            if have.map_or(true, |h| h != set) {
                return Err((
                    format!("{:?}", key),
                    "use index is missing or stale for this value".to_string(),
                ));
            }
        }
        for (key, set) in &self.uses {
            if !set.is_empty() && fresh.get(key).map_or(true, |f| f != set) {
                return Err((
                    format!("{:?}", key),
                    "use index records uses that do not exist".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// True when `self.op_exists(id)` holds for every op arg of `op`.
    pub(crate) fn args_resolve(&self, op: OpId) -> bool {
        self.op(op)
            .args
            .iter()
            .flat_map(Operand::values)
            .all(|v| match v {
                Value::Op(id) => self.op_exists(*id),
                Value::Block(id) => self.block_exists(*id),
                Value::Arg(id) => id.index() < self.args.len(),
                _ => true,
            })
    }
}
