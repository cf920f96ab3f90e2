//! Positioned op emitter with structural helpers.
//!
//! A [`Builder`] holds a current block and an anchor within it. Op
//! factories validate the opcode schema, mint a fresh result name, insert
//! at the anchor, and advance the anchor past the new op. Scoped
//! positioning (`at_front`, `at_end`) restores the previous position when
//! the scope closure returns, errors included.

use crate::error::IrError;
use crate::function::Function;
use crate::id::{BlockId, OpId};
use crate::opcode::{check_args, Opcode};
use crate::types::Type;
use crate::value::{Constant, Operand, Value};

/// Insertion point within the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Before the first op.
    Head,
    /// After the last op.
    Tail,
    /// Directly after a specific op.
    After(OpId),
}

/// Blocks created by [`Builder::if_`] / [`Builder::ifelse`].
#[derive(Debug, Clone, Copy)]
pub struct IfBlocks {
    pub then_block: BlockId,
    /// `None` for a plain `if_`, where the false edge goes straight to
    /// `exit_block`.
    pub else_block: Option<BlockId>,
    pub exit_block: BlockId,
}

/// A positioned emitter over one function.
pub struct Builder<'f> {
    func: &'f mut Function,
    block: Option<BlockId>,
    anchor: Anchor,
}

impl<'f> Builder<'f> {
    /// Creates an unpositioned builder; position it before emitting.
    pub fn new(func: &'f mut Function) -> Builder<'f> {
        Builder {
            func,
            block: None,
            anchor: Anchor::Tail,
        }
    }

    pub fn func(&mut self) -> &mut Function {
        self.func
    }

    // -----------------------------------------------------------------------
    // Positioning
    // -----------------------------------------------------------------------

    pub fn position_at_beginning(&mut self, block: BlockId) {
        self.block = Some(block);
        self.anchor = Anchor::Head;
    }

    pub fn position_at_end(&mut self, block: BlockId) {
        self.block = Some(block);
        self.anchor = Anchor::Tail;
    }

    pub fn position_before(&mut self, op: OpId) {
        let block = self.func.op(op).block().expect("op is detached");
        self.block = Some(block);
        self.anchor = match self.prev_of(op) {
            Some(prev) => Anchor::After(prev),
            None => Anchor::Head,
        };
    }

    pub fn position_after(&mut self, op: OpId) {
        let block = self.func.op(op).block().expect("op is detached");
        self.block = Some(block);
        self.anchor = Anchor::After(op);
    }

    fn prev_of(&self, op: OpId) -> Option<OpId> {
        let block = self.func.op(op).block()?;
        let ops = self.func.ops_of(block);
        let pos = ops.iter().position(|&o| o == op)?;
        if pos == 0 {
            None
        } else {
            Some(ops[pos - 1])
        }
    }

    /// Runs `f` positioned at the front of `block`, restoring the previous
    /// position afterwards (also on error return).
    pub fn at_front<R>(&mut self, block: BlockId, f: impl FnOnce(&mut Builder<'f>) -> R) -> R {
        let saved = (self.block, self.anchor);
        self.position_at_beginning(block);
        let result = f(self);
        self.block = saved.0;
        self.anchor = saved.1;
        result
    }

    /// Runs `f` positioned at the end of `block`, restoring the previous
    /// position afterwards (also on error return).
    pub fn at_end<R>(&mut self, block: BlockId, f: impl FnOnce(&mut Builder<'f>) -> R) -> R {
        let saved = (self.block, self.anchor);
        self.position_at_end(block);
        let result = f(self);
        self.block = saved.0;
        self.anchor = saved.1;
        result
    }

    // -----------------------------------------------------------------------
    // Emission
    // -----------------------------------------------------------------------

    /// Emits one op at the current anchor after schema validation. Void
    /// opcodes get a `Void` result type regardless of `ty`.
    pub fn emit(&mut self, opcode: Opcode, ty: Type, args: Vec<Operand>) -> Result<OpId, IrError> {
        let block = self.block.ok_or(IrError::NotPositioned)?;
        check_args(opcode, &args)?;
        let id = self.func.new_op(opcode, ty, args, None);
        match self.anchor {
            Anchor::Head => {
                if let Some(&head) = self.func.ops_of(block).first() {
                    self.func.insert_op_before(id, head);
                } else {
                    self.func.append_op(block, id);
                }
            }
            Anchor::Tail => self.func.append_op(block, id),
            Anchor::After(anchor) => self.func.insert_op_after(id, anchor),
        }
        self.anchor = Anchor::After(id);
        Ok(id)
    }

    // Value-producing factories.

    /// `ty` is the pointer type of the new slot.
    pub fn alloca(&mut self, ty: Type) -> Result<OpId, IrError> {
        self.emit(Opcode::Alloca, ty, vec![])
    }

    pub fn load(&mut self, ty: Type, ptr: Value) -> Result<OpId, IrError> {
        self.emit(Opcode::Load, ty, vec![Operand::Value(ptr)])
    }

    pub fn phi(
        &mut self,
        ty: Type,
        blocks: Vec<BlockId>,
        values: Vec<Value>,
    ) -> Result<OpId, IrError> {
        let blocks = blocks.into_iter().map(Value::Block).collect();
        self.emit(
            Opcode::Phi,
            ty,
            vec![Operand::List(blocks), Operand::List(values)],
        )
    }

    pub fn call(&mut self, ty: Type, func: Value, args: Vec<Value>) -> Result<OpId, IrError> {
        self.emit(
            Opcode::Call,
            ty,
            vec![Operand::Value(func), Operand::List(args)],
        )
    }

    pub fn convert(&mut self, ty: Type, value: Value) -> Result<OpId, IrError> {
        self.emit(Opcode::Convert, ty, vec![Operand::Value(value)])
    }

    pub fn not_(&mut self, value: Value) -> Result<OpId, IrError> {
        self.emit(Opcode::Not, Type::Bool, vec![Operand::Value(value)])
    }

    pub fn getfield(&mut self, ty: Type, value: Value, field: Constant) -> Result<OpId, IrError> {
        self.emit(
            Opcode::Getfield,
            ty,
            vec![Operand::Value(value), Operand::Value(Value::Const(field))],
        )
    }

    pub fn getindex(&mut self, ty: Type, value: Value, index: Value) -> Result<OpId, IrError> {
        self.emit(
            Opcode::Getindex,
            ty,
            vec![Operand::Value(value), Operand::Value(index)],
        )
    }

    pub fn exc_setup(&mut self, handlers: Vec<BlockId>) -> Result<OpId, IrError> {
        let handlers = handlers.into_iter().map(Value::Block).collect();
        self.emit(Opcode::ExcSetup, Type::Opaque, vec![Operand::List(handlers)])
    }

    pub fn exc_catch(&mut self, types: Vec<Value>) -> Result<OpId, IrError> {
        self.emit(Opcode::ExcCatch, Type::Exception, vec![Operand::List(types)])
    }

    // Void factories.

    pub fn store(&mut self, value: Value, ptr: Value) -> Result<OpId, IrError> {
        self.emit(
            Opcode::Store,
            Type::Void,
            vec![Operand::Value(value), Operand::Value(ptr)],
        )
    }

    pub fn jump(&mut self, target: BlockId) -> Result<OpId, IrError> {
        self.emit(
            Opcode::Jump,
            Type::Void,
            vec![Operand::Value(Value::Block(target))],
        )
    }

    pub fn cbranch(
        &mut self,
        cond: Value,
        if_true: BlockId,
        if_false: BlockId,
    ) -> Result<OpId, IrError> {
        self.emit(
            Opcode::Cbranch,
            Type::Void,
            vec![
                Operand::Value(cond),
                Operand::Value(Value::Block(if_true)),
                Operand::Value(Value::Block(if_false)),
            ],
        )
    }

    pub fn ret(&mut self, value: Option<Value>) -> Result<OpId, IrError> {
        let args = match value {
            Some(v) => vec![Operand::Value(v)],
            None => vec![],
        };
        self.emit(Opcode::Ret, Type::Void, args)
    }

    pub fn exc_throw(&mut self, exc: Value) -> Result<OpId, IrError> {
        self.emit(Opcode::ExcThrow, Type::Void, vec![Operand::Value(exc)])
    }

    pub fn print(&mut self, value: Value) -> Result<OpId, IrError> {
        self.emit(Opcode::Print, Type::Void, vec![Operand::Value(value)])
    }

    // -----------------------------------------------------------------------
    // Structural helpers
    // -----------------------------------------------------------------------

    /// Splits the current block at the anchor: trailing ops move to a new
    /// successor block inserted right after it. With `terminate`, a `jump`
    /// to the new block is appended unless the old block already ends in a
    /// terminator. Returns `(old_block, new_block)`.
    pub fn splitblock(
        &mut self,
        name: Option<&str>,
        terminate: bool,
    ) -> Result<(BlockId, BlockId), IrError> {
        let cur = self.block.ok_or(IrError::NotPositioned)?;
        let newblock = self.func.add_block_after(name.unwrap_or("block"), cur);

        let trailing: Vec<OpId> = match self.anchor {
            Anchor::Tail => Vec::new(),
            Anchor::Head => self.func.ops_of(cur),
            Anchor::After(op) => {
                let ops = self.func.ops_of(cur);
                let pos = ops
                    .iter()
                    .position(|&o| o == op)
                    .expect("anchor op left its block");
                ops[pos + 1..].to_vec()
            }
        };
        for &op in &trailing {
            self.func.unlink(op);
        }
        for &op in &trailing {
            self.func.append_op(newblock, op);
        }

        if terminate && self.func.terminator_of(cur).is_none() {
            self.at_end(cur, |b| b.jump(newblock))?;
        }
        Ok((cur, newblock))
    }

    /// Splits at the anchor and wires an `if`: `cbranch(cond, then, exit)`.
    /// The caller fills the then-branch and jumps to `exit_block`.
    pub fn if_(&mut self, cond: Value) -> Result<IfBlocks, IrError> {
        let (prev, exit) = self.splitblock(Some("if.exit"), false)?;
        let then_block = self.func.add_block_after("if.then", prev);
        self.at_end(prev, |b| b.cbranch(cond, then_block, exit))?;
        Ok(IfBlocks {
            then_block,
            else_block: None,
            exit_block: exit,
        })
    }

    /// Splits at the anchor and wires an `if`/`else`:
    /// `cbranch(cond, then, else)`. The caller fills both branches and
    /// jumps each to `exit_block`.
    pub fn ifelse(&mut self, cond: Value) -> Result<IfBlocks, IrError> {
        let (prev, exit) = self.splitblock(Some("if.exit"), false)?;
        let then_block = self.func.add_block_after("if.then", prev);
        let else_block = self.func.add_block_after("if.else", then_block);
        self.at_end(prev, |b| b.cbranch(cond, then_block, else_block))?;
        Ok(IfBlocks {
            then_block,
            else_block: Some(else_block),
            exit_block: exit,
        })
    }

    /// Generates a counted loop over `[start, stop)` with the given step
    /// (defaults 0 and 1). An index slot is allocated in the entry block;
    /// the condition block loads, advances, and compares with a strict
    /// less-than. The builder is left positioned at the beginning of the
    /// body. Returns `(cond_block, body_block, exit_block)`.
    pub fn gen_loop(
        &mut self,
        start: Option<Value>,
        stop: Value,
        step: Option<Value>,
    ) -> Result<(BlockId, BlockId, BlockId), IrError> {
        self.block.ok_or(IrError::NotPositioned)?;
        let ty = self
            .func
            .value_type(&stop)
            .ok_or_else(|| IrError::verify("gen_loop", "stop value must be typed"))?;
        let start = start.unwrap_or(Value::Const(Constant::int(0, ty.clone())));
        let step = step.unwrap_or(Value::Const(Constant::int(1, ty.clone())));
        let entry = self.func.startblock().ok_or(IrError::NotPositioned)?;

        let var = self.at_front(entry, |b| b.alloca(Type::pointer(ty.clone())))?;

        let (prev, exit) = self.splitblock(Some("loop.exit"), false)?;
        let cond = self.func.add_block_after("loop.cond", prev);
        let body = self.func.add_block_after("loop.body", cond);

        self.at_end(prev, |b| -> Result<(), IrError> {
            b.store(start, Value::Op(var))?;
            b.jump(cond)?;
            Ok(())
        })?;

        self.at_front(cond, |b| -> Result<(), IrError> {
            let index = b.load(ty.clone(), Value::Op(var))?;
            let next = b.add(ty.clone(), Value::Op(index), step)?;
            b.store(Value::Op(next), Value::Op(var))?;
            let in_range = b.lt(Value::Op(index), stop)?;
            b.cbranch(Value::Op(in_range), body, exit)?;
            Ok(())
        })?;

        self.at_end(body, |b| b.jump(cond))?;
        self.position_at_beginning(body);
        Ok((cond, body, exit))
    }
}

macro_rules! binary_factories {
    ($($method:ident => $opcode:ident;)+) => {
        impl<'f> Builder<'f> {
            $(
                pub fn $method(&mut self, ty: Type, lhs: Value, rhs: Value) -> Result<OpId, IrError> {
                    self.emit(Opcode::$opcode, ty, vec![Operand::Value(lhs), Operand::Value(rhs)])
                }
            )+
        }
    };
}

macro_rules! compare_factories {
    ($($method:ident => $opcode:ident;)+) => {
        impl<'f> Builder<'f> {
            $(
                pub fn $method(&mut self, lhs: Value, rhs: Value) -> Result<OpId, IrError> {
                    self.emit(Opcode::$opcode, Type::Bool, vec![Operand::Value(lhs), Operand::Value(rhs)])
                }
            )+
        }
    };
}

binary_factories! {
    add => Add;
    sub => Sub;
    mul => Mul;
    div => Div;
    mod_ => Mod;
    bitand => Bitand;
    bitor => Bitor;
    bitxor => Bitxor;
}

compare_factories! {
    eq => Eq;
    noteq => Noteq;
    lt => Lt;
    lte => Lte;
    gt => Gt;
    gte => Gte;
}
