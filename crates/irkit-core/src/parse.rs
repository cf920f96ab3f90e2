//! Parser for the canonical textual IR.
//!
//! Reads the format emitted by [`crate::pretty`]: globals, then functions
//! of labeled blocks with one op per line. Comments (`;` to end of line)
//! and blank lines are tolerated and not preserved.
//!
//! Ops are constructed in two phases: all blocks and ops are created
//! first with empty args, then every operand is resolved and patched in.
//! That makes forward references (jumps to later blocks, φs over later
//! ops) work without special cases.

use std::collections::HashSet;

use crate::error::IrError;
use crate::function::Function;
use crate::module::{GlobalValue, Module};
use crate::opcode::{check_args, Opcode};
use crate::types::{DimOrder, Type};
use crate::value::{ConstValue, Constant, Operand, Value};

/// Parses a whole module from textual IR.
pub fn parse_module(source: &str) -> Result<Module, IrError> {
    Parser::new(source)?.module()
}

/// Parses a single type, e.g. `ptr[int32]`. Used by tests and tools.
pub fn parse_type(source: &str) -> Result<Type, IrError> {
    let mut parser = Parser::new(source)?;
    let ty = parser.ty()?;
    parser.expect_eof()?;
    Ok(ty)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    /// `%name`
    Local(String),
    Int(i64),
    Float(f64),
    Str(String),
    Punct(char),
    Eof,
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    line: usize,
    column: usize,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied();
        if let Some(c) = c {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn err(&self, message: impl Into<String>) -> IrError {
        IrError::Parse {
            line: self.line,
            column: self.column,
            message: message.into(),
        }
    }

    fn take_word(&mut self) -> String {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                word.push(c);
                self.bump();
            } else {
                break;
            }
        }
        word
    }
}

fn lex(source: &str) -> Result<Vec<Spanned>, IrError> {
    let mut lx = Lexer::new(source);
    let mut toks = Vec::new();

    while let Some(ch) = lx.peek() {
        let start_line = lx.line;
        let start_column = lx.column;

        if ch.is_whitespace() {
            lx.bump();
            continue;
        }
        if ch == ';' {
            while let Some(c) = lx.peek() {
                if c == '\n' {
                    break;
                }
                lx.bump();
            }
            continue;
        }

        let tok = if ch == '%' {
            lx.bump();
            let name = lx.take_word();
            if name.is_empty() {
                return Err(lx.err("expected a name after '%'"));
            }
            Tok::Local(name)
        } else if ch.is_ascii_digit() || ch == '-' {
            let mut text = String::new();
            if ch == '-' {
                text.push('-');
                lx.bump();
                if lx.peek() == Some('i') {
                    let word = lx.take_word();
                    if word != "inf" {
                        return Err(lx.err(format!("unexpected '-{}'", word)));
                    }
                    toks.push(Spanned {
                        tok: Tok::Float(f64::NEG_INFINITY),
                        line: start_line,
                        column: start_column,
                    });
                    continue;
                }
            }
            let mut is_float = false;
            while let Some(c) = lx.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    lx.bump();
                } else if c == '.' || c == 'e' || c == 'E' {
                    is_float = true;
                    text.push(c);
                    lx.bump();
                    if (c == 'e' || c == 'E') && lx.peek() == Some('-') {
                        text.push('-');
                        lx.bump();
                    }
                } else {
                    break;
                }
            }
            if is_float {
                match text.parse::<f64>() {
                    Ok(v) => Tok::Float(v),
                    Err(_) => return Err(lx.err(format!("bad float literal '{}'", text))),
                }
            } else {
                match text.parse::<i64>() {
                    Ok(v) => Tok::Int(v),
                    Err(_) => return Err(lx.err(format!("bad integer literal '{}'", text))),
                }
            }
        } else if ch == '"' {
            lx.bump();
            let mut s = String::new();
            loop {
                match lx.bump() {
                    Some('"') => break,
                    Some('\\') => match lx.bump() {
                        Some('n') => s.push('\n'),
                        Some('t') => s.push('\t'),
                        Some('"') => s.push('"'),
                        Some('\\') => s.push('\\'),
                        other => return Err(lx.err(format!("bad escape '\\{:?}'", other))),
                    },
                    Some(c) => s.push(c),
                    None => return Err(lx.err("unterminated string literal")),
                }
            }
            Tok::Str(s)
        } else if ch.is_alphabetic() || ch == '_' {
            Tok::Ident(lx.take_word())
        } else if "(){}[],=:".contains(ch) {
            lx.bump();
            Tok::Punct(ch)
        } else {
            return Err(lx.err(format!("unexpected character '{}'", ch)));
        };

        toks.push(Spanned {
            tok,
            line: start_line,
            column: start_column,
        });
    }

    toks.push(Spanned {
        tok: Tok::Eof,
        line: lx.line,
        column: lx.column,
    });
    Ok(toks)
}

// ---------------------------------------------------------------------------
// Parsed forms (phase 1)
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum POperand {
    Local(String),
    Ref(String),
    Const(Constant),
    Undef(Type),
    List(Vec<POperand>),
}

#[derive(Debug)]
struct POp {
    result: String,
    ty: Type,
    opcode: Opcode,
    operands: Vec<POperand>,
    line: usize,
    column: usize,
}

#[derive(Debug)]
struct PBlock {
    name: String,
    ops: Vec<POp>,
    line: usize,
    column: usize,
}

#[derive(Debug)]
struct PFunc {
    name: String,
    restype: Type,
    args: Vec<(Type, String)>,
    blocks: Vec<PBlock>,
    line: usize,
    column: usize,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    toks: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn new(source: &str) -> Result<Parser, IrError> {
        Ok(Parser {
            toks: lex(source)?,
            pos: 0,
        })
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn here(&self) -> (usize, usize) {
        let s = &self.toks[self.pos];
        (s.line, s.column)
    }

    fn error(&self, message: impl Into<String>) -> IrError {
        let (line, column) = self.here();
        IrError::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Tok {
        let tok = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect_punct(&mut self, p: char) -> Result<(), IrError> {
        match self.bump() {
            Tok::Punct(c) if c == p => Ok(()),
            other => Err(self.error(format!("expected '{}', got {:?}", p, other))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, IrError> {
        match self.bump() {
            Tok::Ident(s) => Ok(s),
            other => Err(self.error(format!("expected an identifier, got {:?}", other))),
        }
    }

    fn expect_local(&mut self) -> Result<String, IrError> {
        match self.bump() {
            Tok::Local(s) => Ok(s),
            other => Err(self.error(format!("expected a %name, got {:?}", other))),
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<(), IrError> {
        match self.bump() {
            Tok::Ident(s) if s == kw => Ok(()),
            other => Err(self.error(format!("expected '{}', got {:?}", kw, other))),
        }
    }

    fn expect_int(&mut self) -> Result<i64, IrError> {
        match self.bump() {
            Tok::Int(v) => Ok(v),
            other => Err(self.error(format!("expected an integer, got {:?}", other))),
        }
    }

    fn expect_eof(&mut self) -> Result<(), IrError> {
        match self.peek() {
            Tok::Eof => Ok(()),
            other => Err(self.error(format!("trailing input: {:?}", other))),
        }
    }

    // -- types ------------------------------------------------------------

    fn ty(&mut self) -> Result<Type, IrError> {
        let name = self.expect_ident()?;
        let ty = match name.as_str() {
            "void" => Type::Void,
            "bool" => Type::Bool,
            "int8" => Type::int8(),
            "int16" => Type::int16(),
            "int32" => Type::int32(),
            "int64" => Type::int64(),
            "uint8" => Type::uint8(),
            "uint16" => Type::uint16(),
            "uint32" => Type::uint32(),
            "uint64" => Type::uint64(),
            "float32" => Type::float32(),
            "float64" => Type::float64(),
            "bytes" => Type::Bytes,
            "exception" => Type::Exception,
            "opaque" => Type::Opaque,
            "ptr" => {
                self.expect_punct('[')?;
                let base = self.ty()?;
                self.expect_punct(']')?;
                Type::pointer(base)
            }
            "array" => {
                self.expect_punct('[')?;
                let base = self.ty()?;
                self.expect_punct(',')?;
                let ndim = self.expect_int()?;
                self.expect_punct(',')?;
                let order = match self.expect_ident()?.as_str() {
                    "C" => DimOrder::C,
                    "F" => DimOrder::F,
                    "A" => DimOrder::A,
                    other => return Err(self.error(format!("bad dim order '{}'", other))),
                };
                self.expect_punct(']')?;
                Type::Array {
                    base: Box::new(base),
                    ndim: ndim as u8,
                    order,
                }
            }
            "struct" => {
                self.expect_punct('[')?;
                let mut names = Vec::new();
                let mut types = Vec::new();
                if self.peek() != &Tok::Punct(']') {
                    loop {
                        names.push(self.expect_ident()?);
                        self.expect_punct(':')?;
                        types.push(self.ty()?);
                        if self.peek() == &Tok::Punct(',') {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_punct(']')?;
                Type::Struct { names, types }
            }
            "tuple" => {
                self.expect_punct('[')?;
                let mut bases = Vec::new();
                if self.peek() != &Tok::Punct(']') {
                    loop {
                        bases.push(self.ty()?);
                        if self.peek() == &Tok::Punct(',') {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_punct(']')?;
                Type::Tuple { bases }
            }
            "list" => {
                self.expect_punct('[')?;
                let base = self.ty()?;
                self.expect_punct(',')?;
                let count = self.expect_int()?;
                self.expect_punct(']')?;
                Type::List {
                    base: Box::new(base),
                    count,
                }
            }
            "dict" => {
                self.expect_punct('[')?;
                let key = self.ty()?;
                self.expect_punct(',')?;
                let value = self.ty()?;
                self.expect_punct(',')?;
                let count = self.expect_int()?;
                self.expect_punct(']')?;
                Type::Dict {
                    key: Box::new(key),
                    value: Box::new(value),
                    count,
                }
            }
            "func" => {
                self.expect_punct('[')?;
                let restype = self.ty()?;
                let mut argtypes = Vec::new();
                while self.peek() == &Tok::Punct(',') {
                    self.bump();
                    argtypes.push(self.ty()?);
                }
                self.expect_punct(']')?;
                Type::function(restype, argtypes)
            }
            "typedef" => {
                self.expect_punct('[')?;
                let name = self.expect_ident()?;
                self.expect_punct(',')?;
                let base = self.ty()?;
                self.expect_punct(']')?;
                Type::typedef(name, base)
            }
            other => return Err(self.error(format!("unknown type '{}'", other))),
        };
        Ok(ty)
    }

    // -- module structure --------------------------------------------------

    fn module(&mut self) -> Result<Module, IrError> {
        let mut globals = Vec::new();
        let mut funcs = Vec::new();
        loop {
            match self.peek().clone() {
                Tok::Eof => break,
                Tok::Ident(kw) if kw == "global" => {
                    self.bump();
                    let name = self.expect_local()?;
                    self.expect_punct('=')?;
                    let ty = self.ty()?;
                    globals.push((name, ty));
                }
                Tok::Ident(kw) if kw == "function" => {
                    funcs.push(self.function()?);
                }
                other => {
                    return Err(self.error(format!(
                        "expected 'global' or 'function', got {:?}",
                        other
                    )))
                }
            }
        }
        build_module(globals, funcs)
    }

    fn function(&mut self) -> Result<PFunc, IrError> {
        let (line, column) = self.here();
        self.expect_keyword("function")?;
        let restype = self.ty()?;
        let name = self.expect_ident()?;
        self.expect_punct('(')?;
        let mut args = Vec::new();
        if self.peek() != &Tok::Punct(')') {
            loop {
                let ty = self.ty()?;
                let argname = self.expect_local()?;
                args.push((ty, argname));
                if self.peek() == &Tok::Punct(',') {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        self.expect_punct('{')?;

        let mut blocks: Vec<PBlock> = Vec::new();
        loop {
            match self.peek().clone() {
                Tok::Punct('}') => {
                    self.bump();
                    break;
                }
                Tok::Ident(label) => {
                    let (line, column) = self.here();
                    self.bump();
                    self.expect_punct(':')?;
                    blocks.push(PBlock {
                        name: label,
                        ops: Vec::new(),
                        line,
                        column,
                    });
                }
                Tok::Local(_) => {
                    let op = self.op()?;
                    match blocks.last_mut() {
                        Some(block) => block.ops.push(op),
                        None => return Err(self.error("op before the first block label")),
                    }
                }
                other => {
                    return Err(self.error(format!(
                        "expected a block label, an op, or '}}', got {:?}",
                        other
                    )))
                }
            }
        }

        Ok(PFunc {
            name,
            restype,
            args,
            blocks,
            line,
            column,
        })
    }

    fn op(&mut self) -> Result<POp, IrError> {
        let (line, column) = self.here();
        let result = self.expect_local()?;
        self.expect_punct('=')?;
        self.expect_punct('(')?;
        let ty = self.ty()?;
        self.expect_punct(')')?;
        let opname = self.expect_ident()?;
        let opcode = Opcode::parse(&opname)
            .ok_or_else(|| self.error(format!("unknown opcode '{}'", opname)))?;
        self.expect_punct('(')?;
        let mut operands = Vec::new();
        if self.peek() != &Tok::Punct(')') {
            loop {
                operands.push(self.operand(true)?);
                if self.peek() == &Tok::Punct(',') {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect_punct(')')?;
        Ok(POp {
            result,
            ty,
            opcode,
            operands,
            line,
            column,
        })
    }

    fn operand(&mut self, allow_list: bool) -> Result<POperand, IrError> {
        match self.peek().clone() {
            Tok::Local(name) => {
                self.bump();
                Ok(POperand::Local(name))
            }
            Tok::Punct('[') if allow_list => {
                self.bump();
                let mut items = Vec::new();
                if self.peek() != &Tok::Punct(']') {
                    loop {
                        items.push(self.operand(false)?);
                        if self.peek() == &Tok::Punct(',') {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect_punct(']')?;
                Ok(POperand::List(items))
            }
            Tok::Int(v) => {
                self.bump();
                self.expect_punct(':')?;
                let ty = self.ty()?;
                let value = if ty.is_real() {
                    ConstValue::Real(v as f64)
                } else {
                    ConstValue::Int(v)
                };
                Ok(POperand::Const(Constant::new(value, ty)))
            }
            Tok::Float(v) => {
                self.bump();
                self.expect_punct(':')?;
                let ty = self.ty()?;
                Ok(POperand::Const(Constant::new(ConstValue::Real(v), ty)))
            }
            Tok::Str(s) => {
                self.bump();
                self.expect_punct(':')?;
                let ty = self.ty()?;
                Ok(POperand::Const(Constant::new(ConstValue::Str(s), ty)))
            }
            Tok::Ident(name) => {
                self.bump();
                if self.peek() == &Tok::Punct(':') {
                    self.bump();
                    let ty = self.ty()?;
                    match name.as_str() {
                        "undef" => Ok(POperand::Undef(ty)),
                        "true" => Ok(POperand::Const(Constant::new(ConstValue::Bool(true), ty))),
                        "false" => Ok(POperand::Const(Constant::new(ConstValue::Bool(false), ty))),
                        "inf" if ty.is_real() => Ok(POperand::Const(Constant::new(
                            ConstValue::Real(f64::INFINITY),
                            ty,
                        ))),
                        "NaN" if ty.is_real() => Ok(POperand::Const(Constant::new(
                            ConstValue::Real(f64::NAN),
                            ty,
                        ))),
                        _ if ty.is_exception() => {
                            Ok(POperand::Const(Constant::new(ConstValue::Exc(name), ty)))
                        }
                        _ => Err(self.error(format!("bad literal '{}:{}'", name, ty))),
                    }
                } else {
                    Ok(POperand::Ref(name))
                }
            }
            other => Err(self.error(format!("expected an operand, got {:?}", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Building (phase 2)
// ---------------------------------------------------------------------------

fn build_module(globals: Vec<(String, Type)>, funcs: Vec<PFunc>) -> Result<Module, IrError> {
    let mut module = Module::new();
    for (name, ty) in globals {
        module.add_global(GlobalValue::new(name, ty))?;
    }
    let func_names: HashSet<String> = funcs.iter().map(|f| f.name.clone()).collect();
    let global_names: HashSet<String> = module.globals().map(|g| g.name.clone()).collect();
    for pfunc in funcs {
        let func = build_function(pfunc, &func_names, &global_names)?;
        module.add_function(func)?;
    }
    Ok(module)
}

fn build_function(
    pfunc: PFunc,
    func_names: &HashSet<String>,
    global_names: &HashSet<String>,
) -> Result<Function, IrError> {
    let parse_err = |line, column, message: String| IrError::Parse {
        line,
        column,
        message,
    };

    let argtypes: Vec<Type> = pfunc.args.iter().map(|(ty, _)| ty.clone()).collect();
    let argnames: Vec<String> = pfunc.args.iter().map(|(_, name)| name.clone()).collect();
    let mut func = Function::new(
        pfunc.name,
        Type::function(pfunc.restype, argtypes),
        argnames,
    )?;

    // First create every block and every op (with empty args), so forward
    // references resolve in the second pass.
    for pblock in &pfunc.blocks {
        let id = func.add_block(&pblock.name);
        if func.block(id).name() != pblock.name {
            return Err(parse_err(
                pblock.line,
                pblock.column,
                format!("duplicate block label '{}'", pblock.name),
            ));
        }
        for pop in &pblock.ops {
            let op = func.new_op(pop.opcode, pop.ty.clone(), Vec::new(), Some(&pop.result));
            if func.op(op).result() != pop.result {
                return Err(parse_err(
                    pop.line,
                    pop.column,
                    format!("duplicate result name '%{}'", pop.result),
                ));
            }
            func.append_op(id, op);
        }
    }

    // Second pass: resolve operands and patch the args in.
    for pblock in &pfunc.blocks {
        for pop in &pblock.ops {
            let op = func
                .result_op(&pop.result)
                .expect("op was created in the first pass");
            let mut args = Vec::with_capacity(pop.operands.len());
            for operand in &pop.operands {
                args.push(resolve_operand(
                    &func,
                    operand,
                    func_names,
                    global_names,
                    pop.line,
                    pop.column,
                )?);
            }
            check_args(pop.opcode, &args)?;
            func.set_args(op, args);
        }
    }

    Ok(func)
}

fn resolve_operand(
    func: &Function,
    operand: &POperand,
    func_names: &HashSet<String>,
    global_names: &HashSet<String>,
    line: usize,
    column: usize,
) -> Result<Operand, IrError> {
    Ok(match operand {
        POperand::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(resolve_value(func, item, func_names, global_names, line, column)?);
            }
            Operand::List(values)
        }
        single => Operand::Value(resolve_value(
            func,
            single,
            func_names,
            global_names,
            line,
            column,
        )?),
    })
}

fn resolve_value(
    func: &Function,
    operand: &POperand,
    func_names: &HashSet<String>,
    global_names: &HashSet<String>,
    line: usize,
    column: usize,
) -> Result<Value, IrError> {
    let parse_err = |message: String| IrError::Parse {
        line,
        column,
        message,
    };
    Ok(match operand {
        POperand::Const(c) => Value::Const(c.clone()),
        POperand::Undef(ty) => Value::Undef(ty.clone()),
        POperand::Local(name) => {
            if let Some(op) = func.result_op(name) {
                Value::Op(op)
            } else if let Some(arg) = func.arg_value(name) {
                arg
            } else if global_names.contains(name) {
                Value::Global(name.clone())
            } else {
                return Err(parse_err(format!("unknown value '%{}'", name)));
            }
        }
        POperand::Ref(name) => {
            if let Some(block) = func.find_block(name) {
                Value::Block(block)
            } else if func_names.contains(name) {
                Value::Func(name.clone())
            } else {
                return Err(parse_err(format!("unknown block or function '{}'", name)));
            }
        }
        POperand::List(_) => {
            return Err(parse_err("operand lists nest only one level".to_string()))
        }
    })
}
