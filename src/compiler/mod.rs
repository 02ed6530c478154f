use std::rc::Rc;

use tracing::debug;

use crate::bytecode::{Chunk, Instruction, MAX_REG, OpCode, PRIM_FALSE, PRIM_NIL, PRIM_TRUE, Reg};
use crate::value::Value;

pub mod regalloc;

use regalloc::{Mark, OutOfRegisters, RegAlloc};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("not enough arguments to {form}")]
    NotEnoughArguments { form: &'static str },
    #[error("too many arguments to {form}")]
    TooManyArguments { form: &'static str },
    #[error("def! target must be a symbol, got {type_name}")]
    InvalidDefTarget { type_name: &'static str },
    #[error("let* bindings must be a list or vector, got {type_name}")]
    LetBindingsNotSequence { type_name: &'static str },
    #[error("let* binding name must be a symbol, got {type_name}")]
    InvalidLetBinding { type_name: &'static str },
    #[error("let* bindings need an even number of forms")]
    OddLetBindings,
    #[error("expression needs more than {} registers", MAX_REG + 1)]
    TooManyRegisters,
    #[error("constant pool exceeds {} entries", u16::MAX as usize + 1)]
    TooManyConstants,
    #[error("{what} is not supported")]
    Unsupported { what: String },
}

impl From<OutOfRegisters> for CompileError {
    fn from(_: OutOfRegisters) -> Self {
        CompileError::TooManyRegisters
    }
}

type CompileResult<T> = Result<T, CompileError>;

// ── Expression descriptors ───────────────────────────────────────────

/// Where a compiled sub-expression's value lives before it is placed.
#[derive(Debug, Clone, PartialEq)]
enum ExpDesc {
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Keyword(Rc<str>),
    /// Name still to be looked up at run time.
    Global(Rc<str>),
    /// Bound variable living in a fixed register.
    Local(Reg),
    /// Result of the CALL at `pc`, left in `base`.
    Call { pc: usize, base: Reg },
    /// Instruction at this offset whose A operand is not yet decided.
    Relocable(usize),
    NonRelocable(Reg),
}

impl ExpDesc {
    fn is_literal(&self) -> bool {
        matches!(
            self,
            ExpDesc::Nil | ExpDesc::True | ExpDesc::False | ExpDesc::Int(_) | ExpDesc::Float(_)
                | ExpDesc::Str(_) | ExpDesc::Keyword(_)
        )
    }
}

// ── Per-function state ───────────────────────────────────────────────

#[derive(Debug)]
struct Variable {
    name: Rc<str>,
    reg: Reg,
}

/// Lexical block: variable count and allocator position at entry.
struct Scope {
    n_vars: usize,
    mark: Mark,
}

struct FuncState {
    chunk: Chunk,
    regs: RegAlloc,
    /// Indices into the compiler's variable table for this function's
    /// live variables, oldest first.
    var_map: Vec<usize>,
}

impl FuncState {
    fn new() -> Self {
        FuncState { chunk: Chunk::new(), regs: RegAlloc::new(), var_map: Vec::new() }
    }

    fn emit(&mut self, inst: Instruction) -> usize {
        self.chunk.emit(inst)
    }

    fn constant(&mut self, val: Value) -> CompileResult<u16> {
        self.chunk.add_constant(val).ok_or(CompileError::TooManyConstants)
    }

    /// Resolves pending lookups: globals become a relocable GLOBAL_GET,
    /// locals and call results become fixed registers.
    fn discharge(&mut self, e: ExpDesc) -> CompileResult<ExpDesc> {
        Ok(match e {
            ExpDesc::Global(name) => {
                let k = self.constant(Value::String(name))?;
                ExpDesc::Relocable(self.emit(Instruction::ad(OpCode::GlobalGet, 0, k)))
            }
            ExpDesc::Local(r) => ExpDesc::NonRelocable(r),
            ExpDesc::Call { pc, base } => {
                debug_assert_eq!(self.chunk.code[pc].op(), Ok(OpCode::Call));
                ExpDesc::NonRelocable(base)
            }
            other => other,
        })
    }

    fn load_constant(&mut self, r: Reg, val: Value) -> CompileResult<()> {
        let k = self.constant(val)?;
        self.emit(Instruction::ad(OpCode::Const, r, k));
        Ok(())
    }

    /// Places the value of `e` in register `r`.
    fn expr_to_reg(&mut self, e: ExpDesc, r: Reg) -> CompileResult<ExpDesc> {
        match self.discharge(e)? {
            ExpDesc::Nil => {
                self.emit(Instruction::ad(OpCode::Primitive, r, PRIM_NIL));
            }
            ExpDesc::True => {
                self.emit(Instruction::ad(OpCode::Primitive, r, PRIM_TRUE));
            }
            ExpDesc::False => {
                self.emit(Instruction::ad(OpCode::Primitive, r, PRIM_FALSE));
            }
            ExpDesc::Int(n) => self.load_constant(r, Value::Int(n))?,
            ExpDesc::Float(x) => self.load_constant(r, Value::Float(x))?,
            ExpDesc::Str(s) => self.load_constant(r, Value::String(s))?,
            ExpDesc::Keyword(k) => self.load_constant(r, Value::Keyword(k))?,
            ExpDesc::Relocable(pc) => self.chunk.code[pc].set_a(r),
            ExpDesc::NonRelocable(src) => {
                if src != r {
                    self.emit(Instruction::ad(OpCode::Mov, r, src as u16));
                }
            }
            ExpDesc::Global(_) | ExpDesc::Local(_) | ExpDesc::Call { .. } => {
                unreachable!("discharged descriptor still pending")
            }
        }
        Ok(ExpDesc::NonRelocable(r))
    }

    /// Places the value of `e` in a freshly reserved register, reusing the
    /// register it already occupies when that is the top temporary.
    fn expr_to_next_reg(&mut self, e: ExpDesc) -> CompileResult<Reg> {
        let e = self.discharge(e)?;
        if let ExpDesc::NonRelocable(r) = e {
            self.regs.free(r);
        }
        let r = self.regs.reserve(1)?;
        self.expr_to_reg(e, r)?;
        Ok(r)
    }

    fn expr_to_any_reg(&mut self, e: ExpDesc) -> CompileResult<Reg> {
        match self.discharge(e)? {
            ExpDesc::NonRelocable(r) => Ok(r),
            e => self.expr_to_next_reg(e),
        }
    }

    /// Evaluates `e` for its effects only.
    fn discard(&mut self, e: ExpDesc) -> CompileResult<()> {
        if e.is_literal() || matches!(e, ExpDesc::Local(_)) {
            return Ok(());
        }
        let r = self.expr_to_any_reg(e)?;
        self.regs.free(r);
        Ok(())
    }
}

// ── Compiler ─────────────────────────────────────────────────────────

struct Compiler {
    /// Variable table shared by every function being compiled.
    vars: Vec<Variable>,
    fs: FuncState,
}

impl Compiler {
    fn new() -> Self {
        Compiler { vars: Vec::new(), fs: FuncState::new() }
    }

    fn lookup(&self, name: &str) -> ExpDesc {
        let local = self.fs.var_map.iter().rev().map(|&i| &self.vars[i]).find(|v| &*v.name == name);
        match local {
            Some(v) => ExpDesc::Local(v.reg),
            // no enclosing function is ever compiled, so the chain ends here
            None => ExpDesc::Global(Rc::from(name)),
        }
    }

    fn begin_scope(&self) -> Scope {
        Scope { n_vars: self.fs.var_map.len(), mark: self.fs.regs.mark() }
    }

    fn end_scope(&mut self, scope: Scope) {
        assert!(self.fs.var_map.len() >= scope.n_vars, "scope closed twice");
        while self.fs.var_map.len() > scope.n_vars {
            self.fs.var_map.pop();
            self.vars.pop();
        }
        self.fs.regs.release_to(scope.mark);
    }

    fn declare(&mut self, name: Rc<str>, reg: Reg) {
        assert_eq!(reg as usize + 1, self.fs.regs.next(), "variable register must be the newest");
        self.fs.var_map.push(self.vars.len());
        self.vars.push(Variable { name, reg });
        self.fs.regs.pin();
    }

    fn expr(&mut self, node: &Value) -> CompileResult<ExpDesc> {
        Ok(match node {
            Value::Nil => ExpDesc::Nil,
            Value::Bool(true) => ExpDesc::True,
            Value::Bool(false) => ExpDesc::False,
            Value::Int(n) => ExpDesc::Int(*n),
            Value::Float(x) => ExpDesc::Float(*x),
            Value::String(s) => ExpDesc::Str(Rc::clone(s)),
            Value::Keyword(k) => ExpDesc::Keyword(Rc::clone(k)),
            Value::Symbol(s) => self.lookup(s),
            Value::List(items) => return self.list(items),
            Value::Vector(items) => return self.call(ExpDesc::Global(Rc::from("vec")), items),
            Value::Map(entries) => {
                let mut args = Vec::with_capacity(entries.len() * 2);
                for (k, v) in entries {
                    args.push(k.to_value());
                    args.push(v.clone());
                }
                return self.call(ExpDesc::Global(Rc::from("hash-map")), &args);
            }
            Value::Native(_) | Value::CallFrame(_) | Value::Error(_) => {
                return Err(CompileError::Unsupported {
                    what: format!("compiling a {} value", node.type_name()),
                });
            }
        })
    }

    fn list(&mut self, items: &[Value]) -> CompileResult<ExpDesc> {
        let Some(head) = items.first() else {
            let pc = self.fs.emit(Instruction::ad(OpCode::NewList, 0, 0));
            return Ok(ExpDesc::Relocable(pc));
        };
        match head.as_symbol() {
            Some("def!") => self.def(items),
            Some("let*") => self.let_form(items),
            Some("fn*") => Err(CompileError::Unsupported { what: "fn*".to_string() }),
            _ => {
                let f = self.expr(head)?;
                self.call(f, &items[1..])
            }
        }
    }

    /// `(def! name expr)`
    fn def(&mut self, items: &[Value]) -> CompileResult<ExpDesc> {
        match items.len() {
            3 => {}
            n if n < 3 => return Err(CompileError::NotEnoughArguments { form: "def!" }),
            _ => return Err(CompileError::TooManyArguments { form: "def!" }),
        }
        let name = items[1]
            .as_symbol()
            .ok_or(CompileError::InvalidDefTarget { type_name: items[1].type_name() })?;
        let e = self.expr(&items[2])?;
        let r = self.fs.expr_to_any_reg(e)?;
        let k = self.fs.constant(Value::string(name))?;
        self.fs.emit(Instruction::ad(OpCode::GlobalSet, r, k));
        Ok(ExpDesc::NonRelocable(r))
    }

    /// `(let* [name expr ...] body...)`
    fn let_form(&mut self, items: &[Value]) -> CompileResult<ExpDesc> {
        let Some(bindings) = items.get(1) else {
            return Ok(ExpDesc::Nil);
        };
        let pairs = bindings
            .as_seq()
            .ok_or(CompileError::LetBindingsNotSequence { type_name: bindings.type_name() })?;
        if pairs.len() % 2 != 0 {
            return Err(CompileError::OddLetBindings);
        }
        if let Some(bad) = pairs.iter().step_by(2).find(|n| n.as_symbol().is_none()) {
            return Err(CompileError::InvalidLetBinding { type_name: bad.type_name() });
        }

        let scope = self.begin_scope();
        let base = self.fs.regs.next();

        for pair in pairs.chunks(2) {
            let Value::Symbol(name) = &pair[0] else {
                unreachable!("binding names checked above")
            };
            // compiled before the name is visible: bindings are sequential
            let e = self.expr(&pair[1])?;
            let r = self.fs.expr_to_next_reg(e)?;
            self.declare(Rc::clone(name), r);
        }

        let body = &items[2..];
        let mut result = ExpDesc::Nil;
        for (i, form) in body.iter().enumerate() {
            result = self.expr(form)?;
            if i + 1 < body.len() {
                self.fs.discard(result)?;
                result = ExpDesc::Nil;
            }
        }

        // A result held in this scope's registers moves down to the base
        // register, which stays reserved after the scope closes.
        let owned = match result {
            ExpDesc::Local(r) | ExpDesc::NonRelocable(r) | ExpDesc::Call { base: r, .. } => r as usize >= base,
            _ => false,
        };
        if !owned {
            self.end_scope(scope);
            return Ok(result);
        }
        self.fs.regs.ensure_frame(base + 1)?;
        let base = Reg::try_from(base).map_err(|_| CompileError::TooManyRegisters)?;
        self.fs.expr_to_reg(result, base)?;
        self.end_scope(scope);
        let r = self.fs.regs.reserve(1)?;
        assert_eq!(r, base, "let* result register moved");
        Ok(ExpDesc::NonRelocable(r))
    }

    /// Calls `f` with `args`. Callee and arguments occupy a contiguous run
    /// of registers starting at the call's base.
    fn call(&mut self, f: ExpDesc, args: &[Value]) -> CompileResult<ExpDesc> {
        let base = self.fs.expr_to_next_reg(f)?;
        for arg in args {
            let e = self.expr(arg)?;
            self.fs.expr_to_next_reg(e)?;
        }
        let argc = u16::try_from(args.len()).map_err(|_| CompileError::TooManyRegisters)?;
        // the first argument slot receives the result, even with no arguments
        self.fs.regs.ensure_frame(base as usize + 2)?;
        let pc = self.fs.emit(Instruction::ad(OpCode::Call, base, argc));
        self.fs.regs.rewind_to(base as usize + 1);
        Ok(ExpDesc::Call { pc, base })
    }
}

/// Compiles one top-level form. On success the form's value ends up in
/// register 0 when the chunk runs.
pub fn compile(root: &Value) -> Result<Chunk, CompileError> {
    let mut c = Compiler::new();
    let e = c.expr(root)?;
    c.fs.expr_to_reg(e, 0)?;
    c.fs.regs.ensure_frame(1)?;

    let mut chunk = c.fs.chunk;
    chunk.frame_size = c.fs.regs.frame_size();
    debug!(
        instructions = chunk.code.len(),
        constants = chunk.constants.len(),
        frame_size = chunk.frame_size,
        "compiled chunk"
    );
    Ok(chunk)
}
