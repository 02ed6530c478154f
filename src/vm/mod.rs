use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::bytecode::{Chunk, MAX_REG, OpCode, PRIM_FALSE, PRIM_NIL, PRIM_TRUE, Reg};
use crate::value::{CallFrame, Value};

pub mod natives;

/// Global environment: name → value. Seeded with the native table and
/// extended by `def!`.
pub type Globals = HashMap<String, Value>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown global: {name}")]
    UnknownGlobal { name: String },
    #[error("cannot call a value of type {type_name}")]
    NotCallable { type_name: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    IntegerOverflow,
    #[error("unknown opcode: {op}")]
    UnknownOpcode { op: u8 },
    #[error("unknown primitive: {code}")]
    InvalidPrimitive { code: u16 },
    #[error("stack too small: frame needs {needed} registers, {available} available")]
    StackTooSmall { needed: usize, available: usize },
    #[error("{0}")]
    Type(String),
}

type VmResult<T> = Result<T, RuntimeError>;

// ── Native calling convention ────────────────────────────────────────

/// View of the stack handed to a native procedure: its arguments start at
/// slot 0, and slot 0 receives the return value.
pub struct NativeCall<'a> {
    window: &'a mut [Value],
    argc: usize,
}

impl<'a> NativeCall<'a> {
    pub fn new(window: &'a mut [Value], argc: usize) -> Self {
        assert!(window.len() >= argc.max(1), "native call window smaller than its arguments");
        NativeCall { window, argc }
    }

    pub fn argc(&self) -> usize {
        self.argc
    }

    pub fn args(&self) -> &[Value] {
        &self.window[..self.argc]
    }

    /// Moves the arguments out, leaving nil behind.
    pub fn take_args(&mut self) -> Vec<Value> {
        self.window[..self.argc]
            .iter_mut()
            .map(|v| std::mem::replace(v, Value::Nil))
            .collect()
    }

    pub fn ret(&mut self, val: Value) {
        self.window[0] = val;
    }
}

// ── VM ───────────────────────────────────────────────────────────────

struct VM<'a> {
    chunk: &'a Chunk,
    globals: &'a mut Globals,
    stack: &'a mut [Value],
    /// Register zero of the current frame.
    top: usize,
    /// One past the last register the chunk may touch.
    limit: usize,
}

/// Runs `chunk` to completion. The value the compiler placed in register 0
/// is left in `stack[0]`.
pub fn execute(chunk: &Chunk, globals: &mut Globals, stack: &mut [Value]) -> VmResult<()> {
    if stack.len() < chunk.frame_size {
        return Err(RuntimeError::StackTooSmall { needed: chunk.frame_size, available: stack.len() });
    }
    let limit = chunk.frame_size;
    VM { chunk, globals, stack, top: 0, limit }.run()
}

impl<'a> VM<'a> {
    #[inline]
    fn slot(&self, r: Reg) -> usize {
        let idx = self.top + r as usize;
        assert!(idx < self.limit, "register {r} outside the frame window ({} registers)", self.limit);
        idx
    }

    /// MOV carries its source register in the 16-bit D operand.
    #[inline]
    fn slot_d(&self, d: u16) -> usize {
        assert!(d as usize <= MAX_REG, "register operand {d} out of range");
        self.slot(d as Reg)
    }

    #[inline]
    fn constant(&self, d: u16) -> &'a Value {
        let chunk: &'a Chunk = self.chunk;
        assert!((d as usize) < chunk.constants.len(), "constant {d} outside the pool");
        &chunk.constants[d as usize]
    }

    fn global_name(&self, d: u16) -> VmResult<&'a str> {
        match self.constant(d) {
            Value::String(s) => Ok(&**s),
            other => Err(RuntimeError::Type(format!("global name must be a string constant, got {}", other.type_name()))),
        }
    }

    fn run(&mut self) -> VmResult<()> {
        let chunk: &'a Chunk = self.chunk;
        let code = &chunk.code;
        let mut ip = 0;

        while ip < code.len() {
            let inst = code[ip];
            trace!(ip, ?inst, "exec");
            ip += 1;
            let op = inst.op().map_err(|op| RuntimeError::UnknownOpcode { op })?;

            match op {
                OpCode::Const => {
                    let a = self.slot(inst.a());
                    self.stack[a] = self.constant(inst.d()).clone();
                }
                OpCode::GlobalGet => {
                    let a = self.slot(inst.a());
                    let name = self.global_name(inst.d())?;
                    let val = self.globals.get(name)
                        .ok_or_else(|| RuntimeError::UnknownGlobal { name: name.to_string() })?;
                    self.stack[a] = val.clone();
                }
                OpCode::GlobalSet => {
                    let a = self.slot(inst.a());
                    let name = self.global_name(inst.d())?;
                    debug!(name, "define global");
                    self.globals.insert(name.to_string(), self.stack[a].clone());
                }
                OpCode::NewList => {
                    let a = self.slot(inst.a());
                    self.stack[a] = Value::List(Vec::with_capacity(inst.d() as usize));
                }
                OpCode::Mov => {
                    let a = self.slot(inst.a());
                    let d = self.slot_d(inst.d());
                    self.stack[a] = self.stack[d].clone();
                }
                OpCode::Primitive => {
                    let a = self.slot(inst.a());
                    self.stack[a] = match inst.d() {
                        PRIM_NIL => Value::Nil,
                        PRIM_TRUE => Value::Bool(true),
                        PRIM_FALSE => Value::Bool(false),
                        code => return Err(RuntimeError::InvalidPrimitive { code }),
                    };
                }
                OpCode::Call => {
                    ip = self.call(inst.a(), inst.d() as usize, ip)?;
                }
            }
        }
        Ok(())
    }

    /// Dispatches a CALL and returns the instruction pointer to resume at.
    fn call(&mut self, a: Reg, argc: usize, return_ip: usize) -> VmResult<usize> {
        let base = self.slot(a);
        let proc = match &self.stack[base] {
            Value::Native(p) => *p,
            other => return Err(RuntimeError::NotCallable { type_name: other.type_name() }),
        };
        // The first argument slot doubles as the return slot, so it must
        // exist even for zero-argument calls.
        assert!(base + 1 + argc.max(1) <= self.limit, "call arguments outside the frame window");

        let frame = Rc::new(CallFrame {
            return_ip,
            stack_offset: a as usize + 1,
            callee: Value::Native(proc),
        });
        self.stack[base] = Value::CallFrame(Rc::clone(&frame));
        self.top += frame.stack_offset;

        debug!(name = proc.name, argc, "native call");
        let (start, end) = (self.top, self.limit);
        let mut call = NativeCall::new(&mut self.stack[start..end], argc);
        (proc.func)(&mut call)?;

        let result = std::mem::replace(&mut self.stack[self.top], Value::Nil);
        self.top -= frame.stack_offset;
        self.stack[base] = result;
        Ok(frame.return_ip)
    }
}

// ── Tests ────────────────────────────────────────────────────────────
