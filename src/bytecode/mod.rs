use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

pub mod chunk;
pub use chunk::Chunk;

/// Register index within the current frame window.
pub type Reg = u8;

/// Largest register index a frame may use.
pub const MAX_REG: usize = Reg::MAX as usize;

// ── Opcodes ──────────────────────────────────────────────────────────
//
// ABC mode:  [OP:8 | A:8 | B:8 | C:8]
// AD mode:   [OP:8 | A:8 | D:16]   (D little-endian in bytes 2..3)
//
// Every opcode in the current set is AD mode.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// R[A] = K[D]
    Const = 0,
    /// R[A] = globals[K[D]]
    GlobalGet = 1,
    /// globals[K[D]] = R[A]
    GlobalSet = 2,
    /// R[A] = empty list with room for D elements
    NewList = 3,
    /// call R[A] with D arguments in R[A+1..=A+D]; result lands in R[A]
    Call = 4,
    /// R[A] = R[D]
    Mov = 5,
    /// R[A] = primitive D (nil/true/false)
    Primitive = 6,
}

impl OpCode {
    pub fn name(self) -> &'static str {
        match self {
            OpCode::Const => "CONST",
            OpCode::GlobalGet => "GLOBAL_GET",
            OpCode::GlobalSet => "GLOBAL_SET",
            OpCode::NewList => "NEW_LIST",
            OpCode::Call => "CALL",
            OpCode::Mov => "MOV",
            OpCode::Primitive => "PRIMITIVE",
        }
    }

    /// Whether operand D indexes the constant pool.
    pub fn uses_constant(self) -> bool {
        matches!(self, OpCode::Const | OpCode::GlobalGet | OpCode::GlobalSet)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(op: u8) -> Result<Self, u8> {
        Ok(match op {
            0 => OpCode::Const,
            1 => OpCode::GlobalGet,
            2 => OpCode::GlobalSet,
            3 => OpCode::NewList,
            4 => OpCode::Call,
            5 => OpCode::Mov,
            6 => OpCode::Primitive,
            _ => return Err(op),
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Operands of `PRIMITIVE`.
pub const PRIM_NIL: u16 = 1;
pub const PRIM_TRUE: u16 = 2;
pub const PRIM_FALSE: u16 = 3;

// ── Instruction encoding ────────────────────────────────────────────

/// A 4-byte instruction. `to_le_bytes()` yields `[op, A, B, C]`.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Instruction(u32);

impl Instruction {
    #[inline(always)]
    pub fn abc(op: OpCode, a: Reg, b: Reg, c: Reg) -> Self {
        Instruction(op as u32 | (a as u32) << 8 | (b as u32) << 16 | (c as u32) << 24)
    }

    #[inline(always)]
    pub fn ad(op: OpCode, a: Reg, d: u16) -> Self {
        Instruction(op as u32 | (a as u32) << 8 | (d as u32) << 16)
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Instruction(u32::from_le_bytes(bytes))
    }

    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    #[inline(always)]
    pub fn raw_op(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn op(self) -> Result<OpCode, u8> {
        OpCode::try_from(self.raw_op())
    }

    #[inline(always)]
    pub fn a(self) -> Reg {
        ((self.0 >> 8) & 0xFF) as u8
    }

    #[inline(always)]
    pub fn b(self) -> Reg {
        ((self.0 >> 16) & 0xFF) as u8
    }

    #[inline(always)]
    pub fn c(self) -> Reg {
        (self.0 >> 24) as u8
    }

    #[inline(always)]
    pub fn d(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Rewrites the destination register in place.
    pub fn set_a(&mut self, a: Reg) {
        self.0 = (self.0 & 0xFFFF_00FF) | (a as u32) << 8;
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op() {
            Ok(op) => write!(f, "{} {} {}", op, self.a(), self.d()),
            Err(op) => write!(f, "<bad opcode {op}> {:#010x}", self.0),
        }
    }
}

impl Serialize for Instruction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Instruction", 3)?;
        match self.op() {
            Ok(op) => s.serialize_field("op", op.name())?,
            Err(_) => s.serialize_field("op", &self.raw_op())?,
        }
        s.serialize_field("a", &self.a())?;
        s.serialize_field("d", &self.d())?;
        s.end()
    }
}
