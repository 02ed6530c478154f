//! One compiled unit: the instruction stream and its constant pool.

use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::{Instruction, OpCode, PRIM_FALSE, PRIM_NIL, PRIM_TRUE};
use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    pub code: Vec<Instruction>,
    pub constants: Vec<Value>,
    /// Registers the frame needs; the caller's stack must hold at least this many.
    pub frame_size: usize,
}

impl Chunk {
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Appends a constant and returns its index. Constants are never
    /// deduplicated; `None` once the 16-bit pool is full.
    pub fn add_constant(&mut self, val: Value) -> Option<u16> {
        let idx = u16::try_from(self.constants.len()).ok()?;
        self.constants.push(val);
        Some(idx)
    }

    pub fn emit(&mut self, inst: Instruction) -> usize {
        let idx = self.code.len();
        self.code.push(inst);
        idx
    }

    fn describe(&self, inst: Instruction) -> String {
        match inst.op() {
            Ok(op) if op.uses_constant() => match self.constants.get(inst.d() as usize) {
                Some(k) => format!("; {k}"),
                None => "; <bad constant>".to_string(),
            },
            Ok(OpCode::Primitive) => match inst.d() {
                PRIM_NIL => "; nil".to_string(),
                PRIM_TRUE => "; true".to_string(),
                PRIM_FALSE => "; false".to_string(),
                _ => "; <bad primitive>".to_string(),
            },
            Ok(OpCode::Call) => format!("; {} arg(s)", inst.d()),
            _ => String::new(),
        }
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; frame size {}", self.frame_size)?;
        writeln!(f, "= constants")?;
        for (i, k) in self.constants.iter().enumerate() {
            writeln!(f, "{i:>4}  {k}")?;
        }
        writeln!(f, "= code")?;
        for (offset, inst) in self.code.iter().enumerate() {
            let name = match inst.op() {
                Ok(op) => op.name().to_string(),
                Err(op) => format!("?{op:#04x}"),
            };
            let line = format!("{offset:>4}  {name:<10} {:>3} {:>5}  {}", inst.a(), inst.d(), self.describe(*inst));
            writeln!(f, "{}", line.trim_end())?;
        }
        Ok(())
    }
}

impl Serialize for Chunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let constants: Vec<String> = self.constants.iter().map(|k| k.to_string()).collect();
        let mut s = serializer.serialize_struct("Chunk", 3)?;
        s.serialize_field("frame_size", &self.frame_size)?;
        s.serialize_field("constants", &constants)?;
        s.serialize_field("code", &self.code)?;
        s.end()
    }
}
