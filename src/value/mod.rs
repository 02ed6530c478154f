use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::vm::{NativeCall, RuntimeError};

/// Signature every host procedure follows. Arguments sit in the call's
/// stack window; the procedure leaves its result in the first argument slot.
pub type NativeFn = fn(&mut NativeCall<'_>) -> Result<(), RuntimeError>;

/// Map keys are strings or keywords. The two never collide, so `"a"` and
/// `:a` are distinct entries. Keywords sort first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Keyword(Rc<str>),
    Str(Rc<str>),
}

impl MapKey {
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Keyword(k) => Value::Keyword(Rc::clone(k)),
            MapKey::Str(s) => Value::String(Rc::clone(s)),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Keyword(k) => write!(f, ":{k}"),
            MapKey::Str(s) => write_escaped(f, s),
        }
    }
}

pub type MapEntries = BTreeMap<MapKey, Value>;

#[derive(Clone, Copy)]
pub struct NativeProcedure {
    pub name: &'static str,
    pub func: NativeFn,
}

impl NativeProcedure {
    pub fn new(name: &'static str, func: NativeFn) -> Self {
        NativeProcedure { name, func }
    }
}

impl fmt::Debug for NativeProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeProcedure({})", self.name)
    }
}

// Procedures are identified by their registered name.
impl PartialEq for NativeProcedure {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Pushed into the callee's register while a CALL is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    pub return_ip: usize,
    pub stack_offset: usize,
    pub callee: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    /// Name without the leading `:`.
    Keyword(Rc<str>),
    Symbol(Rc<str>),
    List(Vec<Value>),
    Vector(Vec<Value>),
    Map(MapEntries),
    Native(NativeProcedure),
    CallFrame(Rc<CallFrame>),
    Error(Rc<str>),
}

impl Value {
    pub fn string(s: &str) -> Self {
        Value::String(Rc::from(s))
    }

    pub fn keyword(name: &str) -> Self {
        Value::Keyword(Rc::from(name))
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(Rc::from(name))
    }

    pub fn error(msg: impl AsRef<str>) -> Self {
        Value::Error(Rc::from(msg.as_ref()))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Native(_) => "procedure",
            Value::CallFrame(_) => "frame",
            Value::Error(_) => "error",
        }
    }

    /// Elements of a list or vector.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The map key this value stands for, if it may be used as one.
    pub fn map_key(&self) -> Option<MapKey> {
        match self {
            Value::String(s) => Some(MapKey::Str(Rc::clone(s))),
            Value::Keyword(k) => Some(MapKey::Keyword(Rc::clone(k))),
            _ => None,
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

fn write_seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 { write!(f, " ")?; }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            // Debug keeps the fractional part, so 3.0 never prints like the int 3
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write_escaped(f, s),
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(items) => write_seq(f, "(", items, ")"),
            Value::Vector(items) => write_seq(f, "[", items, "]"),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 { write!(f, " ")?; }
                    write!(f, "{k} {v}")?;
                }
                write!(f, "}}")
            }
            Value::Native(p) => write!(f, "#<native {}>", p.name),
            Value::CallFrame(_) => write!(f, "#<frame>"),
            Value::Error(msg) => write!(f, "#<error {msg}>"),
        }
    }
}
