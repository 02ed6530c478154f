//! Native procedures seeded into every fresh global table.

use super::{Globals, NativeCall, RuntimeError};
use crate::value::{MapEntries, NativeProcedure, Value};

pub const NATIVES: &[NativeProcedure] = &[
    NativeProcedure { name: "+", func: add },
    NativeProcedure { name: "-", func: sub },
    NativeProcedure { name: "*", func: mul },
    NativeProcedure { name: "/", func: div },
    NativeProcedure { name: "vec", func: vec },
    NativeProcedure { name: "hash-map", func: hash_map },
];

pub fn install(globals: &mut Globals) {
    for p in NATIVES {
        globals.insert(p.name.to_string(), Value::Native(*p));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn from_value(name: &str, v: &Value) -> Result<Num, RuntimeError> {
        match v {
            Value::Int(n) => Ok(Num::Int(*n)),
            Value::Float(x) => Ok(Num::Float(*x)),
            other => Err(RuntimeError::Type(format!("{name}: expected a number, got {}", other.type_name()))),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Num::Int(n) => Value::Int(n),
            Num::Float(x) => Value::Float(x),
        }
    }
}

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

/// int ⊕ int stays int; a float on either side promotes.
fn apply(op: Arith, lhs: Num, rhs: Num) -> Result<Num, RuntimeError> {
    match (lhs, rhs) {
        (Num::Int(a), Num::Int(b)) => {
            let r = match op {
                Arith::Add => a.checked_add(b),
                Arith::Sub => a.checked_sub(b),
                Arith::Mul => a.checked_mul(b),
                Arith::Div => {
                    if b == 0 {
                        return Err(RuntimeError::DivisionByZero);
                    }
                    a.checked_div(b)
                }
            };
            r.map(Num::Int).ok_or(RuntimeError::IntegerOverflow)
        }
        _ => {
            let (a, b) = (lhs.as_f64(), rhs.as_f64());
            Ok(Num::Float(match op {
                Arith::Add => a + b,
                Arith::Sub => a - b,
                Arith::Mul => a * b,
                Arith::Div => a / b,
            }))
        }
    }
}

fn fold(call: &NativeCall<'_>, name: &str, op: Arith, init: Num) -> Result<Num, RuntimeError> {
    call.args().iter().try_fold(init, |acc, v| apply(op, acc, Num::from_value(name, v)?))
}

/// `-` and `/`: the first argument seeds the fold; alone, it is applied to
/// the identity (`0 - x`, `1 / x`).
fn fold_from_first(call: &NativeCall<'_>, name: &str, op: Arith, identity: Num) -> Result<Num, RuntimeError> {
    let args = call.args();
    let Some((first, rest)) = args.split_first() else {
        return Err(RuntimeError::Type(format!("{name}: expected at least 1 argument")));
    };
    let first = Num::from_value(name, first)?;
    if rest.is_empty() {
        return apply(op, identity, first);
    }
    rest.iter().try_fold(first, |acc, v| apply(op, acc, Num::from_value(name, v)?))
}

fn add(call: &mut NativeCall<'_>) -> Result<(), RuntimeError> {
    let r = fold(call, "+", Arith::Add, Num::Int(0))?;
    call.ret(r.into_value());
    Ok(())
}

fn mul(call: &mut NativeCall<'_>) -> Result<(), RuntimeError> {
    let r = fold(call, "*", Arith::Mul, Num::Int(1))?;
    call.ret(r.into_value());
    Ok(())
}

fn sub(call: &mut NativeCall<'_>) -> Result<(), RuntimeError> {
    let r = fold_from_first(call, "-", Arith::Sub, Num::Int(0))?;
    call.ret(r.into_value());
    Ok(())
}

fn div(call: &mut NativeCall<'_>) -> Result<(), RuntimeError> {
    let r = fold_from_first(call, "/", Arith::Div, Num::Int(1))?;
    call.ret(r.into_value());
    Ok(())
}

fn vec(call: &mut NativeCall<'_>) -> Result<(), RuntimeError> {
    let items = call.take_args();
    call.ret(Value::Vector(items));
    Ok(())
}

fn hash_map(call: &mut NativeCall<'_>) -> Result<(), RuntimeError> {
    if call.argc() % 2 != 0 {
        return Err(RuntimeError::Type(format!("hash-map: odd number of arguments ({})", call.argc())));
    }
    let mut entries = MapEntries::new();
    let mut args = call.take_args().into_iter();
    while let (Some(k), Some(v)) = (args.next(), args.next()) {
        let key = k.map_key().ok_or_else(|| {
            RuntimeError::Type(format!("hash-map: keys must be strings or keywords, got {}", k.type_name()))
        })?;
        entries.insert(key, v);
    }
    call.ret(Value::Map(entries));
    Ok(())
}
