//! Evaluation session: read → compile → execute → print over one global table.

use tracing::debug;

use crate::bytecode::{Chunk, MAX_REG};
use crate::compiler::{self, CompileError};
use crate::reader::{self, ReadError};
use crate::value::Value;
use crate::vm::{self, Globals, RuntimeError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Owns the global environment and the value stack shared by every form
/// evaluated through it. Globals defined by a form survive later failures.
pub struct Session {
    globals: Globals,
    stack: Vec<Value>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    /// A fresh session whose globals hold the native procedures.
    pub fn new() -> Self {
        let mut globals = Globals::new();
        vm::natives::install(&mut globals);
        Session { globals, stack: vec![Value::Nil; MAX_REG + 1] }
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    /// Runs an already compiled chunk and returns the value left in register 0.
    pub fn run(&mut self, chunk: &Chunk) -> Result<Value, RuntimeError> {
        let outcome = vm::execute(chunk, &mut self.globals, &mut self.stack);
        let result = std::mem::replace(&mut self.stack[0], Value::Nil);
        // drop whatever the frame left behind
        let used = chunk.frame_size.min(self.stack.len());
        self.stack[..used].fill(Value::Nil);
        outcome?;
        Ok(result)
    }

    /// Compiles and executes one form.
    pub fn eval(&mut self, form: &Value) -> Result<Value, Error> {
        let chunk = compiler::compile(form)?;
        Ok(self.run(&chunk)?)
    }

    /// Evaluates every form in `source` in order; `None` when it holds no forms.
    pub fn eval_str(&mut self, source: &str) -> Result<Option<Value>, Error> {
        let forms = reader::read_all(source)?;
        debug!(forms = forms.len(), "read");
        let mut last = None;
        for form in &forms {
            last = Some(self.eval(form)?);
        }
        Ok(last)
    }

    /// Read, evaluate, print.
    pub fn rep(&mut self, source: &str) -> Result<Option<String>, Error> {
        Ok(self.eval_str(source)?.map(|v| v.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(src: &str) -> Result<Option<String>, Error> {
        Session::new().rep(src)
    }

    #[test]
    fn session_arithmetic() {
        assert_eq!(rep("(+ 1 2)"), Ok(Some("3".to_string())));
        assert_eq!(rep("(- 10 (* 2 3))"), Ok(Some("4".to_string())));
    }

    #[test]
    fn session_blank_input() {
        assert_eq!(rep("   ; comment only"), Ok(None));
    }

    #[test]
    fn session_globals_persist() {
        let mut s = Session::new();
        s.rep("(def! x 5)").unwrap();
        assert_eq!(s.rep("x"), Ok(Some("5".to_string())));
        assert_eq!(s.globals().get("x"), Some(&Value::Int(5)));
    }

    #[test]
    fn session_last_form_wins() {
        assert_eq!(rep("(def! a 1) (def! b 2) (+ a b)"), Ok(Some("3".to_string())));
    }

    #[test]
    fn session_failure_keeps_earlier_definitions() {
        let mut s = Session::new();
        let err = s.rep("(def! x 1) (undefined-fn)").unwrap_err();
        assert_eq!(err, Error::Runtime(RuntimeError::UnknownGlobal { name: "undefined-fn".to_string() }));
        assert_eq!(s.rep("x"), Ok(Some("1".to_string())));
    }

    #[test]
    fn session_errors_by_stage() {
        assert!(matches!(rep("(+ 1"), Err(Error::Read(_))));
        assert!(matches!(rep("(def! 1 2)"), Err(Error::Compile(_))));
        assert!(matches!(rep("(+ 1 :k)"), Err(Error::Runtime(_))));
    }

    #[test]
    fn session_string_keys_print_quoted() {
        assert_eq!(rep(r#"{":a" 1}"#), Ok(Some(r#"{":a" 1}"#.to_string())));
        assert_eq!(rep(r#"(hash-map ":a" 1 :a 2)"#), Ok(Some(r#"{:a 2 ":a" 1}"#.to_string())));
    }

    #[test]
    fn session_stack_is_cleared_between_forms() {
        let mut s = Session::new();
        s.rep("(+ 1 2 3)").unwrap();
        assert!(s.stack.iter().all(|v| *v == Value::Nil));
    }

    #[test]
    fn session_globals_can_be_extended() {
        let mut s = Session::new();
        s.globals_mut().insert("answer".to_string(), Value::Int(42));
        assert_eq!(s.rep("(+ answer 0)"), Ok(Some("42".to_string())));
    }
}
