use malvm::compiler::CompileError;
use malvm::reader::read_str;
use malvm::vm::{self, Globals, RuntimeError, natives};
use malvm::{Error, Session, Value, compile};

fn eval(session: &mut Session, src: &str) -> Result<Value, Error> {
    session.eval(&read_str(src).unwrap())
}

fn eval_fresh(src: &str) -> Result<Value, Error> {
    eval(&mut Session::new(), src)
}

// --- Literals ---

#[test]
fn literals_round_trip() {
    let cases = [
        ("nil", Value::Nil),
        ("true", Value::Bool(true)),
        ("false", Value::Bool(false)),
        ("3", Value::Int(3)),
        ("2.5", Value::Float(2.5)),
        (r#""s""#, Value::string("s")),
        (":k", Value::keyword("k")),
    ];
    for (src, expected) in cases {
        assert_eq!(eval_fresh(src), Ok(expected), "literal {src}");
    }
}

// --- Globals ---

#[test]
fn def_then_lookup() {
    let mut s = Session::new();
    assert_eq!(eval(&mut s, "(def! x 5)"), Ok(Value::Int(5)));
    assert_eq!(eval(&mut s, "x"), Ok(Value::Int(5)));
}

#[test]
fn undefined_global() {
    assert_eq!(
        eval_fresh("y"),
        Err(Error::Runtime(RuntimeError::UnknownGlobal { name: "y".to_string() }))
    );
}

#[test]
fn def_overwrites() {
    let mut s = Session::new();
    eval(&mut s, "(def! x 1)").unwrap();
    eval(&mut s, "(def! x (+ x 1))").unwrap();
    assert_eq!(eval(&mut s, "x"), Ok(Value::Int(2)));
}

// --- let* ---

#[test]
fn let_bindings_are_sequential() {
    let mut s = Session::new();
    assert_eq!(eval(&mut s, "(let* [a 1 b (+ a 1)] (+ a b))"), Ok(Value::Int(3)));
    assert!(matches!(eval(&mut s, "a"), Err(Error::Runtime(RuntimeError::UnknownGlobal { .. }))));
    assert!(matches!(eval(&mut s, "b"), Err(Error::Runtime(RuntimeError::UnknownGlobal { .. }))));
}

#[test]
fn let_shadowing_is_scope_local() {
    assert_eq!(eval_fresh("(let* [a 1] (let* [a 2] a))"), Ok(Value::Int(2)));
    assert_eq!(eval_fresh("(let* [a 1] (let* [a 2] a) a)"), Ok(Value::Int(1)));
    assert_eq!(eval_fresh("(let* [a 1] (+ (let* [a 2] a) a))"), Ok(Value::Int(3)));
}

#[test]
fn let_accepts_list_bindings() {
    assert_eq!(eval_fresh("(let* (a 2 b 3) (* a b))"), Ok(Value::Int(6)));
}

#[test]
fn let_body_forms_run_in_order() {
    let mut s = Session::new();
    assert_eq!(eval(&mut s, "(let* [a 7] (def! seen a) (+ a 1))"), Ok(Value::Int(8)));
    assert_eq!(eval(&mut s, "seen"), Ok(Value::Int(7)));
}

#[test]
fn let_without_body_is_nil() {
    assert_eq!(eval_fresh("(let* [a 1])"), Ok(Value::Nil));
}

#[test]
fn let_inside_call_arguments() {
    assert_eq!(eval_fresh("(+ 1 (let* [a 2 b 3] (* a b)) 4)"), Ok(Value::Int(11)));
}

// --- Compile errors ---

#[test]
fn def_arity_and_target() {
    assert!(matches!(eval_fresh("(def! x)"), Err(Error::Compile(CompileError::NotEnoughArguments { .. }))));
    assert!(matches!(eval_fresh("(def! x 1 2)"), Err(Error::Compile(CompileError::TooManyArguments { .. }))));
    assert!(matches!(eval_fresh("(def! 5 1)"), Err(Error::Compile(CompileError::InvalidDefTarget { .. }))));
}

#[test]
fn compile_error_runs_nothing() {
    let mut s = Session::new();
    assert!(eval(&mut s, "(+ (def! y 1) (def! 2 2))").is_err());
    assert!(!s.globals().contains_key("y"));
}

// --- Natives ---

#[test]
fn numeric_promotion() {
    assert_eq!(eval_fresh("(+ 1 2.5)"), Ok(Value::Float(3.5)));
    assert_eq!(eval_fresh("(+ 1 2)"), Ok(Value::Int(3)));
    assert!(matches!(eval_fresh("(+ 1 \"2\")"), Err(Error::Runtime(RuntimeError::Type(_)))));
}

#[test]
fn hash_map_odd_arity() {
    assert!(matches!(eval_fresh(r#"(hash-map "a" 1 "b")"#), Err(Error::Runtime(RuntimeError::Type(_)))));
}

#[test]
fn empty_vec_prints() {
    let v = eval_fresh("(vec)").unwrap();
    assert_eq!(v, Value::Vector(vec![]));
    assert_eq!(v.to_string(), "[]");
}

#[test]
fn collection_literals() {
    assert_eq!(eval_fresh("[1 (+ 1 1) 3]").unwrap().to_string(), "[1 2 3]");
    assert_eq!(eval_fresh(r#"{"b" 2 :a (* 2 3)}"#).unwrap().to_string(), r#"{:a 6 "b" 2}"#);
    assert_eq!(eval_fresh("()"), Ok(Value::List(vec![])));
}

#[test]
fn map_literal_values_run_in_source_order() {
    let mut s = Session::new();
    assert_eq!(eval(&mut s, "{:b (def! x 1) :a (def! x 2)}").unwrap().to_string(), "{:a 2 :b 1}");
    assert_eq!(eval(&mut s, "x"), Ok(Value::Int(2)));
}

#[test]
fn map_literal_duplicate_key_still_evaluates() {
    let mut s = Session::new();
    assert_eq!(eval(&mut s, "{:a (def! y 1) :a 2}").unwrap().to_string(), "{:a 2}");
    assert_eq!(eval(&mut s, "y"), Ok(Value::Int(1)));
}

#[test]
fn map_literal_keys_are_checked_at_run_time() {
    assert_eq!(eval_fresh(r#"(let* [k "a"] {k 1})"#).unwrap().to_string(), r#"{"a" 1}"#);
    assert!(matches!(eval_fresh("{1 2}"), Err(Error::Runtime(RuntimeError::Type(_)))));
}

#[test]
fn map_string_keys_round_trip() {
    let mut s = Session::new();
    let printed = s.rep(r#"{":a" 1 :a 2}"#).unwrap().unwrap();
    assert_eq!(printed, r#"{:a 2 ":a" 1}"#);
    assert_eq!(s.rep(&printed).unwrap().unwrap(), printed);
}

#[test]
fn calling_a_non_procedure() {
    assert_eq!(
        eval_fresh("(1 2)"),
        Err(Error::Runtime(RuntimeError::NotCallable { type_name: "int" }))
    );
}

// --- Chunks ---

#[test]
fn same_chunk_twice_gives_same_result() {
    let chunk = compile(&read_str("(let* [a 2] (def! z (* a 21)) (vec z a))").unwrap()).unwrap();
    let run = || {
        let mut globals = Globals::new();
        natives::install(&mut globals);
        let mut stack = vec![Value::Nil; chunk.frame_size];
        vm::execute(&chunk, &mut globals, &mut stack).unwrap();
        (stack[0].clone(), globals.get("z").cloned())
    };
    let first = run();
    assert_eq!(first.0, Value::Vector(vec![Value::Int(42), Value::Int(2)]));
    assert_eq!(first, run());
}

#[test]
fn chunk_reports_its_frame_size() {
    let chunk = compile(&read_str("(+ 1 2 3)").unwrap()).unwrap();
    let mut stack = vec![Value::Nil; chunk.frame_size - 1];
    let mut globals = Globals::new();
    natives::install(&mut globals);
    assert_eq!(
        vm::execute(&chunk, &mut globals, &mut stack),
        Err(RuntimeError::StackTooSmall { needed: 4, available: 3 })
    );
}
