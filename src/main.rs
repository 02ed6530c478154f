use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use malvm::diagnostic::{Diagnostic, ansi::AnsiRenderer, json};
use malvm::{Error, Session, compile, reader};

const PROMPT: &str = "user> ";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Emit {
    /// Human-readable disassembly
    Bytecode,
    /// One JSON object per chunk
    Json,
}

/// Compile and run a small Lisp on a register bytecode VM.
/// With no FILE and no -e, starts an interactive prompt.
#[derive(Debug, Parser)]
#[command(name = "malvm", version)]
struct Cli {
    /// Source file to evaluate
    file: Option<PathBuf>,

    /// Evaluate EXPR and print the value of its last form
    #[arg(short = 'e', long = "eval", value_name = "EXPR", conflicts_with = "file")]
    eval: Option<String>,

    /// Print the compiled chunks instead of running them
    #[arg(long, value_enum, value_name = "FORMAT")]
    emit: Option<Emit>,

    /// Report errors as JSON
    #[arg(long)]
    json: bool,

    /// Disable colored error output
    #[arg(long)]
    no_color: bool,
}

struct Reporter {
    json: bool,
    use_color: bool,
}

impl Reporter {
    fn render(&self, err: &Error, source: &str) -> String {
        let d = Diagnostic::from(err).with_source(source);
        if self.json {
            json::render(&d)
        } else {
            AnsiRenderer { use_color: self.use_color }.render(&d).trim_end().to_string()
        }
    }
}

/// Why a one-shot run failed: the program itself, or writing its output.
#[derive(Debug)]
enum Failure {
    Eval(Error),
    Output(io::Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Failure::Eval(e)
    }
}

impl From<io::Error> for Failure {
    fn from(e: io::Error) -> Self {
        Failure::Output(e)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let source = match (&cli.eval, &cli.file) {
        (Some(expr), _) => Some(expr.clone()),
        (None, Some(path)) => match std::fs::read_to_string(path) {
            Ok(s) => Some(s),
            Err(e) => {
                eprintln!("Error reading {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        (None, None) => None,
    };

    match source {
        Some(source) => {
            let reporter = Reporter { json: cli.json, use_color: !cli.no_color && io::stderr().is_terminal() };
            let outcome = match cli.emit {
                Some(format) => emit(&source, format, &mut io::stdout().lock()),
                None => run(&source),
            };
            match outcome {
                Ok(()) => ExitCode::SUCCESS,
                Err(Failure::Eval(e)) => {
                    eprintln!("{}", reporter.render(&e, &source));
                    ExitCode::FAILURE
                }
                Err(Failure::Output(e)) => {
                    eprintln!("Error writing output: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        None => {
            let reporter = Reporter { json: cli.json, use_color: !cli.no_color && io::stdout().is_terminal() };
            match repl(&reporter) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("I/O error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(source: &str) -> Result<(), Failure> {
    if let Some(printed) = Session::new().rep(source)? {
        println!("{printed}");
    }
    Ok(())
}

fn emit(source: &str, format: Emit, out: &mut impl Write) -> Result<(), Failure> {
    let forms = reader::read_all(source).map_err(Error::from)?;
    for (i, form) in forms.iter().enumerate() {
        let chunk = compile(form).map_err(Error::from)?;
        match format {
            Emit::Bytecode => {
                if i > 0 {
                    writeln!(out)?;
                }
                writeln!(out, "; {form}")?;
                write!(out, "{chunk}")?;
            }
            Emit::Json => {
                serde_json::to_writer(&mut *out, &chunk).map_err(io::Error::from)?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

/// Errors are printed where results go and the session carries on.
fn repl(reporter: &Reporter) -> io::Result<()> {
    let mut session = Session::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut line = String::new();

    loop {
        write!(stdout, "{PROMPT}")?;
        stdout.flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            writeln!(stdout)?;
            return Ok(());
        }
        match session.rep(&line) {
            Ok(Some(printed)) => writeln!(stdout, "{printed}")?,
            Ok(None) => {}
            Err(e) => writeln!(stdout, "{}", reporter.render(&e, line.trim_end()))?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn emit_json_writes_one_line_per_form() {
        let mut out = Vec::new();
        emit("(def! a 1) (+ a 2)", Emit::Json, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        for line in text.lines() {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(v["code"].is_array(), "{line}");
        }
    }

    #[test]
    fn emit_json_write_failure_is_reported() {
        let outcome = emit("(+ 1 2)", Emit::Json, &mut ClosedPipe);
        assert!(matches!(outcome, Err(Failure::Output(ref e)) if e.kind() == io::ErrorKind::BrokenPipe), "{outcome:?}");
    }

    #[test]
    fn emit_bytecode_write_failure_is_reported() {
        assert!(matches!(emit("1", Emit::Bytecode, &mut ClosedPipe), Err(Failure::Output(_))));
    }

    #[test]
    fn emit_compile_error_is_an_eval_failure() {
        let outcome = emit("(def! 1 2)", Emit::Json, &mut Vec::new());
        assert!(matches!(outcome, Err(Failure::Eval(Error::Compile(_)))), "{outcome:?}");
    }
}
