pub mod ansi;
pub mod json;
pub mod source_map;

pub use source_map::SourceMap;

use crate::compiler::CompileError;
use crate::reader::{ReadError, Span};
use crate::session::Error;
use crate::vm::RuntimeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Compile,
    Runtime,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Read => "read",
            Stage::Compile => "compile",
            Stage::Runtime => "runtime",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

/// A user-facing error ready to be rendered as text or JSON.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub stage: Stage,
    pub message: String,
    pub label: Option<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(stage: Stage, message: impl Into<String>) -> Self {
        Diagnostic {
            stage,
            message: message.into(),
            label: None,
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.label = Some(Label { span, message: label.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- From impls for each stage's error type ----

impl From<&ReadError> for Diagnostic {
    fn from(e: &ReadError) -> Self {
        let label = match e {
            ReadError::UnexpectedEof { .. } => "input ends inside this form",
            ReadError::Unbalanced { .. } => "no matching opener",
            ReadError::UnterminatedString { .. } => "string starts here",
            _ => "here",
        };
        let d = Diagnostic::error(Stage::Read, e.to_string()).with_span(e.span(), label);
        match e {
            ReadError::BadEscape { .. } => d.with_suggestion(r#"valid escapes are \" \\ \n \r \t"#),
            ReadError::OddMapEntries { .. } => d.with_suggestion("give every key a value"),
            _ => d,
        }
    }
}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        let d = Diagnostic::error(Stage::Compile, e.to_string());
        match e {
            CompileError::NotEnoughArguments { form: "def!" } | CompileError::TooManyArguments { form: "def!" } => {
                d.with_suggestion("write (def! name expr)")
            }
            CompileError::OddLetBindings | CompileError::InvalidLetBinding { .. } => {
                d.with_suggestion("bindings alternate names and values: (let* [a 1 b 2] ...)")
            }
            CompileError::Unsupported { what } if what == "fn*" => d.with_note("function definitions are not compiled yet"),
            _ => d,
        }
    }
}

impl From<&RuntimeError> for Diagnostic {
    fn from(e: &RuntimeError) -> Self {
        let d = Diagnostic::error(Stage::Runtime, e.to_string());
        match e {
            RuntimeError::UnknownGlobal { name } => d.with_suggestion(format!("define it first: (def! {name} ...)")),
            _ => d,
        }
    }
}

impl From<&Error> for Diagnostic {
    fn from(e: &Error) -> Self {
        match e {
            Error::Read(e) => e.into(),
            Error::Compile(e) => e.into(),
            Error::Runtime(e) => e.into(),
        }
    }
}
