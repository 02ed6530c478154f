use logos::Logos;

use crate::value::Value;

/// Deepest chain of nested forms the reader accepts.
pub const MAX_DEPTH: usize = 256;

/// Byte range within the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn at(position: usize) -> Self {
        Span { start: position, end: position + 1 }
    }
}

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n,]+")]
#[logos(skip(r";[^\n]*", allow_greedy = true))]
pub enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,

    // Reader macros
    #[token("'")]
    Quote,
    #[token("`")]
    Quasiquote,
    #[token("~")]
    Unquote,
    #[token("~@")]
    SpliceUnquote,
    #[token("@")]
    Deref,
    #[token("^")]
    Meta,

    /// Raw string literal, quotes and escapes still in place.
    #[regex(r#""([^"\\]|\\.)*""#, |lex| lex.slice().to_string())]
    Str(String),

    /// Number, keyword, symbol, or one of `nil`/`true`/`false`.
    #[regex(r#"[^\s\[\]{}()'"`,;~^@][^\s\[\]{}()'"`,;]*"#, |lex| lex.slice().to_string())]
    Atom(String),
}

impl Token {
    fn closing_char(&self) -> Option<char> {
        match self {
            Token::RParen => Some(')'),
            Token::RBracket => Some(']'),
            Token::RBrace => Some('}'),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadError {
    #[error("unexpected end of input")]
    UnexpectedEof { position: usize },
    #[error("unbalanced '{delim}'")]
    Unbalanced { delim: char, position: usize },
    #[error("unterminated string")]
    UnterminatedString { position: usize },
    #[error("invalid escape '\\{escape}' in string")]
    BadEscape { escape: char, position: usize },
    #[error("malformed number '{text}'")]
    BadNumber { text: String, position: usize },
    #[error("map literal needs an even number of forms")]
    OddMapEntries { position: usize },
    #[error("forms nested deeper than {} levels", MAX_DEPTH)]
    TooDeep { position: usize },
    #[error("unexpected input '{snippet}'")]
    Unexpected { snippet: String, position: usize },
}

impl ReadError {
    /// Byte offset the error points at.
    pub fn position(&self) -> usize {
        match self {
            ReadError::UnexpectedEof { position }
            | ReadError::Unbalanced { position, .. }
            | ReadError::UnterminatedString { position }
            | ReadError::BadEscape { position, .. }
            | ReadError::BadNumber { position, .. }
            | ReadError::OddMapEntries { position }
            | ReadError::TooDeep { position }
            | ReadError::Unexpected { position, .. } => *position,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            ReadError::BadNumber { text, position } => Span { start: *position, end: position + text.len() },
            ReadError::Unexpected { snippet, position } => {
                Span { start: *position, end: position + snippet.len().max(1) }
            }
            _ => Span::at(self.position()),
        }
    }
}

pub type Spanned = (Token, Span);

/// Lex source text into tokens with byte spans.
pub fn lex(source: &str) -> Result<Vec<Spanned>, ReadError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span { start: range.start, end: range.end };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let snippet = &source[range];
                if snippet.starts_with('"') {
                    return Err(ReadError::UnterminatedString { position: span.start });
                }
                return Err(ReadError::Unexpected { snippet: snippet.to_string(), position: span.start });
            }
        }
    }

    Ok(tokens)
}

/// Reads the first form in `source`.
pub fn read_str(source: &str) -> Result<Value, ReadError> {
    let mut reader = Reader::new(source)?;
    reader.read_form()
}

/// Reads every form in `source`, in order.
pub fn read_all(source: &str) -> Result<Vec<Value>, ReadError> {
    let mut reader = Reader::new(source)?;
    let mut forms = Vec::new();
    while !reader.at_end() {
        forms.push(reader.read_form()?);
    }
    Ok(forms)
}

struct Reader {
    tokens: std::iter::Peekable<std::vec::IntoIter<Spanned>>,
    end: usize,
    depth: usize,
}

impl Reader {
    fn new(source: &str) -> Result<Self, ReadError> {
        Ok(Reader { tokens: lex(source)?.into_iter().peekable(), end: source.len(), depth: 0 })
    }

    fn at_end(&mut self) -> bool {
        self.tokens.peek().is_none()
    }

    fn read_form(&mut self) -> Result<Value, ReadError> {
        let Some((token, span)) = self.tokens.next() else {
            return Err(ReadError::UnexpectedEof { position: self.end });
        };
        if self.depth == MAX_DEPTH {
            return Err(ReadError::TooDeep { position: span.start });
        }
        self.depth += 1;
        let form = self.read_token(token, span);
        self.depth -= 1;
        form
    }

    fn read_token(&mut self, token: Token, span: Span) -> Result<Value, ReadError> {
        match token {
            Token::LParen => Ok(Value::List(self.read_seq(Token::RParen, span)?)),
            Token::LBracket => Ok(Value::Vector(self.read_seq(Token::RBracket, span)?)),
            Token::LBrace => {
                let items = self.read_seq(Token::RBrace, span)?;
                hash_map_form(items, span)
            }
            Token::RParen | Token::RBracket | Token::RBrace => Err(ReadError::Unbalanced {
                delim: token.closing_char().unwrap_or('?'),
                position: span.start,
            }),
            Token::Quote => self.wrap("quote"),
            Token::Quasiquote => self.wrap("quasiquote"),
            Token::Unquote => self.wrap("unquote"),
            Token::SpliceUnquote => self.wrap("splice-unquote"),
            Token::Deref => self.wrap("deref"),
            Token::Meta => {
                let meta = self.read_form()?;
                let target = self.read_form()?;
                Ok(Value::List(vec![Value::symbol("with-meta"), target, meta]))
            }
            Token::Str(raw) => unescape(&raw, span.start),
            Token::Atom(text) => read_atom(&text, span.start),
        }
    }

    /// Reads forms up to `close`. An unclosed sequence reports the opening
    /// delimiter's position.
    fn read_seq(&mut self, close: Token, open: Span) -> Result<Vec<Value>, ReadError> {
        let mut items = Vec::new();
        loop {
            match self.tokens.peek() {
                None => return Err(ReadError::UnexpectedEof { position: open.start }),
                Some((t, _)) if *t == close => {
                    self.tokens.next();
                    return Ok(items);
                }
                Some(_) => items.push(self.read_form()?),
            }
        }
    }

    fn wrap(&mut self, head: &str) -> Result<Value, ReadError> {
        let form = self.read_form()?;
        Ok(Value::List(vec![Value::symbol(head), form]))
    }
}

/// `{k v ...}` reads as `(hash-map k v ...)`. Entries stay in source order
/// and duplicates are kept, so every value form is evaluated.
fn hash_map_form(items: Vec<Value>, open: Span) -> Result<Value, ReadError> {
    if items.len() % 2 != 0 {
        return Err(ReadError::OddMapEntries { position: open.start });
    }
    let mut form = Vec::with_capacity(items.len() + 1);
    form.push(Value::symbol("hash-map"));
    form.extend(items);
    Ok(Value::List(form))
}

fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix(['-', '+']).unwrap_or(text);
    digits.starts_with(|c: char| c.is_ascii_digit())
}

fn read_atom(text: &str, position: usize) -> Result<Value, ReadError> {
    match text {
        "nil" => return Ok(Value::Nil),
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Some(name) = text.strip_prefix(':') {
        return Ok(Value::keyword(name));
    }
    if looks_numeric(text) {
        if let Ok(n) = text.parse::<i64>() {
            return Ok(Value::Int(n));
        }
        if let Ok(x) = text.parse::<f64>() {
            return Ok(Value::Float(x));
        }
        return Err(ReadError::BadNumber { text: text.to_string(), position });
    }
    Ok(Value::symbol(text))
}

fn unescape(raw: &str, position: usize) -> Result<Value, ReadError> {
    // the token regex guarantees surrounding quotes
    let body = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(escape) => return Err(ReadError::BadEscape { escape, position }),
            None => return Err(ReadError::UnterminatedString { position }),
        }
    }
    Ok(Value::String(out.into()))
}
