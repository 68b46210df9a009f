//! Query expression language.
//!
//! ```text
//! query   := setexpr EOF
//! setexpr := primary (('+' | '-' | '^') primary)*
//! primary := STRING | LABEL | '[' (setexpr (',' setexpr)*)? ']'
//!          | IDENT '(' args ')' | '(' setexpr ')'
//! ```
//!
//! Functions: `deps(x)`, `dependsOn(x)` (alias `rdeps`), `kind("re", x)`,
//! `filterByKind("k", x)` (alias `edgeKind`), `outputs(x[, "build_kind"])`,
//! `files(x)`. Bare labels such as `//app:main` need no quotes; a `-` inside a
//! label is part of it, so the difference operator must be surrounded by
//! whitespace.
use std::fmt;
use std::str::FromStr;

use logos::Logos;

use crate::errors::ParseError;

/// Parsed query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Pattern(String),
    Set(Vec<Expr>),
    Deps(Box<Expr>),
    DependsOn(Box<Expr>),
    Kind { pattern: String, targets: Box<Expr> },
    EdgeKind { kind: String, targets: Box<Expr> },
    Outputs { targets: Box<Expr>, build_kind: Option<String> },
    Files(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Except(Box<Expr>, Box<Expr>),
    Intersect(Box<Expr>, Box<Expr>),
}

// Typed builders, for callers composing queries without text.
impl Expr {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        Self::Pattern(pattern.into())
    }

    #[must_use]
    pub fn deps(self) -> Self {
        Self::Deps(Box::new(self))
    }

    #[must_use]
    pub fn depends_on(self) -> Self {
        Self::DependsOn(Box::new(self))
    }

    #[must_use]
    pub fn files(self) -> Self {
        Self::Files(Box::new(self))
    }

    #[must_use]
    pub fn outputs(self, build_kind: Option<&str>) -> Self {
        Self::Outputs { targets: Box::new(self), build_kind: build_kind.map(str::to_string) }
    }

    pub fn kind(self, pattern: impl Into<String>) -> Self {
        Self::Kind { pattern: pattern.into(), targets: Box::new(self) }
    }

    pub fn edge_kind(self, kind: impl Into<String>) -> Self {
        Self::EdgeKind { kind: kind.into(), targets: Box::new(self) }
    }

    #[must_use]
    pub fn union(self, other: Expr) -> Self {
        Self::Union(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn except(self, other: Expr) -> Self {
        Self::Except(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn intersect(self, other: Expr) -> Self {
        Self::Intersect(Box::new(self), Box::new(other))
    }
}

impl FromStr for Expr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_query(s)
    }
}

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"\s+")]
enum Tok {
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r#"'([^'\\]|\\.)*'"#, unquote)]
    Str(String),
    // A `-` may continue a label but never start one.
    #[regex(r"[A-Za-z0-9_/:.@*][A-Za-z0-9_/:.@*\-]*", |lex| lex.slice().to_string())]
    Word(String),
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("^")]
    Caret,
    Eof,
}

fn unquote(lex: &mut logos::Lexer<'_, Tok>) -> String {
    let quoted = lex.slice();
    let body = &quoted[1..quoted.len() - 1];
    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some(other) => value.push(other),
            None => {}
        }
    }
    value
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Str(s) => write!(f, "string {s:?}"),
            Tok::Word(w) => write!(f, "`{w}`"),
            Tok::LParen => f.write_str("`(`"),
            Tok::RParen => f.write_str("`)`"),
            Tok::LBracket => f.write_str("`[`"),
            Tok::RBracket => f.write_str("`]`"),
            Tok::Comma => f.write_str("`,`"),
            Tok::Plus => f.write_str("`+`"),
            Tok::Minus => f.write_str("`-`"),
            Tok::Caret => f.write_str("`^`"),
            Tok::Eof => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    offset: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut lex = Tok::lexer(input);
    let mut tokens = Vec::new();
    while let Some(result) = lex.next() {
        let offset = lex.span().start;
        match result {
            Ok(tok) => tokens.push(Token { tok, offset }),
            Err(()) => {
                return Err(match lex.slice().chars().next() {
                    Some('"' | '\'') => ParseError::UnterminatedString { offset },
                    ch => ParseError::UnexpectedChar { ch: ch.unwrap_or_default(), offset },
                });
            }
        }
    }
    tokens.push(Token { tok: Tok::Eof, offset: input.len() });
    Ok(tokens)
}

/// Parse query text into an `Expr`.
///
/// # Errors
/// Returns `ParseError` for lexical errors, unknown functions, wrong arity,
/// nesting deeper than `MAX_NESTING`, or input left over after a complete
/// expression.
pub fn parse_query(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser { tokens: tokenize(input)?, pos: 0, depth: 0 };
    let expr = parser.set_expr()?;
    let rest = parser.peek();
    if rest.tok != Tok::Eof {
        return Err(ParseError::TrailingInput { offset: rest.offset });
    }
    Ok(expr)
}

/// Deepest nesting of calls, lists and parentheses a query may use.
pub const MAX_NESTING: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // tokenize always ends the stream with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), ParseError> {
        let token = self.advance();
        if &token.tok == tok {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: tok.to_string(),
                found: token.tok.to_string(),
                offset: token.offset,
            })
        }
    }

    fn set_expr(&mut self) -> Result<Expr, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep { offset: self.peek().offset, limit: MAX_NESTING });
        }
        self.depth += 1;
        let expr = self.operators();
        self.depth -= 1;
        expr
    }

    fn operators(&mut self) -> Result<Expr, ParseError> {
        let base = self.depth;
        let mut lhs = self.primary()?;
        loop {
            let combine: fn(Expr, Expr) -> Expr = match self.peek().tok {
                Tok::Plus => Expr::union,
                Tok::Minus => Expr::except,
                Tok::Caret => Expr::intersect,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            let offset = self.advance().offset;
            // every operator wraps the chain built so far one level deeper
            self.depth += 1;
            if self.depth >= MAX_NESTING {
                return Err(ParseError::TooDeep { offset, limit: MAX_NESTING });
            }
            let rhs = self.primary()?;
            lhs = combine(lhs, rhs);
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.advance();
        match token.tok {
            Tok::Str(s) => Ok(Expr::Pattern(s)),
            Tok::Word(w) => {
                if self.peek().tok == Tok::LParen {
                    self.advance();
                    self.call(&w)
                } else {
                    Ok(Expr::Pattern(w))
                }
            }
            Tok::LBracket => {
                let items = self.list(&Tok::RBracket)?;
                Ok(Expr::Set(items.into_iter().map(|(_, e)| e).collect()))
            }
            Tok::LParen => {
                let inner = self.set_expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            other => Err(ParseError::UnexpectedToken {
                expected: "a target, list or function call".to_string(),
                found: other.to_string(),
                offset: token.offset,
            }),
        }
    }

    // Comma-separated expressions up to `close`, each with its start offset.
    fn list(&mut self, close: &Tok) -> Result<Vec<(usize, Expr)>, ParseError> {
        let mut items = Vec::new();
        if &self.peek().tok == close {
            self.advance();
            return Ok(items);
        }
        loop {
            let offset = self.peek().offset;
            items.push((offset, self.set_expr()?));
            let token = self.advance();
            match &token.tok {
                Tok::Comma => {}
                t if t == close => return Ok(items),
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: format!("`,` or {close}"),
                        found: other.to_string(),
                        offset: token.offset,
                    })
                }
            }
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, ParseError> {
        let mut args = self.list(&Tok::RParen)?;
        let found = args.len();
        let arity = |expected: &str| ParseError::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            found,
        };
        match name {
            "deps" | "dependsOn" | "rdeps" | "files" => {
                if args.len() != 1 {
                    return Err(arity("1"));
                }
                let arg = args.remove(0).1;
                Ok(match name {
                    "deps" => arg.deps(),
                    "files" => arg.files(),
                    _ => arg.depends_on(),
                })
            }
            "kind" | "filterByKind" | "edgeKind" => {
                if args.len() != 2 {
                    return Err(arity("2"));
                }
                let targets = args.remove(1).1;
                let label = string_arg(args.remove(0))?;
                Ok(if name == "kind" { targets.kind(label) } else { targets.edge_kind(label) })
            }
            "outputs" => {
                if args.is_empty() || args.len() > 2 {
                    return Err(arity("1 or 2"));
                }
                let build_kind = if args.len() == 2 { Some(string_arg(args.remove(1))?) } else { None };
                let targets = args.remove(0).1;
                Ok(targets.outputs(build_kind.as_deref()))
            }
            _ => Err(ParseError::UnknownFunction { name: name.to_string() }),
        }
    }
}

fn string_arg((offset, expr): (usize, Expr)) -> Result<String, ParseError> {
    match expr {
        Expr::Pattern(s) => Ok(s),
        _ => Err(ParseError::UnexpectedToken {
            expected: "a string literal".to_string(),
            found: "an expression".to_string(),
            offset,
        }),
    }
}
