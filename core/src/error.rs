//! All error-related WAT types.
//!
//! Every compiler stage has its own error enum, matching the taxonomy the
//! original implementation raised as distinctly-typed exceptions: lexical,
//! syntax, type, symbol, assembly, and runtime errors are never conflated
//! into one catch-all.

use crate::util::{self, Position};
use serde::Serialize;
use std::fmt::{self, Debug, Display, Formatter};

/// A trait for any error that originates in source code. [SourceError]s rely
/// on having source code present in order to display themselves.
pub trait SourceError: 'static + Send + Sync + Debug + Serialize {
    /// A simple type label for this error, e.g. `"Syntax"` or `"Runtime"`.
    fn type_label(&self) -> &'static str;

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result;
}

/// Failures from [crate::lexer::Lexer].
#[derive(Clone, Debug, Serialize)]
pub enum LexicalError {
    UnterminatedString,
    UnterminatedChar,
    EmptyCharLiteral,
    UnknownEscape(char),
    UnexpectedChar(char),
}

impl SourceError for LexicalError {
    fn type_label(&self) -> &'static str {
        "Lexical"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedString => write!(f, "unterminated string literal"),
            Self::UnterminatedChar => write!(f, "unterminated character literal"),
            Self::EmptyCharLiteral => write!(f, "empty character literal"),
            Self::UnknownEscape(c) => write!(f, "unknown escape sequence '\\{}'", c),
            Self::UnexpectedChar(c) => write!(f, "unexpected character '{}'", c),
        }
    }
}

/// Failures from [crate::parser::Parser].
#[derive(Clone, Debug, Serialize)]
pub enum SyntaxError {
    /// A specific token/element was expected, but something else was found.
    Expected {
        expected: String,
        found: String,
    },
    UnexpectedEof,
    IncludeNotFound(String),
    InvalidAssembly(String),
    /// An included file failed to lex; `msg` is that file's own lexical
    /// error message, folded in here since `#include` is handled entirely
    /// within the parsing stage.
    IncludeLexError { path: String, msg: String },
}

impl SourceError for SyntaxError {
    fn type_label(&self) -> &'static str {
        "Syntax"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected { expected, found } => {
                write!(f, "expected {}, found {}", expected, found)
            }
            Self::UnexpectedEof => write!(f, "unexpected end of file"),
            Self::IncludeNotFound(path) => {
                write!(f, "could not find included file `{}`", path)
            }
            Self::InvalidAssembly(msg) => write!(f, "invalid asm block: {}", msg),
            Self::IncludeLexError { path, msg } => {
                write!(f, "in included file `{}`: {}", path, msg)
            }
        }
    }
}

/// Failures from the typer: [crate::typer].
#[derive(Clone, Debug, Serialize)]
pub enum TypeError {
    Mismatch { expected: String, found: String },
    NotAnLvalue,
    NotIndexable { ty: String },
    WrongArgCount { expected: usize, found: usize },
    InvalidCast { from: String, to: String },
    UndefinedStruct(String),
    UnfilledStruct(String),
    RedefinedStruct(String),
    VoidValue,
}

impl SourceError for TypeError {
    fn type_label(&self) -> &'static str {
        "Type"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { expected, found } => {
                write!(f, "expected type `{}`, found `{}`", expected, found)
            }
            Self::NotAnLvalue => {
                write!(f, "this expression cannot be assigned to or have its address taken")
            }
            Self::NotIndexable { ty } => write!(f, "`{}` is not indexable", ty),
            Self::WrongArgCount { expected, found } => write!(
                f,
                "expected {} argument(s), found {}",
                expected, found
            ),
            Self::InvalidCast { from, to } => {
                write!(f, "cannot cast `{}` to `{}`", from, to)
            }
            Self::UndefinedStruct(name) => {
                write!(f, "struct `{}` was never defined", name)
            }
            Self::UnfilledStruct(name) => write!(
                f,
                "struct `{}` was declared but never defined",
                name
            ),
            Self::RedefinedStruct(name) => {
                write!(f, "struct `{}` is already defined", name)
            }
            Self::VoidValue => write!(f, "a void value cannot be used here"),
        }
    }
}

/// Failures from the symbol table: [crate::symbols].
#[derive(Clone, Debug, Serialize)]
pub enum SymbolError {
    DuplicateGlobal(String),
    DuplicateLocal(String),
    DuplicateArg(String),
    DuplicateFunction(String),
    UndefinedVariable(String),
    UndefinedFunction(String),
    UnfilledStruct(String),
    MissingMain,
}

impl SourceError for SymbolError {
    fn type_label(&self) -> &'static str {
        "Symbol"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateGlobal(name) => {
                write!(f, "global `{}` is already declared", name)
            }
            Self::DuplicateLocal(name) => {
                write!(f, "local `{}` is already declared", name)
            }
            Self::DuplicateArg(name) => {
                write!(f, "parameter `{}` is already declared", name)
            }
            Self::DuplicateFunction(name) => {
                write!(f, "function `{}` is already declared", name)
            }
            Self::UndefinedVariable(name) => {
                write!(f, "undefined variable `{}`", name)
            }
            Self::UndefinedFunction(name) => {
                write!(f, "undefined function `{}`", name)
            }
            Self::UnfilledStruct(name) => write!(
                f,
                "struct `{}` was declared but never defined",
                name
            ),
            Self::MissingMain => write!(f, "program has no `main` function"),
        }
    }
}

/// Failures from the code generator and its patch-resolution pass:
/// [crate::codegen].
#[derive(Clone, Debug, Serialize)]
pub enum AssemblyError {
    DuplicateLabel(String),
    UndefinedLabel(String),
    BranchOutOfRange { offset: i32 },
    BadRegister(i64),
    ImmediateOutOfRange(i64),
    InvalidAssemblyLine(String),
}

impl SourceError for AssemblyError {
    fn type_label(&self) -> &'static str {
        "Assembly"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateLabel(name) => {
                write!(f, "label `{}` is already defined", name)
            }
            Self::UndefinedLabel(name) => {
                write!(f, "reference to undefined label `{}`", name)
            }
            Self::BranchOutOfRange { offset } => write!(
                f,
                "branch offset {} does not fit in a 16-bit immediate",
                offset
            ),
            Self::BadRegister(n) => write!(f, "`{}` is not a valid register operand (expected $0-$31)", n),
            Self::ImmediateOutOfRange(n) => write!(f, "immediate {} does not fit the operand it's used in", n),
            Self::InvalidAssemblyLine(line) => write!(f, "could not parse assembly line `{}`", line),
        }
    }
}

/// Union of the two error kinds [crate::compiler::Compiler] can raise:
/// a pre-lowering symbol check (missing `main`, an undefined struct) or
/// an assembly-time failure surfacing out of [crate::codegen::Codegen].
/// Keeping this as a thin wrapper rather than flattening both into one enum
/// preserves each stage's own `type_label`.
#[derive(Clone, Debug, Serialize)]
pub enum CompileError {
    Symbol(SymbolError),
    Assembly(AssemblyError),
}

impl SourceError for CompileError {
    fn type_label(&self) -> &'static str {
        match self {
            Self::Symbol(e) => e.type_label(),
            Self::Assembly(e) => e.type_label(),
        }
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Symbol(e) => e.fmt_msg(f),
            Self::Assembly(e) => e.fmt_msg(f),
        }
    }
}

impl From<SymbolError> for CompileError {
    fn from(e: SymbolError) -> Self {
        Self::Symbol(e)
    }
}

impl From<AssemblyError> for CompileError {
    fn from(e: AssemblyError) -> Self {
        Self::Assembly(e)
    }
}

/// Failures raised while the emulator executes a compiled program:
/// [crate::emulator].
#[derive(Clone, Debug, Serialize)]
pub enum RuntimeError {
    InvalidOpcode(u32),
    DivideByZero,
    OutOfBoundsAccess { addr: u32 },
    TooManyCycles,
}

impl SourceError for RuntimeError {
    fn type_label(&self) -> &'static str {
        "Runtime"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOpcode(op) => write!(f, "invalid instruction opcode {}", op),
            Self::DivideByZero => write!(f, "division by zero"),
            Self::OutOfBoundsAccess { addr } => {
                write!(f, "memory access out of bounds at address {:#x}", addr)
            }
            Self::TooManyCycles => write!(
                f,
                "program exceeded the maximum number of cycles"
            ),
        }
    }
}

/// A wrapper around a [SourceError] that attaches the [Position] it occurred
/// at. This type on its own can be formatted without any external data.
///
/// `Display` is hand-written below (it needs to interleave the error's own
/// `fmt_msg` with the position), so this implements `std::error::Error`
/// directly rather than deriving it through `thiserror`, which requires an
/// `#[error(...)]` attribute to generate `Display` itself.
#[derive(Clone, Debug, Serialize)]
pub struct SourceErrorWrapper<E: SourceError> {
    error: E,
    pos: Position,
}

impl<E: SourceError> std::error::Error for SourceErrorWrapper<E> {}

impl<E: SourceError> SourceErrorWrapper<E> {
    pub fn new(error: E, pos: Position) -> Self {
        Self { error, pos }
    }

    pub fn pos(&self) -> &Position {
        &self.pos
    }

    pub fn error(&self) -> &E {
        &self.error
    }
}

impl<E: SourceError> Display for SourceErrorWrapper<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} error at {}: ", self.error.type_label(), self.pos)?;
        self.error.fmt_msg(f)
    }
}

struct MsgOnly<'a, E>(&'a E);

impl<'a, E: SourceError> Display for MsgOnly<'a, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.0.fmt_msg(f)
    }
}

impl<E: SourceError> SourceErrorWrapper<E> {
    /// Renders as `file(line): message` (`line: message` if the file name is
    /// empty) — the plain diagnostic line a driver writes to stderr, with
    /// none of [Display]'s `<type> error at` framing.
    pub fn diagnostic(&self) -> String {
        format!("{}: {}", self.pos, MsgOnly(&self.error))
    }
}

/// A wrapper around a collection of errors, plus the source code they refer
/// to, so that source snippets can be rendered alongside each message. Same
/// reasoning as [SourceErrorWrapper] for implementing `std::error::Error`
/// by hand instead of deriving it through `thiserror`.
#[derive(Clone, Debug, Serialize)]
pub struct WithSource<E: SourceError> {
    errors: Vec<SourceErrorWrapper<E>>,
    #[serde(skip)]
    source_code: String,
}

impl<E: SourceError> std::error::Error for WithSource<E> {}

impl<E: SourceError> WithSource<E> {
    pub fn new(
        errors: impl IntoIterator<Item = SourceErrorWrapper<E>>,
        source: String,
    ) -> Self {
        Self {
            errors: errors.into_iter().collect(),
            source_code: source,
        }
    }

    pub fn single(error: E, pos: Position, source: String) -> Self {
        Self::new(std::iter::once(SourceErrorWrapper::new(error, pos)), source)
    }

    pub fn errors(&self) -> &[SourceErrorWrapper<E>] {
        &self.errors
    }

    /// One `file(line): message` line per error, in the order they were
    /// raised.
    pub fn diagnostics(&self) -> Vec<String> {
        self.errors.iter().map(SourceErrorWrapper::diagnostic).collect()
    }
}

impl<E: SourceError> Display for WithSource<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
            if f.alternate() {
                util::fmt_src_highlight(f, &error.pos, &self.source_code)?;
            }
        }
        Ok(())
    }
}
