//! Core implementation of the WAT language: a small statically typed
//! imperative language that compiles to a 32-bit big-endian RISC
//! instruction stream and runs on an in-process emulator.
//!
//! ```
//! use wat::{compile_and_run, NullIncludes};
//!
//! let source = r#"
//!     func main(): void {
//!         var p: *int;
//!         p = cast(*int) 0xFFFF000C;
//!         *p = 2 + 3 * 4;
//!     }
//! "#;
//! let outcome = compile_and_run(source, "main.wat", &NullIncludes, vec![]).unwrap();
//! assert_eq!(outcome.output, vec![14]);
//! ```

#![deny(clippy::all, unused_must_use)]

pub mod util;

pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod consts;
pub mod emulator;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod symbols;
pub mod typer;
pub mod types;

use crate::compiler::Compiler;
use crate::emulator::Emulator;
use crate::error::{CompileError, RuntimeError, SymbolError, SyntaxError, TypeError, WithSource};
use crate::parser::IncludeResolver;
use crate::symbols::SymbolTable;
use crate::typer::{Binder, Typer};
use crate::types::TypeRegistry;
use std::fmt::{self, Display, Formatter};

/// An [IncludeResolver] that rejects every `#include`, for callers (tests,
/// one-off snippets) that know their source has none.
pub struct NullIncludes;

impl IncludeResolver for NullIncludes {
    fn resolve(&self, path: &str) -> Result<String, String> {
        Err(format!("no includes available, requested `{}`", path))
    }
}

/// Union of every error a full `compile` can produce, keeping each stage's
/// own error type (and its own `WithSource` rendering) distinct rather than
/// flattening them, the same split the driver in §7 documents: a `Diag` is
/// never reclassified once raised.
#[derive(Debug)]
pub enum Error {
    Syntax(WithSource<SyntaxError>),
    Symbol(WithSource<SymbolError>),
    Type(WithSource<TypeError>),
    Compile(WithSource<CompileError>),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax(e) => write!(f, "{:#}", e),
            Self::Symbol(e) => write!(f, "{:#}", e),
            Self::Type(e) => write!(f, "{:#}", e),
            Self::Compile(e) => write!(f, "{:#}", e),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// One `file(line): message` line per error, the format the driver in
    /// §4.1 writes to stderr.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            Self::Syntax(e) => e.diagnostics(),
            Self::Symbol(e) => e.diagnostics(),
            Self::Type(e) => e.diagnostics(),
            Self::Compile(e) => e.diagnostics(),
        }
    }
}

/// The word stream produced by a successful compile, ready to be handed to
/// [Emulator::new].
pub struct CompiledProgram {
    pub code: Vec<codegen::Word>,
}

/// Runs the full pipeline — lex, parse (resolving `#include`s through
/// `resolver`), bind, type-check, lower — and returns the finished word
/// stream. Mirrors the predecessor's `Compiler::compile` driver: each stage
/// runs to completion or the whole pipeline aborts with that stage's own
/// error type, never a partial result.
pub fn compile(
    source: &str,
    file: &str,
    resolver: &dyn IncludeResolver,
) -> Result<CompiledProgram, Error> {
    let mut table = SymbolTable::new();
    let mut types = TypeRegistry::new();

    let mut program = parser::parse_program(source, file, resolver, &mut table)
        .map_err(|(e, pos)| Error::Syntax(WithSource::single(e, pos, source.to_string())))?;
    debug!(eprintln!("AST: {:#?}", program));

    Binder::new(&mut table, &mut types)
        .bind(&program)
        .map_err(|(e, pos)| Error::Symbol(WithSource::single(e, pos, source.to_string())))?;

    Typer::new(&table, &types)
        .check_program(&mut program)
        .map_err(|(e, pos)| Error::Type(WithSource::single(e, pos, source.to_string())))?;
    debug!(eprintln!("Typed AST: {:#?}", program));

    let code = Compiler::new(&mut table, &types).compile(&program).map_err(|errs| {
        Error::Compile(WithSource::new(
            errs.into_iter()
                .map(|(e, pos)| error::SourceErrorWrapper::new(e, pos)),
            source.to_string(),
        ))
    })?;
    debug!(eprintln!("Code: {:?}", code));

    Ok(CompiledProgram { code })
}

/// The terminal state of an emulator run: every general-purpose register,
/// the bytes written through `putc`, and how many instructions it took.
pub struct RunOutcome {
    pub registers: [u32; 32],
    pub output: Vec<u8>,
    pub cycle_count: u64,
}

/// Compiles `source` and runs it to completion against `input` (the bytes
/// `getc` will read, in order). A convenience that chains [compile] and
/// [Emulator::run] for callers (tests, the CLI) that don't need to inspect
/// the compiled word stream in between.
pub fn compile_and_run(
    source: &str,
    file: &str,
    resolver: &dyn IncludeResolver,
    input: Vec<u8>,
) -> Result<RunOutcome, CompileOrRuntimeError> {
    let compiled = compile(source, file, resolver).map_err(CompileOrRuntimeError::Compile)?;
    let mut emulator = Emulator::new(&compiled.code, input);
    emulator.run().map_err(CompileOrRuntimeError::Runtime)?;
    Ok(RunOutcome {
        registers: *emulator.registers(),
        output: emulator.output().to_vec(),
        cycle_count: emulator.cycle_count(),
    })
}

/// Either half of the two remaining stages that can fail once a program
/// has compiled: the emulator finding a `RuntimeError`, carried without a
/// source position since the emulator has no notion of source lines (it
/// only sees already-patched instruction words).
#[derive(Debug)]
pub enum CompileOrRuntimeError {
    Compile(Error),
    Runtime(RuntimeError),
}

impl Display for CompileOrRuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile(e) => write!(f, "{}", e),
            Self::Runtime(e) => {
                use crate::error::SourceError;
                write!(f, "Runtime error: ")?;
                e.fmt_msg(f)
            }
        }
    }
}

impl std::error::Error for CompileOrRuntimeError {}

impl CompileOrRuntimeError {
    /// One `file(line): message` line per error. A runtime error carries no
    /// source position — the emulator only ever sees already-patched
    /// instruction words — so it renders as a bare message.
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            Self::Compile(e) => e.diagnostics(),
            Self::Runtime(e) => {
                use crate::error::SourceError;
                struct Msg<'a>(&'a RuntimeError);
                impl<'a> Display for Msg<'a> {
                    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                        self.0.fmt_msg(f)
                    }
                }
                vec![Msg(e).to_string()]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_program_writes_result_through_memory_mapped_io() {
        let source = r#"
            func main(): void {
                var p: *int;
                p = cast(*int) 0xFFFF000C;
                *p = 2 + 3 * 4;
            }
        "#;
        let outcome = compile_and_run(source, "t.wat", &NullIncludes, vec![]).unwrap();
        assert_eq!(outcome.output, vec![14]);
    }

    #[test]
    fn missing_main_surfaces_as_compile_error() {
        let err = compile("func f(): void { }", "t.wat", &NullIncludes).unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
    }

    #[test]
    fn parse_error_surfaces_as_syntax_error() {
        let err = compile("func main(", "t.wat", &NullIncludes).unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
    }
}
