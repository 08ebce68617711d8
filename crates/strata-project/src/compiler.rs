//! The seam to the language compiler
//!
//! Lexing, parsing and type checking happen elsewhere. The pipeline only
//! needs to hand a file over, collect diagnostics and print the result.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    SyntaxError,
    TypeError,
    Warning,
    /// An unresolved symbol
    Unknown,
}

impl DiagnosticKind {
    pub fn is_error(self) -> bool {
        matches!(self, DiagnosticKind::SyntaxError | DiagnosticKind::TypeError)
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::SyntaxError => "syntax error",
            DiagnosticKind::TypeError => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Unknown => "unknown variable",
        };
        f.write_str(name)
    }
}

/// A compiler message tied to a source position (1-based line and column)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.kind,
            self.message
        )
    }
}

/// Outcome of processing one file
#[derive(Debug, Clone, Default)]
pub struct Processed<A> {
    pub ast: A,
    pub syntax_errors: Vec<Diagnostic>,
    pub type_errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub unknowns: Vec<Diagnostic>,
}

impl<A> Processed<A> {
    pub fn has_errors(&self) -> bool {
        !self.syntax_errors.is_empty() || !self.type_errors.is_empty()
    }

    /// Every diagnostic, errors first
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.syntax_errors
            .iter()
            .chain(&self.type_errors)
            .chain(&self.warnings)
            .chain(&self.unknowns)
    }
}

/// A compiler the build pipeline can drive one file at a time.
///
/// The environment carries state between files (loaded modules, known
/// types) and is threaded through explicitly.
pub trait Compiler {
    type Ast;
    type Env;

    fn new_env(&mut self, preload_modules: &[String]) -> Result<Self::Env, String>;

    /// Process a file. `Err` is a fatal failure, not a diagnostic.
    fn process(&mut self, file: &Path, env: &mut Self::Env) -> Result<Processed<Self::Ast>, String>;

    fn pretty_print(&self, ast: &Self::Ast) -> String;
}
