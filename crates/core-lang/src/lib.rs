//! Lexer, AST and parser for the restricted teaching language that lesson
//! bodies and validator scripts are written in. Execution semantics live
//! in `core-interp`; this crate only turns source text into a [`Program`].

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::Program;

use thiserror::Error;

/// A single, unified syntax-error shape for callers: wherever the failure
/// originated (tokenizing or parsing), it carries enough to render a caret
/// under the offending column the way a terminal diagnostic should.
#[derive(Debug, Error, Clone)]
#[error("line {line}, column {col}: {message}")]
pub struct LangError {
    pub line: u32,
    pub col: u32,
    pub message: String,
    pub offending_line: String,
}

impl From<lexer::LexError> for LangError {
    fn from(e: lexer::LexError) -> Self {
        LangError {
            line: e.line,
            col: e.col,
            message: e.message,
            offending_line: e.offending_line,
        }
    }
}

impl From<parser::ParseError> for LangError {
    fn from(e: parser::ParseError) -> Self {
        LangError {
            line: e.line,
            col: e.col,
            message: e.message,
            offending_line: e.offending_line,
        }
    }
}

/// Parses a lesson submission's full source text into a program. Equivalent
/// to `compile(source, "<submission>", "exec")` in the original engine: a
/// failure here is a `SyntacticFailure`, never a runtime one.
pub fn compile(source: &str) -> Result<Program, LangError> {
    parser::parse_program(source).map_err(LangError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_validator_shaped_source() {
        let src = "def carp(a, b):\n    return a * b\n\nresult = carp(3, 4)\n";
        let program = compile(src).unwrap();
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn surfaces_line_and_column_on_bad_syntax() {
        let err = compile("def f(:\n    pass\n").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(!err.offending_line.is_empty());
    }
}
