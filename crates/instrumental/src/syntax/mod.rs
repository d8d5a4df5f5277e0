//! Host language syntax: tree, tokenizer, parser and renderer.
//!
//! The host language is a small indentation-structured scripting language
//! with short-circuit `and`/`or`, chained comparisons, conditional
//! expressions, documentation strings and `from __future__` imports.

pub mod ast;
mod lexer;
mod parser;
mod render;

use thiserror::Error;

pub use ast::*;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use render::{quote, render_expr, render_module};

/// Syntax error with the line it was found on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    /// 1-based line
    pub line: u32,
    /// What went wrong
    pub message: String,
}

impl ParseError {
    /// Create a syntax error
    #[must_use]
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Parse source text into a module
pub fn parse(source: &str) -> Result<Module, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_module()
}
