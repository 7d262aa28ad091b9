//!
//! The Shale Parser
//! ================
//!
//! This crate serves as the parser for the Shale shell-scripting language:
//! it consumes the lexer's token stream and produces the AST consumed by the
//! interpreter.
//!

mod parser;

pub use crate::parser::{ParseError, Parser};

use shale_core::ast::Block;
use shale_lexer::Token;

/// Parse a program from its token stream.
pub fn parse_tokens(tokens: Vec<Token>) -> Result<Block, ParseError> {
    Parser::new(tokens).parse_program()
}

/// Lex and parse a program from source text.
pub fn parse(input: &str) -> Result<Block, ParseError> {
    let tokens = shale_lexer::lex(input).map_err(|err| ParseError {
        message: err.message,
        pos: err.pos,
    })?;
    Parser::new(tokens).parse_program()
}
