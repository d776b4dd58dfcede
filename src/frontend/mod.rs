//! Frontend module - Lexer, Parser, AST arena

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
