//! Lexer and parser for the sqlgraph document language.
//!
//! Hand-written recursive descent over a token stream. Produces the AST from
//! `sqlgraph-ast`.

pub mod lexer;
pub mod parser;
pub mod token;

pub use lexer::Lexer;
pub use parser::{
    MAX_PARSE_DEPTH, ParseError, ParseMetricsSnapshot, Parser, parse_metrics_snapshot,
    reset_parse_metrics,
};
pub use token::{Token, TokenKind};
