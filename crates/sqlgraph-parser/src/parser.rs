//! Recursive-descent parser for the document language.
//!
//! Single-shot: the first error aborts the document. The grammar is small
//! enough that expressions need no precedence climbing; arithmetic chains
//! fold left-to-right and are emitted verbatim downstream.

use std::collections::BTreeSet;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use sqlgraph_ast::{
    Document, Expression, Field, Node, Operation, OperationKind, Scalar, Selector, SelectorOp,
    Span, Table, VariableDecl,
};

use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

// ---------------------------------------------------------------------------
// Parse metrics
// ---------------------------------------------------------------------------

/// Monotonic counter of successfully parsed operations.
static SQLGRAPH_PARSE_OPERATIONS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Point-in-time parse metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParseMetricsSnapshot {
    /// Total operations successfully parsed.
    pub sqlgraph_parse_operations_total: u64,
}

/// Take a point-in-time snapshot of parse metrics.
#[must_use]
pub fn parse_metrics_snapshot() -> ParseMetricsSnapshot {
    ParseMetricsSnapshot {
        sqlgraph_parse_operations_total: SQLGRAPH_PARSE_OPERATIONS_TOTAL.load(Ordering::Relaxed),
    }
}

/// Reset parse metrics (used by tests/diagnostics).
pub fn reset_parse_metrics() {
    SQLGRAPH_PARSE_OPERATIONS_TOTAL.store(0, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A parse failure with the source position of the offending token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
    pub line: u32,
    pub col: u32,
}

impl ParseError {
    #[must_use]
    pub(crate) fn at(message: impl Into<String>, token: Option<&Token>) -> Self {
        if let Some(t) = token {
            Self {
                message: message.into(),
                span: t.span,
                line: t.line,
                col: t.col,
            }
        } else {
            Self {
                message: message.into(),
                span: Span::ZERO,
                line: 0,
                col: 0,
            }
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.col, self.message)
    }
}

impl Error for ParseError {}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Nesting limit shared by table bodies and expressions.
pub const MAX_PARSE_DEPTH: u32 = 200;

pub struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) pos: usize,
    pub(crate) depth: u32,
}

impl Parser {
    #[must_use]
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    #[must_use]
    pub fn from_source(source: &str) -> Self {
        Self::new(Lexer::tokenize(source))
    }

    /// Parse a whole document. Single-shot: the first error wins.
    pub fn parse_document(&mut self) -> Result<Document, ParseError> {
        let span = tracing::debug_span!(
            target: "sqlgraph.parse",
            "parse",
            operation_count = tracing::field::Empty,
        );
        let _guard = span.enter();

        let mut operations: Vec<Operation> = Vec::new();
        let mut names: BTreeSet<String> = BTreeSet::new();
        while !self.at_eof() {
            let op = self.parse_operation()?;
            if !names.insert(op.name.clone()) {
                return Err(self.err_msg(format!("duplicate operation name '{}'", op.name)));
            }
            operations.push(op);
        }
        if operations.is_empty() {
            return Err(self.err_msg("document contains no operations"));
        }

        SQLGRAPH_PARSE_OPERATIONS_TOTAL.fetch_add(operations.len() as u64, Ordering::Relaxed);
        span.record("operation_count", operations.len() as u64);

        Ok(Document { operations })
    }

    // -----------------------------------------------------------------------
    // Token navigation
    // -----------------------------------------------------------------------

    pub(crate) fn peek(&self) -> &TokenKind {
        self.current().map_or(&TokenKind::Eof, |t| &t.kind)
    }

    pub(crate) fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    pub(crate) fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if self.pos < self.tokens.len().saturating_sub(1) {
            self.pos += 1;
        }
        t
    }

    pub(crate) fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.check(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.err_expected(&kind.describe()))
        }
    }

    fn err_msg(&self, message: impl Into<String>) -> ParseError {
        ParseError::at(message, self.current())
    }

    fn err_expected(&self, what: &str) -> ParseError {
        // Lexer errors carry their own message; prefer it over "expected X".
        if let TokenKind::Error(msg) = self.peek() {
            return self.err_msg(msg.clone());
        }
        self.err_msg(format!("expected {what}, found {}", self.peek().describe()))
    }

    fn enter_recursion(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(self.err_msg(format!(
                "nesting is too deep (maximum depth {MAX_PARSE_DEPTH})"
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave_recursion(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// A name token. Reserved words are rejected here so misuse like
    /// `query query { … }` reports a dedicated message.
    fn expect_name(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::KwQuery
            | TokenKind::KwMutation
            | TokenKind::KwOn
            | TokenKind::KwIn
            | TokenKind::KwTrue
            | TokenKind::KwFalse
            | TokenKind::KwNull => Err(self.err_msg(format!(
                "{} is a reserved word and cannot be used as {what}",
                self.peek().describe()
            ))),
            _ => Err(self.err_expected(what)),
        }
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    fn parse_operation(&mut self) -> Result<Operation, ParseError> {
        let kind = match self.peek() {
            TokenKind::KwQuery => OperationKind::Query,
            TokenKind::KwMutation => OperationKind::Mutation,
            _ => return Err(self.err_expected("'query' or 'mutation'")),
        };
        self.advance();

        let name = self.expect_name("an operation name")?;
        let variables = if self.check(&TokenKind::LParen) {
            self.parse_var_decls()?
        } else {
            Vec::new()
        };

        self.expect(&TokenKind::LBrace)?;
        let mut tables = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_eof() {
                return Err(self.err_expected("'}' closing the operation body"));
            }
            tables.push(self.parse_table()?);
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(Operation {
            kind,
            name,
            variables,
            tables,
        })
    }

    fn parse_var_decls(&mut self) -> Result<Vec<VariableDecl>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut decls = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let name = match self.peek() {
                TokenKind::Variable(name) => {
                    let name = name.clone();
                    self.advance();
                    name
                }
                _ => return Err(self.err_expected("a variable declaration like '$name'")),
            };
            let required = self.eat(&TokenKind::Bang);
            decls.push(VariableDecl { name, required });
            let _ = self.eat(&TokenKind::Comma);
        }
        self.expect(&TokenKind::RParen)?;
        Ok(decls)
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    fn parse_table(&mut self) -> Result<Table, ParseError> {
        self.enter_recursion()?;
        let result = self.parse_table_inner();
        self.leave_recursion();
        result
    }

    fn parse_table_inner(&mut self) -> Result<Table, ParseError> {
        let delete = self.eat(&TokenKind::Minus);
        let name = self.expect_name("a table name")?;

        let mut params = Vec::new();
        if self.eat(&TokenKind::LParen) {
            while !self.check(&TokenKind::RParen) {
                params.push(self.parse_selector()?);
                let _ = self.eat(&TokenKind::Comma);
            }
            self.expect(&TokenKind::RParen)?;
        }

        let mut children = Vec::new();
        if self.eat(&TokenKind::LBrace) {
            while !self.check(&TokenKind::RBrace) {
                if self.at_eof() {
                    return Err(self.err_expected("'}' closing the table body"));
                }
                children.push(self.parse_child()?);
            }
            self.expect(&TokenKind::RBrace)?;
        }

        Ok(Table {
            name,
            params,
            children,
            delete,
        })
    }

    fn parse_child(&mut self) -> Result<Node, ParseError> {
        if self.eat(&TokenKind::Spread) {
            self.expect(&TokenKind::KwOn)?;
            return Ok(Node::Join(self.parse_table()?));
        }

        let name = self.expect_name("a field name")?;
        if self.eat(&TokenKind::LBracket) {
            let alias = self.expect_name("an alias name")?;
            self.expect(&TokenKind::RBracket)?;
            return Ok(Node::Field(Field {
                name,
                alias: Some(alias),
                value: None,
            }));
        }
        if self.eat(&TokenKind::Colon) {
            let value = self.parse_expression()?;
            return Ok(Node::Field(Field {
                name,
                alias: None,
                value: Some(value),
            }));
        }
        Ok(Node::Field(Field::bare(name)))
    }

    // -----------------------------------------------------------------------
    // Selectors
    // -----------------------------------------------------------------------

    fn parse_selector(&mut self) -> Result<Selector, ParseError> {
        let lhs = self.parse_path()?;
        let op = match self.peek() {
            TokenKind::Eq => SelectorOp::Eq,
            TokenKind::Ne => SelectorOp::Ne,
            TokenKind::Lt => SelectorOp::Lt,
            TokenKind::Le => SelectorOp::Le,
            TokenKind::Gt => SelectorOp::Gt,
            TokenKind::Ge => SelectorOp::Ge,
            TokenKind::KwIn => SelectorOp::In,
            _ => return Err(self.err_expected("a selector operator")),
        };
        self.advance();
        let rhs = self.parse_expression()?;

        if op == SelectorOp::In
            && !matches!(rhs, Expression::List(_) | Expression::QueryCall(..))
        {
            return Err(self.err_msg("'in' requires a list or a query call on the right-hand side"));
        }

        Ok(Selector { lhs, op, rhs })
    }

    fn parse_path(&mut self) -> Result<Vec<String>, ParseError> {
        let mut path = vec![self.expect_name("a column path")?];
        while self.eat(&TokenKind::Dot) {
            path.push(self.expect_name("a column path segment")?);
        }
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.enter_recursion()?;
        let result = self.parse_expression_inner();
        self.leave_recursion();
        result
    }

    fn parse_expression_inner(&mut self) -> Result<Expression, ParseError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expression::BinaryOp(op.to_owned(), Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expression, ParseError> {
        if self.check(&TokenKind::Minus) {
            // Negative numeric literal; other negations are not part of the
            // surface grammar.
            self.advance();
            return match self.peek().clone() {
                TokenKind::Integer(n) => {
                    self.advance();
                    Ok(Expression::Literal(Scalar::Integer(-n)))
                }
                TokenKind::Float(v) => {
                    self.advance();
                    Ok(Expression::Literal(Scalar::Float(-v)))
                }
                _ => Err(self.err_expected("a number after '-'")),
            };
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        match self.peek().clone() {
            TokenKind::Integer(n) => {
                self.advance();
                Ok(Expression::Literal(Scalar::Integer(n)))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expression::Literal(Scalar::Float(v)))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expression::Literal(Scalar::String(s)))
            }
            TokenKind::KwTrue => {
                self.advance();
                Ok(Expression::Literal(Scalar::Bool(true)))
            }
            TokenKind::KwFalse => {
                self.advance();
                Ok(Expression::Literal(Scalar::Bool(false)))
            }
            TokenKind::KwNull => {
                self.advance();
                Ok(Expression::Literal(Scalar::Null))
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expression::Variable(name))
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::Ident(name) => {
                self.advance();
                self.parse_name_expression(name)
            }
            TokenKind::Error(msg) => Err(self.err_msg(msg)),
            _ => Err(self.err_expected("an expression")),
        }
    }

    fn parse_list(&mut self) -> Result<Expression, ParseError> {
        self.expect(&TokenKind::LBracket)?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            items.push(self.parse_expression()?);
            let _ = self.eat(&TokenKind::Comma);
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expression::List(items))
    }

    /// Disambiguate an identifier at expression position.
    ///
    /// UPPERCASE names are raw SQL: bare (`CURRENT_TIMESTAMP`), fused with a
    /// following string (`INTERVAL '1 week'`), or a function call
    /// (`NOW()`). Anything else is a query call when parenthesized, and a
    /// column path otherwise.
    fn parse_name_expression(&mut self, name: String) -> Result<Expression, ParseError> {
        let raw_sql = is_raw_sql_name(&name);

        if self.eat(&TokenKind::LParen) {
            let mut args = Vec::new();
            while !self.check(&TokenKind::RParen) {
                args.push(self.parse_expression()?);
                let _ = self.eat(&TokenKind::Comma);
            }
            self.expect(&TokenKind::RParen)?;

            if raw_sql {
                return Ok(Expression::FunctionCall(name, args));
            }
            for arg in &args {
                if !matches!(arg, Expression::Literal(_) | Expression::Variable(_)) {
                    return Err(self.err_msg(format!(
                        "arguments of query call '{name}' must be literals or variables"
                    )));
                }
            }
            return Ok(Expression::QueryCall(name, args));
        }

        if raw_sql {
            // INTERVAL '1 week' and friends: fuse a following string literal.
            if let TokenKind::Str(s) = self.peek().clone() {
                self.advance();
                return Ok(Expression::RawText(format!("{name} '{s}'")));
            }
            return Ok(Expression::RawText(name));
        }

        let mut path = vec![name];
        while self.eat(&TokenKind::Dot) {
            path.push(self.expect_name("a column path segment")?);
        }
        Ok(Expression::Column(path))
    }
}

/// Unquoted identifiers without lowercase letters pass through as raw SQL.
fn is_raw_sql_name(name: &str) -> bool {
    name.chars().any(|c| c.is_ascii_alphabetic())
        && !name.chars().any(|c| c.is_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
