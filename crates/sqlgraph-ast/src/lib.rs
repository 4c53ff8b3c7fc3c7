//! Abstract syntax tree for the sqlgraph document language.
//!
//! A document holds one or more named operations (queries and mutations);
//! each operation holds variable declarations and a body of table nodes.
//! The parser in `sqlgraph-parser` produces these types and nothing mutates
//! them afterwards: lowering walks the tree read-only, so a `Document` can be
//! compiled concurrently against distinct variable environments.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Span — source location tracking
// ---------------------------------------------------------------------------

/// A byte-offset range into the original document source.
///
/// Tokens and parse errors carry a `Span` so messages can point back at the
/// exact source location.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Byte offset of the first character (inclusive).
    pub start: u32,
    /// Byte offset one past the last character (exclusive).
    pub end: u32,
}

impl Span {
    /// Create a new span from start (inclusive) to end (exclusive) byte offsets.
    #[must_use]
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// A zero-length span at position 0, used as a placeholder.
    pub const ZERO: Self = Self { start: 0, end: 0 };

    /// Merge two spans into one that covers both.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        let start = if self.start < other.start {
            self.start
        } else {
            other.start
        };
        let end = if self.end > other.end {
            self.end
        } else {
            other.end
        };
        Self { start, end }
    }

    /// Length in bytes.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.end - self.start
    }

    /// Whether the span is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.start == self.end
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// Document and operations
// ---------------------------------------------------------------------------

/// A parsed document: an ordered list of named operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub operations: Vec<Operation>,
}

impl Document {
    /// Look up an operation by name.
    ///
    /// Operation names are unique within a document (the parser rejects
    /// duplicates), so the first match is the only match.
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&Operation> {
        self.operations.iter().find(|op| op.name == name)
    }
}

/// Whether an operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        })
    }
}

/// A named query or mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OperationKind,
    pub name: String,
    pub variables: Vec<VariableDecl>,
    pub tables: Vec<Table>,
}

/// A declared operation variable; `$name!` marks it required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableDecl {
    pub name: String,
    pub required: bool,
}

impl VariableDecl {
    /// Create an optional variable declaration.
    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }

    /// Create a required variable declaration.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tables and children
// ---------------------------------------------------------------------------

/// A table node: a relation name, selector parameters, child nodes, and a
/// delete marker (`-` prefix in source).
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub params: Vec<Selector>,
    pub children: Vec<Node>,
    pub delete: bool,
}

impl Table {
    /// The table's field children, in source order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.children.iter().filter_map(|n| match n {
            Node::Field(f) => Some(f),
            Node::Join(_) => None,
        })
    }

    /// The table's join children, in source order.
    pub fn joins(&self) -> impl Iterator<Item = &Table> {
        self.children.iter().filter_map(|n| match n {
            Node::Join(t) => Some(t),
            Node::Field(_) => None,
        })
    }

    /// Whether any child is a join spread.
    #[must_use]
    pub fn has_joins(&self) -> bool {
        self.joins().next().is_some()
    }

    /// Whether any child is a field.
    #[must_use]
    pub fn has_fields(&self) -> bool {
        self.fields().next().is_some()
    }
}

/// A child of a table body.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Field(Field),
    /// `...on <Table>` spread, lowered to an INNER JOIN.
    Join(Table),
}

/// A field node.
///
/// In queries `value` is `None` and `alias` may be set (`name[alias]`); in
/// mutations `value` is required and `alias` is forbidden (`name: expr`).
/// The lowering phase enforces those shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
    pub value: Option<Expression>,
}

impl Field {
    /// A plain projection field with no alias and no value.
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            value: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

/// A predicate in a table's parameter list, compiled to one WHERE/ON term.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    /// Identifier path on the left-hand side (`id`, `users.id`).
    pub lhs: Vec<String>,
    pub op: SelectorOp,
    pub rhs: Expression,
}

/// Comparison operator of a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    In,
}

impl fmt::Display for SelectorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::In => "in",
        })
    }
}

// ---------------------------------------------------------------------------
// Expressions and scalars
// ---------------------------------------------------------------------------

/// An expression on the right-hand side of a selector or field assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A scalar literal.
    Literal(Scalar),
    /// `$name`, resolved against the variable environment at lowering time.
    Variable(String),
    /// Raw SQL emitted verbatim (`CURRENT_TIMESTAMP`, `INTERVAL '1 week'`).
    RawText(String),
    /// A column reference path (`id`, `users.id`), emitted verbatim.
    Column(Vec<String>),
    /// `NAME(args…)` — an uppercase call passed through to SQL.
    FunctionCall(String, Vec<Expression>),
    /// `[a, b, c]` — compiled to a parenthesized list.
    List(Vec<Expression>),
    /// `name(args…)` — inlines another operation's SELECT as a subquery.
    QueryCall(String, Vec<Expression>),
    /// `<a> <op> <b>` with the operator emitted verbatim.
    BinaryOp(String, Box<Expression>, Box<Expression>),
}

/// A scalar value: the leaf grammar shared by literals, variables, and
/// configuration. Serde stays untagged so variable maps bind naturally from
/// JSON (`{"id": 9, "name": "John"}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}
