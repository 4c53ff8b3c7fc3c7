use thiserror::Error;

/// Primary error type for sqlgraph compilation.
///
/// Structured variants for every failure the pipeline can report, grouped by
/// the phase that produces them. Callers that only care about the category
/// can match on [`CompileError::kind`] instead of individual variants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    // === Parse errors ===
    /// The source text could not be parsed into a document.
    #[error("parse error at {line}:{col}: {message}")]
    Parse {
        message: String,
        line: u32,
        col: u32,
    },

    // === Shape errors ===
    /// A mutation field carried a query-style alias.
    #[error("field '{field}' in a mutation cannot carry an alias")]
    AliasInMutation { field: String },

    /// A mutation field had no assignment value.
    #[error("field '{field}' in a mutation requires a value")]
    ValueRequired { field: String },

    /// A delete table listed field children.
    #[error("delete on '{table}' cannot select fields")]
    FieldsNotAllowedInDelete { table: String },

    /// A non-delete mutation table contained a join spread.
    #[error("mutation table '{table}' cannot contain joins")]
    JoinsNotAllowedInMutation { table: String },

    /// A query field carried an assignment value.
    #[error("query table '{table}' cannot assign field values")]
    AssignmentsNotAllowedInQuery { table: String },

    /// A delete table had an empty selector list.
    #[error("delete on '{table}' requires at least one selector")]
    DeleteRequiresSelector { table: String },

    /// An operation that must produce statements had no table to work on.
    #[error("operation '{operation}' contains no table")]
    MutationRequiresTable { operation: String },

    /// Every field of a mutation table was dropped during resolution.
    #[error("no field of '{table}' survived resolution; at least one is required")]
    AtLeastOneFieldRequired { table: String },

    // === Resolution errors ===
    /// A declared-required variable was not supplied by the caller.
    #[error("missing required variable: ${name}")]
    MissingRequiredVariable { name: String },

    /// A query call referenced an operation the document does not contain.
    #[error("unknown operation: {name}")]
    UnknownOperation { name: String },

    /// A query call re-entered an operation already being compiled.
    #[error("recursive query call: {name}")]
    RecursiveQueryCall { name: String },

    /// The requested SQL flavor is not one of `pg`, `mysql`, `sqlite3`.
    #[error("unknown SQL flavor: '{name}'")]
    UnknownFlavor { name: String },

    // === Value errors ===
    /// A scalar failed to serialize into SQL text.
    #[error("value failed to serialize: {detail}")]
    Value { detail: String },
}

/// Coarse error category, one per phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed source text; fatal for the whole document.
    Parse,
    /// The AST violates a structural invariant; fatal for the operation.
    Shape,
    /// Variable or cross-operation lookup failed; fatal for the operation.
    Resolution,
    /// A scalar failed to serialize; recoverable at field granularity.
    Value,
}

impl ErrorKind {
    /// Stable lowercase tag for logs and structured output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Shape => "shape",
            Self::Resolution => "resolution",
            Self::Value => "value",
        }
    }
}

impl CompileError {
    /// Map this error to its category tag.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::AliasInMutation { .. }
            | Self::ValueRequired { .. }
            | Self::FieldsNotAllowedInDelete { .. }
            | Self::JoinsNotAllowedInMutation { .. }
            | Self::AssignmentsNotAllowedInQuery { .. }
            | Self::DeleteRequiresSelector { .. }
            | Self::MutationRequiresTable { .. }
            | Self::AtLeastOneFieldRequired { .. } => ErrorKind::Shape,
            Self::MissingRequiredVariable { .. }
            | Self::UnknownOperation { .. }
            | Self::RecursiveQueryCall { .. }
            | Self::UnknownFlavor { .. } => ErrorKind::Resolution,
            Self::Value { .. } => ErrorKind::Value,
        }
    }

    /// Whether compilation of the containing operation must abort.
    ///
    /// Value errors drop the offending field instead; they only become fatal
    /// indirectly through [`CompileError::AtLeastOneFieldRequired`].
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Value)
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>, line: u32, col: u32) -> Self {
        Self::Parse {
            message: message.into(),
            line,
            col,
        }
    }

    /// Create a missing-required-variable error.
    pub fn missing_variable(name: impl Into<String>) -> Self {
        Self::MissingRequiredVariable { name: name.into() }
    }

    /// Create an unknown-operation error.
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation { name: name.into() }
    }

    /// Create a value-serialization error.
    pub fn value(detail: impl Into<String>) -> Self {
        Self::Value {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `CompileError`.
pub type Result<T> = std::result::Result<T, CompileError>;
