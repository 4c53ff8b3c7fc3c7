//! Flavor-parameterized SQL statement assembly.
//!
//! [`QueryBuilder`] collects statement parts through chained calls and
//! serializes the clauses in canonical order, whatever order the lowering
//! phase supplied them in. It owns scalar quoting; nothing else in the
//! pipeline writes quotes. One builder per in-flight statement, discarded
//! once the SQL string is produced.

use std::fmt;
use std::str::FromStr;

use sqlgraph_ast::Scalar;
use sqlgraph_error::CompileError;

// ---------------------------------------------------------------------------
// Flavor
// ---------------------------------------------------------------------------

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    Postgres,
    Mysql,
    Sqlite,
}

impl Flavor {
    /// Whether the dialect accepts a `RETURNING` clause on mutations.
    #[must_use]
    pub const fn supports_returning(self) -> bool {
        // MySQL has no RETURNING; Postgres and modern SQLite do.
        !matches!(self, Self::Mysql)
    }

    /// Canonical flavor tag as accepted by [`FromStr`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "pg",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite3",
        }
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Flavor {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pg" | "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(CompileError::UnknownFlavor {
                name: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// QueryBuilder
// ---------------------------------------------------------------------------

/// The statement being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum StatementKind {
    #[default]
    Select,
    Insert,
    Update,
    Delete,
}

/// Accumulates one SQL statement and serializes it on demand.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    flavor: Flavor,
    kind: StatementKind,
    target: String,
    fields: Vec<String>,
    assignments: Vec<(String, String)>,
    joins: Vec<String>,
    predicate: Option<String>,
    order: Option<(String, bool)>,
    limit: Option<u64>,
    offset: Option<u64>,
    returning: Option<String>,
}

impl QueryBuilder {
    /// Create an empty builder for the given flavor.
    #[must_use]
    pub fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            kind: StatementKind::default(),
            target: String::new(),
            fields: Vec::new(),
            assignments: Vec::new(),
            joins: Vec::new(),
            predicate: None,
            order: None,
            limit: None,
            offset: None,
            returning: None,
        }
    }

    /// The flavor this builder serializes for.
    #[must_use]
    pub const fn flavor(&self) -> Flavor {
        self.flavor
    }

    // -- statement kind -----------------------------------------------------

    pub fn select(&mut self) -> &mut Self {
        self.kind = StatementKind::Select;
        self
    }

    pub fn insert(&mut self) -> &mut Self {
        self.kind = StatementKind::Insert;
        self
    }

    pub fn update(&mut self) -> &mut Self {
        self.kind = StatementKind::Update;
        self
    }

    pub fn delete(&mut self) -> &mut Self {
        self.kind = StatementKind::Delete;
        self
    }

    // -- target relation ----------------------------------------------------

    /// `FROM <name>` target for SELECT/DELETE.
    pub fn from(&mut self, name: impl Into<String>) -> &mut Self {
        self.target = name.into();
        self
    }

    /// `INSERT INTO <name>` target.
    pub fn into_table(&mut self, name: impl Into<String>) -> &mut Self {
        self.target = name.into();
        self
    }

    /// `UPDATE <name>` target.
    pub fn table(&mut self, name: impl Into<String>) -> &mut Self {
        self.target = name.into();
        self
    }

    // -- statement parts ----------------------------------------------------

    /// Add a projection entry (SELECT only). No entries means `*`.
    pub fn field(&mut self, expr: impl Into<String>) -> &mut Self {
        self.fields.push(expr.into());
        self
    }

    /// Add a column/value pair. Serializes as `SET col = val` for UPDATE and
    /// as parallel column/value lists for INSERT.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    /// Append an already-assembled join fragment.
    pub fn join(&mut self, fragment: impl Into<String>) -> &mut Self {
        self.joins.push(fragment.into());
        self
    }

    /// Set the WHERE predicate. The caller supplies the text already wrapped
    /// in its single pair of parentheses.
    pub fn where_clause(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// `ORDER BY <column> ASC|DESC`.
    pub fn order(&mut self, column: impl Into<String>, descending: bool) -> &mut Self {
        self.order = Some((column.into(), descending));
        self
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// `RETURNING <column>`, dropped on dialects without the clause.
    pub fn returning(&mut self, column: impl Into<String>) -> &mut Self {
        let column = column.into();
        if self.flavor.supports_returning() {
            self.returning = Some(column);
        } else {
            tracing::warn!(
                target: "sqlgraph.build",
                flavor = %self.flavor,
                column = %column,
                "RETURNING is not supported by this flavor; clause dropped"
            );
        }
        self
    }

    // -- value serialization ------------------------------------------------

    /// Quote a string scalar: single quotes, embedded quotes doubled.
    #[must_use]
    pub fn quote_str(&self, s: &str) -> String {
        format!("'{}'", s.replace('\'', "''"))
    }

    /// Serialize a scalar: `NULL`, `TRUE`/`FALSE`, bare numerics (floats
    /// always carry a decimal point), quoted strings.
    #[must_use]
    pub fn scalar(&self, value: &Scalar) -> String {
        match value {
            Scalar::Null => "NULL".to_owned(),
            Scalar::Bool(true) => "TRUE".to_owned(),
            Scalar::Bool(false) => "FALSE".to_owned(),
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(v) => {
                if v.fract() == 0.0 && !v.is_infinite() && !v.is_nan() {
                    format!("{v:.1}")
                } else {
                    format!("{v}")
                }
            }
            Scalar::String(s) => self.quote_str(s),
        }
    }

    /// Raw-text sink: pass text through verbatim.
    #[must_use]
    pub fn raw(&self, text: &str) -> String {
        text.to_owned()
    }

    // -- serialization ------------------------------------------------------

    /// Serialize the statement.
    #[must_use]
    pub fn sql(&self) -> String {
        self.to_string()
    }

    fn write_tail(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(predicate) = &self.predicate {
            write!(f, " WHERE {predicate}")?;
        }
        if let Some((column, descending)) = &self.order {
            let dir = if *descending { "DESC" } else { "ASC" };
            write!(f, " ORDER BY {column} {dir}")?;
        }
        if let Some(n) = self.limit {
            write!(f, " LIMIT {n}")?;
        }
        if let Some(n) = self.offset {
            write!(f, " OFFSET {n}")?;
        }
        Ok(())
    }

    fn write_returning(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(column) = &self.returning {
            write!(f, " RETURNING {column}")?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StatementKind::Select => {
                f.write_str("SELECT ")?;
                if self.fields.is_empty() {
                    f.write_str("*")?;
                } else {
                    f.write_str(&self.fields.join(", "))?;
                }
                write!(f, " FROM {}", self.target)?;
                for join in &self.joins {
                    write!(f, " {join}")?;
                }
                self.write_tail(f)
            }
            StatementKind::Insert => {
                write!(f, "INSERT INTO {} (", self.target)?;
                for (i, (column, _)) in self.assignments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(column)?;
                }
                f.write_str(") VALUES (")?;
                for (i, (_, value)) in self.assignments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(value)?;
                }
                f.write_str(")")?;
                self.write_returning(f)
            }
            StatementKind::Update => {
                write!(f, "UPDATE {} SET ", self.target)?;
                for (i, (column, value)) in self.assignments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{column} = {value}")?;
                }
                self.write_tail(f)?;
                self.write_returning(f)
            }
            StatementKind::Delete => {
                write!(f, "DELETE FROM {}", self.target)?;
                for join in &self.joins {
                    write!(f, " {join}")?;
                }
                self.write_tail(f)?;
                self.write_returning(f)
            }
        }
    }
}
