//! Lowering from the sqlgraph document AST to SQL statement strings.
//!
//! The dispatcher classifies each top-level table by shape: a `-` marker
//! means DELETE, a query operation means SELECT, and a mutation table maps to
//! UPDATE when it has selectors and INSERT when it does not. Every statement
//! gets its own [`QueryBuilder`](sqlgraph_builder::QueryBuilder), discarded
//! after serialization, so a `Document` can be compiled concurrently against
//! distinct variable environments.

mod expr;
mod mutation;
mod query;
pub mod resolve;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sqlgraph_ast::{Document, OperationKind, Scalar};
use sqlgraph_builder::Flavor;
use sqlgraph_error::{CompileError, Result};

// ---------------------------------------------------------------------------
// Compile metrics
// ---------------------------------------------------------------------------

/// Monotonic counter of successfully compiled statements.
static SQLGRAPH_COMPILE_STATEMENTS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Point-in-time compile metrics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompileMetricsSnapshot {
    /// Total statements successfully compiled.
    pub sqlgraph_compile_statements_total: u64,
}

/// Take a point-in-time snapshot of compile metrics.
#[must_use]
pub fn compile_metrics_snapshot() -> CompileMetricsSnapshot {
    CompileMetricsSnapshot {
        sqlgraph_compile_statements_total: SQLGRAPH_COMPILE_STATEMENTS_TOTAL
            .load(Ordering::Relaxed),
    }
}

/// Reset compile metrics (used by tests/diagnostics).
pub fn reset_compile_metrics() {
    SQLGRAPH_COMPILE_STATEMENTS_TOTAL.store(0, Ordering::Relaxed);
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Caller-supplied compilation options.
///
/// Statement options (`limit`, `offset`, `orderBy`, `descending`,
/// `returning`) apply to top-level statements only; nested derived tables
/// and query-call subselects never see them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Variables bound into the resolver.
    pub variables: BTreeMap<String, Scalar>,
    /// Appends `LIMIT n`.
    pub limit: Option<u64>,
    /// Appends `OFFSET n`.
    pub offset: Option<u64>,
    /// Appends `ORDER BY column ASC/DESC` per `descending`.
    pub order_by: Option<String>,
    /// Sort direction for `order_by`.
    pub descending: bool,
    /// Appends `RETURNING col` on mutations (dialect-gated).
    pub returning: Option<String>,
}

/// Shared read-only lowering context.
pub(crate) struct Ctx<'a> {
    pub doc: &'a Document,
    pub flavor: Flavor,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Compile every operation of a document, one SQL string per top-level
/// table, in document order.
pub fn compile_document(doc: &Document, flavor: Flavor, config: &Config) -> Result<Vec<String>> {
    let span = tracing::debug_span!(
        target: "sqlgraph.compile",
        "compile",
        flavor = %flavor,
        statement_count = tracing::field::Empty,
    );
    let _guard = span.enter();

    let ctx = Ctx { doc, flavor };
    let mut statements = Vec::new();

    for operation in &doc.operations {
        let env = resolve::resolve(&operation.variables, &config.variables)?;
        if operation.kind == OperationKind::Mutation && operation.tables.is_empty() {
            return Err(CompileError::MutationRequiresTable {
                operation: operation.name.clone(),
            });
        }

        for table in &operation.tables {
            // The stack starts with the operation itself so a query call
            // cannot route back into it.
            let mut stack = vec![operation.name.clone()];
            let sql = if table.delete {
                mutation::lower_delete(&ctx, table, &env, &mut stack, config)?
            } else if operation.kind == OperationKind::Query {
                query::lower_select(&ctx, table, &env, &mut stack, Some(config))?
            } else if table.params.is_empty() {
                mutation::lower_insert(&ctx, table, &env, &mut stack, config)?
            } else {
                mutation::lower_update(&ctx, table, &env, &mut stack, config)?
            };
            SQLGRAPH_COMPILE_STATEMENTS_TOTAL.fetch_add(1, Ordering::Relaxed);
            statements.push(sql);
        }
    }

    span.record("statement_count", statements.len() as u64);
    Ok(statements)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgraph_parser::Parser;

    fn parse(source: &str) -> Document {
        Parser::from_source(source)
            .parse_document()
            .unwrap_or_else(|e| panic!("unexpected parse error: {e}"))
    }

    fn compile_src(source: &str, config: &Config) -> Result<Vec<String>> {
        compile_document(&parse(source), Flavor::Postgres, config)
    }

    fn vars(pairs: &[(&str, Scalar)]) -> Config {
        Config {
            variables: pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
            ..Config::default()
        }
    }

    #[test]
    fn dispatch_classifies_by_shape() {
        let out = compile_src(
            r#"
            query q { users { } }
            mutation ins { users { name: "x" } }
            mutation upd($id) { users(id=$id) { name: "y" } }
            mutation del { - users(id=1) }
            "#,
            &vars(&[("id", Scalar::Integer(3))]),
        )
        .expect("all four shapes compile");
        assert!(out[0].starts_with("SELECT "));
        assert!(out[1].starts_with("INSERT INTO "));
        assert!(out[2].starts_with("UPDATE "));
        assert!(out[3].starts_with("DELETE FROM "));
    }

    #[test]
    fn statements_follow_document_order() {
        let out = compile_src(
            "query a { first { } } query b { second { } third { } }",
            &Config::default(),
        )
        .expect("queries compile");
        assert_eq!(
            out,
            [
                "SELECT * FROM first",
                "SELECT * FROM second",
                "SELECT * FROM third",
            ]
        );
    }

    #[test]
    fn missing_required_variable_fails() {
        let err = compile_src(
            "query q($id!) { users(id=$id) { } }",
            &Config::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingRequiredVariable {
                name: "id".to_owned()
            }
        );
    }

    #[test]
    fn mutation_without_table_fails() {
        let err = compile_src("mutation m { }", &Config::default()).unwrap_err();
        assert!(matches!(err, CompileError::MutationRequiresTable { .. }));
    }

    #[test]
    fn empty_query_operation_produces_nothing() {
        let out = compile_src("query q { }", &Config::default()).expect("empty query body");
        assert!(out.is_empty());
    }

    #[test]
    fn config_applies_to_every_top_level_statement() {
        let config = Config {
            limit: Some(2),
            ..Config::default()
        };
        let out = compile_src("query q { users { } posts { } }", &config).expect("compiles");
        assert_eq!(
            out,
            ["SELECT * FROM users LIMIT 2", "SELECT * FROM posts LIMIT 2"]
        );
    }

    #[test]
    fn config_deserializes_from_camel_case_json() {
        let config: Config = serde_json::from_str(
            r#"{"variables": {"id": 9}, "orderBy": "name", "descending": true, "limit": 1}"#,
        )
        .expect("config should deserialize");
        assert_eq!(config.order_by.as_deref(), Some("name"));
        assert!(config.descending);
        assert_eq!(config.limit, Some(1));
        assert_eq!(config.variables["id"], Scalar::Integer(9));
    }

    #[test]
    fn compilation_is_deterministic() {
        let source = r#"
            query q($dog) { messages(content in ["cat", true, $dog]) { } }
        "#;
        let config = vars(&[("dog", Scalar::from("dog"))]);
        let first = compile_src(source, &config).expect("compiles");
        for _ in 0..16 {
            assert_eq!(compile_src(source, &config).expect("compiles"), first);
        }
    }

    #[test]
    fn metrics_count_statements() {
        reset_compile_metrics();
        let before = compile_metrics_snapshot();
        let _ = compile_src("query q { users { } posts { } }", &Config::default());
        let after = compile_metrics_snapshot();
        assert_eq!(
            after.sqlgraph_compile_statements_total - before.sqlgraph_compile_statements_total,
            2
        );
    }
}
