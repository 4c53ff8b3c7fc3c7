//! Mutation lowering: table nodes to INSERT, UPDATE, and DELETE statements.

use sqlgraph_ast::{Node, Table};
use sqlgraph_builder::QueryBuilder;
use sqlgraph_error::{CompileError, Result};

use crate::expr;
use crate::query;
use crate::resolve::VarEnv;
use crate::{Config, Ctx};

/// Lower a parameterless mutation table to INSERT.
pub(crate) fn lower_insert(
    ctx: &Ctx<'_>,
    table: &Table,
    env: &VarEnv,
    stack: &mut Vec<String>,
    config: &Config,
) -> Result<String> {
    let assignments = compile_field_assignments(ctx, table, env, stack)?;

    let mut qb = QueryBuilder::new(ctx.flavor);
    qb.insert().into_table(&table.name);
    for (column, value) in assignments {
        qb.set(column, value);
    }
    if let Some(column) = &config.returning {
        qb.returning(column);
    }
    Ok(qb.sql())
}

/// Lower a parameterized mutation table to UPDATE.
pub(crate) fn lower_update(
    ctx: &Ctx<'_>,
    table: &Table,
    env: &VarEnv,
    stack: &mut Vec<String>,
    config: &Config,
) -> Result<String> {
    let assignments = compile_field_assignments(ctx, table, env, stack)?;

    let mut qb = QueryBuilder::new(ctx.flavor);
    qb.update().table(&table.name);
    for (column, value) in assignments {
        qb.set(column, value);
    }
    qb.where_clause(expr::compile_selectors(ctx, &table.params, env, stack)?);
    apply_mutation_config(&mut qb, config);
    Ok(qb.sql())
}

/// Lower a `-`-marked table to DELETE.
///
/// Joins are permitted and reuse query lowering; the resulting
/// `DELETE … INNER JOIN` matches the observable output of the original even
/// though it is not portable SQL.
pub(crate) fn lower_delete(
    ctx: &Ctx<'_>,
    table: &Table,
    env: &VarEnv,
    stack: &mut Vec<String>,
    config: &Config,
) -> Result<String> {
    if table.params.is_empty() {
        return Err(CompileError::DeleteRequiresSelector {
            table: table.name.clone(),
        });
    }
    if table.has_fields() {
        return Err(CompileError::FieldsNotAllowedInDelete {
            table: table.name.clone(),
        });
    }

    let mut qb = QueryBuilder::new(ctx.flavor);
    qb.delete().from(&table.name);
    for join in table.joins() {
        let (fragment, _exposed) = query::lower_join(ctx, join, &table.name, env, stack)?;
        qb.join(fragment);
    }
    qb.where_clause(expr::compile_selectors(ctx, &table.params, env, stack)?);
    apply_mutation_config(&mut qb, config);
    Ok(qb.sql())
}

/// Compile the table's field assignments in source order.
///
/// Fields whose variable value is unbound are omitted; an empty survivor set
/// is an error. Join children are rejected here because only deletes may
/// carry them.
fn compile_field_assignments(
    ctx: &Ctx<'_>,
    table: &Table,
    env: &VarEnv,
    stack: &mut Vec<String>,
) -> Result<Vec<(String, String)>> {
    let mut assignments = Vec::new();
    for node in &table.children {
        let field = match node {
            Node::Field(field) => field,
            Node::Join(_) => {
                return Err(CompileError::JoinsNotAllowedInMutation {
                    table: table.name.clone(),
                });
            }
        };
        if field.alias.is_some() {
            return Err(CompileError::AliasInMutation {
                field: field.name.clone(),
            });
        }
        let Some(value) = &field.value else {
            return Err(CompileError::ValueRequired {
                field: field.name.clone(),
            });
        };
        if let Some(compiled) =
            expr::compile_assignment_value(ctx, &field.name, value, env, stack)?
        {
            assignments.push((field.name.clone(), compiled));
        }
    }

    if assignments.is_empty() {
        return Err(CompileError::AtLeastOneFieldRequired {
            table: table.name.clone(),
        });
    }
    Ok(assignments)
}

fn apply_mutation_config(qb: &mut QueryBuilder, config: &Config) {
    if let Some(column) = &config.order_by {
        qb.order(column, config.descending);
    }
    if let Some(n) = config.limit {
        qb.limit(n);
    }
    if let Some(column) = &config.returning {
        qb.returning(column);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgraph_ast::{Document, Scalar};
    use sqlgraph_builder::Flavor;
    use sqlgraph_parser::Parser;

    fn parse(source: &str) -> Document {
        Parser::from_source(source)
            .parse_document()
            .unwrap_or_else(|e| panic!("unexpected parse error: {e}"))
    }

    fn env_with(pairs: &[(&str, Scalar)]) -> VarEnv {
        VarEnv::from_values(
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_owned(), v.clone()))
                .collect(),
        )
    }

    fn lower_first(source: &str, env: &VarEnv, config: &Config) -> Result<String> {
        let doc = parse(source);
        let ctx = Ctx {
            doc: &doc,
            flavor: Flavor::Postgres,
        };
        let table = &doc.operations[0].tables[0];
        let mut stack = vec![doc.operations[0].name.clone()];
        if table.delete {
            lower_delete(&ctx, table, env, &mut stack, config)
        } else if table.params.is_empty() {
            lower_insert(&ctx, table, env, &mut stack, config)
        } else {
            lower_update(&ctx, table, env, &mut stack, config)
        }
    }

    #[test]
    fn insert_with_literals() {
        let sql = lower_first(
            r#"mutation m { users { name: "John" age: 45 } }"#,
            &VarEnv::default(),
            &Config::default(),
        )
        .expect("insert compiles");
        assert_eq!(sql, "INSERT INTO users (name, age) VALUES ('John', 45)");
    }

    #[test]
    fn update_with_variables() {
        let sql = lower_first(
            "mutation m($id, $name, $age) { users(id=$id) { name: $name age: $age } }",
            &env_with(&[
                ("id", Scalar::Integer(9)),
                ("name", Scalar::from("John")),
                ("age", Scalar::Integer(45)),
            ]),
            &Config::default(),
        )
        .expect("update compiles");
        assert_eq!(
            sql,
            "UPDATE users SET name = 'John', age = 45 WHERE (id = 9)"
        );
    }

    #[test]
    fn unresolved_variable_drops_field() {
        let sql = lower_first(
            "mutation m($name, $age) { users(id=1) { name: $name age: $age } }",
            &env_with(&[("name", Scalar::from("John"))]),
            &Config::default(),
        )
        .expect("partial update compiles");
        assert_eq!(sql, "UPDATE users SET name = 'John' WHERE (id = 1)");
    }

    #[test]
    fn all_fields_dropped_is_an_error() {
        let err = lower_first(
            "mutation m($name) { users { name: $name } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::AtLeastOneFieldRequired { table } if table == "users"
        ));
    }

    #[test]
    fn alias_in_mutation_rejected() {
        let err = lower_first(
            "mutation m { users(id=1) { name[alias] } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::AliasInMutation { field } if field == "name"));
    }

    #[test]
    fn bare_field_in_mutation_rejected() {
        let err = lower_first(
            "mutation m { users(id=1) { name } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::ValueRequired { field } if field == "name"));
    }

    #[test]
    fn join_in_mutation_rejected() {
        let err = lower_first(
            "mutation m { users { name: 1 ...on bookmarks(user_id=users.id) { } } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::JoinsNotAllowedInMutation { table } if table == "users"
        ));
    }

    #[test]
    fn raw_text_assignment_passes_through() {
        let sql = lower_first(
            "mutation m { events { at: CURRENT_TIMESTAMP } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .expect("raw assignment compiles");
        assert_eq!(sql, "INSERT INTO events (at) VALUES (CURRENT_TIMESTAMP)");
    }

    #[test]
    fn compound_assignment_is_parenthesized() {
        let sql = lower_first(
            "mutation m { events { until: CURRENT_TIMESTAMP - INTERVAL '1 week' } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .expect("compound assignment compiles");
        assert_eq!(
            sql,
            "INSERT INTO events (until) VALUES ((CURRENT_TIMESTAMP - INTERVAL '1 week'))"
        );
    }

    #[test]
    fn delete_with_order_limit() {
        let config = Config {
            limit: Some(1),
            order_by: Some("name".to_owned()),
            descending: true,
            ..Config::default()
        };
        let sql = lower_first(
            "mutation m($name) { - users(name=$name) }",
            &env_with(&[("name", Scalar::from("Tyler"))]),
            &config,
        )
        .expect("delete compiles");
        assert_eq!(
            sql,
            "DELETE FROM users WHERE (name = 'Tyler') ORDER BY name DESC LIMIT 1"
        );
    }

    #[test]
    fn delete_requires_selector() {
        let err = lower_first(
            "mutation m { - users }",
            &VarEnv::default(),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CompileError::DeleteRequiresSelector { table } if table == "users"
        ));
    }

    #[test]
    fn delete_rejects_fields_but_allows_joins() {
        let err = lower_first(
            "mutation m { - users(id=1) { name } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::FieldsNotAllowedInDelete { .. }));

        let sql = lower_first(
            "mutation m { - users(id=1) { ...on bookmarks(user_id=users.id) { } } }",
            &VarEnv::default(),
            &Config::default(),
        )
        .expect("delete with join compiles");
        assert_eq!(
            sql,
            "DELETE FROM users \
             INNER JOIN (SELECT bookmarks.user_id FROM bookmarks) \
             AS bookmarks ON (bookmarks.user_id = users.id) \
             WHERE (id = 1)"
        );
    }

    #[test]
    fn insert_returning_is_dialect_gated() {
        let doc = parse(r#"mutation m { users { name: "x" } }"#);
        let table = &doc.operations[0].tables[0];
        let config = Config {
            returning: Some("id".to_owned()),
            ..Config::default()
        };
        for (flavor, expected) in [
            (
                Flavor::Postgres,
                "INSERT INTO users (name) VALUES ('x') RETURNING id",
            ),
            (Flavor::Mysql, "INSERT INTO users (name) VALUES ('x')"),
            (
                Flavor::Sqlite,
                "INSERT INTO users (name) VALUES ('x') RETURNING id",
            ),
        ] {
            let ctx = Ctx { doc: &doc, flavor };
            let mut stack = vec!["m".to_owned()];
            let sql = lower_insert(&ctx, table, &VarEnv::default(), &mut stack, &config)
                .expect("insert compiles");
            assert_eq!(sql, expected);
        }
    }
}
