//! Selector and expression compilation.
//!
//! Shared by query and mutation lowering: serializes predicate terms and
//! scalar expressions with the quoting rules of the builder. Query calls
//! inline another operation's SELECT, guarded against recursion.

use std::collections::BTreeMap;

use sqlgraph_ast::{Expression, Selector};
use sqlgraph_builder::QueryBuilder;
use sqlgraph_error::{CompileError, Result};

use crate::query;
use crate::resolve::{self, VarEnv};
use crate::Ctx;

/// Hard ceiling on query-call nesting; deeper chains are treated as cycles.
pub(crate) const MAX_QUERY_CALL_DEPTH: usize = 32;

/// Compile a selector list into one WHERE/ON-ready predicate, wrapped in a
/// single pair of parentheses.
pub(crate) fn compile_selectors(
    ctx: &Ctx<'_>,
    selectors: &[Selector],
    env: &VarEnv,
    stack: &mut Vec<String>,
) -> Result<String> {
    let mut terms = Vec::with_capacity(selectors.len());
    for selector in selectors {
        terms.push(compile_selector(ctx, selector, env, stack)?);
    }
    Ok(format!("({})", terms.join(" AND ")))
}

/// Compile one `lhs op rhs` term.
pub(crate) fn compile_selector(
    ctx: &Ctx<'_>,
    selector: &Selector,
    env: &VarEnv,
    stack: &mut Vec<String>,
) -> Result<String> {
    let rhs = compile_expr(ctx, &selector.rhs, env, stack)?;
    Ok(format!("{} {} {}", selector.lhs.join("."), selector.op, rhs))
}

/// Compile an expression to SQL text.
pub(crate) fn compile_expr(
    ctx: &Ctx<'_>,
    expr: &Expression,
    env: &VarEnv,
    stack: &mut Vec<String>,
) -> Result<String> {
    let qb = QueryBuilder::new(ctx.flavor);
    match expr {
        Expression::Literal(scalar) => Ok(qb.scalar(scalar)),
        Expression::Variable(name) => match env.get(name) {
            Some(scalar) => Ok(qb.scalar(scalar)),
            None => {
                tracing::debug!(
                    target: "sqlgraph.compile",
                    variable = %name,
                    "variable unresolved in selector position; compiling to NULL"
                );
                Ok("NULL".to_owned())
            }
        },
        Expression::RawText(text) => Ok(qb.raw(text)),
        Expression::Column(path) => Ok(path.join(".")),
        Expression::FunctionCall(name, args) => {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                parts.push(compile_expr(ctx, arg, env, stack)?);
            }
            Ok(format!("{name}({})", parts.join(", ")))
        }
        Expression::List(items) => {
            let mut parts = Vec::with_capacity(items.len());
            for item in items {
                parts.push(compile_expr(ctx, item, env, stack)?);
            }
            Ok(format!("({})", parts.join(", ")))
        }
        Expression::QueryCall(name, args) => compile_query_call(ctx, name, args, env, stack),
        Expression::BinaryOp(op, lhs, rhs) => {
            let lhs = compile_expr(ctx, lhs, env, stack)?;
            let rhs = compile_expr(ctx, rhs, env, stack)?;
            Ok(format!("{lhs} {op} {rhs}"))
        }
    }
}

/// Compile a mutation field's assignment value.
///
/// Returns `Ok(None)` when the value is a variable the environment does not
/// bind; the caller omits the field from the statement. Compound values are
/// parenthesized so they survive as one SQL operand.
pub(crate) fn compile_assignment_value(
    ctx: &Ctx<'_>,
    field_name: &str,
    expr: &Expression,
    env: &VarEnv,
    stack: &mut Vec<String>,
) -> Result<Option<String>> {
    match expr {
        Expression::Variable(name) => match env.get(name) {
            Some(scalar) => Ok(Some(QueryBuilder::new(ctx.flavor).scalar(scalar))),
            None => {
                tracing::debug!(
                    target: "sqlgraph.compile",
                    field = %field_name,
                    variable = %name,
                    "variable unresolved; omitting field assignment"
                );
                Ok(None)
            }
        },
        Expression::BinaryOp(..) => Ok(Some(format!(
            "({})",
            compile_expr(ctx, expr, env, stack)?
        ))),
        _ => Ok(Some(compile_expr(ctx, expr, env, stack)?)),
    }
}

/// Inline another operation's SELECT as a parenthesized subquery.
///
/// Arguments bind positionally to the callee's declared variables; the
/// callee's own required-variable rules still apply.
fn compile_query_call(
    ctx: &Ctx<'_>,
    name: &str,
    args: &[Expression],
    env: &VarEnv,
    stack: &mut Vec<String>,
) -> Result<String> {
    let operation = ctx
        .doc
        .operation(name)
        .ok_or_else(|| CompileError::unknown_operation(name))?;

    if stack.iter().any(|frame| frame == name) || stack.len() >= MAX_QUERY_CALL_DEPTH {
        return Err(CompileError::RecursiveQueryCall {
            name: name.to_owned(),
        });
    }

    let mut bound = BTreeMap::new();
    for (decl, arg) in operation.variables.iter().zip(args) {
        match arg {
            Expression::Literal(scalar) => {
                bound.insert(decl.name.clone(), scalar.clone());
            }
            Expression::Variable(var) => {
                if let Some(scalar) = env.get(var) {
                    bound.insert(decl.name.clone(), scalar.clone());
                }
            }
            // The parser restricts query-call arguments to the two arms above.
            _ => {}
        }
    }
    let callee_env = resolve::resolve(&operation.variables, &bound)?;

    let table = operation
        .tables
        .first()
        .ok_or_else(|| CompileError::MutationRequiresTable {
            operation: operation.name.clone(),
        })?;

    stack.push(operation.name.clone());
    let sql = query::lower_select(ctx, table, &callee_env, stack, None);
    stack.pop();

    Ok(format!("({})", sql?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlgraph_ast::{Scalar, SelectorOp};
    use sqlgraph_builder::Flavor;
    use sqlgraph_parser::Parser;

    fn ctx_over(source: &str) -> (sqlgraph_ast::Document, Flavor) {
        let doc = Parser::from_source(source)
            .parse_document()
            .unwrap_or_else(|e| panic!("unexpected parse error: {e}"));
        (doc, Flavor::Postgres)
    }

    fn compile(source: &str, expr: &Expression, env: &VarEnv) -> Result<String> {
        let (doc, flavor) = ctx_over(source);
        let ctx = Ctx { doc: &doc, flavor };
        compile_expr(&ctx, expr, env, &mut Vec::new())
    }

    const DUMMY: &str = "query q { t { } }";

    fn env_with(name: &str, value: Scalar) -> VarEnv {
        VarEnv::from_values([(name.to_owned(), value)].into_iter().collect())
    }

    #[test]
    fn literal_emission() {
        let env = VarEnv::default();
        for (expr, expected) in [
            (Expression::Literal(Scalar::Null), "NULL"),
            (Expression::Literal(Scalar::Bool(true)), "TRUE"),
            (Expression::Literal(Scalar::Integer(45)), "45"),
            (
                Expression::Literal(Scalar::String("John".to_owned())),
                "'John'",
            ),
        ] {
            assert_eq!(compile(DUMMY, &expr, &env).unwrap(), expected);
        }
    }

    #[test]
    fn variable_resolves_or_nulls() {
        let expr = Expression::Variable("dog".to_owned());
        let bound = env_with("dog", Scalar::from("dog"));
        assert_eq!(compile(DUMMY, &expr, &bound).unwrap(), "'dog'");
        assert_eq!(compile(DUMMY, &expr, &VarEnv::default()).unwrap(), "NULL");
    }

    #[test]
    fn raw_text_and_columns_verbatim() {
        let env = VarEnv::default();
        assert_eq!(
            compile(
                DUMMY,
                &Expression::RawText("CURRENT_TIMESTAMP".to_owned()),
                &env
            )
            .unwrap(),
            "CURRENT_TIMESTAMP"
        );
        assert_eq!(
            compile(
                DUMMY,
                &Expression::Column(vec!["users".to_owned(), "id".to_owned()]),
                &env
            )
            .unwrap(),
            "users.id"
        );
    }

    #[test]
    fn function_call_and_list() {
        let env = VarEnv::default();
        let call = Expression::FunctionCall(
            "COALESCE".to_owned(),
            vec![
                Expression::Column(vec!["name".to_owned()]),
                Expression::Literal(Scalar::String("anon".to_owned())),
            ],
        );
        assert_eq!(compile(DUMMY, &call, &env).unwrap(), "COALESCE(name, 'anon')");

        let list = Expression::List(vec![
            Expression::Literal(Scalar::String("cat".to_owned())),
            Expression::Literal(Scalar::Bool(true)),
        ]);
        assert_eq!(compile(DUMMY, &list, &env).unwrap(), "('cat', TRUE)");
    }

    #[test]
    fn binary_op_spreads_verbatim() {
        let env = VarEnv::default();
        let expr = Expression::BinaryOp(
            "-".to_owned(),
            Box::new(Expression::RawText("CURRENT_TIMESTAMP".to_owned())),
            Box::new(Expression::RawText("INTERVAL '1 week'".to_owned())),
        );
        assert_eq!(
            compile(DUMMY, &expr, &env).unwrap(),
            "CURRENT_TIMESTAMP - INTERVAL '1 week'"
        );
    }

    #[test]
    fn selector_list_wraps_once() {
        let (doc, flavor) = ctx_over(DUMMY);
        let ctx = Ctx { doc: &doc, flavor };
        let selectors = vec![
            Selector {
                lhs: vec!["id".to_owned()],
                op: SelectorOp::Eq,
                rhs: Expression::Literal(Scalar::Integer(9)),
            },
            Selector {
                lhs: vec!["age".to_owned()],
                op: SelectorOp::Ge,
                rhs: Expression::Literal(Scalar::Integer(21)),
            },
        ];
        let sql = compile_selectors(&ctx, &selectors, &VarEnv::default(), &mut Vec::new())
            .expect("selectors compile");
        assert_eq!(sql, "(id = 9 AND age >= 21)");
    }

    #[test]
    fn query_call_inlines_subselect() {
        let source =
            "query getUserID { users(id=3) { id } } query q { users(id=getUserID()) { name } }";
        let expr = Expression::QueryCall("getUserID".to_owned(), vec![]);
        let sql = compile(source, &expr, &VarEnv::default()).expect("query call compiles");
        assert_eq!(sql, "(SELECT users.id FROM users WHERE (id = 3))");
    }

    #[test]
    fn query_call_binds_arguments_positionally() {
        let source =
            "query byId($id!) { users(id=$id) { id } } query q { users(id=byId(7)) { } }";
        let expr = Expression::QueryCall(
            "byId".to_owned(),
            vec![Expression::Literal(Scalar::Integer(7))],
        );
        let sql = compile(source, &expr, &VarEnv::default()).expect("bound call compiles");
        assert_eq!(sql, "(SELECT users.id FROM users WHERE (id = 7))");
    }

    #[test]
    fn query_call_enforces_callee_required_variables() {
        let source = "query byId($id!) { users(id=$id) { id } } query q { users(id=byId($missing)) { } }";
        let expr = Expression::QueryCall(
            "byId".to_owned(),
            vec![Expression::Variable("missing".to_owned())],
        );
        let err = compile(source, &expr, &VarEnv::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::MissingRequiredVariable {
                name: "id".to_owned()
            }
        );
    }

    #[test]
    fn unknown_operation_rejected() {
        let expr = Expression::QueryCall("nowhere".to_owned(), vec![]);
        let err = compile(DUMMY, &expr, &VarEnv::default()).unwrap_err();
        assert_eq!(err, CompileError::unknown_operation("nowhere"));
    }

    #[test]
    fn recursive_query_call_rejected() {
        let source = "query loop_a { t(id=loop_b()) { } } query loop_b { t(id=loop_a()) { } }";
        let expr = Expression::QueryCall("loop_a".to_owned(), vec![]);
        let err = compile(source, &expr, &VarEnv::default()).unwrap_err();
        assert!(matches!(err, CompileError::RecursiveQueryCall { .. }));
    }

    #[test]
    fn assignment_value_skips_unbound_variable() {
        let (doc, flavor) = ctx_over(DUMMY);
        let ctx = Ctx { doc: &doc, flavor };
        let value = Expression::Variable("ghost".to_owned());
        let compiled = compile_assignment_value(
            &ctx,
            "name",
            &value,
            &VarEnv::default(),
            &mut Vec::new(),
        )
        .expect("skip is not an error");
        assert_eq!(compiled, None);
    }

    #[test]
    fn assignment_value_parenthesizes_compound_values() {
        let (doc, flavor) = ctx_over(DUMMY);
        let ctx = Ctx { doc: &doc, flavor };
        let value = Expression::BinaryOp(
            "-".to_owned(),
            Box::new(Expression::RawText("CURRENT_TIMESTAMP".to_owned())),
            Box::new(Expression::RawText("INTERVAL '1 week'".to_owned())),
        );
        let compiled = compile_assignment_value(
            &ctx,
            "until",
            &value,
            &VarEnv::default(),
            &mut Vec::new(),
        )
        .expect("compound value compiles");
        assert_eq!(
            compiled.as_deref(),
            Some("(CURRENT_TIMESTAMP - INTERVAL '1 week')")
        );
    }
}
