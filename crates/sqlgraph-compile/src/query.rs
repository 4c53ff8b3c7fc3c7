//! Query lowering: table nodes to SELECT statements.
//!
//! Join spreads become nested derived tables. For each join child, selectors
//! whose right-hand side references a column of the parent table form the ON
//! clause; every other selector is hoisted into the derived table's WHERE.
//! The derived projection carries the child's own fields, the columns its
//! descendants expose, and the foreign-key columns the ON clause needs.

use sqlgraph_ast::{Expression, Table};
use sqlgraph_builder::QueryBuilder;
use sqlgraph_error::{CompileError, Result};

use crate::expr;
use crate::resolve::VarEnv;
use crate::{Config, Ctx};

/// A column a derived table makes visible to the level that joins it.
#[derive(Debug, Clone)]
pub(crate) struct Exposed {
    /// Projection expression as seen from the joining level
    /// (`bookmarks.name`, or a bare alias like `page_number`).
    expr: String,
    /// Alias to apply at the joining level.
    alias: Option<String>,
}

impl Exposed {
    fn render(&self) -> String {
        match &self.alias {
            Some(alias) => format!("{} AS {alias}", self.expr),
            None => self.expr.clone(),
        }
    }

    /// The output-column name this entry has once projected.
    fn output_name(&self) -> &str {
        match &self.alias {
            Some(alias) => alias,
            None => self.expr.rsplit('.').next().unwrap_or(&self.expr),
        }
    }
}

/// Lower one table node to a SELECT statement.
///
/// `config` carries the caller's statement options and is present only for
/// the outermost statement; nested lowering (joins, query calls) passes
/// `None` so limits and ordering never leak inward.
pub(crate) fn lower_select(
    ctx: &Ctx<'_>,
    table: &Table,
    env: &VarEnv,
    stack: &mut Vec<String>,
    config: Option<&Config>,
) -> Result<String> {
    check_query_shape(table)?;

    let mut qb = QueryBuilder::new(ctx.flavor);
    qb.select().from(&table.name);

    for field in table.fields() {
        let qualified = format!("{}.{}", table.name, field.name);
        match &field.alias {
            Some(alias) => qb.field(format!("{qualified} AS {alias}")),
            None => qb.field(qualified),
        };
    }

    for join in table.joins() {
        let (fragment, exposed) = lower_join(ctx, join, &table.name, env, stack)?;
        for entry in &exposed {
            qb.field(entry.render());
        }
        qb.join(fragment);
    }

    if !table.params.is_empty() {
        qb.where_clause(expr::compile_selectors(ctx, &table.params, env, stack)?);
    }

    if let Some(config) = config {
        if let Some(column) = &config.order_by {
            qb.order(column, config.descending);
        }
        if let Some(n) = config.limit {
            qb.limit(n);
        }
        if let Some(n) = config.offset {
            qb.offset(n);
        }
        // `returning` has no SELECT form; it only applies to mutations.
    }

    Ok(qb.sql())
}

/// Lower a join spread under `parent` into an INNER JOIN fragment, returning
/// the fragment and the columns the joining level should project.
pub(crate) fn lower_join(
    ctx: &Ctx<'_>,
    child: &Table,
    parent: &str,
    env: &VarEnv,
    stack: &mut Vec<String>,
) -> Result<(String, Vec<Exposed>)> {
    check_query_shape(child)?;

    let (on_selectors, hoisted): (Vec<_>, Vec<_>) = child
        .params
        .iter()
        .partition(|sel| references_table(&sel.rhs, parent));

    let mut qb = QueryBuilder::new(ctx.flavor);
    qb.select().from(&child.name);
    let mut exposed_up: Vec<Exposed> = Vec::new();

    // Own fields project unaliased here; the alias is applied by the level
    // that joins this derived table.
    for field in child.fields() {
        let qualified = format!("{}.{}", child.name, field.name);
        qb.field(qualified.clone());
        exposed_up.push(Exposed {
            expr: qualified,
            alias: field.alias.clone(),
        });
    }

    for grandchild in child.joins() {
        let (fragment, exposed) = lower_join(ctx, grandchild, &child.name, env, stack)?;
        for entry in &exposed {
            qb.field(entry.render());
            // Once projected (and possibly aliased) here, the column
            // surfaces upward under its bare output name.
            exposed_up.push(Exposed {
                expr: entry.output_name().to_owned(),
                alias: None,
            });
        }
        qb.join(fragment);
    }

    // Foreign-key columns the ON clause references must be visible through
    // the derived table.
    let mut on_terms = Vec::with_capacity(on_selectors.len());
    for selector in &on_selectors {
        let fk = format!("{}.{}", child.name, selector.lhs.join("."));
        qb.field(fk.clone());
        let rhs = expr::compile_expr(ctx, &selector.rhs, env, stack)?;
        on_terms.push(format!("{fk} {} {rhs}", selector.op));
    }

    if !hoisted.is_empty() {
        let hoisted: Vec<_> = hoisted.into_iter().cloned().collect();
        qb.where_clause(expr::compile_selectors(ctx, &hoisted, env, stack)?);
    }

    let on_clause = if on_terms.is_empty() {
        "TRUE".to_owned()
    } else {
        on_terms.join(" AND ")
    };

    let fragment = format!(
        "INNER JOIN ({}) AS {} ON ({on_clause})",
        qb.sql(),
        child.name
    );
    Ok((fragment, exposed_up))
}

/// A query-side table may not assign field values.
fn check_query_shape(table: &Table) -> Result<()> {
    if table.fields().any(|f| f.value.is_some()) {
        return Err(CompileError::AssignmentsNotAllowedInQuery {
            table: table.name.clone(),
        });
    }
    Ok(())
}

/// Whether an expression is a qualified column reference into `table`.
fn references_table(expr: &Expression, table: &str) -> bool {
    matches!(expr, Expression::Column(path) if path.len() >= 2 && path[0] == table)
}
