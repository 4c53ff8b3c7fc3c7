//! Public API facade for sqlgraph.
//!
//! A document holds named queries and mutations over tables, joins, and
//! selector predicates; [`compile`] turns it into one SQL string per
//! top-level table, targeting a chosen flavor:
//!
//! ```
//! use sqlgraph::{compile, Config};
//!
//! let sql = compile(
//!     r#"mutation m { users { name: "John" age: 45 } }"#,
//!     "pg",
//!     &Config::default(),
//! )
//! .expect("document compiles");
//! assert_eq!(sql, ["INSERT INTO users (name, age) VALUES ('John', 45)"]);
//! ```

pub use sqlgraph_ast as ast;
pub use sqlgraph_ast::{Document, Scalar};
pub use sqlgraph_builder::{Flavor, QueryBuilder};
pub use sqlgraph_compile::{
    compile_document, compile_metrics_snapshot, reset_compile_metrics, Config,
};
pub use sqlgraph_error::{CompileError, ErrorKind, Result};
pub use sqlgraph_parser::{parse_metrics_snapshot, reset_parse_metrics, ParseError, Parser};

/// Compile a document against a flavor named by its tag (`pg`, `mysql`,
/// `sqlite3`), returning one SQL string per top-level table in document
/// order.
///
/// Parse once and call [`compile_document`] directly to compile the same
/// document against many variable environments.
pub fn compile(source: &str, flavor: &str, config: &Config) -> Result<Vec<String>> {
    let flavor: Flavor = flavor.parse()?;
    let document = Parser::from_source(source)
        .parse_document()
        .map_err(|e| CompileError::parse(e.message, e.line, e.col))?;
    compile_document(&document, flavor, config)
}
