//! Variable resolution.
//!
//! Merges caller-supplied variables with an operation's declarations. The
//! merge is tolerant: supplied variables nobody declared stay accessible, so
//! a shared variable map can serve several operations. Only required
//! declarations are enforced.

use std::collections::BTreeMap;

use sqlgraph_ast::{Scalar, VariableDecl};
use sqlgraph_error::{CompileError, Result};

/// An immutable variable environment for one lowering pass.
///
/// Inner frames (query-call subselects) get their own environment built from
/// the call arguments; nothing is shared or mutated across frames.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarEnv {
    values: BTreeMap<String, Scalar>,
}

impl VarEnv {
    /// Environment over an existing value map.
    #[must_use]
    pub fn from_values(values: BTreeMap<String, Scalar>) -> Self {
        Self { values }
    }

    /// Look up a variable.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.values.get(name)
    }

    /// Whether the environment binds `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

/// Build the environment for an operation.
///
/// Fails with [`CompileError::MissingRequiredVariable`] when a declaration
/// marked required (`$name!`) has no supplied value. Undeclared supplied
/// entries are retained.
pub fn resolve(declared: &[VariableDecl], supplied: &BTreeMap<String, Scalar>) -> Result<VarEnv> {
    for decl in declared {
        if decl.required && !supplied.contains_key(&decl.name) {
            return Err(CompileError::missing_variable(decl.name.clone()));
        }
    }
    Ok(VarEnv::from_values(supplied.clone()))
}
