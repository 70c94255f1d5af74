//! Symbol oracle: the semantic questions the rewriter asks the front end.
//!
//! The oracle is a black box over the front end's semantic model. The
//! rewriter only needs three answers: the generic arguments a call binds
//! when they are elided in source, the type of an expression, and the
//! constant value of an expression when it has one.

use std::collections::BTreeMap;

use chipflow_core::Literal;
use serde::{Deserialize, Serialize};

use crate::source::{SyntaxId, TypeRef};

/// Outcome of asking for the generic arguments of a call.
#[derive(Debug, Clone, PartialEq)]
pub enum GenericResolution {
    /// The callee is not generic.
    NotGeneric,
    Resolved(Vec<TypeRef>),
    /// The callee is generic but its arguments could not be inferred.
    Unresolved,
}

pub trait SymbolOracle {
    fn generic_arguments(&self, call: SyntaxId) -> GenericResolution;

    fn expression_type(&self, expr: SyntaxId) -> Option<TypeRef>;

    fn constant_value(&self, expr: SyntaxId) -> Option<Literal>;
}

/// Table-driven oracle, loaded from JSON exported by the front end.
///
/// Keys are raw syntax ids. A generic entry of `null` marks a generic call
/// whose arguments could not be inferred.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOracle {
    #[serde(default)]
    pub generic_calls: BTreeMap<u32, Option<Vec<TypeRef>>>,
    #[serde(default)]
    pub expression_types: BTreeMap<u32, TypeRef>,
    #[serde(default)]
    pub constants: BTreeMap<u32, Literal>,
}

impl TableOracle {
    pub fn new() -> Self {
        TableOracle::default()
    }

    pub fn with_generic(mut self, call: u32, args: Option<Vec<TypeRef>>) -> Self {
        self.generic_calls.insert(call, args);
        self
    }

    pub fn with_type(mut self, expr: u32, ty: TypeRef) -> Self {
        self.expression_types.insert(expr, ty);
        self
    }

    pub fn with_constant(mut self, expr: u32, value: Literal) -> Self {
        self.constants.insert(expr, value);
        self
    }
}

impl SymbolOracle for TableOracle {
    fn generic_arguments(&self, call: SyntaxId) -> GenericResolution {
        match self.generic_calls.get(&call.0) {
            None => GenericResolution::NotGeneric,
            Some(Some(args)) => GenericResolution::Resolved(args.clone()),
            Some(None) => GenericResolution::Unresolved,
        }
    }

    fn expression_type(&self, expr: SyntaxId) -> Option<TypeRef> {
        self.expression_types.get(&expr.0).cloned()
    }

    fn constant_value(&self, expr: SyntaxId) -> Option<Literal> {
        self.constants.get(&expr.0).cloned()
    }
}
