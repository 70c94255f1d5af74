//! Syntax rewriter: typed source tree to flow/scope API program.
//!
//! The rewrite is static and purely structural. Control statements become
//! builder operations whose bodies are nested op lists, blocks gain
//! scope-enter/scope-exit markers, operators become chip calls, types are
//! retargeted to port kinds and elided generic arguments are filled in from
//! the [`SymbolOracle`]. No graph is built here.

mod expr;
mod stmt;
pub(crate) mod types;

use std::collections::HashSet;

use chipflow_core::Catalog;
use indexmap::IndexMap;

use crate::error::LoweringError;
use crate::oracle::SymbolOracle;
use crate::program::{Dispatch, EventTarget, Method, Param, Program};
use crate::source::{MethodDecl, SourceTree};

/// Method attribute that routes calls through an event receiver.
pub const EVENT_FUNCTION_ATTRIBUTE: &str = "EventFunction";
/// Method attribute that builds the body once and shares its value.
pub const SHARED_PROPERTY_ATTRIBUTE: &str = "SharedProperty";

pub(crate) struct Rewriter<'a> {
    oracle: &'a dyn SymbolOracle,
    catalog: &'a Catalog,
    user_methods: HashSet<String>,
}

/// Rewrites every method of `tree`.
pub fn rewrite(
    tree: &SourceTree,
    oracle: &dyn SymbolOracle,
    catalog: &Catalog,
) -> Result<Program, LoweringError> {
    let rewriter = Rewriter {
        oracle,
        catalog,
        user_methods: tree.methods.iter().map(|m| m.name.clone()).collect(),
    };

    let mut methods = IndexMap::new();
    for decl in &tree.methods {
        if methods.contains_key(&decl.name) {
            return Err(LoweringError::DuplicateMethod {
                name: decl.name.clone(),
                span: decl.span,
            });
        }
        let method = rewriter.method(decl)?;
        methods.insert(decl.name.clone(), method);
    }

    Ok(Program {
        name: tree.name.clone(),
        methods,
    })
}

impl<'a> Rewriter<'a> {
    fn method(&self, decl: &MethodDecl) -> Result<Method, LoweringError> {
        let dispatch = dispatch(decl)?;

        let return_kind = types::retarget(&decl.return_type, self.catalog, decl.span)?;
        let tuple_names = decl
            .tuple_names
            .clone()
            .or_else(|| types::tuple_names(&decl.return_type));

        let params = decl
            .params
            .iter()
            .map(|p| {
                Ok(Param {
                    name: p.name.clone(),
                    kind: types::retarget_value(&p.ty, self.catalog, decl.span)?,
                })
            })
            .collect::<Result<Vec<_>, LoweringError>>()?;

        let body = self.function_body(
            &decl.body,
            &decl.name,
            return_kind.clone(),
            tuple_names,
            params.iter().map(|p| p.name.clone()).collect(),
        )?;

        Ok(Method {
            name: decl.name.clone(),
            params,
            return_kind,
            dispatch,
            body,
            span: decl.span,
        })
    }
}

/// `EventFunction` sends to the local receiver; `EventFunction(All)` and
/// friends pick another target.
fn dispatch(decl: &MethodDecl) -> Result<Dispatch, LoweringError> {
    for attribute in &decl.attributes {
        let Some(rest) = attribute.strip_prefix(EVENT_FUNCTION_ATTRIBUTE) else {
            continue;
        };
        if rest.is_empty() {
            return Ok(Dispatch::EventFunction(EventTarget::default()));
        }
        if let Some(name) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            let name = name.trim();
            return EventTarget::from_name(name)
                .map(Dispatch::EventFunction)
                .ok_or_else(|| LoweringError::Unsupported {
                    construct: format!("event target '{}'", name),
                    span: decl.span,
                });
        }
    }
    if decl.attributes.iter().any(|a| a == SHARED_PROPERTY_ATTRIBUTE) {
        return Ok(Dispatch::SharedProperty);
    }
    Ok(Dispatch::Inline)
}
