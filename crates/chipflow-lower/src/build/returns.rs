//! Return collection.
//!
//! Each function body opens a [`ReturnScope`]. A `return` records the live
//! flow together with its value and terminates the path; when the body ends,
//! every recorded flow is merged back into the live one and the last
//! recorded value becomes the call's value.

use chipflow_core::{Value, ValueKind};

use super::scope::{CollectedReturn, ReturnScope, SemanticScope};
use super::{describe, unbalanced, BuildState};
use crate::error::LoweringError;
use crate::source::Span;

impl<'p> BuildState<'p> {
    pub(super) fn begin_returns(
        &mut self,
        method: &str,
        return_kind: Option<ValueKind>,
        tuple_names: Option<&[String]>,
        span: Span,
    ) -> Result<(), LoweringError> {
        // A tuple return type must name every element.
        let arity = match &return_kind {
            Some(ValueKind::Tuple(elements)) => Some(elements.len()),
            _ => None,
        };
        let detail = match (arity, tuple_names) {
            (None, None) => None,
            (None, Some(names)) if names.is_empty() => None,
            (Some(arity), Some(names)) if names.len() == arity => None,
            (Some(arity), None) => Some(format!(
                "a tuple of {} elements has no element names",
                arity
            )),
            (arity, Some(names)) => Some(format!(
                "{} tuple element names for a tuple of {} elements",
                names.len(),
                arity.unwrap_or(0)
            )),
        };
        if let Some(detail) = detail {
            return Err(LoweringError::ReturnArityMismatch {
                method: method.to_string(),
                detail,
                span,
            });
        }
        self.scopes.push(SemanticScope::Return(ReturnScope {
            method: method.to_string(),
            return_kind,
            returns: Vec::new(),
        }));
        Ok(())
    }

    pub(super) fn add_return(&mut self, value: Option<Value>, span: Span) -> Result<(), LoweringError> {
        // The return scope sits just outside the method root, so the
        // innermost one is always the current method's.
        let index = self
            .scopes
            .iter()
            .rposition(|s| matches!(s, SemanticScope::Return(_)))
            .ok_or_else(|| unbalanced(span))?;
        let SemanticScope::Return(scope) = &self.scopes[index] else {
            return Err(unbalanced(span));
        };

        let value = match (&scope.return_kind, value) {
            (None, None) | (None, Some(Value::Unit)) => None,
            (None, Some(_)) => {
                return Err(LoweringError::ReturnArityMismatch {
                    method: scope.method.clone(),
                    detail: "a void method cannot return a value".into(),
                    span,
                })
            }
            (Some(kind), None) => {
                return Err(LoweringError::ReturnArityMismatch {
                    method: scope.method.clone(),
                    detail: format!("missing return value of kind {}", kind),
                    span,
                })
            }
            (Some(kind), Some(value)) => match value.coerce_to(kind) {
                Some(coerced) => Some(coerced),
                None => {
                    return Err(LoweringError::ReturnTypeMismatch {
                        method: scope.method.clone(),
                        expected: kind.to_string(),
                        actual: describe(&value),
                        span,
                    })
                }
            },
        };

        let flow = self.flow.clone();
        self.flow.clear();
        if let SemanticScope::Return(scope) = &mut self.scopes[index] {
            scope.returns.push(CollectedReturn { flow, value });
        }
        Ok(())
    }

    /// Closes the return scope. The live flow becomes the union of the
    /// fall-through flow and every collected return flow.
    pub(super) fn finalize_returns(&mut self, span: Span) -> Result<Value, LoweringError> {
        let scope = match self.scopes.pop() {
            Some(SemanticScope::Return(scope)) => scope,
            _ => return Err(unbalanced(span)),
        };

        let mut last = None;
        for collected in scope.returns {
            self.flow.merge(collected.flow);
            if collected.value.is_some() {
                last = collected.value;
            }
        }

        Ok(match (last, &scope.return_kind) {
            (Some(value), _) => value,
            (None, Some(kind)) => Value::default_for(kind),
            (None, None) => Value::Unit,
        })
    }
}
