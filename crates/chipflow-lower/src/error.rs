//! Lowering errors.
//!
//! Every failure is fatal for the whole build and carries the source
//! location of the construct that caused it.

use chipflow_core::GraphError;
use thiserror::Error;

use crate::source::Span;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoweringError {
    #[error("{span}: cannot infer generic arguments for call to '{method}'")]
    UnresolvedGenericArgument { method: String, span: Span },

    #[error("{span}: switch case key is not a compile-time literal ({detail})")]
    DynamicSwitchCase { detail: String, span: Span },

    #[error("{span}: interpolation alignment and format clauses are not supported")]
    UnsupportedInterpolationClause { span: Span },

    #[error("{span}: return in '{method}': {detail}")]
    ReturnArityMismatch {
        method: String,
        detail: String,
        span: Span,
    },

    #[error("{span}: return in '{method}': expected {expected}, got {actual}")]
    ReturnTypeMismatch {
        method: String,
        expected: String,
        actual: String,
        span: Span,
    },

    #[error("{span}: cannot resolve the type of this expression")]
    UnresolvableExpressionType { span: Span },

    #[error("{span}: no label '{label}' is reachable from this goto")]
    UnresolvedGoto { label: String, span: Span },

    #[error("{span}: label '{label}' is declared twice in the same scope")]
    DuplicateLabel { label: String, span: Span },

    #[error("{span}: cannot switch on a value of kind {kind}")]
    InvalidSwitchSubject { kind: String, span: Span },

    #[error("{span}: '{keyword}' outside of a loop or switch")]
    MisplacedJump { keyword: String, span: Span },

    #[error("{span}: unknown chip '{name}'")]
    UnknownChip { name: String, span: Span },

    #[error("{span}: unknown variable '{name}'")]
    UnknownVariable { name: String, span: Span },

    #[error("{span}: unknown method '{name}'")]
    UnknownMethod { name: String, span: Span },

    #[error("{span}: method '{name}' is declared more than once")]
    DuplicateMethod { name: String, span: Span },

    #[error("entry method '{name}' not found")]
    EntryNotFound { name: String },

    #[error("{span}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        span: Span,
    },

    #[error("{span}: unsupported construct: {construct}")]
    Unsupported { construct: String, span: Span },

    #[error("{span}: inlining '{method}' exceeds the depth limit of {limit}")]
    InlineDepthExceeded {
        method: String,
        limit: usize,
        span: Span,
    },

    #[error("{span}: loop body does not trace back to its entry")]
    IteratorDiscontinuity { span: Span },

    #[error("{span}: graph error: {source}")]
    Graph {
        #[source]
        source: GraphError,
        span: Span,
    },
}

impl LoweringError {
    pub fn span(&self) -> Option<Span> {
        match self {
            LoweringError::EntryNotFound { .. } => None,
            LoweringError::UnresolvedGenericArgument { span, .. }
            | LoweringError::DynamicSwitchCase { span, .. }
            | LoweringError::UnsupportedInterpolationClause { span }
            | LoweringError::ReturnArityMismatch { span, .. }
            | LoweringError::ReturnTypeMismatch { span, .. }
            | LoweringError::UnresolvableExpressionType { span }
            | LoweringError::UnresolvedGoto { span, .. }
            | LoweringError::DuplicateLabel { span, .. }
            | LoweringError::InvalidSwitchSubject { span, .. }
            | LoweringError::MisplacedJump { span, .. }
            | LoweringError::UnknownChip { span, .. }
            | LoweringError::UnknownVariable { span, .. }
            | LoweringError::UnknownMethod { span, .. }
            | LoweringError::DuplicateMethod { span, .. }
            | LoweringError::TypeMismatch { span, .. }
            | LoweringError::Unsupported { span, .. }
            | LoweringError::InlineDepthExceeded { span, .. }
            | LoweringError::IteratorDiscontinuity { span }
            | LoweringError::Graph { span, .. } => Some(*span),
        }
    }

    pub(crate) fn graph(source: GraphError, span: Span) -> Self {
        LoweringError::Graph { source, span }
    }
}
