//! Semantic scope stack entries.
//!
//! The stack mirrors lexical nesting exactly. Accessibility scopes own the
//! names (variables, labels) declared in a block; the other entries carry
//! per-construct state for conditionals, return collection, switches and
//! loops. Searches walk from the top and stop at the nearest
//! [`ScopeKind::MethodRoot`] accessibility scope.

use chipflow_core::{NodeId, Port, Value, ValueKind};
use indexmap::IndexMap;

use super::flow::{ExecFlow, FlowId};
use crate::program::ScopeKind;
use crate::source::Span;

/// Index into the builder's variable arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct VarId(pub usize);

/// A local as the builder sees it: its host storage plus promotion state.
#[derive(Debug, Clone)]
pub(crate) struct DeclaredVariable {
    pub name: String,
    pub kind: ValueKind,
    pub value: Value,
    pub writable: bool,
    /// Graph variable backing this local while it is promoted.
    pub promotion_backing: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingGoto {
    pub flow: ExecFlow,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub(crate) struct AccessibilityScope {
    pub kind: ScopeKind,
    pub pending_gotos: IndexMap<String, PendingGoto>,
    /// Labels waiting for the next node spawned on their flow.
    pub pending_labels: IndexMap<String, FlowId>,
    pub declared_labels: IndexMap<String, Port>,
    pub variables: IndexMap<String, VarId>,
}

impl AccessibilityScope {
    pub fn new(kind: ScopeKind) -> Self {
        AccessibilityScope {
            kind,
            pending_gotos: IndexMap::new(),
            pending_labels: IndexMap::new(),
            declared_labels: IndexMap::new(),
            variables: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct PromotedVariable {
    pub var: VarId,
    /// Host value before the conditional.
    pub snapshot: Value,
    pub backing: NodeId,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ConditionalContext {
    /// Variables promoted in the branch being built.
    pub branch: IndexMap<VarId, PromotedVariable>,
    /// Every variable promoted in any branch so far.
    pub touched: IndexMap<VarId, PromotedVariable>,
    /// Entry writes to emit on the pre-conditional flow.
    pub seeds: Vec<(NodeId, Value)>,
    /// Backing nodes created by this conditional.
    pub created: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub(crate) struct CollectedReturn {
    pub flow: ExecFlow,
    pub value: Option<Value>,
}

#[derive(Debug, Clone)]
pub(crate) struct ReturnScope {
    pub method: String,
    pub return_kind: Option<ValueKind>,
    pub returns: Vec<CollectedReturn>,
}

#[derive(Debug, Clone)]
pub(crate) struct SwitchScope {
    pub break_flow: ExecFlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopKind {
    While,
    DoWhile,
    ForEach,
}

#[derive(Debug, Clone)]
pub(crate) struct LoopScope {
    pub kind: LoopKind,
    pub break_flow: ExecFlow,
    pub continue_flow: ExecFlow,
    /// Where `continue` jumps when the loop re-tests in-graph.
    pub retest: Option<Port>,
    pub needs_manual_implementation: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum SemanticScope {
    Accessibility(AccessibilityScope),
    Conditional(ConditionalContext),
    Return(ReturnScope),
    Switch(SwitchScope),
    Loop(LoopScope),
}

impl SemanticScope {
    fn is_method_root(&self) -> bool {
        matches!(self, SemanticScope::Accessibility(a) if a.kind == ScopeKind::MethodRoot)
    }
}

/// Stack queries. Indices are positions from the bottom of the stack.
pub(crate) trait ScopeStack {
    /// Index of the nearest method root, or 0.
    fn method_root(&self) -> usize;

    /// Nearest accessibility scope declaring `name`, within the method.
    fn lookup_variable(&self, name: &str) -> Option<(usize, VarId)>;

    /// Index of the top accessibility scope.
    fn top_accessibility(&self) -> Option<usize>;

    /// Indices of conditional scopes above `index`, outermost first.
    fn conditionals_above(&self, index: usize) -> Vec<usize>;

    /// Nearest scope within the method satisfying `pred`.
    fn nearest_within_method(&self, pred: impl Fn(&SemanticScope) -> bool) -> Option<usize>;
}

impl ScopeStack for Vec<SemanticScope> {
    fn method_root(&self) -> usize {
        self.iter().rposition(SemanticScope::is_method_root).unwrap_or(0)
    }

    fn lookup_variable(&self, name: &str) -> Option<(usize, VarId)> {
        for (i, scope) in self.iter().enumerate().rev() {
            if let SemanticScope::Accessibility(a) = scope {
                if let Some(var) = a.variables.get(name) {
                    return Some((i, *var));
                }
                if a.kind == ScopeKind::MethodRoot {
                    return None;
                }
            }
        }
        None
    }

    fn top_accessibility(&self) -> Option<usize> {
        self.iter()
            .rposition(|s| matches!(s, SemanticScope::Accessibility(_)))
    }

    fn conditionals_above(&self, index: usize) -> Vec<usize> {
        self.iter()
            .enumerate()
            .skip(index + 1)
            .filter(|(_, s)| matches!(s, SemanticScope::Conditional(_)))
            .map(|(i, _)| i)
            .collect()
    }

    fn nearest_within_method(&self, pred: impl Fn(&SemanticScope) -> bool) -> Option<usize> {
        for (i, scope) in self.iter().enumerate().rev() {
            if pred(scope) {
                return Some(i);
            }
            if scope.is_method_root() {
                return None;
            }
        }
        None
    }
}
