//! Goto and label resolution.
//!
//! Resolution is two-pass. A `label L:` first becomes pending, bound to the
//! identity of the flow that is current at the declaration. The next time
//! that flow is fed into an exec input, the input becomes the label's port
//! and every goto waiting on `L` is wired into it. Gotos to a label that is
//! not declared yet park their flow in the scope until the label resolves or
//! the scope closes.

use chipflow_core::Port;

use super::scope::{PendingGoto, ScopeStack, SemanticScope};
use super::{unbalanced, BuildState};
use crate::error::LoweringError;
use crate::program::ScopeKind;
use crate::source::Span;

enum LabelState {
    Declared(Port),
    Pending,
}

impl<'p> BuildState<'p> {
    pub(super) fn declare_label(&mut self, name: &str, span: Span) -> Result<(), LoweringError> {
        let flow = self.flow.id();
        let scope = self.top_accessibility(span)?;
        if scope.declared_labels.contains_key(name) || scope.pending_labels.contains_key(name) {
            return Err(LoweringError::DuplicateLabel {
                label: name.to_string(),
                span,
            });
        }
        scope.pending_labels.insert(name.to_string(), flow);
        Ok(())
    }

    pub(super) fn goto(&mut self, name: &str, span: Span) -> Result<(), LoweringError> {
        match self.find_label(name) {
            Some((index, LabelState::Declared(port))) => {
                self.write_promotions_above(index, span)?;
                self.jump(port, span)
            }
            Some((index, LabelState::Pending)) => {
                self.write_promotions_above(index, span)?;
                self.park_goto(index, name, span);
                Ok(())
            }
            None => {
                let root = self.scopes.method_root();
                self.write_promotions_above(root, span)?;
                let top = self.scopes.top_accessibility().ok_or_else(|| unbalanced(span))?;
                self.park_goto(top, name, span);
                Ok(())
            }
        }
    }

    /// Searches accessibility scopes from the top, up to the method root.
    fn find_label(&self, name: &str) -> Option<(usize, LabelState)> {
        for (i, scope) in self.scopes.iter().enumerate().rev() {
            if let SemanticScope::Accessibility(a) = scope {
                if let Some(port) = a.declared_labels.get(name) {
                    return Some((i, LabelState::Declared(*port)));
                }
                if a.pending_labels.contains_key(name) {
                    return Some((i, LabelState::Pending));
                }
                if a.kind == ScopeKind::MethodRoot {
                    return None;
                }
            }
        }
        None
    }

    /// Moves the current flow into the goto list of `scopes[index]`.
    fn park_goto(&mut self, index: usize, name: &str, span: Span) {
        let parked = self.flow.clone();
        self.flow.clear();
        if let SemanticScope::Accessibility(scope) = &mut self.scopes[index] {
            match scope.pending_gotos.get_mut(name) {
                Some(pending) => pending.flow.merge(parked),
                None => {
                    scope.pending_gotos.insert(
                        name.to_string(),
                        PendingGoto { flow: parked, span },
                    );
                }
            }
        }
    }

    /// Declares every label pending on the current flow at `into` and wires
    /// the gotos waiting for it.
    pub(super) fn resolve_pending_labels(&mut self, into: Port, span: Span) -> Result<(), LoweringError> {
        let flow = self.flow.id();
        let mut resolved = Vec::new();
        for (index, scope) in self.scopes.iter_mut().enumerate() {
            let SemanticScope::Accessibility(scope) = scope else {
                continue;
            };
            let names: Vec<String> = scope
                .pending_labels
                .iter()
                .filter(|(_, id)| **id == flow)
                .map(|(name, _)| name.clone())
                .collect();
            for name in names {
                scope.pending_labels.shift_remove(&name);
                scope.declared_labels.insert(name.clone(), into);
                tracing::debug!(label = %name, port = %into, "label resolved");
                resolved.push((index, name));
            }
        }

        let mut gotos = Vec::new();
        for (index, name) in resolved {
            gotos.extend(self.take_gotos_from(index, &name));
        }
        let ctx = self.context_mut();
        for port in gotos {
            ctx.connect(port, into, true)
                .map_err(|e| LoweringError::graph(e, span))?;
        }
        Ok(())
    }

    /// Removes the parked gotos for `name` from `scopes[index]` and every
    /// scope above it.
    fn take_gotos_from(&mut self, index: usize, name: &str) -> Vec<Port> {
        let mut ports = Vec::new();
        for scope in &mut self.scopes[index..] {
            if let SemanticScope::Accessibility(a) = scope {
                if let Some(pending) = a.pending_gotos.shift_remove(name) {
                    ports.extend(pending.flow.ports().copied());
                }
            }
        }
        ports
    }

    pub(super) fn exit_scope(&mut self, span: Span) -> Result<(), LoweringError> {
        let mut scope = match self.scopes.pop() {
            Some(SemanticScope::Accessibility(scope)) => scope,
            _ => return Err(unbalanced(span)),
        };

        // A label at the very end of a block falls through to whatever
        // follows it, so its gotos join the live flow.
        for name in scope.pending_labels.keys() {
            if let Some(pending) = scope.pending_gotos.shift_remove(name) {
                self.flow.merge(pending.flow);
            }
        }

        if scope.pending_gotos.is_empty() {
            return Ok(());
        }
        if scope.kind == ScopeKind::MethodRoot {
            let (label, pending) = scope
                .pending_gotos
                .first()
                .ok_or_else(|| unbalanced(span))?;
            return Err(LoweringError::UnresolvedGoto {
                label: label.clone(),
                span: pending.span,
            });
        }

        let parent = self
            .scopes
            .top_accessibility()
            .ok_or_else(|| unbalanced(span))?;
        if let SemanticScope::Accessibility(outer) = &mut self.scopes[parent] {
            for (name, pending) in scope.pending_gotos {
                match outer.pending_gotos.get_mut(&name) {
                    Some(existing) => existing.flow.merge(pending.flow),
                    None => {
                        outer.pending_gotos.insert(name, pending);
                    }
                }
            }
        }
        Ok(())
    }
}
