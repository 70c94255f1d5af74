//! Conditional variable promotion.
//!
//! A local declared outside a conditional has a single host value, but the
//! graph needs one value per path. The first time a branch touches such a
//! local it is promoted: a graph `Variable` node (the backing) takes over,
//! the host value becomes the backing's read port, and each branch writes
//! its final value back with `SetVariable` before control merges. Reads
//! after the conditional see the backing's read port, i.e. the merged value.
//!
//! Promotion walks every enclosing conditional between the declaration and
//! the access, outermost first, so each level records its own snapshot and
//! the backing node is shared by all of them.

use chipflow_core::{NodeId, Port, Value, ValueKind};
use indexmap::IndexMap;
use serde_json::json;

use super::scope::{ConditionalContext, PromotedVariable, ScopeStack, SemanticScope, VarId};
use super::BuildState;
use crate::error::LoweringError;
use crate::source::Span;

impl<'p> BuildState<'p> {
    /// Looks up a local for a read or write, promoting it into every
    /// conditional entered since its declaration.
    pub(super) fn access_variable(&mut self, name: &str, span: Span) -> Result<VarId, LoweringError> {
        let (declared_at, var) =
            self.scopes
                .lookup_variable(name)
                .ok_or_else(|| LoweringError::UnknownVariable {
                    name: name.to_string(),
                    span,
                })?;
        let variable = &self.vars[var.0];
        if variable.writable && variable.value.is_storable() {
            for index in self.scopes.conditionals_above(declared_at) {
                self.promote_in(index, var, span)?;
            }
        }
        Ok(var)
    }

    fn backing_value(&self, var: VarId, backing: NodeId) -> Value {
        Value::from_port(&self.vars[var.0].kind, Port::data(backing, 0))
    }

    fn promote_in(&mut self, index: usize, var: VarId, span: Span) -> Result<(), LoweringError> {
        let existing = match &self.scopes[index] {
            SemanticScope::Conditional(cond) => {
                if cond.branch.contains_key(&var) {
                    return Ok(());
                }
                cond.touched.get(&var).cloned()
            }
            _ => return Ok(()),
        };

        // Already promoted in a sibling branch: reuse snapshot and backing.
        if let Some(promoted) = existing {
            let read = self.backing_value(var, promoted.backing);
            self.vars[var.0].value = read;
            if let SemanticScope::Conditional(cond) = &mut self.scopes[index] {
                cond.branch.insert(var, promoted);
            }
            return Ok(());
        }

        let snapshot = self.vars[var.0].value.clone();
        let reusable = self.vars[var.0]
            .promotion_backing
            .filter(|b| self.context().contains(*b));
        let (backing, created) = match reusable {
            Some(backing) => (backing, false),
            None => (self.new_backing(var, &snapshot, span)?, true),
        };

        let read = self.backing_value(var, backing);
        // A fresh backing outside any repeating body starts at the literal
        // default; everything else needs an explicit entry write.
        let seeded_by_default = created && self.repeating == 0 && snapshot.literal().is_some();
        let needs_seed = !seeded_by_default && !snapshot.equivalent_to(&read);

        let promoted = PromotedVariable {
            var,
            snapshot: snapshot.clone(),
            backing,
        };
        if let SemanticScope::Conditional(cond) = &mut self.scopes[index] {
            if created {
                cond.created.push(backing);
            }
            if needs_seed {
                cond.seeds.push((backing, snapshot));
            }
            cond.touched.insert(var, promoted.clone());
            cond.branch.insert(var, promoted);
        }

        self.vars[var.0].promotion_backing = Some(backing);
        self.vars[var.0].value = read;
        tracing::debug!(variable = %self.vars[var.0].name, backing = %backing, "promoted variable");
        Ok(())
    }

    fn new_backing(
        &mut self,
        var: VarId,
        snapshot: &Value,
        span: Span,
    ) -> Result<NodeId, LoweringError> {
        let kind = self.vars[var.0].kind.clone();
        let signature = self.signature("Variable", span)?;
        let node = self.new_node("Variable", &signature, &[kind.clone()]);
        let name = self.vars[var.0].name.clone();
        self.set_metadata(node, "name", json!(name));
        self.set_metadata(node, "kind", json!(kind.to_string()));
        if let Some(literal) = snapshot.literal().filter(|_| self.repeating == 0) {
            self.set_metadata(node, "default", json!(literal));
        }
        Ok(node)
    }

    /// Emits `SetVariable backing <- value` on the current flow, unless the
    /// flow was terminated.
    pub(super) fn write_variable(
        &mut self,
        backing: NodeId,
        kind: &ValueKind,
        value: Value,
        span: Span,
    ) -> Result<(), LoweringError> {
        if self.flow.is_terminated() {
            return Ok(());
        }
        let signature = self.signature("SetVariable", span)?;
        let node = self.spawn(
            "SetVariable",
            &signature,
            std::slice::from_ref(kind),
            vec![value],
            span,
        )?;
        self.set_metadata(node, "variable", json!(backing.0));
        Ok(())
    }

    /// Writes the branch's current host values into their backings,
    /// skipping values that already are the backing's read port.
    pub(super) fn write_promoted_variables(&mut self, index: usize, span: Span) -> Result<(), LoweringError> {
        self.write_promoted_in(&[index], span)
    }

    /// Writes promotions of every conditional above `index`, innermost
    /// first. A local declared inside an enclosing branch is only promoted
    /// by the conditionals nested below its declaration.
    pub(super) fn write_promotions_above(&mut self, index: usize, span: Span) -> Result<(), LoweringError> {
        let mut conditionals = self.scopes.conditionals_above(index);
        conditionals.reverse();
        self.write_promoted_in(&conditionals, span)
    }

    fn write_promoted_in(&mut self, conditionals: &[usize], span: Span) -> Result<(), LoweringError> {
        let mut entries: IndexMap<NodeId, VarId> = IndexMap::new();
        for index in conditionals {
            if let SemanticScope::Conditional(cond) = &self.scopes[*index] {
                for promoted in cond.branch.values() {
                    entries.entry(promoted.backing).or_insert(promoted.var);
                }
            }
        }
        for (backing, var) in entries {
            let value = self.vars[var.0].value.clone();
            if value.equivalent_to(&self.backing_value(var, backing)) {
                continue;
            }
            let kind = self.vars[var.0].kind.clone();
            self.write_variable(backing, &kind, value, span)?;
        }
        Ok(())
    }

    /// Restores every variable promoted in the finished branch to its
    /// pre-conditional snapshot.
    pub(super) fn reset_promoted_variables(&mut self, index: usize) {
        let drained: Vec<PromotedVariable> = match &mut self.scopes[index] {
            SemanticScope::Conditional(cond) => cond.branch.drain(..).map(|(_, p)| p).collect(),
            _ => return,
        };
        for promoted in drained {
            self.vars[promoted.var.0].value = promoted.snapshot;
        }
    }

    /// Points every variable promoted in the current branch at its backing
    /// read port, keeping the branch open.
    pub(super) fn rebind_promoted_variables(&mut self, index: usize) {
        let entries: Vec<(VarId, NodeId)> = match &self.scopes[index] {
            SemanticScope::Conditional(cond) => {
                cond.branch.values().map(|p| (p.var, p.backing)).collect()
            }
            _ => return,
        };
        for (var, backing) in entries {
            self.vars[var.0].value = self.backing_value(var, backing);
        }
    }

    /// Closes a branch: write back, then restore snapshots.
    pub(super) fn end_branch(&mut self, index: usize, span: Span) -> Result<(), LoweringError> {
        self.write_promoted_variables(index, span)?;
        self.reset_promoted_variables(index);
        Ok(())
    }

    /// Emits the entry writes of a popped conditional on the current flow.
    pub(super) fn emit_seeds(&mut self, cond: &ConditionalContext, span: Span) -> Result<(), LoweringError> {
        for (backing, value) in &cond.seeds {
            let kind = match self.context().node(*backing).and_then(|n| n.outputs.first()) {
                Some(kind) => kind.clone(),
                None => continue,
            };
            self.write_variable(*backing, &kind, value.clone(), span)?;
        }
        Ok(())
    }

    /// After all branches: every touched variable now reads the merged value.
    pub(super) fn settle_promoted_variables(&mut self, cond: &ConditionalContext) {
        for promoted in cond.touched.values() {
            self.vars[promoted.var.0].value = self.backing_value(promoted.var, promoted.backing);
        }
    }

    /// Undoes a conditional that produced no observable flow: snapshots
    /// stay in place and backings it created are removed.
    pub(super) fn discard_promotions(&mut self, cond: &ConditionalContext, span: Span) -> Result<(), LoweringError> {
        for promoted in cond.touched.values() {
            self.vars[promoted.var.0].value = promoted.snapshot.clone();
        }
        for backing in &cond.created {
            self.context_mut()
                .remove_node(*backing)
                .map_err(|e| LoweringError::graph(e, span))?;
            for var in self.vars.iter_mut() {
                if var.promotion_backing == Some(*backing) {
                    var.promotion_backing = None;
                }
            }
        }
        Ok(())
    }
}
