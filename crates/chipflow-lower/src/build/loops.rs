//! Loop builders and the `break` / `continue` jumps.
//!
//! `while` re-tests through a guard `If` at the loop head, `do`-`while`
//! tests at the end and jumps back to the first node of the body, and
//! `foreach` hands iteration to a `ForEach` chip. All three run their body
//! inside a conditional context so locals modified by the body are promoted
//! to graph variables, and all three count as repeating bodies.

use std::collections::HashSet;

use chipflow_core::{NodeId, Port, Value, ValueKind};
use serde_json::json;

use super::flow::ExecFlow;
use super::scope::{
    AccessibilityScope, ConditionalContext, LoopKind, LoopScope, ScopeStack, SemanticScope,
};
use super::{describe, unbalanced, BuildState};
use crate::error::LoweringError;
use crate::program::{LExpr, Op, ScopeKind};
use crate::source::Span;

impl<'p> BuildState<'p> {
    fn enter_loop(&mut self, kind: LoopKind) -> usize {
        let index = self.scopes.len();
        let break_flow = self.new_flow();
        let continue_flow = self.new_flow();
        self.scopes.push(SemanticScope::Loop(LoopScope {
            kind,
            break_flow,
            continue_flow,
            retest: None,
            needs_manual_implementation: false,
        }));
        self.scopes
            .push(SemanticScope::Conditional(ConditionalContext::default()));
        self.repeating += 1;
        index
    }

    fn exit_loop(&mut self, index: usize, span: Span) -> Result<(ConditionalContext, LoopScope), LoweringError> {
        self.repeating -= 1;
        let cond = self.pop_conditional(span)?;
        match self.scopes.pop() {
            Some(SemanticScope::Loop(scope)) if self.scopes.len() == index => Ok((cond, scope)),
            _ => Err(unbalanced(span)),
        }
    }

    fn loop_scope_mut(&mut self, index: usize) -> Option<&mut LoopScope> {
        match self.scopes.get_mut(index) {
            Some(SemanticScope::Loop(scope)) => Some(scope),
            _ => None,
        }
    }

    fn take_continue_flow(&mut self, index: usize, span: Span) -> Result<ExecFlow, LoweringError> {
        self.loop_scope_mut(index)
            .map(|scope| scope.continue_flow.take())
            .ok_or_else(|| unbalanced(span))
    }

    pub(super) fn build_while(&mut self, test: &'p LExpr, body: &'p [Op], span: Span) -> Result<(), LoweringError> {
        let index = self.enter_loop(LoopKind::While);
        let cond_index = index + 1;

        let head = self.new_flow();
        let outer = self.swap_flow(head);
        let condition = self.eval(test)?;
        let signature = self.signature("If", span)?;
        let guard = self.new_node("If", &signature, &[]);
        self.connect_value(condition, guard, 0, test.span)?;
        self.advance(Port::exec(guard, 0), Port::exec(guard, 0), span)?;
        let retest = self.flow.first_target().unwrap_or(Port::exec(guard, 0));
        if let Some(scope) = self.loop_scope_mut(index) {
            scope.retest = Some(retest);
        }

        // The head flow ends at the guard; the body starts from its true output.
        let body_flow = self.seeded_flow(Port::exec(guard, 0));
        self.swap_flow(body_flow);
        self.run(body)?;
        self.end_branch(cond_index, span)?;
        self.check_continuity(guard, span)?;
        self.jump(retest, span)?;

        self.swap_flow(outer);
        let (cond, scope) = self.exit_loop(index, span)?;
        self.emit_seeds(&cond, span)?;
        self.advance(retest, Port::exec(guard, 1), span)?;
        self.flow.merge(scope.break_flow.clone());
        self.settle_promoted_variables(&cond);
        self.finish_loop(guard, &scope);
        Ok(())
    }

    pub(super) fn build_do_while(&mut self, body: &'p [Op], test: &'p LExpr, span: Span) -> Result<(), LoweringError> {
        let index = self.enter_loop(LoopKind::DoWhile);
        let cond_index = index + 1;

        let head = self.new_flow();
        let outer = self.swap_flow(head);
        self.run(body)?;

        let continued = self.take_continue_flow(index, span)?;
        if !continued.is_empty() {
            // Paths arriving through `continue` already wrote their values,
            // so the test reads the variables back from their backings.
            self.write_promoted_variables(cond_index, span)?;
            self.rebind_promoted_variables(cond_index);
            self.flow.merge(continued);
        }

        let condition = self.eval(test)?;
        let signature = self.signature("If", span)?;
        let guard = self.new_node("If", &signature, &[]);
        self.connect_value(condition, guard, 0, test.span)?;
        self.end_branch(cond_index, span)?;
        if let Some(first) = self.flow.first_target() {
            self.check_continuity(first.node, span)?;
        }
        self.advance(Port::exec(guard, 0), Port::exec(guard, 1), span)?;
        let entry = self.flow.first_target().unwrap_or(Port::exec(guard, 0));
        self.context_mut()
            .connect(Port::exec(guard, 0), entry, true)
            .map_err(|e| LoweringError::graph(e, span))?;

        self.swap_flow(outer);
        let (cond, scope) = self.exit_loop(index, span)?;
        self.emit_seeds(&cond, span)?;
        self.advance(entry, Port::exec(guard, 1), span)?;
        self.flow.merge(scope.break_flow.clone());
        self.settle_promoted_variables(&cond);
        self.finish_loop(guard, &scope);
        Ok(())
    }

    pub(super) fn build_for_each(
        &mut self,
        name: &str,
        kind: Option<&ValueKind>,
        collection: &'p LExpr,
        body: &'p [Op],
        span: Span,
    ) -> Result<(), LoweringError> {
        let list = self.eval(collection)?;
        let element = match (kind, &list) {
            (Some(kind), _) => kind.clone(),
            (None, Value::List { element, .. }) => element.clone(),
            (None, Value::Any(_)) => ValueKind::Any,
            (None, other) => {
                return Err(LoweringError::TypeMismatch {
                    expected: "a list".into(),
                    actual: describe(other),
                    span: collection.span,
                })
            }
        };
        let signature = self.signature("ForEach", span)?;
        let node = self.new_node("ForEach", &signature, std::slice::from_ref(&element));
        self.connect_value(list, node, 0, collection.span)?;

        let index = self.enter_loop(LoopKind::ForEach);
        let cond_index = index + 1;

        let body_flow = self.seeded_flow(Port::exec(node, 0));
        let outer = self.swap_flow(body_flow);
        self.scopes.push(SemanticScope::Accessibility(AccessibilityScope::new(
            ScopeKind::General,
        )));
        let item = Value::from_port(&element, Port::data(node, 0));
        self.declare(name, element, item, false, span)?;
        self.run(body)?;
        self.exit_scope(span)?;
        self.end_branch(cond_index, span)?;

        let continued = self.take_continue_flow(index, span)?;
        self.flow.merge(continued);
        self.check_continuity(node, span)?;
        // The chip starts the next iteration itself; the body's end is dropped.
        self.flow.clear();

        self.swap_flow(outer);
        let (cond, scope) = self.exit_loop(index, span)?;
        self.emit_seeds(&cond, span)?;
        self.advance(Port::exec(node, 0), Port::exec(node, 1), span)?;
        self.flow.merge(scope.break_flow.clone());
        self.settle_promoted_variables(&cond);
        self.finish_loop(node, &scope);
        Ok(())
    }

    fn finish_loop(&mut self, node: NodeId, scope: &LoopScope) {
        if scope.needs_manual_implementation {
            tracing::warn!(
                node = %node,
                kind = ?scope.kind,
                "loop needs a manual iterator implementation"
            );
            self.set_metadata(node, "needs_manual_implementation", json!(true));
        }
    }

    /// Walks backwards from the live frontier to `source` over exec
    /// connections. Passing a deferred output flags every open loop.
    fn check_continuity(&mut self, source: NodeId, span: Span) -> Result<(), LoweringError> {
        if self.flow.is_empty() {
            return Ok(());
        }
        let mut stack: Vec<Port> = self.flow.ports().copied().collect();
        let mut visited = HashSet::new();
        let mut reached = false;
        let mut deferred = false;

        while let Some(port) = stack.pop() {
            let Some(node) = self.context().node(port.node) else {
                continue;
            };
            let deferred_output = self
                .options
                .catalog
                .get(&node.kind)
                .and_then(|s| s.deferred_output);
            if deferred_output == Some(port.index) {
                deferred = true;
            }
            if port.node == source {
                reached = true;
                continue;
            }
            if visited.insert(port.node) {
                stack.extend(self.context().exec_sources(port.node));
            }
        }

        if deferred {
            for scope in self.scopes.iter_mut() {
                if let SemanticScope::Loop(scope) = scope {
                    scope.needs_manual_implementation = true;
                }
            }
        }
        if !reached {
            return Err(LoweringError::IteratorDiscontinuity { span });
        }
        Ok(())
    }

    pub(super) fn break_(&mut self, span: Span) -> Result<(), LoweringError> {
        let index = self
            .scopes
            .nearest_within_method(|s| matches!(s, SemanticScope::Loop(_) | SemanticScope::Switch(_)))
            .ok_or_else(|| LoweringError::MisplacedJump {
                keyword: "break".into(),
                span,
            })?;
        self.write_promotions_above(index, span)?;
        let flow = self.flow.clone();
        self.flow.clear();
        match &mut self.scopes[index] {
            SemanticScope::Loop(scope) => {
                // While and do-while re-test in the graph and can leave
                // early; a ForEach chip always runs to the end.
                if scope.kind == LoopKind::ForEach {
                    scope.needs_manual_implementation = true;
                }
                scope.break_flow.merge(flow);
            }
            SemanticScope::Switch(scope) => scope.break_flow.merge(flow),
            _ => return Err(unbalanced(span)),
        }
        Ok(())
    }

    pub(super) fn continue_(&mut self, span: Span) -> Result<(), LoweringError> {
        let index = self
            .scopes
            .nearest_within_method(|s| matches!(s, SemanticScope::Loop(_)))
            .ok_or_else(|| LoweringError::MisplacedJump {
                keyword: "continue".into(),
                span,
            })?;
        self.write_promotions_above(index, span)?;
        let retest = match &self.scopes[index] {
            SemanticScope::Loop(scope) if scope.kind == LoopKind::While => scope.retest,
            _ => None,
        };
        match retest {
            Some(port) => self.jump(port, span),
            None => {
                let flow = self.flow.clone();
                self.flow.clear();
                if let Some(scope) = self.loop_scope_mut(index) {
                    scope.continue_flow.merge(flow);
                }
                Ok(())
            }
        }
    }
}
