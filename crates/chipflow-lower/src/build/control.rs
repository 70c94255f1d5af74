//! `if` and `switch` builders.

use chipflow_core::{Literal, Port, ValueKind};
use serde_json::json;

use super::scope::{ConditionalContext, SemanticScope, SwitchScope};
use super::{describe, unbalanced, BuildState};
use crate::error::LoweringError;
use crate::program::{LExpr, Op, SwitchCase, Thunk};
use crate::source::Span;

impl<'p> BuildState<'p> {
    /// Builds one `If` node. Each branch runs on a fresh flow seeded from
    /// its output; a conditional whose branches did nothing is removed again.
    pub(super) fn build_if(
        &mut self,
        test: &'p LExpr,
        then: &'p [Op],
        otherwise: &'p [Op],
        span: Span,
    ) -> Result<(), LoweringError> {
        let condition = self.eval(test)?;
        let signature = self.signature("If", span)?;
        let node = self.new_node("If", &signature, &[]);
        self.connect_value(condition, node, 0, test.span)?;

        let index = self.scopes.len();
        self.scopes
            .push(SemanticScope::Conditional(ConditionalContext::default()));

        let true_flow = self.seeded_flow(Port::exec(node, 0));
        let outer = self.swap_flow(true_flow);
        self.run(then)?;
        self.end_branch(index, span)?;

        let false_flow = self.seeded_flow(Port::exec(node, 1));
        let true_flow = self.swap_flow(false_flow);
        self.run(otherwise)?;
        self.end_branch(index, span)?;
        let false_flow = self.swap_flow(outer);

        let cond = self.pop_conditional(span)?;

        if true_flow.has_advanced_or_cleared() || false_flow.has_advanced_or_cleared() {
            self.emit_seeds(&cond, span)?;
            self.advance(Port::exec(node, 0), Port::exec(node, 0), span)?;
            self.flow.clear();
            self.flow.merge(true_flow);
            self.flow.merge(false_flow);
            self.settle_promoted_variables(&cond);
        } else {
            tracing::debug!(node = %node, "eliding conditional without observable effect");
            self.context_mut()
                .remove_node(node)
                .map_err(|e| LoweringError::graph(e, span))?;
            self.discard_promotions(&cond, span)?;
            // Nothing after the If survived, so later nodes reuse its id.
            self.context_mut().release_ids_from(node);
        }
        Ok(())
    }

    /// Builds an integer or string switch. Output 0 is the default path;
    /// every section with at least one case key gets its own output, so
    /// keys sharing a body share the output.
    pub(super) fn build_switch(
        &mut self,
        subject: &'p LExpr,
        sections: &'p [Thunk],
        cases: &'p [SwitchCase],
        default: Option<usize>,
        span: Span,
    ) -> Result<(), LoweringError> {
        let value = self.eval(subject)?;
        let (kind, key_kind) = match value.kind() {
            Some(ValueKind::Int) => ("ExecutionIntegerSwitch", ValueKind::Int),
            Some(ValueKind::String) => ("ExecutionStringSwitch", ValueKind::String),
            _ => {
                return Err(LoweringError::InvalidSwitchSubject {
                    kind: describe(&value),
                    span: subject.span,
                })
            }
        };

        let mut keys: Vec<(Literal, usize)> = Vec::with_capacity(cases.len());
        for case in cases {
            let key = self.eval(&case.key)?;
            let literal = match (key.literal(), key.port()) {
                (Some(literal), _) => literal,
                (None, Some(port)) => {
                    return Err(LoweringError::DynamicSwitchCase {
                        detail: format!("key is produced by {}", port),
                        span: case.key.span,
                    })
                }
                (None, None) => {
                    return Err(LoweringError::DynamicSwitchCase {
                        detail: format!("key of kind {} has no literal value", describe(&key)),
                        span: case.key.span,
                    })
                }
            };
            if literal.kind() != key_kind {
                return Err(LoweringError::TypeMismatch {
                    expected: key_kind.to_string(),
                    actual: literal.kind().to_string(),
                    span: case.key.span,
                });
            }
            if keys.iter().all(|(existing, _)| *existing != literal) {
                keys.push((literal, case.section));
            }
        }

        // Output number per section, in source order.
        let mut outputs: Vec<Option<u32>> = vec![None; sections.len()];
        let mut next_output = 1;
        for (section, slot) in outputs.iter_mut().enumerate() {
            if keys.iter().any(|(_, s)| *s == section) {
                *slot = Some(next_output);
                next_output += 1;
            }
        }

        let signature = self.signature(kind, span)?;
        let node = self.new_node(kind, &signature, &[]);
        if let Some(n) = self.context_mut().node_mut(node) {
            n.exec_outputs = next_output;
        }
        self.connect_value(value, node, 0, subject.span)?;
        let case_outputs: Vec<u32> = keys
            .iter()
            .map(|(_, section)| outputs[*section].unwrap_or(0))
            .collect();
        let case_keys: Vec<Literal> = keys.into_iter().map(|(key, _)| key).collect();
        self.set_metadata(node, "switch_cases", json!(case_keys));
        self.set_metadata(node, "case_outputs", json!(case_outputs));

        let switch_index = self.scopes.len();
        let break_flow = self.new_flow();
        self.scopes
            .push(SemanticScope::Switch(SwitchScope { break_flow }));
        let cond_index = self.scopes.len();
        self.scopes
            .push(SemanticScope::Conditional(ConditionalContext::default()));

        let mut order: Vec<usize> = Vec::with_capacity(sections.len());
        order.extend(default);
        order.extend((0..sections.len()).filter(|s| Some(*s) != default));

        let mut continuation = self.new_flow();
        if default.is_none() {
            continuation.insert(Port::exec(node, 0));
        }
        let outer = self.swap_flow(continuation);
        for section in order {
            let mut entry = self.new_flow();
            if default == Some(section) {
                entry.insert(Port::exec(node, 0));
            }
            if let Some(output) = outputs[section] {
                entry.insert(Port::exec(node, output));
            }
            let continuation = self.swap_flow(entry);
            self.run(&sections[section])?;
            self.end_branch(cond_index, span)?;
            let finished = self.swap_flow(continuation);
            self.flow.merge(finished);
        }
        let continuation = self.swap_flow(outer);

        let cond = self.pop_conditional(span)?;
        let switch = match self.scopes.pop() {
            Some(SemanticScope::Switch(switch)) if self.scopes.len() == switch_index => switch,
            _ => return Err(unbalanced(span)),
        };

        self.emit_seeds(&cond, span)?;
        self.advance(Port::exec(node, 0), Port::exec(node, 0), span)?;
        self.flow.clear();
        self.flow.merge(continuation);
        self.flow.merge(switch.break_flow);
        self.settle_promoted_variables(&cond);
        Ok(())
    }

    pub(super) fn pop_conditional(&mut self, span: Span) -> Result<ConditionalContext, LoweringError> {
        match self.scopes.pop() {
            Some(SemanticScope::Conditional(cond)) => Ok(cond),
            _ => Err(unbalanced(span)),
        }
    }
}
