//! Expression evaluation.
//!
//! Evaluating an expression yields a [`Value`]. Pure chips only add nodes;
//! chips with exec pins are spliced into the live flow as they are spawned.

use chipflow_core::{ChipSignature, Literal, Node, NodeId, Operand, Port, Value, ValueKind};

use super::{coerce, describe, fold, BuildState};
use crate::error::LoweringError;
use crate::program::{Intrinsic, LExpr, LExprKind};
use crate::source::Span;

impl<'p> BuildState<'p> {
    pub(super) fn eval(&mut self, expr: &'p LExpr) -> Result<Value, LoweringError> {
        let span = expr.span;
        match &expr.kind {
            LExprKind::Literal(literal) => Ok(Value::from_literal(literal.clone())),
            LExprKind::Local(name) => {
                let var = self.access_variable(name, span)?;
                Ok(self.vars[var.0].value.clone())
            }
            LExprKind::Assign { name, value } => {
                let value = self.eval(value)?;
                let var = self.access_variable(name, span)?;
                if !self.vars[var.0].writable {
                    return Err(LoweringError::Unsupported {
                        construct: format!("assignment to read-only local '{}'", name),
                        span,
                    });
                }
                let kind = self.vars[var.0].kind.clone();
                let value = coerce(&value, &kind, span)?;
                self.vars[var.0].value = value.clone();
                Ok(value)
            }
            LExprKind::Chip {
                name,
                type_args,
                args,
            } => self.chip_call(name, type_args, args, span),
            LExprKind::Invoke { method, args } => self.invoke(method, args, span),
            LExprKind::Intrinsic { intrinsic, args } => match intrinsic {
                Intrinsic::StringInterpolation => self.interpolate(args, span),
                Intrinsic::ExistingCircuitBoard => self.existing_circuit_board(args, span),
                Intrinsic::ClearExec => {
                    self.flow.clear();
                    Ok(Value::Unit)
                }
            },
            LExprKind::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Ok(Value::Tuple(values))
            }
            LExprKind::Element { target, index } => match self.eval(target)? {
                Value::Tuple(values) if *index < values.len() => {
                    Ok(values.into_iter().nth(*index).unwrap_or(Value::Unit))
                }
                other => Err(LoweringError::TypeMismatch {
                    expected: format!("a tuple with at least {} elements", index + 1),
                    actual: describe(&other),
                    span,
                }),
            },
            LExprKind::Closure(_) => Err(LoweringError::Unsupported {
                construct: "lambda outside of a circuit board call".into(),
                span,
            }),
            LExprKind::Default(kind) => Ok(Value::default_for(kind)),
        }
    }

    fn chip_call(
        &mut self,
        name: &str,
        type_args: &[ValueKind],
        args: &'p [LExpr],
        span: Span,
    ) -> Result<Value, LoweringError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }

        let name = if name == "Add" && values.iter().any(|v| v.kind() == Some(ValueKind::String)) {
            "StringConcat"
        } else {
            name
        };
        if let Some(folded) = fold::fold(name, &values) {
            return Ok(folded);
        }
        if name == "IfValue" && values.len() == 3 {
            if let Some(Literal::Bool(condition)) = values[0].literal() {
                let chosen = if condition { 1 } else { 2 };
                let kind = type_args.first().cloned().unwrap_or(ValueKind::Any);
                let value = values.swap_remove(chosen);
                return coerce(&value, &kind, span);
            }
        }

        let signature = self.signature(name, span)?;
        let type_args = if type_args.is_empty() {
            infer_type_args(&signature, &values)
        } else {
            type_args.to_vec()
        };
        let node = self.spawn(name, &signature, &type_args, values, span)?;
        Ok(self
            .context()
            .node(node)
            .map(Node::result_value)
            .unwrap_or(Value::Unit))
    }

    /// Spawns a chip, wires its arguments and, if it has exec pins,
    /// advances the live flow through it.
    pub(super) fn spawn(
        &mut self,
        kind: &str,
        signature: &ChipSignature,
        type_args: &[ValueKind],
        values: Vec<Value>,
        span: Span,
    ) -> Result<NodeId, LoweringError> {
        if !signature.variadic && values.len() > signature.inputs.len() {
            return Err(LoweringError::TypeMismatch {
                expected: format!("at most {} arguments to '{}'", signature.inputs.len(), kind),
                actual: format!("{} arguments", values.len()),
                span,
            });
        }

        let node = self.new_node(kind, signature, type_args);
        if signature.variadic && values.len() != signature.inputs.len() {
            let slot = signature
                .inputs
                .last()
                .map(|k| k.resolve(type_args))
                .unwrap_or(ValueKind::Any);
            if let Some(n) = self.context_mut().node_mut(node) {
                n.set_input_count(values.len(), &slot);
            }
        }
        for (slot, value) in values.into_iter().enumerate() {
            self.connect_value(value, node, slot as u32, span)?;
        }
        if signature.is_sequenced() {
            self.advance(
                Port::exec(node, 0),
                Port::exec(node, signature.flow_output),
                span,
            )?;
        }
        Ok(node)
    }

    /// Feeds `value` into data input `slot` of `node`: literals are stored
    /// inline, ports are connected, absent values leave the slot open.
    pub(super) fn connect_value(
        &mut self,
        value: Value,
        node: NodeId,
        slot: u32,
        span: Span,
    ) -> Result<(), LoweringError> {
        let slot_kind = self
            .context()
            .node(node)
            .and_then(|n| n.inputs.get(slot as usize))
            .map(|input| input.kind.clone())
            .ok_or_else(|| LoweringError::TypeMismatch {
                expected: format!("an input slot {}", slot),
                actual: "none".into(),
                span,
            })?;
        let mismatch = |actual: String| LoweringError::TypeMismatch {
            expected: slot_kind.to_string(),
            actual,
            span,
        };

        if matches!(value, Value::Tuple(_) | Value::Unit) {
            return Err(mismatch(describe(&value)));
        }
        if let Some(literal) = value.literal() {
            let literal = match (literal, &slot_kind) {
                (Literal::Int(v), ValueKind::Float) => Literal::Float(v as f64),
                (literal, _) => literal,
            };
            if !slot_kind.accepts(&literal.kind()) {
                return Err(mismatch(literal.kind().to_string()));
            }
            if let Some(n) = self.context_mut().node_mut(node) {
                n.set_literal(slot, literal);
            }
        } else if let Some(port) = value.port() {
            let kind = value.kind().unwrap_or(ValueKind::Any);
            if !slot_kind.accepts(&kind) {
                return Err(mismatch(kind.to_string()));
            }
            self.context_mut()
                .connect(port, Port::data(node, slot), false)
                .map_err(|e| LoweringError::graph(e, span))?;
        }
        Ok(())
    }

    /// Joins text and holes into one string. Adjacent literals are merged;
    /// non-string ports go through `ToString`.
    fn interpolate(&mut self, parts: &'p [LExpr], span: Span) -> Result<Value, LoweringError> {
        let mut pieces: Vec<Value> = Vec::new();
        for part in parts {
            let value = self.eval(part)?;
            let piece = match (value.literal(), value.kind()) {
                (Some(literal), _) => Value::from_literal(Literal::String(literal.to_string())),
                (None, Some(ValueKind::String)) => value,
                (None, Some(kind)) => {
                    let signature = self.signature("ToString", span)?;
                    let node = self.spawn("ToString", &signature, &[kind], vec![value], part.span)?;
                    Value::from_port(&ValueKind::String, Port::data(node, 0))
                }
                (None, None) => {
                    return Err(LoweringError::TypeMismatch {
                        expected: "a value".into(),
                        actual: "void".into(),
                        span: part.span,
                    })
                }
            };
            if let (Some(Value::String(Operand::Literal(prev))), Value::String(Operand::Literal(next))) =
                (pieces.last_mut(), &piece)
            {
                prev.push_str(next);
                continue;
            }
            pieces.push(piece);
        }

        match pieces.len() {
            0 => Ok(Value::from_literal(Literal::String(String::new()))),
            1 => Ok(pieces.remove(0)),
            _ => {
                let signature = self.signature("StringConcat", span)?;
                let node = self.spawn("StringConcat", &signature, &[], pieces, span)?;
                Ok(Value::from_port(&ValueKind::String, Port::data(node, 0)))
            }
        }
    }
}

/// Binds the signature's generic placeholders from the argument kinds.
/// Unbound placeholders resolve to `Any`; an int bound alongside a float
/// widens to float.
fn infer_type_args(signature: &ChipSignature, values: &[Value]) -> Vec<ValueKind> {
    let count = signature
        .inputs
        .iter()
        .chain(signature.outputs.iter())
        .filter_map(max_generic)
        .max()
        .map(|m| m as usize + 1)
        .unwrap_or(0);
    let mut bound: Vec<Option<ValueKind>> = vec![None; count];
    for (i, value) in values.iter().enumerate() {
        let slot = signature
            .inputs
            .get(i)
            .or_else(|| signature.inputs.last().filter(|_| signature.variadic));
        if let (Some(slot), Some(kind)) = (slot, value.kind()) {
            unify(slot, &kind, &mut bound);
        }
    }
    bound
        .into_iter()
        .map(|k| k.unwrap_or(ValueKind::Any))
        .collect()
}

fn max_generic(kind: &ValueKind) -> Option<u32> {
    match kind {
        ValueKind::Generic(i) => Some(*i),
        ValueKind::List(element) => max_generic(element),
        ValueKind::Tuple(elements) => elements.iter().filter_map(max_generic).max(),
        _ => None,
    }
}

fn unify(slot: &ValueKind, actual: &ValueKind, bound: &mut [Option<ValueKind>]) {
    match (slot, actual) {
        (_, ValueKind::Any) => {}
        (ValueKind::Generic(i), _) => {
            if let Some(entry) = bound.get_mut(*i as usize) {
                let widen = *entry == Some(ValueKind::Int) && *actual == ValueKind::Float;
                if entry.is_none() || widen {
                    *entry = Some(actual.clone());
                }
            }
        }
        (ValueKind::List(slot), ValueKind::List(actual)) => unify(slot, actual, bound),
        _ => {}
    }
}
