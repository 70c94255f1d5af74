//! Expression rewriting: operators to chips, calls to chip/method/intrinsic
//! invocations, elided generic arguments made explicit.

use chipflow_core::{Literal, ValueKind};

use super::{types, Rewriter};
use crate::error::LoweringError;
use crate::oracle::GenericResolution;
use crate::program::{Intrinsic, LExpr, LExprKind};
use crate::source::{BinaryOp, Expr, ExprKind, InterpolationPart, TypeRef, UnaryOp};

/// Receiver names whose member calls are plain chip calls.
const CHIP_RECEIVERS: [&str; 2] = ["Chips", "ChipBuilder"];

/// Chip an operator lowers to. `!=` is handled separately.
fn binary_chip(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "Add",
        BinaryOp::Subtract => "Subtract",
        BinaryOp::Multiply => "Multiply",
        BinaryOp::Divide => "Divide",
        BinaryOp::Modulo => "Modulo",
        BinaryOp::Greater => "GreaterThan",
        BinaryOp::Less => "LessThan",
        BinaryOp::GreaterOrEqual => "GreaterOrEqual",
        BinaryOp::LessOrEqual => "LessOrEqual",
        BinaryOp::Equal | BinaryOp::NotEqual => "Equals",
        BinaryOp::LogicalAnd => "And",
        BinaryOp::LogicalOr => "Or",
        BinaryOp::ShiftLeft => "BitShiftLeft",
        BinaryOp::ShiftRight => "BitShiftRight",
    }
}

fn intrinsic(name: &str) -> Option<Intrinsic> {
    match name {
        "ExistingCircuitBoard" => Some(Intrinsic::ExistingCircuitBoard),
        "ClearExec" | "StartNewGraph" => Some(Intrinsic::ClearExec),
        _ => None,
    }
}

impl<'a> Rewriter<'a> {
    pub(super) fn expr(&self, expr: &Expr) -> Result<LExpr, LoweringError> {
        let span = expr.span;
        let kind = match &expr.kind {
            ExprKind::Literal(literal) => LExprKind::Literal(literal.clone()),
            ExprKind::Name(name) => match self.oracle.constant_value(expr.id) {
                Some(constant) => LExprKind::Literal(constant),
                None => LExprKind::Local(name.clone()),
            },
            ExprKind::Member { target, name } => LExprKind::Element {
                index: self.element_index(target, name, expr)?,
                target: Box::new(self.expr(target)?),
            },
            ExprKind::Call {
                target,
                method,
                type_args,
                args,
            } => return self.call(expr, target.as_deref(), method, type_args, args),
            ExprKind::Binary { op, lhs, rhs } => {
                let call = LExpr::chip(binary_chip(*op), vec![self.expr(lhs)?, self.expr(rhs)?], span);
                if *op == BinaryOp::NotEqual {
                    return Ok(LExpr::chip("Not", vec![call], span));
                }
                return Ok(call);
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.expr(operand)?;
                return Ok(match op {
                    UnaryOp::Not => LExpr::chip("Not", vec![operand], span),
                    UnaryOp::Negate => LExpr::chip("Negate", vec![operand], span),
                    UnaryOp::Plus => operand,
                });
            }
            ExprKind::Assign { target, op, value } => {
                let value = self.expr(value)?;
                let value = match op {
                    Some(op) => LExpr::chip(
                        binary_chip(*op),
                        vec![LExpr::new(LExprKind::Local(target.clone()), span), value],
                        span,
                    ),
                    None => value,
                };
                LExprKind::Assign {
                    name: target.clone(),
                    value: Box::new(value),
                }
            }
            ExprKind::Increment { target, decrement } => LExprKind::Assign {
                name: target.clone(),
                value: Box::new(LExpr::chip(
                    if *decrement { "Subtract" } else { "Add" },
                    vec![
                        LExpr::new(LExprKind::Local(target.clone()), span),
                        LExpr::literal(Literal::Int(1), span),
                    ],
                    span,
                )),
            },
            ExprKind::Conditional {
                cond,
                when_true,
                when_false,
            } => {
                let ty = self
                    .oracle
                    .expression_type(expr.id)
                    .ok_or(LoweringError::UnresolvableExpressionType { span })?;
                let kind = types::retarget_value(&ty, self.catalog, span)?;
                LExprKind::Chip {
                    name: "IfValue".into(),
                    type_args: vec![kind],
                    args: vec![self.expr(cond)?, self.expr(when_true)?, self.expr(when_false)?],
                }
            }
            ExprKind::Interpolated(parts) => {
                let mut args = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        InterpolationPart::Text(text) => {
                            args.push(LExpr::literal(Literal::String(text.clone()), span))
                        }
                        InterpolationPart::Hole {
                            expr,
                            alignment,
                            format,
                        } => {
                            if alignment.is_some() || format.is_some() {
                                return Err(LoweringError::UnsupportedInterpolationClause {
                                    span: expr.span,
                                });
                            }
                            args.push(self.expr(expr)?);
                        }
                    }
                }
                LExprKind::Intrinsic {
                    intrinsic: Intrinsic::StringInterpolation,
                    args,
                }
            }
            ExprKind::Tuple(elements) => LExprKind::Tuple(
                elements
                    .iter()
                    .map(|e| self.expr(e))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            ExprKind::Lambda(block) => {
                LExprKind::Closure(self.function_body(block, "<lambda>", None, None, Vec::new())?)
            }
            ExprKind::Default(ty) => {
                LExprKind::Default(types::retarget_value(ty, self.catalog, span)?)
            }
        };
        Ok(LExpr::new(kind, span))
    }

    fn call(
        &self,
        expr: &Expr,
        target: Option<&Expr>,
        method: &str,
        explicit_type_args: &[TypeRef],
        args: &[Expr],
    ) -> Result<LExpr, LoweringError> {
        let span = expr.span;
        let mut lowered_args = args
            .iter()
            .map(|a| self.expr(a))
            .collect::<Result<Vec<_>, _>>()?;

        let kind = match (target, intrinsic(method)) {
            (None, _) if self.user_methods.contains(method) => LExprKind::Invoke {
                method: method.to_string(),
                args: lowered_args,
            },
            (None, Some(intrinsic)) => LExprKind::Intrinsic {
                intrinsic,
                args: lowered_args,
            },
            _ => {
                if let Some(receiver) = target {
                    let is_chip_receiver = matches!(
                        &receiver.kind,
                        ExprKind::Name(n) if CHIP_RECEIVERS.contains(&n.as_str())
                    );
                    if !is_chip_receiver {
                        lowered_args.insert(0, self.expr(receiver)?);
                    }
                }
                LExprKind::Chip {
                    name: method.to_string(),
                    type_args: self.type_arguments(expr, method, explicit_type_args)?,
                    args: lowered_args,
                }
            }
        };
        Ok(LExpr::new(kind, span))
    }

    /// Explicit type arguments win; otherwise ask the oracle.
    fn type_arguments(
        &self,
        call: &Expr,
        method: &str,
        explicit: &[TypeRef],
    ) -> Result<Vec<ValueKind>, LoweringError> {
        let span = call.span;
        let resolved = if explicit.is_empty() {
            match self.oracle.generic_arguments(call.id) {
                GenericResolution::NotGeneric => return Ok(Vec::new()),
                GenericResolution::Resolved(args) => args,
                GenericResolution::Unresolved => {
                    return Err(LoweringError::UnresolvedGenericArgument {
                        method: method.to_string(),
                        span,
                    })
                }
            }
        } else {
            explicit.to_vec()
        };
        resolved
            .iter()
            .map(|ty| {
                types::retarget_value(ty, self.catalog, span).map_err(|_| {
                    LoweringError::UnresolvedGenericArgument {
                        method: method.to_string(),
                        span,
                    }
                })
            })
            .collect()
    }

    /// Index of a tuple element accessed by name or as `ItemN`.
    fn element_index(&self, target: &Expr, name: &str, access: &Expr) -> Result<usize, LoweringError> {
        if let Some(TypeRef::Tuple(elements)) = self.oracle.expression_type(target.id) {
            if let Some(i) = elements.iter().position(|e| e.name.as_deref() == Some(name)) {
                return Ok(i);
            }
        }
        name.strip_prefix("Item")
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .map(|n| n - 1)
            .ok_or_else(|| LoweringError::Unsupported {
                construct: format!("member access '.{}'", name),
                span: access.span,
            })
    }
}
