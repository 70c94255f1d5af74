//! Statement rewriting.

use chipflow_core::ValueKind;

use super::{types, Rewriter};
use crate::error::LoweringError;
use crate::program::{Op, OpKind, ScopeKind, SwitchCase, Thunk};
use crate::source::{Block, Expr, ExprKind, GotoTarget, Stmt, StmtKind, SwitchLabel, SwitchSection};

/// Label given to the `default:` section of a switch.
pub(crate) const DEFAULT_CASE_LABEL: &str = "switch_case_default";

impl<'a> Rewriter<'a> {
    /// Wraps a function or lambda body: the return accumulator is opened
    /// before the first statement and merged after the last, and the body
    /// block is a root accessibility boundary.
    pub(super) fn function_body(
        &self,
        block: &Block,
        method: &str,
        return_kind: Option<ValueKind>,
        tuple_names: Option<Vec<String>>,
        params: Vec<String>,
    ) -> Result<Thunk, LoweringError> {
        let mut ops = vec![Op::new(
            OpKind::BeginReturns {
                method: method.to_string(),
                return_kind,
                tuple_names,
            },
            block.span,
        )];
        ops.extend(self.block(
            block,
            ScopeKind::MethodRoot,
            vec![Op::new(OpKind::BindParameters(params), block.span)],
        )?);
        ops.push(Op::new(OpKind::FinalizeReturns, block.span));
        Ok(ops)
    }

    fn block(&self, block: &Block, kind: ScopeKind, prelude: Vec<Op>) -> Result<Thunk, LoweringError> {
        let mut ops = vec![Op::new(OpKind::EnterScope(kind), block.span)];
        ops.extend(prelude);
        for stmt in &block.stmts {
            ops.extend(self.stmt(stmt)?);
        }
        ops.push(Op::new(OpKind::ExitScope, block.span));
        Ok(ops)
    }

    /// A branch or loop body. Non-block bodies still get their own scope.
    fn embedded(&self, stmt: &Stmt) -> Result<Thunk, LoweringError> {
        match &stmt.kind {
            StmtKind::Block(block) => self.block(block, ScopeKind::General, Vec::new()),
            _ => {
                let mut ops = vec![Op::new(OpKind::EnterScope(ScopeKind::General), stmt.span)];
                ops.extend(self.stmt(stmt)?);
                ops.push(Op::new(OpKind::ExitScope, stmt.span));
                Ok(ops)
            }
        }
    }

    pub(super) fn stmt(&self, stmt: &Stmt) -> Result<Thunk, LoweringError> {
        let span = stmt.span;
        let op = |kind| Ok(vec![Op::new(kind, span)]);
        match &stmt.kind {
            StmtKind::Block(block) => self.block(block, ScopeKind::General, Vec::new()),
            StmtKind::Expr(expr) => op(OpKind::Eval(self.expr(expr)?)),
            StmtKind::Local { name, ty, init } => {
                let kind = match ty {
                    Some(ty) => Some(types::retarget_value(ty, self.catalog, span)?),
                    None => None,
                };
                if kind.is_none() && init.is_none() {
                    return Err(LoweringError::UnresolvableExpressionType { span });
                }
                let init = init.as_ref().map(|e| self.expr(e)).transpose()?;
                op(OpKind::Declare {
                    name: name.clone(),
                    kind,
                    init,
                })
            }
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => op(OpKind::If {
                test: self.expr(cond)?,
                then: self.embedded(then)?,
                otherwise: match otherwise {
                    Some(s) => self.embedded(s)?,
                    None => Vec::new(),
                },
            }),
            StmtKind::While { cond, body } => op(OpKind::While {
                test: self.expr(cond)?,
                body: self.embedded(body)?,
            }),
            StmtKind::DoWhile { body, cond } => op(OpKind::DoWhile {
                body: self.embedded(body)?,
                test: self.expr(cond)?,
            }),
            StmtKind::ForEach {
                name,
                ty,
                collection,
                body,
            } => op(OpKind::ForEach {
                name: name.clone(),
                kind: match ty {
                    Some(ty) => Some(types::retarget_value(ty, self.catalog, span)?),
                    None => None,
                },
                collection: self.expr(collection)?,
                body: self.embedded(body)?,
            }),
            StmtKind::Switch { subject, sections } => self.switch(stmt, subject, sections),
            StmtKind::Goto(target) => op(OpKind::Goto(match target {
                GotoTarget::Label(label) => label.clone(),
                GotoTarget::Case(expr) => self.case_label(expr),
                GotoTarget::Default => DEFAULT_CASE_LABEL.to_string(),
            })),
            StmtKind::Labeled { label, stmt: inner } => {
                let mut ops = vec![Op::new(OpKind::Label(label.clone()), span)];
                ops.extend(self.stmt(inner)?);
                Ok(ops)
            }
            StmtKind::Break => op(OpKind::Break),
            StmtKind::Continue => op(OpKind::Continue),
            StmtKind::Return(value) => op(OpKind::Return(
                value.as_ref().map(|e| self.expr(e)).transpose()?,
            )),
            StmtKind::Throw(_) => op(OpKind::ClearExec),
            StmtKind::Empty => Ok(Vec::new()),
        }
    }

    /// Each section becomes one body; every case label of a section selects
    /// the same body, and the section declares a label per case so
    /// `goto case` can reach it. The switch gets its own scope.
    fn switch(
        &self,
        stmt: &Stmt,
        subject: &Expr,
        sections: &[SwitchSection],
    ) -> Result<Thunk, LoweringError> {
        let mut bodies = Vec::with_capacity(sections.len());
        let mut cases = Vec::new();
        let mut default = None;

        for (index, section) in sections.iter().enumerate() {
            let mut body = Vec::new();
            for label in &section.labels {
                match label {
                    SwitchLabel::Case(key) => {
                        body.push(Op::new(OpKind::Label(self.case_label(key)), key.span));
                        cases.push(SwitchCase {
                            key: self.expr(key)?,
                            section: index,
                        });
                    }
                    // A repeated default is ignored after the first.
                    SwitchLabel::Default if default.is_none() => {
                        body.push(Op::new(OpKind::Label(DEFAULT_CASE_LABEL.into()), stmt.span));
                        default = Some(index);
                    }
                    SwitchLabel::Default => {}
                }
            }
            for inner in &section.stmts {
                body.extend(self.stmt(inner)?);
            }
            bodies.push(body);
        }

        Ok(vec![
            Op::new(OpKind::EnterScope(ScopeKind::General), stmt.span),
            Op::new(
                OpKind::Switch {
                    subject: self.expr(subject)?,
                    sections: bodies,
                    cases,
                    default,
                },
                stmt.span,
            ),
            Op::new(OpKind::ExitScope, stmt.span),
        ])
    }

    /// Synthetic label naming the section a case key selects.
    fn case_label(&self, key: &Expr) -> String {
        let text = match (&key.kind, self.oracle.constant_value(key.id)) {
            (_, Some(constant)) => constant.to_string(),
            (ExprKind::Literal(literal), None) => literal.to_string(),
            (ExprKind::Name(name), None) => name.clone(),
            _ => format!("expr{}", key.id.0),
        };
        format!("switch_case_{}", text)
    }
}
