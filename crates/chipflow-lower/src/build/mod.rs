//! Graph-construction runtime.
//!
//! [`BuildState`] executes a rewritten [`Program`] once, synchronously and
//! depth-first, spawning nodes into a [`Context`]. All mutable state (the
//! current flow, the scope stack, the variable arena, handler registries)
//! lives in the state value, so independent lowerings never share anything.
//!
//! The work is split by concern:
//! - `labels`: two-pass goto/label resolution and scope exit
//! - `promote`: conditional variable promotion
//! - `returns`: return collection
//! - `control`: if and switch
//! - `loops`: while, do-while, foreach, break and continue
//! - `expr` / `fold`: expression evaluation and literal folding
//! - `calls`: method inlining, event and shared-property dispatch, sub-boards

mod calls;
mod control;
mod expr;
pub mod flow;
mod fold;
mod labels;
mod loops;
mod promote;
mod returns;
mod scope;

use chipflow_core::{ChipSignature, Context, NodeId, Port, Value, ValueKind};
use indexmap::IndexMap;

use self::flow::{ExecFlow, FlowId};
use self::scope::{AccessibilityScope, DeclaredVariable, ScopeStack, SemanticScope, VarId};
use crate::error::LoweringError;
use crate::options::LowerOptions;
use crate::program::{Op, OpKind, Program};
use crate::source::Span;

/// Event function registered on first call.
#[derive(Debug, Clone)]
struct EventHandler {
    event: String,
    /// Variable node holding the handler's result, for non-void functions.
    result: Option<(NodeId, ValueKind)>,
}

pub(crate) struct BuildState<'p> {
    program: &'p Program,
    options: &'p LowerOptions,
    root: Context,
    /// Sub-contexts being built, innermost last.
    nested: Vec<Context>,
    flow: ExecFlow,
    next_flow: u64,
    scopes: Vec<SemanticScope>,
    vars: Vec<DeclaredVariable>,
    pending_args: Vec<Value>,
    returned: Option<Value>,
    call_depth: usize,
    /// Nesting of bodies that may run more than once (loops, handlers).
    repeating: usize,
    events: IndexMap<String, EventHandler>,
    shared: IndexMap<String, Value>,
}

/// Runs the entry method of `program` and returns the finished context.
pub(crate) fn build(program: &Program, options: &LowerOptions) -> Result<Context, LoweringError> {
    let entry = program
        .methods
        .get(&options.entry)
        .ok_or_else(|| LoweringError::EntryNotFound {
            name: options.entry.clone(),
        })?;

    let mut state = BuildState::new(program, options);
    let args = entry
        .params
        .iter()
        .map(|p| Value::default_for(&p.kind))
        .collect();
    state.run_method(entry, args, entry.span)?;
    state.flow.clear();

    debug_assert!(state.scopes.is_empty(), "scope stack not balanced");
    debug_assert!(state.nested.is_empty(), "sub-context left open");
    #[cfg(debug_assertions)]
    state.root.assert_consistency();

    Ok(state.root)
}

impl<'p> BuildState<'p> {
    fn new(program: &'p Program, options: &'p LowerOptions) -> Self {
        BuildState {
            program,
            options,
            root: Context::new(),
            nested: Vec::new(),
            flow: ExecFlow::new(FlowId(0)),
            next_flow: 1,
            scopes: Vec::new(),
            vars: Vec::new(),
            pending_args: Vec::new(),
            returned: None,
            call_depth: 0,
            repeating: 0,
            events: IndexMap::new(),
            shared: IndexMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Context and flow plumbing
    // -----------------------------------------------------------------------

    fn context(&self) -> &Context {
        self.nested.last().unwrap_or(&self.root)
    }

    fn context_mut(&mut self) -> &mut Context {
        match self.nested.last_mut() {
            Some(ctx) => ctx,
            None => &mut self.root,
        }
    }

    fn context_and_flow(&mut self) -> (&mut Context, &mut ExecFlow) {
        let ctx = match self.nested.last_mut() {
            Some(ctx) => ctx,
            None => &mut self.root,
        };
        (ctx, &mut self.flow)
    }

    fn new_flow(&mut self) -> ExecFlow {
        let id = FlowId(self.next_flow);
        self.next_flow += 1;
        ExecFlow::new(id)
    }

    fn seeded_flow(&mut self, port: Port) -> ExecFlow {
        let mut flow = self.new_flow();
        flow.insert(port);
        flow
    }

    /// Makes `flow` current and returns the previous one.
    fn swap_flow(&mut self, flow: ExecFlow) -> ExecFlow {
        std::mem::replace(&mut self.flow, flow)
    }

    /// Feeds the current flow into `into` and continues from `out`.
    fn advance(&mut self, into: Port, out: Port, span: Span) -> Result<(), LoweringError> {
        self.resolve_pending_labels(into, span)?;
        let (ctx, flow) = self.context_and_flow();
        flow.advance(ctx, into, out)
            .map_err(|e| LoweringError::graph(e, span))
    }

    /// Feeds the current flow into `into`, leaving it empty.
    fn feed(&mut self, into: Port, span: Span) -> Result<(), LoweringError> {
        self.resolve_pending_labels(into, span)?;
        let (ctx, flow) = self.context_and_flow();
        flow.feed(ctx, into).map_err(|e| LoweringError::graph(e, span))
    }

    /// Feeds the current flow into `into` and terminates it.
    fn jump(&mut self, into: Port, span: Span) -> Result<(), LoweringError> {
        self.feed(into, span)?;
        self.flow.clear();
        Ok(())
    }

    /// Spawns a node without touching the flow.
    fn new_node(&mut self, kind: &str, signature: &ChipSignature, type_args: &[ValueKind]) -> NodeId {
        let id = self.context_mut().new_node(kind, signature, type_args);
        tracing::debug!(node = %id, kind, "spawned node");
        id
    }

    fn signature(&self, kind: &str, span: Span) -> Result<ChipSignature, LoweringError> {
        self.options
            .catalog
            .get(kind)
            .cloned()
            .ok_or_else(|| LoweringError::UnknownChip {
                name: kind.to_string(),
                span,
            })
    }

    fn set_metadata(&mut self, node: NodeId, key: &str, value: serde_json::Value) {
        if let Some(n) = self.context_mut().node_mut(node) {
            n.metadata.insert(key.to_string(), value);
        }
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    fn declare(
        &mut self,
        name: &str,
        kind: ValueKind,
        value: Value,
        writable: bool,
        span: Span,
    ) -> Result<VarId, LoweringError> {
        let id = VarId(self.vars.len());
        self.vars.push(DeclaredVariable {
            name: name.to_string(),
            kind,
            value,
            writable,
            promotion_backing: None,
        });
        let top = self.top_accessibility(span)?;
        top.variables.insert(name.to_string(), id);
        Ok(id)
    }

    fn top_accessibility(&mut self, span: Span) -> Result<&mut AccessibilityScope, LoweringError> {
        let index = self.scopes.top_accessibility().ok_or_else(|| unbalanced(span))?;
        match &mut self.scopes[index] {
            SemanticScope::Accessibility(scope) => Ok(scope),
            _ => Err(unbalanced(span)),
        }
    }

    // -----------------------------------------------------------------------
    // Op interpreter
    // -----------------------------------------------------------------------

    fn run(&mut self, ops: &'p [Op]) -> Result<(), LoweringError> {
        for op in ops {
            self.step(op)?;
        }
        Ok(())
    }

    fn step(&mut self, op: &'p Op) -> Result<(), LoweringError> {
        let span = op.span;
        match &op.kind {
            OpKind::EnterScope(kind) => {
                self.scopes
                    .push(SemanticScope::Accessibility(AccessibilityScope::new(*kind)));
            }
            OpKind::ExitScope => self.exit_scope(span)?,
            OpKind::BeginReturns {
                method,
                return_kind,
                tuple_names,
            } => self.begin_returns(method, return_kind.clone(), tuple_names.as_deref(), span)?,
            OpKind::FinalizeReturns => {
                let value = self.finalize_returns(span)?;
                self.returned = Some(value);
            }
            OpKind::BindParameters(names) => {
                let args = std::mem::take(&mut self.pending_args);
                if args.len() != names.len() {
                    return Err(LoweringError::TypeMismatch {
                        expected: format!("{} arguments", names.len()),
                        actual: format!("{} arguments", args.len()),
                        span,
                    });
                }
                for (name, value) in names.iter().zip(args) {
                    let kind = value.kind().unwrap_or(ValueKind::Any);
                    self.declare(name, kind, value, true, span)?;
                }
            }
            OpKind::Declare { name, kind, init } => {
                let value = match init {
                    Some(init) => self.eval(init)?,
                    None => match kind {
                        Some(kind) => Value::default_for(kind),
                        None => return Err(LoweringError::UnresolvableExpressionType { span }),
                    },
                };
                let (kind, value) = match kind {
                    Some(kind) => {
                        let coerced = coerce(&value, kind, span)?;
                        (kind.clone(), coerced)
                    }
                    None => match value.kind() {
                        Some(kind) => (kind, value),
                        None => {
                            return Err(LoweringError::TypeMismatch {
                                expected: "a value".into(),
                                actual: "void".into(),
                                span,
                            })
                        }
                    },
                };
                self.declare(name, kind, value, true, span)?;
            }
            OpKind::Eval(expr) => {
                self.eval(expr)?;
            }
            OpKind::If {
                test,
                then,
                otherwise,
            } => self.build_if(test, then, otherwise, span)?,
            OpKind::Switch {
                subject,
                sections,
                cases,
                default,
            } => self.build_switch(subject, sections, cases, *default, span)?,
            OpKind::While { test, body } => self.build_while(test, body, span)?,
            OpKind::DoWhile { body, test } => self.build_do_while(body, test, span)?,
            OpKind::ForEach {
                name,
                kind,
                collection,
                body,
            } => self.build_for_each(name, kind.as_ref(), collection, body, span)?,
            OpKind::Goto(label) => self.goto(label, span)?,
            OpKind::Label(label) => self.declare_label(label, span)?,
            OpKind::Break => self.break_(span)?,
            OpKind::Continue => self.continue_(span)?,
            OpKind::Return(value) => {
                let value = match value {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                self.add_return(value, span)?;
            }
            OpKind::ClearExec => self.flow.clear(),
        }
        Ok(())
    }
}

/// Converts `value` for a slot of `kind` or reports the mismatch.
fn coerce(value: &Value, kind: &ValueKind, span: Span) -> Result<Value, LoweringError> {
    value.coerce_to(kind).ok_or_else(|| LoweringError::TypeMismatch {
        expected: kind.to_string(),
        actual: describe(value),
        span,
    })
}

fn describe(value: &Value) -> String {
    value
        .kind()
        .map(|k| k.to_string())
        .unwrap_or_else(|| "void".to_string())
}

fn unbalanced(span: Span) -> LoweringError {
    LoweringError::Unsupported {
        construct: "unbalanced scope stack".into(),
        span,
    }
}
