//! Calls into user methods and circuit boards.
//!
//! Plain methods are inlined at every call site. Event functions are built
//! once behind an `EventReceiver` and invoked through `EventSender`; shared
//! properties are built once and their value reused.

use chipflow_core::{Context, Operand, Port, Value};
use serde_json::json;

use super::{coerce, describe, BuildState, EventHandler};
use crate::error::LoweringError;
use crate::program::{Dispatch, EventTarget, LExpr, LExprKind, Method};
use crate::source::Span;

impl<'p> BuildState<'p> {
    pub(super) fn invoke(&mut self, name: &str, args: &'p [LExpr], span: Span) -> Result<Value, LoweringError> {
        let program = self.program;
        let method = program
            .methods
            .get(name)
            .ok_or_else(|| LoweringError::UnknownMethod {
                name: name.to_string(),
                span,
            })?;
        if args.len() != method.params.len() {
            return Err(LoweringError::TypeMismatch {
                expected: format!("{} arguments to '{}'", method.params.len(), name),
                actual: format!("{} arguments", args.len()),
                span,
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for (arg, param) in args.iter().zip(&method.params) {
            let value = self.eval(arg)?;
            values.push(coerce(&value, &param.kind, arg.span)?);
        }

        match method.dispatch {
            Dispatch::Inline => self.run_method(method, values, span),
            Dispatch::EventFunction(target) => self.send_event(method, target, values, span),
            Dispatch::SharedProperty => self.shared_property(method, values, span),
        }
    }

    /// Runs a method body on the live flow and returns its value.
    pub(super) fn run_method(&mut self, method: &'p Method, args: Vec<Value>, span: Span) -> Result<Value, LoweringError> {
        if self.call_depth >= self.options.max_inline_depth {
            return Err(LoweringError::InlineDepthExceeded {
                method: method.name.clone(),
                limit: self.options.max_inline_depth,
                span,
            });
        }
        tracing::trace!(method = %method.name, depth = self.call_depth, "inlining method");
        self.call_depth += 1;
        self.pending_args = args;
        let result = self.run(&method.body);
        self.call_depth -= 1;
        result?;
        Ok(self.returned.take().unwrap_or(Value::Unit))
    }

    fn send_event(
        &mut self,
        method: &'p Method,
        target: EventTarget,
        args: Vec<Value>,
        span: Span,
    ) -> Result<Value, LoweringError> {
        let handler = match self.events.get(&method.name) {
            Some(handler) => handler.clone(),
            None => self.define_event(method, span)?,
        };

        let signature = self.signature("EventSender", span)?;
        let sender = self.spawn("EventSender", &signature, &[], args, span)?;
        self.set_metadata(sender, "event", json!(handler.event));
        self.set_metadata(sender, "target", json!(target));

        Ok(match handler.result {
            Some((node, kind)) => Value::from_port(&kind, Port::data(node, 0)),
            None => Value::Unit,
        })
    }

    /// Emits the definition and receiver of an event function and builds
    /// its body on a flow of its own.
    fn define_event(&mut self, method: &'p Method, span: Span) -> Result<EventHandler, LoweringError> {
        let event = method.name.clone();
        let kinds: Vec<String> = method.params.iter().map(|p| p.kind.to_string()).collect();

        let definition_sig = self.signature("EventDefinition", span)?;
        let definition = self.new_node("EventDefinition", &definition_sig, &[]);
        self.set_metadata(definition, "event", json!(event));
        self.set_metadata(definition, "parameters", json!(kinds));

        let receiver_sig = self.signature("EventReceiver", span)?;
        let receiver = self.new_node("EventReceiver", &receiver_sig, &[]);
        self.set_metadata(receiver, "event", json!(event));
        if let Some(node) = self.context_mut().node_mut(receiver) {
            node.outputs = method.params.iter().map(|p| p.kind.clone()).collect();
        }

        let result = match &method.return_kind {
            Some(kind) => {
                let variable_sig = self.signature("Variable", span)?;
                let node = self.new_node("Variable", &variable_sig, std::slice::from_ref(kind));
                self.set_metadata(node, "name", json!(format!("{}.result", event)));
                self.set_metadata(node, "kind", json!(kind.to_string()));
                Some((node, kind.clone()))
            }
            None => None,
        };

        // Registered before the body is built so the handler may call itself.
        let handler = EventHandler { event, result };
        self.events.insert(method.name.clone(), handler.clone());

        let args: Vec<Value> = method
            .params
            .iter()
            .enumerate()
            .map(|(i, p)| Value::from_port(&p.kind, Port::data(receiver, i as u32)))
            .collect();
        let detached = self.seeded_flow(Port::exec(receiver, 0));
        let outer = self.swap_flow(detached);
        self.repeating += 1;
        let built = self.run_method(method, args, span).and_then(|value| {
            match &handler.result {
                Some((node, kind)) => self.write_variable(*node, kind, value, span),
                None => Ok(()),
            }
        });
        self.repeating -= 1;
        self.swap_flow(outer);
        built?;
        Ok(handler)
    }

    fn shared_property(&mut self, method: &'p Method, args: Vec<Value>, span: Span) -> Result<Value, LoweringError> {
        if let Some(value) = self.shared.get(&method.name) {
            return Ok(value.clone());
        }
        let value = self.run_method(method, args, span)?;
        self.shared.insert(method.name.clone(), value.clone());
        Ok(value)
    }

    /// `ExistingCircuitBoard(name, () => { ... })`: builds the lambda into a
    /// sub-context anchored at `name`.
    pub(super) fn existing_circuit_board(&mut self, args: &'p [LExpr], span: Span) -> Result<Value, LoweringError> {
        let (name, body) = match args {
            [name, LExpr {
                kind: LExprKind::Closure(body),
                ..
            }] => (name, body),
            _ => {
                return Err(LoweringError::Unsupported {
                    construct: "ExistingCircuitBoard expects a name and a lambda".into(),
                    span,
                })
            }
        };
        let anchor = match self.eval(name)? {
            Value::String(Operand::Literal(anchor)) => anchor,
            other => {
                return Err(LoweringError::TypeMismatch {
                    expected: "a string literal board name".into(),
                    actual: describe(&other),
                    span: name.span,
                })
            }
        };

        tracing::debug!(anchor = %anchor, "building sub-context");
        self.nested.push(Context::anchored(anchor));
        let detached = self.new_flow();
        let outer = self.swap_flow(detached);
        self.pending_args = Vec::new();
        let built = self.run(body);
        self.returned = None;
        self.swap_flow(outer);
        let context = self.nested.pop();
        built?;
        if let Some(context) = context {
            self.context_mut().add_sub_context(context);
        }
        Ok(Value::Unit)
    }
}
