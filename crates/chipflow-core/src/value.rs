//! Values flowing through the builder and the port types they carry.
//!
//! A [`Value`] is what a local variable holds while a program is being
//! lowered: either a compile-time literal or a reference to a data output
//! port in the graph. Scalar kinds may be either; list and object kinds are
//! always port-backed (or absent, meaning the default/null value).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::port::Port;

// ---------------------------------------------------------------------------
// Port types
// ---------------------------------------------------------------------------

/// Logical type of a data port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    String,
    List(Box<ValueKind>),
    /// A catalog object kind such as `Player` or `Vector3`.
    Object(String),
    /// Accepts and produces any kind.
    Any,
    Tuple(Vec<ValueKind>),
    /// Placeholder for the n-th generic argument of a chip signature.
    Generic(u32),
}

impl ValueKind {
    /// Substitutes generic placeholders with concrete type arguments.
    /// Placeholders without a matching argument become [`ValueKind::Any`].
    pub fn resolve(&self, type_args: &[ValueKind]) -> ValueKind {
        match self {
            ValueKind::Generic(i) => type_args
                .get(*i as usize)
                .cloned()
                .unwrap_or(ValueKind::Any),
            ValueKind::List(element) => ValueKind::List(Box::new(element.resolve(type_args))),
            ValueKind::Tuple(elements) => {
                ValueKind::Tuple(elements.iter().map(|e| e.resolve(type_args)).collect())
            }
            other => other.clone(),
        }
    }

    /// Whether a port of kind `other` may feed a slot of this kind.
    pub fn accepts(&self, other: &ValueKind) -> bool {
        match (self, other) {
            (ValueKind::Any, _) | (_, ValueKind::Any) => true,
            (ValueKind::Generic(_), _) | (_, ValueKind::Generic(_)) => true,
            (ValueKind::List(a), ValueKind::List(b)) => a.accepts(b),
            (ValueKind::Tuple(a), ValueKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.accepts(y))
            }
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Int => write!(f, "int"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::String => write!(f, "string"),
            ValueKind::List(element) => write!(f, "List<{}>", element),
            ValueKind::Object(name) => write!(f, "{}", name),
            ValueKind::Any => write!(f, "any"),
            ValueKind::Tuple(elements) => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            ValueKind::Generic(i) => write!(f, "T{}", i),
        }
    }
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

/// A compile-time constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Literal {
    pub fn kind(&self) -> ValueKind {
        match self {
            Literal::Bool(_) => ValueKind::Bool,
            Literal::Int(_) => ValueKind::Int,
            Literal::Float(_) => ValueKind::Float,
            Literal::String(_) => ValueKind::String,
        }
    }
}

/// Renders the literal the way the downstream runtime stringifies it.
/// Used for switch case labels and folded string interpolation.
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(true) => write!(f, "True"),
            Literal::Bool(false) => write!(f, "False"),
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::String(s) => write!(f, "{}", s),
        }
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A scalar that is either known at build time or produced by a port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand<T> {
    Literal(T),
    Port(Port),
}

impl<T> Operand<T> {
    pub fn port(&self) -> Option<Port> {
        match self {
            Operand::Literal(_) => None,
            Operand::Port(p) => Some(*p),
        }
    }
}

/// A value held by a local during lowering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(Operand<bool>),
    Int(Operand<i64>),
    Float(Operand<f64>),
    String(Operand<String>),
    List {
        element: ValueKind,
        port: Option<Port>,
    },
    Object {
        kind: String,
        port: Option<Port>,
    },
    Any(Option<Port>),
    Tuple(Vec<Value>),
    /// Result of a call to a void method or chip without outputs.
    Unit,
}

impl Value {
    pub fn from_literal(literal: Literal) -> Value {
        match literal {
            Literal::Bool(v) => Value::Bool(Operand::Literal(v)),
            Literal::Int(v) => Value::Int(Operand::Literal(v)),
            Literal::Float(v) => Value::Float(Operand::Literal(v)),
            Literal::String(v) => Value::String(Operand::Literal(v)),
        }
    }

    /// Wraps an output port as a value of the given kind.
    ///
    /// Tuple and generic kinds cannot be carried by a single port and are
    /// treated as [`Value::Any`].
    pub fn from_port(kind: &ValueKind, port: Port) -> Value {
        match kind {
            ValueKind::Bool => Value::Bool(Operand::Port(port)),
            ValueKind::Int => Value::Int(Operand::Port(port)),
            ValueKind::Float => Value::Float(Operand::Port(port)),
            ValueKind::String => Value::String(Operand::Port(port)),
            ValueKind::List(element) => Value::List {
                element: (**element).clone(),
                port: Some(port),
            },
            ValueKind::Object(name) => Value::Object {
                kind: name.clone(),
                port: Some(port),
            },
            ValueKind::Any | ValueKind::Tuple(_) | ValueKind::Generic(_) => {
                Value::Any(Some(port))
            }
        }
    }

    /// The value a declaration of `kind` holds before any assignment.
    pub fn default_for(kind: &ValueKind) -> Value {
        match kind {
            ValueKind::Bool => Value::Bool(Operand::Literal(false)),
            ValueKind::Int => Value::Int(Operand::Literal(0)),
            ValueKind::Float => Value::Float(Operand::Literal(0.0)),
            ValueKind::String => Value::String(Operand::Literal(String::new())),
            ValueKind::List(element) => Value::List {
                element: (**element).clone(),
                port: None,
            },
            ValueKind::Object(name) => Value::Object {
                kind: name.clone(),
                port: None,
            },
            ValueKind::Tuple(elements) => {
                Value::Tuple(elements.iter().map(Value::default_for).collect())
            }
            ValueKind::Any | ValueKind::Generic(_) => Value::Any(None),
        }
    }

    /// Logical kind, or `None` for [`Value::Unit`].
    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::List { element, .. } => ValueKind::List(Box::new(element.clone())),
            Value::Object { kind, .. } => ValueKind::Object(kind.clone()),
            Value::Any(_) => ValueKind::Any,
            Value::Tuple(values) => {
                let mut kinds = Vec::with_capacity(values.len());
                for v in values {
                    kinds.push(v.kind()?);
                }
                ValueKind::Tuple(kinds)
            }
            Value::Unit => return None,
        })
    }

    pub fn port(&self) -> Option<Port> {
        match self {
            Value::Bool(o) => o.port(),
            Value::Int(o) => o.port(),
            Value::Float(o) => o.port(),
            Value::String(o) => o.port(),
            Value::List { port, .. } | Value::Object { port, .. } | Value::Any(port) => *port,
            Value::Tuple(_) | Value::Unit => None,
        }
    }

    pub fn literal(&self) -> Option<Literal> {
        match self {
            Value::Bool(Operand::Literal(v)) => Some(Literal::Bool(*v)),
            Value::Int(Operand::Literal(v)) => Some(Literal::Int(*v)),
            Value::Float(Operand::Literal(v)) => Some(Literal::Float(*v)),
            Value::String(Operand::Literal(v)) => Some(Literal::String(v.clone())),
            _ => None,
        }
    }

    /// Whether this value can be held in a single graph variable.
    pub fn is_storable(&self) -> bool {
        !matches!(self, Value::Tuple(_) | Value::Unit)
    }

    /// Two values are equivalent when they are the same literal or are
    /// produced by equivalent ports.
    pub fn equivalent_to(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equivalent_to(y))
            }
            (Value::Unit, Value::Unit) => true,
            _ => match (self.port(), other.port()) {
                (Some(a), Some(b)) => a.equivalent_to(&b),
                (None, None) => match (self.literal(), other.literal()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
                _ => false,
            },
        }
    }

    /// Converts the value for use where `target` is expected.
    ///
    /// Integer literals widen to float; values of kind `any` are retagged
    /// with the target kind. Returns `None` when the value is not assignable.
    pub fn coerce_to(&self, target: &ValueKind) -> Option<Value> {
        match (self, target) {
            (_, ValueKind::Any | ValueKind::Generic(_)) => Some(self.clone()),
            (Value::Any(Some(port)), _) => Some(Value::from_port(target, *port)),
            (Value::Any(None), _) => Some(Value::default_for(target)),
            (Value::Int(Operand::Literal(v)), ValueKind::Float) => {
                Some(Value::Float(Operand::Literal(*v as f64)))
            }
            (Value::List { element, port }, ValueKind::List(target_element)) => {
                if target_element.accepts(element) {
                    Some(Value::List {
                        element: (**target_element).clone(),
                        port: *port,
                    })
                } else {
                    None
                }
            }
            (Value::Tuple(values), ValueKind::Tuple(kinds)) => {
                if values.len() != kinds.len() {
                    return None;
                }
                values
                    .iter()
                    .zip(kinds)
                    .map(|(v, k)| v.coerce_to(k))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Tuple)
            }
            _ => match self.kind() {
                Some(kind) if &kind == target => Some(self.clone()),
                _ => None,
            },
        }
    }
}
