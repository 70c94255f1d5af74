//! The rewritten program: source control flow expressed as flow/scope API
//! operations.
//!
//! The rewriter produces this tree statically; the build runtime executes
//! it once. Control statements carry their bodies as nested op lists
//! ([`Thunk`]s) that the runtime invokes when and as often as the
//! corresponding builder needs them, which is the closure-as-body model.
//! Locals are referred to by name and resolved through the scope stack at
//! build time, so every body shares its enclosing variables.

use chipflow_core::{Literal, ValueKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::source::Span;

/// A body invoked by a builder.
pub type Thunk = Vec<Op>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub name: String,
    pub methods: IndexMap<String, Method>,
}

/// How calls to a method are lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dispatch {
    /// Inlined at each call site.
    Inline,
    /// Built once behind an event receiver; calls send the event.
    EventFunction(EventTarget),
    /// Built once; calls reuse the first result.
    SharedProperty,
}

/// Receivers of an event sent by an event function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventTarget {
    #[default]
    Local,
    Others,
    All,
    Authority,
    RoomAuthority,
}

impl EventTarget {
    /// Parses `Others`, `OTHERS`, `room_authority`, `RoomAuthority`, ...
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "local" => Some(EventTarget::Local),
            "others" => Some(EventTarget::Others),
            "all" => Some(EventTarget::All),
            "authority" => Some(EventTarget::Authority),
            "roomauthority" => Some(EventTarget::RoomAuthority),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub return_kind: Option<ValueKind>,
    pub dispatch: Dispatch,
    pub body: Thunk,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ValueKind,
}

/// Accessibility scope flavor pushed by [`OpKind::EnterScope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeKind {
    /// A nested block: lookups continue into the parent.
    General,
    /// A method or lambda body: lookups stop here.
    MethodRoot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Op {
    pub span: Span,
    pub kind: OpKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    EnterScope(ScopeKind),
    ExitScope,
    /// Opens the return accumulator of a function body.
    BeginReturns {
        method: String,
        return_kind: Option<ValueKind>,
        tuple_names: Option<Vec<String>>,
    },
    /// Merges every collected return flow into the live flow.
    FinalizeReturns,
    /// Declares the pending call arguments under these names.
    BindParameters(Vec<String>),
    Declare {
        name: String,
        kind: Option<ValueKind>,
        init: Option<LExpr>,
    },
    Eval(LExpr),
    If {
        test: LExpr,
        then: Thunk,
        otherwise: Thunk,
    },
    Switch {
        subject: LExpr,
        /// Distinct section bodies in source order.
        sections: Vec<Thunk>,
        /// Case keys and the section each one selects.
        cases: Vec<SwitchCase>,
        /// Section selected by `default:`, if any.
        default: Option<usize>,
    },
    While {
        test: LExpr,
        body: Thunk,
    },
    DoWhile {
        body: Thunk,
        test: LExpr,
    },
    ForEach {
        name: String,
        kind: Option<ValueKind>,
        collection: LExpr,
        body: Thunk,
    },
    Goto(String),
    Label(String),
    Break,
    Continue,
    Return(Option<LExpr>),
    /// Terminates the current flow (`throw`).
    ClearExec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub key: LExpr,
    pub section: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LExpr {
    pub span: Span,
    pub kind: LExprKind,
}

/// Builder-side intrinsics the rewriter targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intrinsic {
    /// Concatenates text and holes into one string.
    StringInterpolation,
    /// Builds a closure into a sub-context anchored at an existing board.
    ExistingCircuitBoard,
    /// Clears the current flow.
    ClearExec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LExprKind {
    Literal(Literal),
    Local(String),
    Assign {
        name: String,
        value: Box<LExpr>,
    },
    Chip {
        name: String,
        type_args: Vec<ValueKind>,
        args: Vec<LExpr>,
    },
    Invoke {
        method: String,
        args: Vec<LExpr>,
    },
    Intrinsic {
        intrinsic: Intrinsic,
        args: Vec<LExpr>,
    },
    Tuple(Vec<LExpr>),
    Element {
        target: Box<LExpr>,
        index: usize,
    },
    Closure(Thunk),
    Default(ValueKind),
}

impl Op {
    pub fn new(kind: OpKind, span: Span) -> Self {
        Op { span, kind }
    }
}

impl LExpr {
    pub fn new(kind: LExprKind, span: Span) -> Self {
        LExpr { span, kind }
    }

    pub fn literal(literal: Literal, span: Span) -> Self {
        LExpr::new(LExprKind::Literal(literal), span)
    }

    pub fn chip(name: &str, args: Vec<LExpr>, span: Span) -> Self {
        LExpr::new(
            LExprKind::Chip {
                name: name.to_string(),
                type_args: Vec::new(),
                args,
            },
            span,
        )
    }
}
