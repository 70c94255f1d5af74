//! Typed syntax tree consumed by the rewriter.
//!
//! The tree is produced by an external front end (parser plus semantic
//! model) and arrives as JSON. Every statement and expression carries a
//! [`SyntaxId`] so the [`SymbolOracle`](crate::oracle::SymbolOracle) can
//! answer type questions about it, and a [`Span`] for diagnostics.

use std::fmt;

use chipflow_core::Literal;
use serde::{Deserialize, Serialize};

/// Identity of a syntax node, assigned by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SyntaxId(pub u32);

/// Source location (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Span { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredefinedType {
    Void,
    Bool,
    Int,
    Float,
    String,
}

/// A type as written in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeRef {
    Predefined(PredefinedType),
    Named(String),
    Generic { name: String, args: Vec<TypeRef> },
    Tuple(Vec<TupleElement>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleElement {
    #[serde(default)]
    pub name: Option<String>,
    pub ty: TypeRef,
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// One circuit: a class whose `CircuitGraph` method is the entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTree {
    pub name: String,
    pub methods: Vec<MethodDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    #[serde(default)]
    pub id: SyntaxId,
    #[serde(default)]
    pub span: Span,
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub params: Vec<ParamDecl>,
    pub return_type: TypeRef,
    /// Element names the front end recorded for a tuple return type. When
    /// absent they are taken from the return type itself.
    #[serde(default)]
    pub tuple_names: Option<Vec<String>>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    #[serde(default)]
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(default)]
    pub id: SyntaxId,
    #[serde(default)]
    pub span: Span,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    Block(Block),
    Expr(Expr),
    Local {
        name: String,
        #[serde(default)]
        ty: Option<TypeRef>,
        #[serde(default)]
        init: Option<Expr>,
    },
    If {
        cond: Expr,
        then: Box<Stmt>,
        #[serde(default)]
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    ForEach {
        name: String,
        #[serde(default)]
        ty: Option<TypeRef>,
        collection: Expr,
        body: Box<Stmt>,
    },
    Switch {
        subject: Expr,
        sections: Vec<SwitchSection>,
    },
    Goto(GotoTarget),
    Labeled {
        label: String,
        stmt: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Throw(Option<Expr>),
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchSection {
    pub labels: Vec<SwitchLabel>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SwitchLabel {
    Case(Expr),
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GotoTarget {
    Label(String),
    Case(Expr),
    Default,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default)]
    pub id: SyntaxId,
    #[serde(default)]
    pub span: Span,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    Equal,
    NotEqual,
    LogicalAnd,
    LogicalOr,
    ShiftLeft,
    ShiftRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Literal(Literal),
    Name(String),
    Member {
        target: Box<Expr>,
        name: String,
    },
    Call {
        #[serde(default)]
        target: Option<Box<Expr>>,
        method: String,
        #[serde(default)]
        type_args: Vec<TypeRef>,
        #[serde(default)]
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `x = v` or compound `x op= v`.
    Assign {
        target: String,
        #[serde(default)]
        op: Option<BinaryOp>,
        value: Box<Expr>,
    },
    /// `++x` / `--x` and their postfix forms.
    Increment {
        target: String,
        #[serde(default)]
        decrement: bool,
    },
    Conditional {
        cond: Box<Expr>,
        when_true: Box<Expr>,
        when_false: Box<Expr>,
    },
    Interpolated(Vec<InterpolationPart>),
    Tuple(Vec<Expr>),
    Lambda(Block),
    Default(TypeRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InterpolationPart {
    Text(String),
    Hole {
        expr: Expr,
        #[serde(default)]
        alignment: Option<Expr>,
        #[serde(default)]
        format: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Construction helpers for tests and front ends that build trees in code
// ---------------------------------------------------------------------------

impl Expr {
    pub fn new(kind: ExprKind) -> Self {
        Expr {
            id: SyntaxId::default(),
            span: Span::default(),
            kind,
        }
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = SyntaxId(id);
        self
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.span = Span::new(line, column);
        self
    }
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            id: SyntaxId::default(),
            span: Span::default(),
            kind,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.span = Span::new(line, column);
        self
    }
}

impl Block {
    pub fn of(stmts: Vec<Stmt>) -> Self {
        Block {
            span: Span::default(),
            stmts,
        }
    }
}
