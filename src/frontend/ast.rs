//! Abstract Syntax Tree definitions for Lona
//!
//! Nodes live in a single arena (`Ast`) and refer to each other through
//! `NodeId` handles. Nothing is freed individually; the arena is dropped as a
//! whole once compilation of the unit is finished.

use std::fmt;

use serde::Serialize;

use crate::utils::Span;

/// Handle to a node in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// The node arena for one compilation unit
#[derive(Debug, Clone, Default, Serialize)]
pub struct Ast {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node and return its handle
    pub fn add(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// The `Program` node, once parsing has finished
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Statements of a `StatList` node
    pub fn stmts(&self, id: NodeId) -> &[NodeId] {
        match self.kind(id) {
            NodeKind::StatList { stmts } => stmts,
            other => panic!("expected a statement list, found {}", other.tag()),
        }
    }
}

/// A single node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

/// Node kinds. The set is closed; every visitor matches it exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node")]
pub enum NodeKind {
    /// Compilation unit; `body` is a `StatList`
    Program { body: NodeId },
    StatList { stmts: Vec<NodeId> },
    Const { value: Constant },
    Ident { name: String },
    Assign { left: NodeId, right: NodeId },
    BinOp { op: BinaryOp, left: NodeId, right: NodeId },
    UnaryOp { op: UnaryOp, operand: NodeId },
    /// `methods` are `FuncDecl` nodes
    StructDecl { name: String, fields: Vec<FieldDecl>, methods: Vec<NodeId> },
    VarDecl { name: String, ty: Option<TypeExpr>, init: Option<NodeId> },
    /// `body` is a `StatList`
    FuncDecl { name: String, params: Vec<Param>, ret: Option<TypeExpr>, body: NodeId },
    Return { value: Option<NodeId> },
    If { cond: NodeId, then_body: NodeId, else_body: Option<NodeId> },
    /// `for` and `while` both lower to a guarded loop
    Loop { cond: NodeId, body: NodeId },
    /// Call; when `callee` is a `Selector` naming a struct method this is a
    /// method call on the selector's parent
    FieldCall { callee: NodeId, args: Vec<NodeId> },
    Selector { parent: NodeId, field: String },
}

impl NodeKind {
    /// Short tag used in CFG dumps and logs
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Program { .. } => "Program",
            NodeKind::StatList { .. } => "StatList",
            NodeKind::Const { .. } => "Const",
            NodeKind::Ident { .. } => "Ident",
            NodeKind::Assign { .. } => "Assign",
            NodeKind::BinOp { .. } => "BinOp",
            NodeKind::UnaryOp { .. } => "UnaryOp",
            NodeKind::StructDecl { .. } => "StructDecl",
            NodeKind::VarDecl { .. } => "VarDecl",
            NodeKind::FuncDecl { .. } => "FuncDecl",
            NodeKind::Return { .. } => "Return",
            NodeKind::If { .. } => "If",
            NodeKind::Loop { .. } => "Loop",
            NodeKind::FieldCall { .. } => "FieldCall",
            NodeKind::Selector { .. } => "Selector",
        }
    }
}

/// Literal constant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Constant {
    Int32(i32),
    Float32(f32),
    Str(String),
    Bool(bool),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `~x`
    BitNot,
    /// `&x`
    AddrOf,
    /// `*x`
    Deref,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::AddrOf => "&",
            UnaryOp::Deref => "*",
        };
        write!(f, "{}", s)
    }
}

/// A parsed type annotation: base name plus indirection suffixes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeExpr {
    pub name: String,
    pub suffixes: Vec<TypeSuffix>,
    pub span: Span,
}

impl TypeExpr {
    pub fn named(name: &str, span: Span) -> Self {
        Self { name: name.to_string(), suffixes: Vec::new(), span }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for suffix in &self.suffixes {
            match suffix {
                TypeSuffix::Pointer => write!(f, "*")?,
                TypeSuffix::Array(None) => write!(f, "[]")?,
                TypeSuffix::Array(Some(n)) => write!(f, "[{}]", n)?,
            }
        }
        Ok(())
    }
}

/// One level of indirection in a type annotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeSuffix {
    /// `*`
    Pointer,
    /// `[]` or `[N]`
    Array(Option<u32>),
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Struct field declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}
