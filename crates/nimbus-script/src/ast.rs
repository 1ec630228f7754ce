//! AST of a compiled function module.
//!
//! A [`Program`] is the "compiled text" of one function: immutable once
//! produced, shared behind `Arc` by every execution of that function.

use std::sync::Arc;

use crate::token::Span;

/// One compiled source file.
#[derive(Debug, Clone)]
pub struct Program {
    /// Logical name the program was compiled under.
    pub name: String,
    /// Top-level statements, in source order.
    pub body: Vec<Stmt>,
}

impl Program {
    /// Names exported by this program, in declaration order.
    pub fn export_names(&self) -> Vec<&str> {
        self.body
            .iter()
            .filter_map(|stmt| match &stmt.kind {
                StmtKind::Export(Export::Default(_)) => Some("default"),
                StmtKind::Export(Export::Binding { name, .. }) => Some(name.as_str()),
                StmtKind::Export(Export::Function(def)) => def.name.as_deref(),
                _ => None,
            })
            .collect()
    }
}

/// A function literal or declaration.
#[derive(Debug, Clone)]
pub struct FnDef {
    /// Declared name, if any.
    pub name: Option<String>,
    /// Parameter names.
    pub params: Vec<String>,
    /// Function body.
    pub body: Vec<Stmt>,
    /// Position of the `fn` keyword.
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `let x = e;` / `const x = e;`
    Let { name: String, value: Option<Expr> },
    /// `target = e;` (compound operators are desugared into `value`)
    Assign { target: Expr, value: Expr },
    /// Bare expression.
    Expr(Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Option<Vec<Stmt>>,
    },
    While { cond: Expr, body: Vec<Stmt> },
    /// `for (let x of items) { ... }`
    ForOf {
        binding: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
    Break,
    Continue,
    Throw(Expr),
    Try {
        body: Vec<Stmt>,
        binding: Option<String>,
        handler: Vec<Stmt>,
    },
    /// `fn name(...) { ... }`, hoisted within its block.
    Function(Arc<FnDef>),
    /// Only valid at the top level of a program.
    Export(Export),
    /// `{ ... }`
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone)]
pub enum Export {
    /// `export default e;`
    Default(Expr),
    /// `export let name = e;`
    Binding { name: String, value: Expr },
    /// `export fn name(...) { ... }`
    Function(Arc<FnDef>),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Whether this expression can appear on the left of `=`.
    pub fn is_place(&self) -> bool {
        match &self.kind {
            ExprKind::Ident(_) => true,
            ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => object.is_place(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<Expr>),
    Object(Vec<(String, Expr)>),
    Ident(String),
    Function(Arc<FnDef>),
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Typeof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

/// Short-circuiting operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}
