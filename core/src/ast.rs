//! The AST produced by [crate::parser::Parser].
//!
//! Nodes are plain tagged enums rather than a virtual class hierarchy, and
//! every expression carries its own cached `ty` slot, filled in by
//! [crate::typer] and then read back by [crate::compiler] — the same shape
//! as the predecessor's `AST::getTag()`/`setTag()`, just without a second
//! virtual dispatch to get there.

use crate::types::TypeId;
use crate::util::Position;

/// A type as written in source, before it's been resolved against the
/// [crate::types::TypeRegistry].
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Name(String),
    Ptr(Box<TypeExpr>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Deref,
    AddrOf,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Position,
    /// Filled in by the typer; empty (`None`) right after parsing.
    pub ty: Option<TypeId>,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Position) -> Self {
        Self { kind, pos, ty: None }
    }

    pub fn ty(&self) -> TypeId {
        self.ty.expect("expression was not typed before codegen")
    }
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Int(i32),
    Bool(bool),
    Char(u8),
    /// Interned string id (see [crate::symbols::SymbolTable::intern_string]).
    Str(usize),
    /// An array literal: the initializer values, and the declared length
    /// (which may be larger, with the remainder zero-filled).
    Array(Vec<Expr>, u32),
    Ident(String),
    Paren(Box<Expr>),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Cast(TypeExpr, Box<Expr>),
}

#[derive(Clone, Debug)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Expr(Expr),
    Assign(Expr, Expr),
    VarDecl(String, TypeExpr, Option<Expr>),
    Block(Vec<Stmt>),
    If(Expr, Box<Stmt>, Option<Box<Stmt>>),
    While(Expr, Box<Stmt>),
    Return(Option<Expr>),
    /// Raw source text of an `asm { ... }` block, assembled directly by
    /// [crate::codegen::Codegen::assemble_inline].
    Asm(String),
}

#[derive(Clone, Debug)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<(String, TypeExpr)>,
    pub return_type: TypeExpr,
    pub body: Vec<Stmt>,
    pub pos: Position,
}

#[derive(Clone, Debug)]
pub enum Item {
    StructDecl(String),
    StructDef(String, Vec<(String, TypeExpr)>),
    Func(FuncDecl),
    GlobalVar(String, TypeExpr, Option<Expr>),
}

#[derive(Clone, Debug)]
pub struct ItemNode {
    pub kind: Item,
    pub pos: Position,
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub items: Vec<ItemNode>,
}
