//! Abstract syntax tree for the supported C89 subset.
//!
//! Every node carries the [`SourceLocation`] of its leading token so later
//! stages (semantic analysis, IR generation, diagnostics) can always point
//! back at source without re-deriving it.

use crate::diagnostics::SourceLocation;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    pub declarations: Vec<ExternalDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalDecl {
    Function(FunctionDef),
    /// A function prototype or variable declaration at file scope, with no
    /// body — includes `extern` declarations of library functions.
    Declaration(Declaration),
    StructDef(StructDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<Param>,
    pub is_variadic: bool,
    pub is_extern: bool,
    pub body: Option<Block>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub ty: Type,
    pub init: Option<Expr>,
    pub location: SourceLocation,
}

/// A `<type> name [= init], name2 [= init2], ...;` declaration. Function
/// prototypes reuse this shape with an empty `declarators` list and the
/// function's own [`FunctionDef`] carrying the type information instead.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub base_type: Type,
    pub is_extern: bool,
    pub is_static: bool,
    pub declarators: Vec<Declarator>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<Param>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expr {
        expr: Expr,
        location: SourceLocation,
    },
    Declaration(Declaration),
    Block(Block),
    If {
        condition: Expr,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
        location: SourceLocation,
    },
    While {
        condition: Expr,
        body: Box<Statement>,
        location: SourceLocation,
    },
    For {
        init: Option<Box<Statement>>,
        condition: Option<Expr>,
        step: Option<Expr>,
        body: Box<Statement>,
        location: SourceLocation,
    },
    Return {
        value: Option<Expr>,
        location: SourceLocation,
    },
    Break {
        location: SourceLocation,
    },
    Continue {
        location: SourceLocation,
    },
    /// `;` by itself.
    Empty {
        location: SourceLocation,
    },
}

impl Statement {
    pub fn location(&self) -> &SourceLocation {
        match self {
            Statement::Expr { location, .. }
            | Statement::If { location, .. }
            | Statement::While { location, .. }
            | Statement::For { location, .. }
            | Statement::Return { location, .. }
            | Statement::Break { location }
            | Statement::Continue { location }
            | Statement::Empty { location } => location,
            Statement::Declaration(d) => &d.location,
            Statement::Block(b) => &b.location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogAnd,
    LogOr,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
    Deref,
    AddrOf,
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    ShlAssign,
    ShrAssign,
}

/// An expression node. `resolved_type` is `None` until semantic analysis
/// fills it in; IR generation and every stage downstream may assume it is
/// present.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: SourceLocation,
    pub resolved_type: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, location: SourceLocation) -> Self {
        Expr {
            kind,
            location,
            resolved_type: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    CharLiteral(i64),
    StringLiteral(String),
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        field: String,
        /// `true` for `->`, `false` for `.`.
        arrow: bool,
    },
    Cast {
        target_type: Type,
        operand: Box<Expr>,
    },
    Sizeof(SizeofOperand),
    /// A parenthesized comma expression `(a, b, c)`; evaluates all of its
    /// elements in order and yields the last.
    Comma(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SizeofOperand {
    Type(Type),
    Expr(Box<Expr>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn loc() -> SourceLocation {
        SourceLocation::new(PathBuf::from("t.c"), 1, 1)
    }

    #[test]
    fn statement_location_covers_every_variant() {
        let stmts = vec![
            Statement::Break { location: loc() },
            Statement::Continue { location: loc() },
            Statement::Empty { location: loc() },
            Statement::Return {
                value: None,
                location: loc(),
            },
        ];
        for s in stmts {
            assert_eq!(s.location(), &loc());
        }
    }

    #[test]
    fn expr_starts_with_no_resolved_type() {
        let e = Expr::new(ExprKind::IntLiteral(42), loc());
        assert!(e.resolved_type.is_none());
    }
}
