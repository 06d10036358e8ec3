use super::{AssignOpKind, BinOpKind, Node, NodeListClause, Seq, Stmt, TypeExpr, UnOpKind};
use crate::span::Span;
use crate::tokens::NumberBase;

#[derive(Clone, Debug, PartialEq)]
pub enum LiteralExpr {
    Integer { value: String, base: NumberBase, type_name: String },
    Float { value: String, type_name: String },
    Character(char),
    String(String),
    Bool(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchArm {
    pub pattern: MatchPattern,
    pub body: Node<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchPattern {
    /// `Enum::Variant(binding)` — binding is `None` for a payload-less match arm.
    EnumVariant { enum_name: Option<String>, variant: String, binding: Option<String> },
    Literal(LiteralExpr),
    Wildcard,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(LiteralExpr, Span),
    Identifier(String, Span),

    Binary { op: BinOpKind, left: Node<Expr>, right: Node<Expr>, span: Span },
    Unary { op: UnOpKind, operand: Node<Expr>, span: Span },
    Assign { op: AssignOpKind, target: Node<Expr>, value: Node<Expr>, span: Span },

    Index { base: Node<Expr>, index: Node<Expr>, span: Span },
    Field { base: Node<Expr>, field: String, span: Span },

    Call { callee: String, arguments: NodeListClause<Expr>, span: Span },

    ArrayLiteral { elements: NodeListClause<Expr>, span: Span },
    Range { start: Node<Expr>, end: Node<Expr>, span: Span },

    As { operand: Node<Expr>, target_type: TypeExpr, span: Span },
    EnumConstruct { enum_name: String, variant: String, payload: Node<Expr>, span: Span },

    Block { statements: Seq<Stmt>, trailing: Option<Node<Expr>>, span: Span },
    If { condition: Node<Expr>, then_branch: Node<Expr>, else_branch: Option<Node<Expr>>, span: Span },
    While {
        label: Option<String>,
        condition: Node<Expr>,
        body: Node<Expr>,
        finally: Option<Node<Expr>>,
        else_branch: Option<Node<Expr>>,
        span: Span,
    },
    ForLegacy {
        label: Option<String>,
        init: Option<Node<Stmt>>,
        test: Node<Expr>,
        step: Option<Node<Expr>>,
        body: Node<Expr>,
        span: Span,
    },
    ForRanged { label: Option<String>, binding: String, iterable: Node<Expr>, body: Node<Expr>, span: Span },
    Match { scrutinee: Node<Expr>, arms: Seq<MatchArm>, span: Span },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Literal(_, span)
            | Expr::Identifier(_, span)
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Assign { span, .. }
            | Expr::Index { span, .. }
            | Expr::Field { span, .. }
            | Expr::Call { span, .. }
            | Expr::ArrayLiteral { span, .. }
            | Expr::Range { span, .. }
            | Expr::As { span, .. }
            | Expr::EnumConstruct { span, .. }
            | Expr::Block { span, .. }
            | Expr::If { span, .. }
            | Expr::While { span, .. }
            | Expr::ForLegacy { span, .. }
            | Expr::ForRanged { span, .. }
            | Expr::Match { span, .. } => span,
        }
    }
}
