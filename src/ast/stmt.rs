use super::{Decl, Expr, Node};
use crate::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Expression(Node<Expr>, Span),
    Declaration(Node<Decl>, Span),
    Return(Option<Node<Expr>>, Span),
    Break(Option<String>, Span),
    Continue(Option<String>, Span),
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Expression(_, span)
            | Stmt::Declaration(_, span)
            | Stmt::Return(_, span)
            | Stmt::Break(_, span)
            | Stmt::Continue(_, span) => span,
        }
    }
}
