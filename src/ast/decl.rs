use super::{Expr, Node, Seq, TypeExpr};
use crate::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_annotation: TypeExpr,
    pub default_value: Option<Node<Expr>>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructField {
    pub name: String,
    pub type_annotation: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumVariant {
    pub name: String,
    pub payload_type: TypeExpr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    /// `name: Type (= expr)?` or `name (mut)? := expr`.
    Variable {
        name: String,
        type_annotation: Option<TypeExpr>,
        mutable: bool,
        value: Option<Node<Expr>>,
        span: Span,
    },
    Function {
        name: String,
        generics: Seq<String>,
        parameters: Seq<Param>,
        return_type: Option<TypeExpr>,
        body: Node<Expr>,
        span: Span,
    },
    External {
        name: String,
        parameter_types: Seq<TypeExpr>,
        return_type: TypeExpr,
        span: Span,
    },
    Struct { name: String, fields: Seq<StructField>, span: Span },
    Enum { name: String, variants: Seq<EnumVariant>, span: Span },
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Variable { name, .. }
            | Decl::Function { name, .. }
            | Decl::External { name, .. }
            | Decl::Struct { name, .. }
            | Decl::Enum { name, .. } => name,
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            Decl::Variable { span, .. }
            | Decl::Function { span, .. }
            | Decl::External { span, .. }
            | Decl::Struct { span, .. }
            | Decl::Enum { span, .. } => span,
        }
    }
}
