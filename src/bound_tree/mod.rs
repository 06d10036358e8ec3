//! The bound tree (spec.md §3 "Bound tree"): parallel to the unbound
//! tree, but every expression carries its resolved `Type` and every
//! call/identifier its resolved symbol.

pub mod operators;

use crate::ast::{AssignOpKind, UnOpKind};
use crate::span::Span;
use crate::types::Type;
use crate::value::PrimitiveValue;
pub use operators::{BoundBinaryOperator, BoundUnaryOperator};

/// Identifies a bound function declaration (including monomorphised
/// generic instances), stable for the duration of one compilation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionId(pub usize);

#[derive(Clone, Debug, PartialEq)]
pub struct BoundMatchArm {
    pub pattern: BoundPattern,
    pub binding: Option<String>,
    pub body: Box<BoundExpr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundPattern {
    EnumVariant { variant: String, variant_index: usize },
    Literal(PrimitiveValue),
    Wildcard,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundExpr {
    Literal(PrimitiveValue, Type, Span),
    Variable(String, Type, Span),

    Binary { operator: BoundBinaryOperator, left: Box<BoundExpr>, right: Box<BoundExpr>, span: Span },
    Unary { operator: BoundUnaryOperator, operand: Box<BoundExpr>, span: Span },
    Assign { op: AssignOpKind, target: Box<BoundExpr>, value: Box<BoundExpr>, ty: Type, span: Span },

    Index { base: Box<BoundExpr>, index: Box<BoundExpr>, element_type: Type, span: Span },
    Field { base: Box<BoundExpr>, field: String, field_type: Type, span: Span },

    Call { function: FunctionId, name: String, arguments: Vec<BoundExpr>, return_type: Type, span: Span },
    ExternalCall { name: String, arguments: Vec<BoundExpr>, return_type: Type, span: Span },

    ArrayLiteral { elements: Vec<BoundExpr>, ty: Type, span: Span },
    Range { start: Box<BoundExpr>, end: Box<BoundExpr>, element_type: Type, span: Span },

    As { operand: Box<BoundExpr>, target_type: Type, span: Span },

    Block { statements: Vec<BoundStmt>, trailing: Option<Box<BoundExpr>>, ty: Type, span: Span },
    If { condition: Box<BoundExpr>, then_branch: Box<BoundExpr>, else_branch: Option<Box<BoundExpr>>, ty: Type, span: Span },
    While {
        label: Option<String>,
        condition: Box<BoundExpr>,
        body: Box<BoundExpr>,
        finally: Option<Box<BoundExpr>>,
        else_branch: Option<Box<BoundExpr>>,
        span: Span,
    },
    ForLegacy {
        label: Option<String>,
        init: Option<Box<BoundStmt>>,
        test: Box<BoundExpr>,
        step: Option<Box<BoundExpr>>,
        body: Box<BoundExpr>,
        span: Span,
    },
    ForRanged { label: Option<String>, binding: String, binding_type: Type, iterable: Box<BoundExpr>, body: Box<BoundExpr>, span: Span },
    Match { scrutinee: Box<BoundExpr>, arms: Vec<BoundMatchArm>, ty: Type, span: Span },
    EnumConstruct { enum_name: String, variant: String, variant_index: usize, payload: Box<BoundExpr>, ty: Type, span: Span },

    /// A subtree that failed to bind. Its type is always `Void`; the
    /// diagnostics sink holds the reason (spec.md §3 invariant: every
    /// bound expression has a non-invalid type iff no attributable
    /// error was pushed).
    Invalid(Span),
}

impl BoundExpr {
    pub fn ty(&self) -> Type {
        match self {
            BoundExpr::Literal(_, ty, _) => ty.clone(),
            BoundExpr::Variable(_, ty, _) => ty.clone(),
            BoundExpr::Binary { operator, .. } => operator.return_type.clone(),
            BoundExpr::Unary { operator, .. } => operator.return_type.clone(),
            BoundExpr::Assign { ty, .. } => ty.clone(),
            BoundExpr::Index { element_type, .. } => element_type.clone(),
            BoundExpr::Field { field_type, .. } => field_type.clone(),
            BoundExpr::Call { return_type, .. } => return_type.clone(),
            BoundExpr::ExternalCall { return_type, .. } => return_type.clone(),
            BoundExpr::ArrayLiteral { ty, .. } => ty.clone(),
            BoundExpr::Range { element_type, .. } => element_type.clone(),
            BoundExpr::As { target_type, .. } => target_type.clone(),
            BoundExpr::Block { ty, .. } => ty.clone(),
            BoundExpr::If { ty, .. } => ty.clone(),
            BoundExpr::While { .. } => Type::void(),
            BoundExpr::ForLegacy { .. } => Type::void(),
            BoundExpr::ForRanged { .. } => Type::void(),
            BoundExpr::Match { ty, .. } => ty.clone(),
            BoundExpr::EnumConstruct { ty, .. } => ty.clone(),
            BoundExpr::Invalid(_) => Type::void(),
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            BoundExpr::Literal(_, _, span)
            | BoundExpr::Variable(_, _, span)
            | BoundExpr::Binary { span, .. }
            | BoundExpr::Unary { span, .. }
            | BoundExpr::Assign { span, .. }
            | BoundExpr::Index { span, .. }
            | BoundExpr::Field { span, .. }
            | BoundExpr::Call { span, .. }
            | BoundExpr::ExternalCall { span, .. }
            | BoundExpr::ArrayLiteral { span, .. }
            | BoundExpr::Range { span, .. }
            | BoundExpr::As { span, .. }
            | BoundExpr::Block { span, .. }
            | BoundExpr::If { span, .. }
            | BoundExpr::While { span, .. }
            | BoundExpr::ForLegacy { span, .. }
            | BoundExpr::ForRanged { span, .. }
            | BoundExpr::Match { span, .. }
            | BoundExpr::EnumConstruct { span, .. }
            | BoundExpr::Invalid(span) => span,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, BoundExpr::Invalid(_))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundStmt {
    Expression(BoundExpr),
    Declaration(BoundDecl),
    Return(Option<BoundExpr>, Span),
    Break(Option<String>, Span),
    Continue(Option<String>, Span),
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub ty: Type,
    pub default_value: Option<BoundExpr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BoundDecl {
    Variable { name: String, ty: Type, value: Option<BoundExpr>, span: Span },
    Function { id: FunctionId, name: String, parameters: Vec<BoundParameter>, return_type: Type, body: BoundExpr, span: Span },
    External { name: String, parameter_types: Vec<Type>, return_type: Type, span: Span },
    Struct { name: String, fields: Vec<(String, Type)>, span: Span },
    Enum { name: String, variants: Vec<(String, Type)>, span: Span },
}

/// Which unary operators denote an in-place mutation requiring an
/// lvalue operand (spec.md §4.7: `++`/`--` on mutable numeric storage).
pub fn is_mutating_unary(op: UnOpKind) -> bool {
    matches!(op, UnOpKind::PreIncrement | UnOpKind::PreDecrement | UnOpKind::PostIncrement | UnOpKind::PostDecrement)
}
