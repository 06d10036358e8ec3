//! Operator resolution (spec.md §4.6.2): a pure function from
//! `op × left_type × right_type` (or `op × operand_type` for unary) to
//! a return `Type`. Grounded on the table spec.md reproduces and
//! `original_source/core/include/linc/system/PrimitiveValue.hpp`'s
//! per-kind operator macros for which primitive pairings are legal.

use crate::ast::{AssignOpKind, BinOpKind, UnOpKind};
use crate::types::{Primitive, Type, TypeKind};

#[derive(Clone, Debug, PartialEq)]
pub struct BoundBinaryOperator {
    pub kind: BinOpKind,
    pub left_type: Type,
    pub right_type: Type,
    pub return_type: Type,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundUnaryOperator {
    pub kind: UnOpKind,
    pub operand_type: Type,
    pub return_type: Type,
}

fn is_string_or_char(ty: &Type) -> bool {
    matches!(ty.as_primitive(), Some(Primitive::String) | Some(Primitive::Char))
}

/// Resolves a binary operator against its operand types, returning the
/// result type or `None` when the combination is undefined (the binder
/// turns `None` into an "undefined operator for …" diagnostic and an
/// `Invalid` type).
pub fn resolve_binary(op: BinOpKind, left: &Type, right: &Type) -> Option<Type> {
    use BinOpKind::*;
    match op {
        Add => {
            if is_string_or_char(left) && is_string_or_char(right) {
                return Some(Type::primitive(Primitive::String));
            }
            if let (TypeKind::Array(a), TypeKind::Array(b)) = (&left.kind, &right.kind) {
                if a.base.is_compatible(&b.base) {
                    let count = match (a.count, b.count) {
                        (Some(x), Some(y)) => Some(x + y),
                        _ => None,
                    };
                    return Some(Type::array((*a.base).clone(), count));
                }
                return None;
            }
            numeric_same_primitive(left, right)
        }
        Sub | Mul | Div | Mod => numeric_same_primitive(left, right),
        LogicalAnd | LogicalOr => {
            if left.as_primitive() == Some(Primitive::Bool) && right.as_primitive() == Some(Primitive::Bool) {
                Some(Type::primitive(Primitive::Bool))
            } else {
                None
            }
        }
        Equals | NotEquals => {
            if left.is_compatible(right) {
                Some(Type::primitive(Primitive::Bool))
            } else {
                None
            }
        }
        Less | Greater | LessEqual | GreaterEqual => numeric_same_primitive(left, right).map(|_| Type::primitive(Primitive::Bool)),
        BitwiseAnd | BitwiseOr | BitwiseXor | ShiftLeft | ShiftRight => match (left.as_primitive(), right.as_primitive()) {
            (Some(a), Some(b)) if a.is_integral() && b.is_integral() => Some(Type::primitive(a)),
            _ => None,
        },
    }
}

fn numeric_same_primitive(left: &Type, right: &Type) -> Option<Type> {
    match (left.as_primitive(), right.as_primitive()) {
        (Some(a), Some(b)) if a.is_numeric() && b.is_numeric() && a == b => Some(Type::primitive(a)),
        _ => None,
    }
}

/// Assignment / compound-assignment resolution: the left side must
/// denote mutable storage (checked by the binder's lvalue analysis,
/// not here) and the right side must be assignable to the left.
pub fn resolve_assignment(op: AssignOpKind, lhs: &Type, rhs: &Type) -> Option<Type> {
    match op {
        AssignOpKind::Assign => {
            if rhs.is_assignable_to(lhs) {
                Some(lhs.clone())
            } else {
                None
            }
        }
        _ => {
            let arithmetic_op = match op {
                AssignOpKind::AddAssign => BinOpKind::Add,
                AssignOpKind::SubAssign => BinOpKind::Sub,
                AssignOpKind::MulAssign => BinOpKind::Mul,
                AssignOpKind::DivAssign => BinOpKind::Div,
                AssignOpKind::ModAssign => BinOpKind::Mod,
                AssignOpKind::Assign => unreachable!(),
            };
            resolve_binary(arithmetic_op, lhs, rhs).filter(|result| result.is_assignable_to(lhs)).map(|_| lhs.clone())
        }
    }
}

/// Resolves a unary operator against its operand type.
pub fn resolve_unary(op: UnOpKind, operand: &Type) -> Option<Type> {
    match op {
        UnOpKind::Plus => match operand.as_primitive() {
            Some(Primitive::Char) => Some(Type::primitive(Primitive::I32)),
            Some(p) if p.is_numeric() => Some(Type::primitive(p)),
            _ => match &operand.kind {
                TypeKind::Array(_) => Some(Type::primitive(Primitive::U64)),
                _ if is_string_or_char(operand) => Some(Type::primitive(Primitive::U64)),
                _ => None,
            },
        },
        UnOpKind::Negate => match operand.as_primitive() {
            Some(p) if p.is_integral() && matches!(p, Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64) => Some(Type::primitive(p)),
            Some(p) if p.is_floating() => Some(Type::primitive(p)),
            _ => None,
        },
        UnOpKind::LogicalNot => match operand.as_primitive() {
            Some(Primitive::Bool) => Some(Type::primitive(Primitive::Bool)),
            Some(p) if p.is_numeric() => Some(Type::primitive(Primitive::Bool)),
            _ => None,
        },
        UnOpKind::BitwiseNot => match operand.as_primitive() {
            Some(p) if p.is_integral() => Some(Type::primitive(p)),
            _ => None,
        },
        UnOpKind::Stringify => Some(Type::primitive(Primitive::String)),
        UnOpKind::TypeOf => Some(Type::primitive(Primitive::TypeValue)),
        UnOpKind::PreIncrement | UnOpKind::PreDecrement | UnOpKind::PostIncrement | UnOpKind::PostDecrement => match operand.as_primitive() {
            Some(p) if p.is_numeric() => Some(Type::primitive(p)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_of_matching_numerics_returns_that_primitive() {
        let i32_type = Type::primitive(Primitive::I32);
        assert_eq!(resolve_binary(BinOpKind::Add, &i32_type, &i32_type), Some(i32_type));
    }

    #[test]
    fn addition_of_string_and_char_returns_string() {
        let string = Type::primitive(Primitive::String);
        let character = Type::primitive(Primitive::Char);
        assert_eq!(resolve_binary(BinOpKind::Add, &string, &character), Some(Type::primitive(Primitive::String)));
    }

    #[test]
    fn mismatched_numeric_primitives_are_undefined() {
        let i32_type = Type::primitive(Primitive::I32);
        let i64_type = Type::primitive(Primitive::I64);
        assert_eq!(resolve_binary(BinOpKind::Add, &i32_type, &i64_type), None);
    }

    #[test]
    fn unary_plus_on_string_yields_length_as_u64() {
        assert_eq!(resolve_unary(UnOpKind::Plus, &Type::primitive(Primitive::String)), Some(Type::primitive(Primitive::U64)));
    }
}
