//! Constant folder (spec.md §4.8): a pure bound-tree → bound-tree pass.
//! Non-foldable expressions are reproduced structurally; folding never
//! elides a side-effecting operand — the short-circuit collapses are
//! safe because the interpreter never evaluates that operand either,
//! once the other side is a known literal.

use crate::ast::{BinOpKind, UnOpKind};
use crate::bound_tree::{BoundDecl, BoundExpr, BoundMatchArm, BoundStmt};
use crate::diagnostics::Diagnostics;
use crate::value::PrimitiveValue;

pub fn fold_program(declarations: Vec<BoundDecl>, diagnostics: &mut Diagnostics) -> Vec<BoundDecl> {
    declarations.into_iter().map(|decl| fold_decl(decl, diagnostics)).collect()
}

fn fold_decl(decl: BoundDecl, diagnostics: &mut Diagnostics) -> BoundDecl {
    match decl {
        BoundDecl::Variable { name, ty, value, span } => BoundDecl::Variable { name, ty, value: value.map(|v| fold_expr(v, diagnostics)), span },
        BoundDecl::Function { id, name, parameters, return_type, body, span } => {
            BoundDecl::Function { id, name, parameters, return_type, body: fold_expr(body, diagnostics), span }
        }
        other @ (BoundDecl::External { .. } | BoundDecl::Struct { .. } | BoundDecl::Enum { .. }) => other,
    }
}

fn fold_stmt(stmt: BoundStmt, diagnostics: &mut Diagnostics) -> BoundStmt {
    match stmt {
        BoundStmt::Expression(expr) => BoundStmt::Expression(fold_expr(expr, diagnostics)),
        BoundStmt::Declaration(decl) => BoundStmt::Declaration(fold_decl(decl, diagnostics)),
        BoundStmt::Return(value, span) => BoundStmt::Return(value.map(|v| fold_expr(v, diagnostics)), span),
        other @ (BoundStmt::Break(..) | BoundStmt::Continue(..)) => other,
    }
}

fn as_literal(expr: &BoundExpr) -> Option<&PrimitiveValue> {
    match expr {
        BoundExpr::Literal(value, ..) => Some(value),
        _ => None,
    }
}

pub fn fold_expr(expr: BoundExpr, diagnostics: &mut Diagnostics) -> BoundExpr {
    match expr {
        BoundExpr::Binary { operator, left, right, span } => {
            let left = fold_expr(*left, diagnostics);

            // Short-circuit collapse: the interpreter never evaluates the
            // right operand once the left literal settles the result, so
            // folding it away here changes nothing observable.
            if matches!(operator.kind, BinOpKind::LogicalAnd | BinOpKind::LogicalOr) {
                if let Some(value) = as_literal(&left) {
                    match (operator.kind, value.is_truthy()) {
                        (BinOpKind::LogicalAnd, false) => return left,
                        (BinOpKind::LogicalAnd, true) => return fold_expr(*right, diagnostics),
                        (BinOpKind::LogicalOr, true) => return left,
                        (BinOpKind::LogicalOr, false) => return fold_expr(*right, diagnostics),
                        _ => {}
                    }
                }
            }

            let right = fold_expr(*right, diagnostics);
            match (as_literal(&left), as_literal(&right)) {
                (Some(l), Some(r)) => match fold_binary_literal(operator.kind, l, r, diagnostics, &span) {
                    Some(value) => BoundExpr::Literal(value, operator.return_type.clone(), span),
                    None => BoundExpr::Binary { operator, left: Box::new(left), right: Box::new(right), span },
                },
                _ => BoundExpr::Binary { operator, left: Box::new(left), right: Box::new(right), span },
            }
        }
        BoundExpr::Unary { operator, operand, span } => {
            let operand = fold_expr(*operand, diagnostics);
            match as_literal(&operand) {
                Some(value) => match fold_unary_literal(operator.kind, value) {
                    Some(folded) => BoundExpr::Literal(folded, operator.return_type.clone(), span),
                    None => BoundExpr::Unary { operator, operand: Box::new(operand), span },
                },
                None => BoundExpr::Unary { operator, operand: Box::new(operand), span },
            }
        }
        BoundExpr::If { condition, then_branch, else_branch, ty, span } => {
            let condition = fold_expr(*condition, diagnostics);
            let then_branch = fold_expr(*then_branch, diagnostics);
            let else_branch = else_branch.map(|e| Box::new(fold_expr(*e, diagnostics)));
            match as_literal(&condition) {
                Some(value) => {
                    if value.is_truthy() {
                        then_branch
                    } else {
                        match else_branch {
                            Some(branch) => *branch,
                            None => BoundExpr::Block { statements: Vec::new(), trailing: None, ty: crate::types::Type::void(), span },
                        }
                    }
                }
                None => BoundExpr::If { condition: Box::new(condition), then_branch: Box::new(then_branch), else_branch, ty, span },
            }
        }
        BoundExpr::Assign { op, target, value, ty, span } => {
            BoundExpr::Assign { op, target: Box::new(fold_expr(*target, diagnostics)), value: Box::new(fold_expr(*value, diagnostics)), ty, span }
        }
        BoundExpr::Index { base, index, element_type, span } => {
            BoundExpr::Index { base: Box::new(fold_expr(*base, diagnostics)), index: Box::new(fold_expr(*index, diagnostics)), element_type, span }
        }
        BoundExpr::Field { base, field, field_type, span } => BoundExpr::Field { base: Box::new(fold_expr(*base, diagnostics)), field, field_type, span },
        BoundExpr::Call { function, name, arguments, return_type, span } => {
            BoundExpr::Call { function, name, arguments: arguments.into_iter().map(|a| fold_expr(a, diagnostics)).collect(), return_type, span }
        }
        BoundExpr::ExternalCall { name, arguments, return_type, span } => {
            BoundExpr::ExternalCall { name, arguments: arguments.into_iter().map(|a| fold_expr(a, diagnostics)).collect(), return_type, span }
        }
        BoundExpr::ArrayLiteral { elements, ty, span } => BoundExpr::ArrayLiteral { elements: elements.into_iter().map(|e| fold_expr(e, diagnostics)).collect(), ty, span },
        BoundExpr::Range { start, end, element_type, span } => {
            BoundExpr::Range { start: Box::new(fold_expr(*start, diagnostics)), end: Box::new(fold_expr(*end, diagnostics)), element_type, span }
        }
        BoundExpr::As { operand, target_type, span } => BoundExpr::As { operand: Box::new(fold_expr(*operand, diagnostics)), target_type, span },
        BoundExpr::Block { statements, trailing, ty, span } => BoundExpr::Block {
            statements: statements.into_iter().map(|s| fold_stmt(s, diagnostics)).collect(),
            trailing: trailing.map(|t| Box::new(fold_expr(*t, diagnostics))),
            ty,
            span,
        },
        BoundExpr::While { label, condition, body, finally, else_branch, span } => BoundExpr::While {
            label,
            condition: Box::new(fold_expr(*condition, diagnostics)),
            body: Box::new(fold_expr(*body, diagnostics)),
            finally: finally.map(|e| Box::new(fold_expr(*e, diagnostics))),
            else_branch: else_branch.map(|e| Box::new(fold_expr(*e, diagnostics))),
            span,
        },
        BoundExpr::ForLegacy { label, init, test, step, body, span } => BoundExpr::ForLegacy {
            label,
            init: init.map(|s| Box::new(fold_stmt(*s, diagnostics))),
            test: Box::new(fold_expr(*test, diagnostics)),
            step: step.map(|e| Box::new(fold_expr(*e, diagnostics))),
            body: Box::new(fold_expr(*body, diagnostics)),
            span,
        },
        BoundExpr::ForRanged { label, binding, binding_type, iterable, body, span } => BoundExpr::ForRanged {
            label,
            binding,
            binding_type,
            iterable: Box::new(fold_expr(*iterable, diagnostics)),
            body: Box::new(fold_expr(*body, diagnostics)),
            span,
        },
        BoundExpr::Match { scrutinee, arms, ty, span } => BoundExpr::Match {
            scrutinee: Box::new(fold_expr(*scrutinee, diagnostics)),
            arms: arms.into_iter().map(|arm| fold_match_arm(arm, diagnostics)).collect(),
            ty,
            span,
        },
        BoundExpr::EnumConstruct { enum_name, variant, variant_index, payload, ty, span } => {
            BoundExpr::EnumConstruct { enum_name, variant, variant_index, payload: Box::new(fold_expr(*payload, diagnostics)), ty, span }
        }
        literal @ BoundExpr::Literal(..) | literal @ BoundExpr::Variable(..) | literal @ BoundExpr::Invalid(_) => literal,
    }
}

fn fold_match_arm(arm: BoundMatchArm, diagnostics: &mut Diagnostics) -> BoundMatchArm {
    BoundMatchArm { pattern: arm.pattern, binding: arm.binding, body: Box::new(fold_expr(*arm.body, diagnostics)), span: arm.span }
}

fn fold_binary_literal(op: BinOpKind, left: &PrimitiveValue, right: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &crate::span::Span) -> Option<PrimitiveValue> {
    use BinOpKind::*;
    match op {
        Add => Some(left.add(right, diagnostics, span)),
        Sub => Some(left.sub(right, diagnostics, span)),
        Mul => Some(left.mul(right, diagnostics, span)),
        Div => Some(left.div(right, diagnostics, span)),
        Mod => Some(left.rem(right, diagnostics, span)),
        Equals => left.compare(right).map(|o| PrimitiveValue::Bool(o == std::cmp::Ordering::Equal)),
        NotEquals => left.compare(right).map(|o| PrimitiveValue::Bool(o != std::cmp::Ordering::Equal)),
        Less => left.compare(right).map(|o| PrimitiveValue::Bool(o == std::cmp::Ordering::Less)),
        Greater => left.compare(right).map(|o| PrimitiveValue::Bool(o == std::cmp::Ordering::Greater)),
        LessEqual => left.compare(right).map(|o| PrimitiveValue::Bool(o != std::cmp::Ordering::Greater)),
        GreaterEqual => left.compare(right).map(|o| PrimitiveValue::Bool(o != std::cmp::Ordering::Less)),
        LogicalAnd => Some(PrimitiveValue::Bool(left.is_truthy() && right.is_truthy())),
        LogicalOr => Some(PrimitiveValue::Bool(left.is_truthy() || right.is_truthy())),
        // Bitwise operators are foldable too, but rarely appear on two
        // literals in practice; left unfolded to keep this pass small.
        BitwiseAnd | BitwiseOr | BitwiseXor | ShiftLeft | ShiftRight => None,
    }
}

fn fold_unary_literal(op: UnOpKind, operand: &PrimitiveValue) -> Option<PrimitiveValue> {
    match op {
        UnOpKind::Negate => Some(operand.negate()),
        UnOpKind::LogicalNot => Some(operand.logical_not()),
        // `++`/`--` mutate a storage location; never fold them even when
        // the operand happens to be a literal in the unbound sense.
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder;
    use crate::lexer;
    use crate::parser;
    use crate::span::SourceMap;

    fn fold(src: &str) -> Vec<BoundDecl> {
        let mut sources = SourceMap::new();
        let file = sources.add_file("<test>", src);
        let mut diagnostics = Diagnostics::new();
        let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
        let decls = parser::parse_program(tokens, &mut diagnostics);
        let program = binder::bind_program(decls, &mut diagnostics);
        fold_program(program.declarations, &mut diagnostics)
    }

    #[test]
    fn literal_arithmetic_folds_to_a_single_literal() {
        let decls = fold("fn main(): i32 { return 2 + 3 * 4; }");
        match &decls[0] {
            BoundDecl::Function { body, .. } => match body {
                BoundExpr::Block { statements, .. } => match &statements[0] {
                    BoundStmt::Return(Some(BoundExpr::Literal(value, ..)), _) => assert_eq!(*value, PrimitiveValue::I32(14)),
                    other => panic!("expected a folded literal return, got {:?}", other),
                },
                other => panic!("expected a block body, got {:?}", other),
            },
            other => panic!("expected a function declaration, got {:?}", other),
        }
    }

    #[test]
    fn literal_if_condition_collapses_to_the_taken_branch() {
        let decls = fold("fn main(): i32 { return if true { 1 } else { 2 }; }");
        match &decls[0] {
            BoundDecl::Function { body, .. } => match body {
                BoundExpr::Block { statements, .. } => match &statements[0] {
                    BoundStmt::Return(Some(BoundExpr::Literal(value, ..)), _) => assert_eq!(*value, PrimitiveValue::I32(1)),
                    other => panic!("expected a folded literal return, got {:?}", other),
                },
                other => panic!("expected a block body, got {:?}", other),
            },
            other => panic!("expected a function declaration, got {:?}", other),
        }
    }
}
