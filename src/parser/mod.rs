//! Recursive descent + Pratt parser (spec.md §4.5), grounded on
//! `examples/original_source/core/src/parser/Parser.cpp`'s precedence
//! climbing and `Operators.cpp`'s precedence tables.
//!
//! The fixed precedence/associativity table (pinned per the expanded
//! specification): 1 assignment forms (right), 2 `|| &&` (left),
//! 3 `| ^ &` (left), 4 `== != < > <= >=` (left), 5 `<< >> + - * / %`
//! (left). Unary operators sit in two tiers above the highest binary
//! tier, exactly as `Operators::s_UnaryOperatorPrecedenceMap` does.

pub mod defs;

use crate::ast::{AssignOpKind, BinOpKind, Decl, Expr, Node, NodeListClause, Stmt, TypeExpr, UnOpKind};
use crate::ast::decl::{EnumVariant, Param, StructField};
use crate::ast::expr::{LiteralExpr, MatchArm, MatchPattern};
use crate::diagnostics::{Diagnostics, Stage};
use crate::span::Span;
use crate::tokens::{Token, TokenKind};
use defs::{DefinitionKind, DefinitionTable};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

enum ParsedOp {
    Binary(BinOpKind),
    Assign(AssignOpKind),
}

fn binary_or_assign(kind: &TokenKind) -> Option<(ParsedOp, u8, Assoc)> {
    use TokenKind::*;
    Some(match kind {
        Assign => (ParsedOp::Assign(AssignOpKind::Assign), 1, Assoc::Right),
        AssignAdd => (ParsedOp::Assign(AssignOpKind::AddAssign), 1, Assoc::Right),
        AssignSub => (ParsedOp::Assign(AssignOpKind::SubAssign), 1, Assoc::Right),
        AssignMul => (ParsedOp::Assign(AssignOpKind::MulAssign), 1, Assoc::Right),
        AssignDiv => (ParsedOp::Assign(AssignOpKind::DivAssign), 1, Assoc::Right),
        AssignMod => (ParsedOp::Assign(AssignOpKind::ModAssign), 1, Assoc::Right),
        LogicalOr => (ParsedOp::Binary(BinOpKind::LogicalOr), 2, Assoc::Left),
        LogicalAnd => (ParsedOp::Binary(BinOpKind::LogicalAnd), 2, Assoc::Left),
        BitwiseOr => (ParsedOp::Binary(BinOpKind::BitwiseOr), 3, Assoc::Left),
        BitwiseXor => (ParsedOp::Binary(BinOpKind::BitwiseXor), 3, Assoc::Left),
        BitwiseAnd => (ParsedOp::Binary(BinOpKind::BitwiseAnd), 3, Assoc::Left),
        Equals => (ParsedOp::Binary(BinOpKind::Equals), 4, Assoc::Left),
        NotEquals => (ParsedOp::Binary(BinOpKind::NotEquals), 4, Assoc::Left),
        Less => (ParsedOp::Binary(BinOpKind::Less), 4, Assoc::Left),
        Greater => (ParsedOp::Binary(BinOpKind::Greater), 4, Assoc::Left),
        LessEqual => (ParsedOp::Binary(BinOpKind::LessEqual), 4, Assoc::Left),
        GreaterEqual => (ParsedOp::Binary(BinOpKind::GreaterEqual), 4, Assoc::Left),
        ShiftLeft => (ParsedOp::Binary(BinOpKind::ShiftLeft), 5, Assoc::Left),
        ShiftRight => (ParsedOp::Binary(BinOpKind::ShiftRight), 5, Assoc::Left),
        Plus => (ParsedOp::Binary(BinOpKind::Add), 5, Assoc::Left),
        Minus => (ParsedOp::Binary(BinOpKind::Sub), 5, Assoc::Left),
        Star => (ParsedOp::Binary(BinOpKind::Mul), 5, Assoc::Left),
        Slash => (ParsedOp::Binary(BinOpKind::Div), 5, Assoc::Left),
        Percent => (ParsedOp::Binary(BinOpKind::Mod), 5, Assoc::Left),
        _ => return None,
    })
}

fn unary_operator(kind: &TokenKind) -> Option<(UnOpKind, u8)> {
    use TokenKind::*;
    Some(match kind {
        At => (UnOpKind::Stringify, 6),
        TypeOf => (UnOpKind::TypeOf, 6),
        Increment => (UnOpKind::PreIncrement, 6),
        Decrement => (UnOpKind::PreDecrement, 6),
        Minus => (UnOpKind::Negate, 7),
        Plus => (UnOpKind::Plus, 7),
        LogicalNot => (UnOpKind::LogicalNot, 7),
        BitwiseNot => (UnOpKind::BitwiseNot, 7),
        _ => return None,
    })
}

/// What a `parse_variant` call yields at a block-body position: a
/// declaration, a statement, or a bare expression (the caller decides
/// whether the expression becomes a statement or the block's trailing
/// value).
enum BodyItem {
    Decl(Decl),
    Stmt(Stmt),
    Expr(Expr),
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    index: usize,
    diagnostics: &'a mut Diagnostics,
    defs: DefinitionTable,
}

pub fn parse_program(tokens: Vec<Token>, diagnostics: &mut Diagnostics) -> Vec<Decl> {
    let mut parser = Parser { tokens, index: 0, diagnostics, defs: DefinitionTable::new() };
    let mut decls = Vec::new();
    while !parser.at_end() {
        decls.push(parser.parse_declaration());
    }
    decls
}

impl<'a> Parser<'a> {
    fn current(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.index + offset)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::EndOfFile)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn at_end(&self) -> bool {
        self.check(TokenKind::EndOfFile)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    /// Inserts a synthetic token of the expected kind on mismatch, per
    /// spec.md §7's syntactic error handling: report and continue.
    fn expect(&mut self, kind: TokenKind) -> Token {
        if self.check(kind.clone()) {
            self.advance()
        } else {
            let span = self.current().span.clone();
            self.diagnostics.error(Stage::Parser, Some(span.clone()), format!("expected {:?}, found {:?}", kind, self.current().kind));
            Token::new(kind, span)
        }
    }

    fn expect_identifier(&mut self) -> String {
        if let TokenKind::Identifier = self.current().kind {
            self.advance().value.unwrap_or_default()
        } else {
            let span = self.current().span.clone();
            self.diagnostics.error(Stage::Parser, Some(span), "expected identifier");
            String::new()
        }
    }

    fn here(&self) -> Span {
        self.current().span.clone()
    }

    // ---- Declarations -------------------------------------------------

    fn parse_declaration(&mut self) -> Decl {
        match &self.current().kind {
            TokenKind::KeywordFn => self.parse_function_decl(Vec::new()),
            TokenKind::KeywordExt => self.parse_external_decl(),
            TokenKind::KeywordStruct => self.parse_struct_decl(),
            TokenKind::KeywordEnum => self.parse_enum_decl(),
            TokenKind::KeywordGeneric => self.parse_generic_decl(),
            TokenKind::Identifier => self.parse_variable_decl(),
            _ => {
                let span = self.here();
                self.diagnostics.error(Stage::Parser, Some(span.clone()), "expected a declaration");
                self.advance();
                Decl::Variable { name: String::new(), type_annotation: None, mutable: false, value: None, span }
            }
        }
    }

    fn parse_variable_decl(&mut self) -> Decl {
        let start = self.here();
        let name = self.expect_identifier();

        if self.check(TokenKind::Colon) {
            self.advance();
            let type_annotation = self.parse_type();
            let mutable = matches!(type_annotation, TypeExpr::Mutable(_));
            let value = if self.check(TokenKind::Assign) {
                self.advance();
                Some(Box::new(self.parse_expression(0)))
            } else {
                None
            };
            self.expect(TokenKind::Terminator);
            self.defs.declare(&name, DefinitionKind::Variable);
            let span = start.join(&self.here());
            return Decl::Variable { name, type_annotation: Some(type_annotation), mutable, value, span };
        }

        let mutable = if self.check(TokenKind::KeywordMut) {
            self.advance();
            true
        } else {
            false
        };
        self.expect(TokenKind::ColonEquals);
        let value = self.parse_expression(0);
        self.expect(TokenKind::Terminator);
        self.defs.declare(&name, DefinitionKind::Variable);
        let span = start.join(&self.here());
        Decl::Variable { name, type_annotation: None, mutable, value: Some(Box::new(value)), span }
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        while !self.check(TokenKind::ParenRight) && !self.at_end() {
            let start = self.here();
            let name = self.expect_identifier();
            self.expect(TokenKind::Colon);
            let type_annotation = self.parse_type();
            let default_value = if self.check(TokenKind::Assign) {
                self.advance();
                Some(Box::new(self.parse_expression(0)))
            } else {
                None
            };
            let span = start.join(&self.here());
            params.push(Param { name, type_annotation, default_value, span });
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        params
    }

    fn parse_function_decl(&mut self, generics: Vec<String>) -> Decl {
        let start = self.here();
        self.advance(); // fn
        let name = self.expect_identifier();
        self.defs.declare(&name, DefinitionKind::Function);
        self.expect(TokenKind::ParenLeft);
        self.defs.push_scope();
        let parameters = self.parse_params();
        for param in &parameters {
            self.defs.declare(&param.name, DefinitionKind::Variable);
        }
        self.expect(TokenKind::ParenRight);
        let return_type = if self.check(TokenKind::Colon) {
            self.advance();
            Some(self.parse_type())
        } else {
            None
        };
        let body = Box::new(self.parse_block());
        self.defs.pop_scope();
        let span = start.join(&self.here());
        Decl::Function { name, generics, parameters, return_type, body, span }
    }

    fn parse_external_decl(&mut self) -> Decl {
        let start = self.here();
        self.advance(); // ext
        let name = self.expect_identifier();
        self.defs.declare(&name, DefinitionKind::External);
        self.expect(TokenKind::ParenLeft);
        let mut parameter_types = Vec::new();
        while !self.check(TokenKind::ParenRight) && !self.at_end() {
            parameter_types.push(self.parse_type());
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::ParenRight);
        self.expect(TokenKind::Colon);
        let return_type = self.parse_type();
        self.expect(TokenKind::Terminator);
        let span = start.join(&self.here());
        Decl::External { name, parameter_types, return_type, span }
    }

    fn parse_struct_decl(&mut self) -> Decl {
        let start = self.here();
        self.advance(); // struct
        let name = self.expect_identifier();
        self.defs.declare(&name, DefinitionKind::Typename);
        self.expect(TokenKind::BraceLeft);
        let mut fields = Vec::new();
        while !self.check(TokenKind::BraceRight) && !self.at_end() {
            let field_start = self.here();
            let field_name = self.expect_identifier();
            self.expect(TokenKind::Colon);
            let type_annotation = self.parse_type();
            self.expect(TokenKind::Terminator);
            let span = field_start.join(&self.here());
            fields.push(StructField { name: field_name, type_annotation, span });
        }
        self.expect(TokenKind::BraceRight);
        let span = start.join(&self.here());
        Decl::Struct { name, fields, span }
    }

    fn parse_enum_decl(&mut self) -> Decl {
        let start = self.here();
        self.advance(); // enum
        let name = self.expect_identifier();
        self.defs.declare(&name, DefinitionKind::Typename);
        self.expect(TokenKind::BraceLeft);
        let mut variants = Vec::new();
        while !self.check(TokenKind::BraceRight) && !self.at_end() {
            let variant_start = self.here();
            let variant_name = self.expect_identifier();
            self.expect(TokenKind::ParenLeft);
            let payload_type = self.parse_type();
            self.expect(TokenKind::ParenRight);
            let span = variant_start.join(&self.here());
            variants.push(EnumVariant { name: variant_name, payload_type, span });
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::BraceRight);
        let span = start.join(&self.here());
        Decl::Enum { name, variants, span }
    }

    /// `generic<T1,T2,…> decl`. Attaches type parameters to a function
    /// declaration; generic structs/enums are out of scope for this
    /// crate (documented in DESIGN.md).
    fn parse_generic_decl(&mut self) -> Decl {
        self.advance(); // generic
        self.expect(TokenKind::Less);
        let mut generics = Vec::new();
        while !self.check(TokenKind::Greater) && !self.at_end() {
            generics.push(self.expect_identifier());
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::Greater);
        if self.check(TokenKind::KeywordFn) {
            self.parse_function_decl(generics)
        } else {
            self.diagnostics.error(Stage::Parser, Some(self.here()), "generic parameters may only prefix a function declaration");
            self.parse_declaration()
        }
    }

    fn parse_type(&mut self) -> TypeExpr {
        if self.check(TokenKind::KeywordMut) {
            self.advance();
            return TypeExpr::Mutable(Box::new(self.parse_type()));
        }
        if self.check(TokenKind::SquareLeft) {
            self.advance();
            let base = self.parse_type();
            let count = if self.check(TokenKind::Terminator) {
                self.advance();
                let token = self.expect(TokenKind::I32Literal);
                token.value.and_then(|v| v.parse::<u64>().ok())
            } else {
                None
            };
            self.expect(TokenKind::SquareRight);
            return TypeExpr::Array { base: Box::new(base), count };
        }
        TypeExpr::Named(self.expect_identifier())
    }

    // ---- Statements / block bodies -------------------------------------

    fn parse_variant(&mut self) -> BodyItem {
        match &self.current().kind {
            TokenKind::KeywordFn | TokenKind::KeywordExt | TokenKind::KeywordStruct | TokenKind::KeywordEnum | TokenKind::KeywordGeneric => {
                BodyItem::Decl(self.parse_declaration())
            }
            TokenKind::Identifier if self.starts_variable_decl() => BodyItem::Decl(self.parse_declaration()),
            TokenKind::KeywordReturn => {
                let start = self.here();
                self.advance();
                let value = if self.check(TokenKind::Terminator) { None } else { Some(Box::new(self.parse_expression(0))) };
                self.expect(TokenKind::Terminator);
                BodyItem::Stmt(Stmt::Return(value, start.join(&self.here())))
            }
            TokenKind::KeywordBreak => {
                let start = self.here();
                self.advance();
                let label = self.parse_optional_label_reference();
                self.expect(TokenKind::Terminator);
                BodyItem::Stmt(Stmt::Break(label, start.join(&self.here())))
            }
            TokenKind::KeywordContinue => {
                let start = self.here();
                self.advance();
                let label = self.parse_optional_label_reference();
                self.expect(TokenKind::Terminator);
                BodyItem::Stmt(Stmt::Continue(label, start.join(&self.here())))
            }
            _ => BodyItem::Expr(self.parse_expression(0)),
        }
    }

    fn parse_optional_label_reference(&mut self) -> Option<String> {
        if self.check(TokenKind::Identifier) {
            Some(self.advance().value.unwrap_or_default())
        } else {
            None
        }
    }

    /// Disambiguates `identifier` starting a declaration (`name: Type`,
    /// `name := expr`, `name mut := expr`) from one starting an
    /// expression-statement (`name = expr`, `name(args)`, …).
    fn starts_variable_decl(&self) -> bool {
        matches!(self.peek_kind(1), TokenKind::Colon | TokenKind::ColonEquals)
            || (matches!(self.peek_kind(1), TokenKind::KeywordMut) && matches!(self.peek_kind(2), TokenKind::ColonEquals))
    }

    fn parse_block(&mut self) -> Expr {
        let start = self.here();
        self.expect(TokenKind::BraceLeft);
        let mut statements = Vec::new();
        let mut trailing = None;
        while !self.check(TokenKind::BraceRight) && !self.at_end() {
            match self.parse_variant() {
                BodyItem::Decl(decl) => {
                    let span = decl.span().clone();
                    statements.push(Stmt::Declaration(Box::new(decl), span));
                }
                BodyItem::Stmt(stmt) => statements.push(stmt),
                BodyItem::Expr(expr) => {
                    if self.check(TokenKind::Terminator) {
                        self.advance();
                        let span = expr.span().clone();
                        statements.push(Stmt::Expression(Box::new(expr), span));
                    } else if self.check(TokenKind::BraceRight) {
                        trailing = Some(Box::new(expr));
                        break;
                    } else {
                        let span = expr.span().clone();
                        statements.push(Stmt::Expression(Box::new(expr), span));
                    }
                }
            }
        }
        self.expect(TokenKind::BraceRight);
        let span = start.join(&self.here());
        Expr::Block { statements, trailing, span }
    }

    // ---- Expressions ----------------------------------------------------

    fn parse_expression(&mut self, min_prec: u8) -> Expr {
        let mut left = if let Some((op, prec)) = unary_operator(&self.current().kind) {
            if prec > min_prec {
                let start = self.here();
                self.advance();
                let operand = Box::new(self.parse_expression(prec));
                let span = start.join(operand.span());
                Expr::Unary { op, operand, span }
            } else {
                self.parse_range_expression()
            }
        } else {
            self.parse_range_expression()
        };

        loop {
            let (op, prec, assoc) = match binary_or_assign(&self.current().kind) {
                Some(v) => v,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = prec + if assoc == Assoc::Left { 1 } else { 0 };
            let right = Box::new(self.parse_expression(next_min));
            let span = left.span().join(right.span());
            left = match op {
                ParsedOp::Binary(kind) => Expr::Binary { op: kind, left: Box::new(left), right, span },
                ParsedOp::Assign(kind) => Expr::Assign { op: kind, target: Box::new(left), value: right, span },
            };
        }
        left
    }

    fn parse_range_expression(&mut self) -> Expr {
        let start = self.parse_primary();
        if self.check(TokenKind::RangeSpecifier) {
            self.advance();
            let end = self.parse_primary();
            let span = start.span().join(end.span());
            Expr::Range { start: Box::new(start), end: Box::new(end), span }
        } else {
            start
        }
    }

    /// The modifier chain: postfix `[index]`, `.field`, and `as Type`
    /// bind tighter than any operator.
    fn parse_primary(&mut self) -> Expr {
        let mut expr = self.parse_atom();
        loop {
            match &self.current().kind {
                TokenKind::SquareLeft => {
                    self.advance();
                    let index = Box::new(self.parse_expression(0));
                    self.expect(TokenKind::SquareRight);
                    let span = expr.span().join(&self.here());
                    expr = Expr::Index { base: Box::new(expr), index, span };
                }
                TokenKind::Dot => {
                    self.advance();
                    let field = self.expect_identifier();
                    let span = expr.span().join(&self.here());
                    expr = Expr::Field { base: Box::new(expr), field, span };
                }
                TokenKind::KeywordAs => {
                    self.advance();
                    let target_type = self.parse_type();
                    let span = expr.span().join(&self.here());
                    expr = Expr::As { operand: Box::new(expr), target_type, span };
                }
                TokenKind::Increment | TokenKind::Decrement => {
                    let op = if self.current().kind == TokenKind::Increment { UnOpKind::PostIncrement } else { UnOpKind::PostDecrement };
                    self.advance();
                    let span = expr.span().join(&self.here());
                    expr = Expr::Unary { op, operand: Box::new(expr), span };
                }
                _ => break,
            }
        }
        expr
    }

    fn parse_atom(&mut self) -> Expr {
        let start = self.here();
        match self.current().kind.clone() {
            TokenKind::ParenLeft => {
                self.advance();
                let inner = self.parse_expression(0);
                self.expect(TokenKind::ParenRight);
                inner
            }
            TokenKind::SquareLeft => {
                self.advance();
                let mut items = Vec::new();
                while !self.check(TokenKind::SquareRight) && !self.at_end() {
                    items.push(self.parse_expression(0));
                    if self.check(TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.expect(TokenKind::SquareRight);
                let span = start.join(&self.here());
                Expr::ArrayLiteral { elements: NodeListClause::new(items, span.clone()), span }
            }
            TokenKind::BraceLeft => self.parse_block(),
            TokenKind::KeywordIf => self.parse_if(),
            TokenKind::KeywordWhile => self.parse_while(None),
            TokenKind::KeywordFor => self.parse_for(None),
            TokenKind::KeywordMatch => self.parse_match(),
            TokenKind::Tilde => self.parse_labelled_loop(),
            TokenKind::Identifier => self.parse_identifier_atom(),
            TokenKind::KeywordTrue => {
                self.advance();
                Expr::Literal(LiteralExpr::Bool(true), start)
            }
            TokenKind::KeywordFalse => {
                self.advance();
                Expr::Literal(LiteralExpr::Bool(false), start)
            }
            TokenKind::CharacterLiteral => {
                let token = self.advance();
                let c = token.value.and_then(|v| v.chars().next()).unwrap_or('\0');
                Expr::Literal(LiteralExpr::Character(c), start)
            }
            TokenKind::StringLiteral => {
                let token = self.advance();
                Expr::Literal(LiteralExpr::String(token.value.unwrap_or_default()), start)
            }
            ref kind if is_numeric_literal_kind(kind) => self.parse_numeric_literal(),
            _ => {
                self.diagnostics.error(Stage::Parser, Some(start.clone()), format!("expected an expression, found {:?}", self.current().kind));
                self.advance();
                Expr::Literal(LiteralExpr::Bool(false), start)
            }
        }
    }

    fn parse_numeric_literal(&mut self) -> Expr {
        let token = self.advance();
        let type_name = numeric_type_name(&token.kind);
        if matches!(token.kind, TokenKind::F32Literal | TokenKind::F64Literal) {
            Expr::Literal(LiteralExpr::Float { value: token.value.unwrap_or_default(), type_name }, token.span)
        } else {
            Expr::Literal(
                LiteralExpr::Integer { value: token.value.unwrap_or_default(), base: token.number_base.unwrap_or(crate::tokens::NumberBase::Dec), type_name },
                token.span,
            )
        }
    }

    fn parse_identifier_atom(&mut self) -> Expr {
        let start = self.here();
        let name = self.advance().value.unwrap_or_default();

        if self.check(TokenKind::DoubleColon) {
            self.advance();
            let variant = self.expect_identifier();
            self.expect(TokenKind::ParenLeft);
            let payload = if self.check(TokenKind::ParenRight) {
                Expr::Literal(LiteralExpr::Bool(false), self.here())
            } else {
                self.parse_expression(0)
            };
            self.expect(TokenKind::ParenRight);
            let span = start.join(&self.here());
            return Expr::EnumConstruct { enum_name: name, variant, payload: Box::new(payload), span };
        }

        if self.check(TokenKind::ParenLeft) {
            self.advance();
            let mut items = Vec::new();
            while !self.check(TokenKind::ParenRight) && !self.at_end() {
                items.push(self.parse_expression(0));
                if self.check(TokenKind::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(TokenKind::ParenRight);
            let span = start.join(&self.here());
            return Expr::Call { callee: name, arguments: NodeListClause::new(items, span.clone()), span };
        }

        Expr::Identifier(name, start)
    }

    fn parse_if(&mut self) -> Expr {
        let start = self.here();
        self.advance(); // if
        let condition = Box::new(self.parse_expression(0));
        let then_branch = Box::new(self.parse_block());
        let else_branch = if self.check(TokenKind::KeywordElse) {
            self.advance();
            if self.check(TokenKind::KeywordIf) {
                Some(Box::new(self.parse_if()))
            } else {
                Some(Box::new(self.parse_block()))
            }
        } else {
            None
        };
        let span = start.join(&self.here());
        Expr::If { condition, then_branch, else_branch, span }
    }

    fn parse_labelled_loop(&mut self) -> Expr {
        self.advance(); // ~
        let label = self.expect_identifier();
        match self.current().kind {
            TokenKind::KeywordWhile => self.parse_while(Some(label)),
            TokenKind::KeywordFor => self.parse_for(Some(label)),
            _ => {
                self.diagnostics.error(Stage::Parser, Some(self.here()), "a loop label must prefix 'while' or 'for'");
                self.parse_expression(0)
            }
        }
    }

    /// A loop/if body is any expression, not necessarily a brace-delimited
    /// block — `while true break outer;` is as valid as `while true { … }`.
    /// A brace-free body is whatever single `parse_variant` item follows,
    /// wrapped in an empty-span-free `Block` so the interpreter sees the
    /// same shape it would for a one-statement braced block.
    fn parse_loop_body(&mut self) -> Expr {
        if self.check(TokenKind::BraceLeft) {
            return self.parse_block();
        }
        let start = self.here();
        let (statements, trailing) = match self.parse_variant() {
            BodyItem::Decl(decl) => {
                let span = decl.span().clone();
                (vec![Stmt::Declaration(Box::new(decl), span)], None)
            }
            BodyItem::Stmt(stmt) => (vec![stmt], None),
            BodyItem::Expr(expr) => {
                if self.check(TokenKind::Terminator) {
                    self.advance();
                    let span = expr.span().clone();
                    (vec![Stmt::Expression(Box::new(expr), span)], None)
                } else {
                    (Vec::new(), Some(Box::new(expr)))
                }
            }
        };
        let span = start.join(&self.here());
        Expr::Block { statements, trailing, span }
    }

    fn parse_while(&mut self, label: Option<String>) -> Expr {
        let start = self.here();
        self.advance(); // while
        let condition = Box::new(self.parse_expression(0));
        let body = Box::new(self.parse_loop_body());

        let finally = if self.check(TokenKind::KeywordFinally) {
            self.advance();
            Some(Box::new(self.parse_loop_body()))
        } else {
            None
        };
        let else_branch = if self.check(TokenKind::KeywordElse) {
            self.advance();
            Some(Box::new(self.parse_loop_body()))
        } else {
            None
        };

        let span = start.join(&self.here());
        Expr::While { label, condition, body, finally, else_branch, span }
    }

    fn parse_for(&mut self, label: Option<String>) -> Expr {
        let start = self.here();
        self.advance(); // for

        if matches!(self.current().kind, TokenKind::Identifier) && matches!(self.peek_kind(1), TokenKind::KeywordIn) {
            let binding = self.expect_identifier();
            self.advance(); // in
            let iterable = Box::new(self.parse_expression(0));
            let body = Box::new(self.parse_loop_body());
            let span = start.join(&self.here());
            return Expr::ForRanged { label, binding, iterable, body, span };
        }

        let init = if self.check(TokenKind::Terminator) {
            self.advance();
            None
        } else {
            Some(Box::new(Stmt::Declaration(Box::new(self.parse_variable_decl()), self.here())))
        };
        let test = Box::new(self.parse_expression(0));
        self.expect(TokenKind::Terminator);
        let step = if self.check(TokenKind::BraceLeft) { None } else { Some(Box::new(self.parse_expression(0))) };
        let body = Box::new(self.parse_loop_body());
        let span = start.join(&self.here());
        Expr::ForLegacy { label, init, test, step, body, span }
    }

    fn parse_match(&mut self) -> Expr {
        let start = self.here();
        self.advance(); // match
        let scrutinee = Box::new(self.parse_expression(0));
        self.expect(TokenKind::BraceLeft);
        let mut arms = Vec::new();
        while !self.check(TokenKind::BraceRight) && !self.at_end() {
            let arm_start = self.here();
            let pattern = self.parse_match_pattern();
            self.expect(TokenKind::Arrow);
            let body = Box::new(self.parse_expression(0));
            let span = arm_start.join(&self.here());
            arms.push(MatchArm { pattern, body, span });
            if self.check(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::BraceRight);
        let span = start.join(&self.here());
        Expr::Match { scrutinee, arms, span }
    }

    fn parse_match_pattern(&mut self) -> MatchPattern {
        if self.check(TokenKind::Identifier) && self.current().value.as_deref() == Some("_") {
            self.advance();
            return MatchPattern::Wildcard;
        }
        if self.check(TokenKind::Identifier) {
            let name = self.advance().value.unwrap_or_default();
            if self.check(TokenKind::DoubleColon) {
                self.advance();
                let variant = self.expect_identifier();
                let binding = self.parse_optional_pattern_binding();
                return MatchPattern::EnumVariant { enum_name: Some(name), variant, binding };
            }
            let binding = self.parse_optional_pattern_binding();
            return MatchPattern::EnumVariant { enum_name: None, variant: name, binding };
        }
        match self.parse_atom() {
            Expr::Literal(literal, _) => MatchPattern::Literal(literal),
            _ => MatchPattern::Wildcard,
        }
    }

    fn parse_optional_pattern_binding(&mut self) -> Option<String> {
        if self.check(TokenKind::ParenLeft) {
            self.advance();
            let name = self.expect_identifier();
            self.expect(TokenKind::ParenRight);
            Some(name)
        } else {
            None
        }
    }
}

fn is_numeric_literal_kind(kind: &TokenKind) -> bool {
    use TokenKind::*;
    matches!(kind, I8Literal | I16Literal | I32Literal | I64Literal | U8Literal | U16Literal | U32Literal | U64Literal | F32Literal | F64Literal)
}

fn numeric_type_name(kind: &TokenKind) -> String {
    use TokenKind::*;
    match kind {
        I8Literal => "i8",
        I16Literal => "i16",
        I32Literal => "i32",
        I64Literal => "i64",
        U8Literal => "u8",
        U16Literal => "u16",
        U32Literal => "u32",
        U64Literal => "u64",
        F32Literal => "f32",
        F64Literal => "f64",
        _ => "i32",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::span::SourceMap;

    fn parse(src: &str) -> (Vec<Decl>, Diagnostics) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("<test>", src);
        let mut diagnostics = Diagnostics::new();
        let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
        let decls = parse_program(tokens, &mut diagnostics);
        (decls, diagnostics)
    }

    #[test]
    fn arithmetic_precedence_binds_multiplication_tighter() {
        let (decls, diags) = parse("fn main(): i32 { return 2 + 3 * 4; }");
        assert!(!diags.has_error());
        let body = match &decls[0] {
            Decl::Function { body, .. } => body,
            _ => panic!("expected function"),
        };
        let statements = match body.as_ref() {
            Expr::Block { statements, .. } => statements,
            _ => panic!("expected block"),
        };
        let expr = match &statements[0] {
            Stmt::Return(Some(expr), _) => expr,
            _ => panic!("expected return"),
        };
        let right = match expr.as_ref() {
            Expr::Binary { op: BinOpKind::Add, right, .. } => right,
            _ => panic!("expected addition at the top"),
        };
        assert!(matches!(right.as_ref(), Expr::Binary { op: BinOpKind::Mul, .. }));
    }

    #[test]
    fn assignment_is_right_associative() {
        let (_, diags) = parse("fn main(): i32 { a: mut i32 = 0; a = a + 1; return a; }");
        assert!(!diags.has_error());
    }

    #[test]
    fn labelled_break_parses_with_label_reference() {
        let (decls, diags) = parse("fn main(): i32 { ~outer while true { break outer; } return 7; }");
        assert!(!diags.has_error());
        assert_eq!(decls.len(), 1);
    }

    #[test]
    fn enum_construction_and_match_parse() {
        let (decls, diags) = parse("enum E { A(i32), B(i32) } fn main(): i32 { e := E::A(5); return match e { E::A(n) -> n, E::B(n) -> n }; }");
        assert!(!diags.has_error());
        assert_eq!(decls.len(), 2);
    }
}
