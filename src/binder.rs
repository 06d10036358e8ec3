//! Name resolution and typing (spec.md §4.6), grounded on
//! `examples/original_source/core/src/bound_tree/Binder.cpp`'s scope
//! stack and operator-dispatch approach, re-expressed over the closed
//! `BoundExpr`/`BoundStmt`/`BoundDecl` tagged variants instead of the
//! original's downcast cascade.

use crate::ast::expr::{LiteralExpr, MatchPattern};
use crate::ast::{self, AssignOpKind, BinOpKind, Decl, Expr, Stmt, TypeExpr, UnOpKind};
use crate::bound_tree::operators::{resolve_assignment, resolve_binary, resolve_unary, BoundBinaryOperator, BoundUnaryOperator};
use crate::bound_tree::{is_mutating_unary, BoundDecl, BoundExpr, BoundMatchArm, BoundParameter, BoundPattern, BoundStmt, FunctionId};
use crate::diagnostics::{Diagnostics, Stage};
use crate::span::Span;
use crate::types::{Primitive, Type};
use crate::value::PrimitiveValue;
use std::collections::HashMap;

#[derive(Clone, Debug)]
enum Symbol {
    Variable { ty: Type, mutable: bool },
    Function { id: FunctionId, parameter_types: Vec<Type>, required: usize, return_type: Type },
    External { parameter_types: Vec<Type>, return_type: Type },
    Typename(Type),
}

#[derive(Clone)]
struct FunctionRecord {
    name: String,
    parameters: Vec<BoundParameter>,
    return_type: Type,
    body: Decl,
    substitution: HashMap<String, Type>,
}

struct LabelInfo {
    is_loop: bool,
}

pub struct Binder<'a> {
    diagnostics: &'a mut Diagnostics,
    scopes: Vec<HashMap<String, Symbol>>,
    labels: Vec<HashMap<String, LabelInfo>>,
    in_function: bool,
    current_return_type: Option<Type>,
    in_loop: bool,
    next_function_id: usize,
    generic_templates: HashMap<String, Decl>,
    instance_cache: HashMap<(String, Vec<Type>), (FunctionId, Vec<Type>, Type)>,
    instance_records: Vec<(FunctionId, FunctionRecord)>,
    type_substitution: Vec<HashMap<String, Type>>,
}

pub struct BoundProgram {
    pub declarations: Vec<BoundDecl>,
}

pub fn bind_program(decls: Vec<Decl>, diagnostics: &mut Diagnostics) -> BoundProgram {
    let mut binder = Binder {
        diagnostics,
        scopes: vec![HashMap::new()],
        labels: Vec::new(),
        in_function: false,
        current_return_type: None,
        in_loop: false,
        next_function_id: 0,
        generic_templates: HashMap::new(),
        instance_cache: HashMap::new(),
        instance_records: Vec::new(),
        type_substitution: Vec::new(),
    };
    binder.register_signatures(&decls);
    let mut bound = Vec::new();
    for decl in &decls {
        if let Decl::Function { generics, .. } = decl {
            if !generics.is_empty() {
                continue;
            }
        }
        bound.push(binder.bind_top_level_decl(decl));
    }
    for (id, record) in std::mem::take(&mut binder.instance_records) {
        bound.push(binder.finish_generic_instance(id, record));
    }
    BoundProgram { declarations: bound }
}

impl<'a> Binder<'a> {
    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, symbol: Symbol, span: &Span) {
        let scope = self.scopes.last_mut().unwrap();
        if scope.contains_key(name) {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("'{}' is already declared in this scope", name));
            return;
        }
        scope.insert(name.to_string(), symbol);
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn resolve_type_expr(&mut self, type_expr: &TypeExpr) -> Type {
        match type_expr {
            TypeExpr::Mutable(inner) => self.resolve_type_expr(inner).as_mutable(),
            TypeExpr::Array { base, count } => {
                let base = self.resolve_type_expr(base);
                Type::array(base, count.map(|c| c as usize))
            }
            TypeExpr::Named(name) => {
                if let Some(frame) = self.type_substitution.last() {
                    if let Some(ty) = frame.get(name) {
                        return ty.clone();
                    }
                }
                if let Some(primitive) = primitive_from_name(name) {
                    return Type::primitive(primitive);
                }
                match self.lookup(name) {
                    Some(Symbol::Typename(ty)) => ty.clone(),
                    _ => {
                        self.diagnostics.error(Stage::Abt, None, format!("unknown type '{}'", name));
                        Type::void()
                    }
                }
            }
        }
    }

    fn register_signatures(&mut self, decls: &[Decl]) {
        for decl in decls {
            match decl {
                Decl::Struct { name, fields, span } => {
                    let resolved_fields = fields.iter().map(|f| (self.resolve_type_expr(&f.type_annotation), f.name.clone())).collect();
                    let ty = Type::structure(resolved_fields);
                    self.declare(name, Symbol::Typename(ty), span);
                }
                Decl::Enum { name, variants, span } => {
                    let resolved = variants.iter().map(|v| (v.name.clone(), self.resolve_type_expr(&v.payload_type))).collect();
                    let ty = Type::enumeration(resolved);
                    self.declare(name, Symbol::Typename(ty), span);
                }
                _ => {}
            }
        }
        for decl in decls {
            match decl {
                Decl::External { name, parameter_types, return_type, span } => {
                    let parameter_types = parameter_types.iter().map(|t| self.resolve_type_expr(t)).collect();
                    let return_type = self.resolve_type_expr(return_type);
                    self.declare(name, Symbol::External { parameter_types, return_type }, span);
                }
                Decl::Function { name, generics, parameters, return_type, span, .. } => {
                    if !generics.is_empty() {
                        self.generic_templates.insert(name.clone(), decl.clone());
                        continue;
                    }
                    self.validate_default_suffix(parameters);
                    let parameter_types: Vec<Type> = parameters.iter().map(|p| self.resolve_type_expr(&p.type_annotation)).collect();
                    let required = parameters.iter().take_while(|p| p.default_value.is_none()).count();
                    let return_type = return_type.as_ref().map(|t| self.resolve_type_expr(t)).unwrap_or_else(Type::void);
                    let id = FunctionId(self.next_function_id);
                    self.next_function_id += 1;
                    self.declare(name, Symbol::Function { id, parameter_types, required, return_type }, span);
                }
                _ => {}
            }
        }
    }

    fn validate_default_suffix(&mut self, parameters: &[ast::decl::Param]) {
        let mut seen_default = false;
        for param in parameters {
            if param.default_value.is_some() {
                seen_default = true;
            } else if seen_default {
                self.diagnostics.error(Stage::Abt, Some(param.span.clone()), "a non-default argument cannot follow a default argument");
            }
        }
    }

    fn bind_top_level_decl(&mut self, decl: &Decl) -> BoundDecl {
        match decl {
            Decl::Variable { name, type_annotation, mutable, value, span } => self.bind_variable_decl(name, type_annotation.as_ref(), *mutable, value.as_deref(), span),
            Decl::Function { name, parameters, return_type, body, span, .. } => {
                let symbol = self.lookup(name).cloned();
                let (id, parameter_types, required, return_ty) = match symbol {
                    Some(Symbol::Function { id, parameter_types, required, return_type }) => (id, parameter_types, required, return_type),
                    _ => unreachable!("function signatures are registered before binding"),
                };
                self.bind_function_decl(name.clone(), id, parameters, &parameter_types, required, return_ty, body, span)
            }
            Decl::External { name, parameter_types, return_type, span } => {
                let parameter_types = parameter_types.iter().map(|t| self.resolve_type_expr(t)).collect();
                let return_type = self.resolve_type_expr(return_type);
                BoundDecl::External { name: name.clone(), parameter_types, return_type, span: span.clone() }
            }
            Decl::Struct { name, fields, span } => {
                let fields = match self.lookup(name) {
                    Some(Symbol::Typename(Type { kind: crate::types::TypeKind::Structure(fields), .. })) => fields.iter().map(|(ty, n)| (n.clone(), ty.clone())).collect(),
                    _ => fields.iter().map(|f| (f.name.clone(), self.resolve_type_expr(&f.type_annotation))).collect(),
                };
                BoundDecl::Struct { name: name.clone(), fields, span: span.clone() }
            }
            Decl::Enum { name, variants, span } => {
                let variants = variants.iter().map(|v| (v.name.clone(), self.resolve_type_expr(&v.payload_type))).collect();
                BoundDecl::Enum { name: name.clone(), variants, span: span.clone() }
            }
        }
    }

    fn bind_variable_decl(&mut self, name: &str, type_annotation: Option<&TypeExpr>, mutable: bool, value: Option<&Expr>, span: &Span) -> BoundDecl {
        let declared_type = type_annotation.map(|t| self.resolve_type_expr(t));
        let bound_value = value.map(|v| self.bind_expr(v));

        let ty = match (&declared_type, &bound_value) {
            (Some(declared), Some(value)) => {
                if !value.ty().is_assignable_to(declared) {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("value of type '{}' is not assignable to declared type '{}'", value.ty(), declared));
                }
                declared.clone()
            }
            (Some(declared), None) => {
                if !mutable {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), "a non-mutable declaration requires a value");
                }
                declared.clone()
            }
            (None, Some(value)) => value.ty(),
            (None, None) => {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), "cannot infer the type of a declaration with no value");
                Type::void()
            }
        };
        let ty = if mutable { ty.as_mutable() } else { ty };
        self.declare(name, Symbol::Variable { ty: ty.clone(), mutable }, span);
        BoundDecl::Variable { name: name.to_string(), ty, value: bound_value, span: span.clone() }
    }

    fn bind_function_decl(
        &mut self,
        name: String,
        id: FunctionId,
        parameters: &[ast::decl::Param],
        parameter_types: &[Type],
        _required: usize,
        return_type: Type,
        body: &Expr,
        span: &Span,
    ) -> BoundDecl {
        self.push_scope();
        let was_in_function = self.in_function;
        let previous_return_type = self.current_return_type.take();
        self.in_function = true;
        self.current_return_type = Some(return_type.clone());

        let mut bound_parameters = Vec::with_capacity(parameters.len());
        for (param, ty) in parameters.iter().zip(parameter_types.iter()) {
            let default_value = param.default_value.as_deref().map(|e| self.bind_expr(e));
            self.declare(&param.name, Symbol::Variable { ty: ty.clone(), mutable: false }, &param.span);
            bound_parameters.push(BoundParameter { name: param.name.clone(), ty: ty.clone(), default_value });
        }

        let bound_body = self.bind_expr(body);
        if !bound_body.ty().is_assignable_to(&return_type) && !bound_body.is_invalid() {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("function body of type '{}' is not assignable to declared return type '{}'", bound_body.ty(), return_type));
        }

        self.in_function = was_in_function;
        self.current_return_type = previous_return_type;
        self.pop_scope();

        BoundDecl::Function { id, name, parameters: bound_parameters, return_type, body: bound_body, span: span.clone() }
    }

    /// Binds a monomorphised generic instance's body: declares its
    /// concrete-typed parameters into a fresh scope before walking the
    /// body, the step the naive cache-and-replay approach first missed.
    fn finish_generic_instance(&mut self, id: FunctionId, record: FunctionRecord) -> BoundDecl {
        let (body_expr, span) = match &record.body {
            Decl::Function { body, span, .. } => (body.as_ref().clone(), span.clone()),
            _ => unreachable!("generic instance records always wrap a Decl::Function template"),
        };

        self.push_scope();
        self.type_substitution.push(record.substitution.clone());
        let was_in_function = self.in_function;
        let previous_return_type = self.current_return_type.take();
        self.in_function = true;
        self.current_return_type = Some(record.return_type.clone());

        for param in &record.parameters {
            self.declare(&param.name, Symbol::Variable { ty: param.ty.clone(), mutable: false }, &span);
        }

        let bound_body = self.bind_expr(&body_expr);
        if !bound_body.ty().is_assignable_to(&record.return_type) && !bound_body.is_invalid() {
            self.diagnostics.error(
                Stage::Abt,
                Some(span.clone()),
                format!("function body of type '{}' is not assignable to declared return type '{}'", bound_body.ty(), record.return_type),
            );
        }

        self.in_function = was_in_function;
        self.current_return_type = previous_return_type;
        self.type_substitution.pop();
        self.pop_scope();

        BoundDecl::Function { id, name: record.name, parameters: record.parameters, return_type: record.return_type, body: bound_body, span }
    }

    fn bind_stmt(&mut self, stmt: &Stmt) -> BoundStmt {
        match stmt {
            Stmt::Expression(expr, _) => BoundStmt::Expression(self.bind_expr(expr)),
            Stmt::Declaration(decl, span) => match decl.as_ref() {
                Decl::Variable { name, type_annotation, mutable, value, .. } => {
                    BoundStmt::Declaration(self.bind_variable_decl(name, type_annotation.as_ref(), *mutable, value.as_deref(), span))
                }
                other => BoundStmt::Declaration(self.bind_top_level_decl(other)),
            },
            Stmt::Return(value, span) => {
                if !self.in_function {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), "'return' outside of a function");
                }
                let bound_value = value.as_deref().map(|e| self.bind_expr(e));
                if let (Some(value), Some(expected)) = (&bound_value, &self.current_return_type) {
                    if !value.ty().is_assignable_to(expected) {
                        self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("returned type '{}' is not assignable to function return type '{}'", value.ty(), expected));
                    }
                }
                BoundStmt::Return(bound_value, span.clone())
            }
            Stmt::Break(label, span) => {
                self.check_flow_target(label.as_deref(), span);
                BoundStmt::Break(label.clone(), span.clone())
            }
            Stmt::Continue(label, span) => {
                self.check_flow_target(label.as_deref(), span);
                BoundStmt::Continue(label.clone(), span.clone())
            }
        }
    }

    fn check_flow_target(&mut self, label: Option<&str>, span: &Span) {
        if !self.in_loop {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), "'break'/'continue' outside of a loop");
            return;
        }
        if let Some(label) = label {
            if !self.labels.iter().any(|scope| scope.get(label).map(|l| l.is_loop).unwrap_or(false)) {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("label '{}' does not name an enclosing loop", label));
            }
        }
    }

    fn push_label(&mut self, label: &Option<String>, span: &Span) {
        let mut scope = HashMap::new();
        if let Some(label) = label {
            if self.labels.iter().any(|s| s.contains_key(label)) {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("label '{}' shadows an outer label of the same name", label));
            }
            scope.insert(label.clone(), LabelInfo { is_loop: true });
        }
        self.labels.push(scope);
    }

    fn pop_label(&mut self) {
        self.labels.pop();
    }

    fn bind_expr(&mut self, expr: &Expr) -> BoundExpr {
        match expr {
            Expr::Literal(literal, span) => self.bind_literal(literal, span),
            Expr::Identifier(name, span) => match self.lookup(name) {
                Some(Symbol::Variable { ty, .. }) => BoundExpr::Variable(name.clone(), ty.clone(), span.clone()),
                Some(_) => {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("'{}' does not name a variable", name));
                    BoundExpr::Invalid(span.clone())
                }
                None => {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("use of undeclared identifier '{}'", name));
                    BoundExpr::Invalid(span.clone())
                }
            },
            Expr::Binary { op, left, right, span } => self.bind_binary(*op, left, right, span),
            Expr::Unary { op, operand, span } => self.bind_unary(*op, operand, span),
            Expr::Assign { op, target, value, span } => self.bind_assign(*op, target, value, span),
            Expr::Index { base, index, span } => self.bind_index(base, index, span),
            Expr::Field { base, field, span } => self.bind_field(base, field, span),
            Expr::Call { callee, arguments, span } => self.bind_call(callee, &arguments.items, span),
            Expr::ArrayLiteral { elements, span } => self.bind_array_literal(&elements.items, span),
            Expr::Range { start, end, span } => self.bind_range(start, end, span),
            Expr::As { operand, target_type, span } => self.bind_as(operand, target_type, span),
            Expr::Block { statements, trailing, span } => self.bind_block(statements, trailing.as_deref(), span),
            Expr::If { condition, then_branch, else_branch, span } => self.bind_if(condition, then_branch, else_branch.as_deref(), span),
            Expr::While { label, condition, body, finally, else_branch, span } => {
                self.bind_while(label, condition, body, finally.as_deref(), else_branch.as_deref(), span)
            }
            Expr::ForLegacy { label, init, test, step, body, span } => self.bind_for_legacy(label, init.as_deref(), test, step.as_deref(), body, span),
            Expr::ForRanged { label, binding, iterable, body, span } => self.bind_for_ranged(label, binding, iterable, body, span),
            Expr::Match { scrutinee, arms, span } => self.bind_match(scrutinee, arms, span),
            Expr::EnumConstruct { enum_name, variant, payload, span } => self.bind_enum_construct(enum_name, variant, payload, span),
        }
    }

    fn bind_literal(&mut self, literal: &LiteralExpr, span: &Span) -> BoundExpr {
        match literal {
            LiteralExpr::Bool(b) => BoundExpr::Literal(PrimitiveValue::Bool(*b), Type::primitive(Primitive::Bool), span.clone()),
            LiteralExpr::Character(c) => BoundExpr::Literal(PrimitiveValue::Char(*c), Type::primitive(Primitive::Char), span.clone()),
            LiteralExpr::String(s) => BoundExpr::Literal(PrimitiveValue::String(s.clone()), Type::primitive(Primitive::String), span.clone()),
            LiteralExpr::Float { value, type_name } => {
                let primitive = primitive_from_name(type_name).unwrap_or(Primitive::F32);
                let parsed: f64 = value.parse().unwrap_or(0.0);
                let raw = if primitive == Primitive::F64 { PrimitiveValue::F64(parsed) } else { PrimitiveValue::F32(parsed as f32) };
                BoundExpr::Literal(raw, Type::primitive(primitive), span.clone())
            }
            LiteralExpr::Integer { value, base, type_name } => {
                let radix = match base {
                    crate::tokens::NumberBase::Dec => 10,
                    crate::tokens::NumberBase::Hex => 16,
                    crate::tokens::NumberBase::Bin => 2,
                };
                let primitive = primitive_from_name(type_name).unwrap_or(Primitive::I32);
                let parsed = i128::from_str_radix(value, radix).unwrap_or(0);
                let raw = integer_literal_value(primitive, parsed);
                BoundExpr::Literal(raw, Type::primitive(primitive), span.clone())
            }
        }
    }

    fn bind_binary(&mut self, op: BinOpKind, left: &Expr, right: &Expr, span: &Span) -> BoundExpr {
        let left = self.bind_expr(left);
        let right = self.bind_expr(right);
        if left.is_invalid() || right.is_invalid() {
            return BoundExpr::Invalid(span.clone());
        }
        match resolve_binary(op, &left.ty(), &right.ty()) {
            Some(return_type) => BoundExpr::Binary {
                operator: BoundBinaryOperator { kind: op, left_type: left.ty(), right_type: right.ty(), return_type },
                left: Box::new(left),
                right: Box::new(right),
                span: span.clone(),
            },
            None => {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("undefined operator '{:?}' for '{}' and '{}'", op, left.ty(), right.ty()));
                BoundExpr::Invalid(span.clone())
            }
        }
    }

    fn bind_unary(&mut self, op: UnOpKind, operand: &Expr, span: &Span) -> BoundExpr {
        if is_mutating_unary(op) {
            self.require_lvalue(operand);
        }
        let operand = self.bind_expr(operand);
        if operand.is_invalid() {
            return BoundExpr::Invalid(span.clone());
        }
        match resolve_unary(op, &operand.ty()) {
            Some(return_type) => BoundExpr::Unary {
                operator: BoundUnaryOperator { kind: op, operand_type: operand.ty(), return_type },
                operand: Box::new(operand),
                span: span.clone(),
            },
            None => {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("undefined unary operator '{:?}' for '{}'", op, operand.ty()));
                BoundExpr::Invalid(span.clone())
            }
        }
    }

    fn require_lvalue(&mut self, expr: &Expr) {
        if !matches!(expr, Expr::Identifier(..) | Expr::Index { .. } | Expr::Field { .. }) {
            self.diagnostics.error(Stage::Abt, Some(expr.span().clone()), "operand must be an identifier, index, or field access");
        }
    }

    fn bind_assign(&mut self, op: AssignOpKind, target: &Expr, value: &Expr, span: &Span) -> BoundExpr {
        self.require_lvalue(target);
        let target = self.bind_expr(target);
        let value = self.bind_expr(value);
        if target.is_invalid() || value.is_invalid() {
            return BoundExpr::Invalid(span.clone());
        }
        if !target.ty().is_mutable {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), "cannot assign to immutable storage");
        }
        match resolve_assignment(op, &target.ty(), &value.ty()) {
            Some(ty) => BoundExpr::Assign { op, target: Box::new(target), value: Box::new(value), ty, span: span.clone() },
            None => {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("cannot assign '{}' to '{}'", value.ty(), target.ty()));
                BoundExpr::Invalid(span.clone())
            }
        }
    }

    fn bind_index(&mut self, base: &Expr, index: &Expr, span: &Span) -> BoundExpr {
        let base = self.bind_expr(base);
        let index = self.bind_expr(index);
        if base.is_invalid() {
            return BoundExpr::Invalid(span.clone());
        }
        if index.ty().as_primitive().map(|p| !p.is_integral()).unwrap_or(true) {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), "array index must be an integral type");
        }
        match &base.ty().kind {
            crate::types::TypeKind::Array(array) => {
                let element_type = (*array.base).clone();
                BoundExpr::Index { base: Box::new(base), index: Box::new(index), element_type, span: span.clone() }
            }
            _ => {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("cannot index into a value of type '{}'", base.ty()));
                BoundExpr::Invalid(span.clone())
            }
        }
    }

    fn bind_field(&mut self, base: &Expr, field: &str, span: &Span) -> BoundExpr {
        let base = self.bind_expr(base);
        if base.is_invalid() {
            return BoundExpr::Invalid(span.clone());
        }
        match &base.ty().kind {
            crate::types::TypeKind::Structure(fields) => match fields.iter().find(|(_, name)| name == field) {
                Some((ty, _)) => {
                    let field_type = ty.clone();
                    BoundExpr::Field { base: Box::new(base), field: field.to_string(), field_type, span: span.clone() }
                }
                None => {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("no field '{}' on '{}'", field, base.ty()));
                    BoundExpr::Invalid(span.clone())
                }
            },
            _ => {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("cannot access a field on a value of type '{}'", base.ty()));
                BoundExpr::Invalid(span.clone())
            }
        }
    }

    fn bind_call(&mut self, callee: &str, arguments: &[Expr], span: &Span) -> BoundExpr {
        if let Some(template) = self.generic_templates.get(callee).cloned() {
            return self.bind_generic_call(callee, &template, arguments, span);
        }

        let symbol = self.lookup(callee).cloned();
        match symbol {
            Some(Symbol::Function { id, parameter_types, required, return_type }) => {
                self.bind_ordinary_call(id, callee, &parameter_types, required, return_type, arguments, span)
            }
            Some(Symbol::External { parameter_types, return_type }) => self.bind_external_call(callee, &parameter_types, return_type, arguments, span, true),
            _ => match internal_function_signature(callee) {
                Some((parameter_types, return_type)) => self.bind_external_call(callee, &parameter_types, return_type, arguments, span, false),
                None => {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("call to undeclared function '{}'", callee));
                    BoundExpr::Invalid(span.clone())
                }
            },
        }
    }

    fn bind_ordinary_call(&mut self, id: FunctionId, name: &str, parameter_types: &[Type], required: usize, return_type: Type, arguments: &[Expr], span: &Span) -> BoundExpr {
        let bound_arguments: Vec<BoundExpr> = arguments.iter().map(|a| self.bind_expr(a)).collect();
        if bound_arguments.len() < required || bound_arguments.len() > parameter_types.len() {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("'{}' expects {}..{} arguments, found {}", name, required, parameter_types.len(), bound_arguments.len()));
            return BoundExpr::Invalid(span.clone());
        }
        for (argument, parameter_type) in bound_arguments.iter().zip(parameter_types.iter()) {
            if !argument.is_invalid() && !argument.ty().is_compatible(parameter_type) {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("argument of type '{}' is not compatible with parameter type '{}'", argument.ty(), parameter_type));
            }
        }
        BoundExpr::Call { function: id, name: name.to_string(), arguments: bound_arguments, return_type, span: span.clone() }
    }

    fn bind_external_call(&mut self, name: &str, parameter_types: &[Type], return_type: Type, arguments: &[Expr], span: &Span, exact_arity: bool) -> BoundExpr {
        let bound_arguments: Vec<BoundExpr> = arguments.iter().map(|a| self.bind_expr(a)).collect();
        let arity_ok = if exact_arity { bound_arguments.len() == parameter_types.len() } else { bound_arguments.len() <= parameter_types.len() };
        if !arity_ok {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("'{}' expects {} arguments, found {}", name, parameter_types.len(), bound_arguments.len()));
            return BoundExpr::Invalid(span.clone());
        }
        for (argument, parameter_type) in bound_arguments.iter().zip(parameter_types.iter()) {
            if !argument.is_invalid() && !argument.ty().is_compatible(parameter_type) {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("argument of type '{}' is not compatible with parameter type '{}'", argument.ty(), parameter_type));
            }
        }
        BoundExpr::ExternalCall { name: name.to_string(), arguments: bound_arguments, return_type, span: span.clone() }
    }

    fn bind_generic_call(&mut self, callee: &str, template: &Decl, arguments: &[Expr], span: &Span) -> BoundExpr {
        let (generics, parameters, return_type_expr, body) = match template {
            Decl::Function { generics, parameters, return_type, body, .. } => (generics, parameters, return_type, body),
            _ => unreachable!(),
        };

        let bound_arguments: Vec<BoundExpr> = arguments.iter().map(|a| self.bind_expr(a)).collect();

        let mut substitution = HashMap::new();
        for (param, argument) in parameters.iter().zip(bound_arguments.iter()) {
            if let TypeExpr::Named(name) = &param.type_annotation {
                if generics.contains(name) && !substitution.contains_key(name) {
                    substitution.insert(name.clone(), argument.ty());
                }
            }
        }
        if substitution.len() != generics.len() {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("could not deduce all type parameters of generic function '{}'", callee));
            return BoundExpr::Invalid(span.clone());
        }

        let _ = body;
        let concrete_types: Vec<Type> = generics.iter().map(|g| substitution.get(g).cloned().unwrap_or_else(Type::void)).collect();
        let instance_key = (callee.to_string(), concrete_types);
        if let Some((id, parameter_types, return_type)) = self.instance_cache.get(&instance_key).cloned() {
            for (argument, parameter_type) in bound_arguments.iter().zip(parameter_types.iter()) {
                if !argument.is_invalid() && !argument.ty().is_compatible(parameter_type) {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("argument of type '{}' is not compatible with parameter type '{}'", argument.ty(), parameter_type));
                }
            }
            return BoundExpr::Call { function: id, name: callee.to_string(), arguments: bound_arguments, return_type, span: span.clone() };
        }

        self.type_substitution.push(substitution.clone());
        let parameter_types: Vec<Type> = parameters.iter().map(|p| self.resolve_type_expr(&p.type_annotation)).collect();
        let return_type = return_type_expr.as_ref().map(|t| self.resolve_type_expr(t)).unwrap_or_else(Type::void);
        self.type_substitution.pop();

        let id = FunctionId(self.next_function_id);
        self.next_function_id += 1;
        self.instance_cache.insert(instance_key, (id, parameter_types.clone(), return_type.clone()));

        let bound_parameters: Vec<BoundParameter> =
            parameters.iter().zip(parameter_types.iter()).map(|(p, ty)| BoundParameter { name: p.name.clone(), ty: ty.clone(), default_value: None }).collect();

        self.instance_records.push((
            id,
            FunctionRecord { name: callee.to_string(), parameters: bound_parameters, return_type: return_type.clone(), body: template.clone(), substitution },
        ));

        for (argument, parameter_type) in bound_arguments.iter().zip(parameter_types.iter()) {
            if !argument.is_invalid() && !argument.ty().is_compatible(parameter_type) {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("argument of type '{}' is not compatible with parameter type '{}'", argument.ty(), parameter_type));
            }
        }

        BoundExpr::Call { function: id, name: callee.to_string(), arguments: bound_arguments, return_type, span: span.clone() }
    }

    fn bind_array_literal(&mut self, elements: &[Expr], span: &Span) -> BoundExpr {
        let bound: Vec<BoundExpr> = elements.iter().map(|e| self.bind_expr(e)).collect();
        let element_type = bound.first().map(|e| e.ty()).unwrap_or_else(Type::void);
        for element in &bound {
            if !element.is_invalid() && !element.ty().is_compatible(&element_type) {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), "array elements must share a common type");
            }
        }
        let count = bound.len();
        let ty = Type::array(element_type, Some(count));
        BoundExpr::ArrayLiteral { elements: bound, ty, span: span.clone() }
    }

    fn bind_range(&mut self, start: &Expr, end: &Expr, span: &Span) -> BoundExpr {
        let start = self.bind_expr(start);
        let end = self.bind_expr(end);
        let element_type = start.ty();
        if !start.is_invalid() && !end.is_invalid() && start.ty() != end.ty() {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), "range endpoints must share the same type");
        }
        BoundExpr::Range { start: Box::new(start), end: Box::new(end), element_type, span: span.clone() }
    }

    fn bind_as(&mut self, operand: &Expr, target_type: &TypeExpr, span: &Span) -> BoundExpr {
        let operand = self.bind_expr(operand);
        let target_type = self.resolve_type_expr(target_type);
        BoundExpr::As { operand: Box::new(operand), target_type, span: span.clone() }
    }

    fn bind_block(&mut self, statements: &[Stmt], trailing: Option<&Expr>, span: &Span) -> BoundExpr {
        self.push_scope();
        let bound_statements = statements.iter().map(|s| self.bind_stmt(s)).collect();
        let bound_trailing = trailing.map(|e| Box::new(self.bind_expr(e)));
        self.pop_scope();
        let ty = bound_trailing.as_ref().map(|e| e.ty()).unwrap_or_else(Type::void);
        BoundExpr::Block { statements: bound_statements, trailing: bound_trailing, ty, span: span.clone() }
    }

    fn bind_if(&mut self, condition: &Expr, then_branch: &Expr, else_branch: Option<&Expr>, span: &Span) -> BoundExpr {
        let condition = self.bind_expr(condition);
        if !condition.is_invalid() && condition.ty().as_primitive() != Some(Primitive::Bool) {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), "'if' condition must be bool");
        }
        let then_branch = self.bind_expr(then_branch);
        let else_branch = else_branch.map(|e| Box::new(self.bind_expr(e)));
        let ty = match &else_branch {
            Some(else_branch) if then_branch.ty() == else_branch.ty() => then_branch.ty(),
            Some(_) => Type::void(),
            None => Type::void(),
        };
        BoundExpr::If { condition: Box::new(condition), then_branch: Box::new(then_branch), else_branch, ty, span: span.clone() }
    }

    fn bind_while(
        &mut self,
        label: &Option<String>,
        condition: &Expr,
        body: &Expr,
        finally: Option<&Expr>,
        else_branch: Option<&Expr>,
        span: &Span,
    ) -> BoundExpr {
        self.push_label(label, span);
        let was_in_loop = self.in_loop;
        self.in_loop = true;
        let condition = self.bind_expr(condition);
        if !condition.is_invalid() && condition.ty().as_primitive() != Some(Primitive::Bool) {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), "'while' condition must be bool");
        }
        let body = self.bind_expr(body);
        self.in_loop = was_in_loop;
        self.pop_label();
        // `finally`/`else` are evaluated after the loop exits, never while it's looping.
        let finally = finally.map(|e| Box::new(self.bind_expr(e)));
        let else_branch = else_branch.map(|e| Box::new(self.bind_expr(e)));
        BoundExpr::While { label: label.clone(), condition: Box::new(condition), body: Box::new(body), finally, else_branch, span: span.clone() }
    }

    fn bind_for_legacy(&mut self, label: &Option<String>, init: Option<&Stmt>, test: &Expr, step: Option<&Expr>, body: &Expr, span: &Span) -> BoundExpr {
        self.push_scope();
        self.push_label(label, span);
        let was_in_loop = self.in_loop;
        self.in_loop = true;
        let init = init.map(|s| Box::new(self.bind_stmt(s)));
        let test = self.bind_expr(test);
        if !test.is_invalid() && test.ty().as_primitive() != Some(Primitive::Bool) {
            self.diagnostics.error(Stage::Abt, Some(span.clone()), "'for' test must be bool");
        }
        let step = step.map(|e| Box::new(self.bind_expr(e)));
        let body = self.bind_expr(body);
        self.in_loop = was_in_loop;
        self.pop_label();
        self.pop_scope();
        BoundExpr::ForLegacy { label: label.clone(), init, test: Box::new(test), step, body: Box::new(body), span: span.clone() }
    }

    fn bind_for_ranged(&mut self, label: &Option<String>, binding: &str, iterable: &Expr, body: &Expr, span: &Span) -> BoundExpr {
        let iterable = self.bind_expr(iterable);
        let binding_type = match &iterable.ty().kind {
            crate::types::TypeKind::Array(array) => (*array.base).clone(),
            crate::types::TypeKind::Structure(fields) if fields.len() == 2 => iterable.ty(),
            _ if iterable.ty().as_primitive() == Some(Primitive::String) => Type::primitive(Primitive::Char),
            _ => {
                if !iterable.is_invalid() {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), "'for ... in' requires a string, array, or range");
                }
                Type::void()
            }
        };
        self.push_scope();
        self.push_label(label, span);
        let was_in_loop = self.in_loop;
        self.in_loop = true;
        self.declare(binding, Symbol::Variable { ty: binding_type.clone(), mutable: false }, span);
        let body = self.bind_expr(body);
        self.in_loop = was_in_loop;
        self.pop_label();
        self.pop_scope();
        BoundExpr::ForRanged { label: label.clone(), binding: binding.to_string(), binding_type, iterable: Box::new(iterable), body: Box::new(body), span: span.clone() }
    }

    fn bind_match(&mut self, scrutinee: &Expr, arms: &[crate::ast::expr::MatchArm], span: &Span) -> BoundExpr {
        let scrutinee = self.bind_expr(scrutinee);
        let enum_variants: Vec<(String, Type)> = match &scrutinee.ty().kind {
            crate::types::TypeKind::Enumeration(variants) => variants.clone(),
            _ => Vec::new(),
        };

        let mut bound_arms = Vec::with_capacity(arms.len());
        for arm in arms {
            self.push_scope();
            let (pattern, binding, payload_type) = match &arm.pattern {
                MatchPattern::EnumVariant { variant, binding, .. } => {
                    let index = enum_variants.iter().position(|(name, _)| name == variant).unwrap_or(0);
                    let payload_type = enum_variants.get(index).map(|(_, ty)| ty.clone()).unwrap_or_else(Type::void);
                    if enum_variants.iter().all(|(name, _)| name != variant) {
                        self.diagnostics.error(Stage::Abt, Some(arm.span.clone()), format!("'{}' is not a variant of this enumeration", variant));
                    }
                    (BoundPattern::EnumVariant { variant: variant.clone(), variant_index: index }, binding.clone(), Some(payload_type))
                }
                MatchPattern::Literal(literal) => {
                    let bound = self.bind_literal(literal, &arm.span);
                    let value = match bound {
                        BoundExpr::Literal(value, ..) => value,
                        _ => PrimitiveValue::Invalid,
                    };
                    (BoundPattern::Literal(value), None, None)
                }
                MatchPattern::Wildcard => (BoundPattern::Wildcard, None, None),
            };
            if let (Some(name), Some(ty)) = (&binding, payload_type) {
                self.declare(name, Symbol::Variable { ty, mutable: false }, &arm.span);
            }
            let body = self.bind_expr(&arm.body);
            self.pop_scope();
            bound_arms.push(BoundMatchArm { pattern, binding, body: Box::new(body), span: arm.span.clone() });
        }

        let ty = unify_arm_types(&bound_arms);
        BoundExpr::Match { scrutinee: Box::new(scrutinee), arms: bound_arms, ty, span: span.clone() }
    }

    fn bind_enum_construct(&mut self, enum_name: &str, variant: &str, payload: &Expr, span: &Span) -> BoundExpr {
        let payload = self.bind_expr(payload);
        match self.lookup(enum_name).cloned() {
            Some(Symbol::Typename(ty)) => match &ty.kind {
                crate::types::TypeKind::Enumeration(variants) => match variants.iter().position(|(name, _)| name == variant) {
                    Some(index) => {
                        let (_, payload_type) = &variants[index];
                        if !payload.is_invalid() && !payload.ty().is_compatible(payload_type) {
                            self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("payload of type '{}' is not compatible with variant payload type '{}'", payload.ty(), payload_type));
                        }
                        BoundExpr::EnumConstruct { enum_name: enum_name.to_string(), variant: variant.to_string(), variant_index: index, payload: Box::new(payload), ty, span: span.clone() }
                    }
                    None => {
                        self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("'{}' is not a variant of '{}'", variant, enum_name));
                        BoundExpr::Invalid(span.clone())
                    }
                },
                _ => {
                    self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("'{}' is not an enumeration", enum_name));
                    BoundExpr::Invalid(span.clone())
                }
            },
            _ => {
                self.diagnostics.error(Stage::Abt, Some(span.clone()), format!("use of undeclared type '{}'", enum_name));
                BoundExpr::Invalid(span.clone())
            }
        }
    }
}

fn unify_arm_types(arms: &[BoundMatchArm]) -> Type {
    let mut iter = arms.iter().map(|arm| arm.body.ty());
    let first = match iter.next() {
        Some(ty) => ty,
        None => return Type::void(),
    };
    if iter.all(|ty| ty == first) {
        first
    } else {
        Type::void()
    }
}

pub fn primitive_from_name(name: &str) -> Option<Primitive> {
    Some(match name {
        "u8" => Primitive::U8,
        "u16" => Primitive::U16,
        "u32" => Primitive::U32,
        "u64" => Primitive::U64,
        "i8" => Primitive::I8,
        "i16" => Primitive::I16,
        "i32" => Primitive::I32,
        "i64" => Primitive::I64,
        "f32" => Primitive::F32,
        "f64" => Primitive::F64,
        "string" => Primitive::String,
        "type" => Primitive::TypeValue,
        "char" => Primitive::Char,
        "bool" => Primitive::Bool,
        "void" => Primitive::Void,
        _ => return None,
    })
}

fn integer_literal_value(primitive: Primitive, parsed: i128) -> PrimitiveValue {
    match primitive {
        Primitive::U8 => PrimitiveValue::U8(parsed as u8),
        Primitive::U16 => PrimitiveValue::U16(parsed as u16),
        Primitive::U32 => PrimitiveValue::U32(parsed as u32),
        Primitive::U64 => PrimitiveValue::U64(parsed as u64),
        Primitive::I8 => PrimitiveValue::I8(parsed as i8),
        Primitive::I16 => PrimitiveValue::I16(parsed as i16),
        Primitive::I64 => PrimitiveValue::I64(parsed as i64),
        _ => PrimitiveValue::I32(parsed as i32),
    }
}

/// The fixed vocabulary of runtime-provided functions (spec.md §4.7),
/// checked with the same arity/type rules as user-declared externals.
fn internal_function_signature(name: &str) -> Option<(Vec<Type>, Type)> {
    use Primitive::*;
    let string = || Type::primitive(String);
    let bytes = || Type::array(Type::primitive(U8), None);
    Some(match name {
        "puts" | "putln" => (vec![string()], Type::void()),
        "putc" => (vec![Type::primitive(Char)], Type::void()),
        "readc" => (vec![], Type::primitive(Char)),
        "readln" => (vec![string()], string()),
        "readraw" => (vec![], string()),
        "system" => (vec![string()], Type::primitive(I32)),
        "sys_read" => (vec![Type::primitive(I32), bytes(), Type::primitive(U64)], Type::primitive(I64)),
        "sys_write" => (vec![Type::primitive(I32), bytes(), Type::primitive(U64)], Type::primitive(I64)),
        "sys_open" => (vec![string(), Type::primitive(I32)], Type::primitive(I64)),
        "sys_close" => (vec![Type::primitive(I32)], Type::primitive(I64)),
        "sys_exit" => (vec![Type::primitive(I32)], Type::void()),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use crate::parser;
    use crate::span::SourceMap;

    fn bind(src: &str) -> (BoundProgram, Diagnostics) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("<test>", src);
        let mut diagnostics = Diagnostics::new();
        let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
        let decls = parser::parse_program(tokens, &mut diagnostics);
        let program = bind_program(decls, &mut diagnostics);
        (program, diagnostics)
    }

    #[test]
    fn arithmetic_program_binds_without_error() {
        let (_, diags) = bind("fn main(): i32 { return 2 + 3 * 4; }");
        assert!(!diags.has_error());
    }

    #[test]
    fn undeclared_identifier_is_an_error() {
        let (_, diags) = bind("fn main(): i32 { return missing; }");
        assert!(diags.has_error());
    }

    #[test]
    fn break_outside_loop_is_an_error() {
        let (_, diags) = bind("fn main(): i32 { break; return 0; }");
        assert!(diags.has_error());
    }

    #[test]
    fn labelled_loops_resolve_break_targets() {
        let (_, diags) = bind("fn main(): i32 { ~outer while true { break outer; } return 7; }");
        assert!(!diags.has_error());
    }

    #[test]
    fn shadowing_outer_label_is_an_error() {
        let (_, diags) = bind("fn main(): i32 { ~l while true { ~l while true { break; } } return 0; }");
        assert!(diags.has_error());
    }

    #[test]
    fn enum_match_arms_unify_to_common_type() {
        let (_, diags) = bind("enum E { A(i32), B(i32) } fn main(): i32 { e := E::A(5); return match e { E::A(n) -> n, E::B(n) -> n }; }");
        assert!(!diags.has_error());
    }
}
