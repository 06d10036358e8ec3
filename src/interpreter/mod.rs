//! The tree-walking interpreter (spec.md §4.7), re-architected around a
//! non-exceptional `Control` value per spec.md §9 ("Control-flow
//! exceptions") instead of the original's thrown sentinels — every
//! evaluation returns a `Control` that loop/function frames inspect and
//! act on rather than unwind past.

pub mod internals;

use crate::ast::{BinOpKind, UnOpKind};
use crate::bound_tree::{BoundDecl, BoundExpr, BoundMatchArm, BoundParameter, BoundPattern, BoundStmt, FunctionId};
use crate::diagnostics::{Diagnostics, Stage};
use crate::span::Span;
use crate::types::{Primitive, Type};
use crate::value::{PrimitiveValue, Value};
use internals::FileTable;
use std::collections::HashMap;

/// The result of evaluating one expression or statement: normal
/// completion carries a value, the others carry the unwinding payload
/// that the nearest loop or function frame is responsible for catching.
#[derive(Debug)]
enum Control {
    Normal(Value),
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
    Exit(i32),
}

/// A mutable storage location reachable from an identifier through any
/// number of index/field steps — the operand `=`, compound assignment,
/// `++`/`--`, and `sys_read`'s out-parameter all resolve before acting.
enum LValuePath {
    Variable(String),
    Index(Box<LValuePath>, usize),
    Field(Box<LValuePath>, String),
}

struct FunctionDef {
    parameters: Vec<BoundParameter>,
    body: BoundExpr,
}

pub struct Interpreter<'a> {
    diagnostics: &'a mut Diagnostics,
    globals: HashMap<String, Value>,
    scopes: Vec<HashMap<String, Value>>,
    functions: HashMap<FunctionId, FunctionDef>,
    files: FileTable,
}

/// Binds and calls `main`, passing `argv` when `main` declares a
/// parameter. Returns the process exit code per spec.md §6: `void` is
/// 0, `u8`/`i8`/`i16`/`i32` yield that value, any other declared return
/// type is a diagnostic and exit code 1.
pub fn evaluate_program(declarations: &[BoundDecl], diagnostics: &mut Diagnostics, argv: Vec<String>) -> i32 {
    let mut interpreter = Interpreter {
        diagnostics,
        globals: HashMap::new(),
        scopes: vec![HashMap::new()],
        functions: HashMap::new(),
        files: FileTable::new(),
    };

    for decl in declarations {
        interpreter.register_decl(decl);
    }

    let main = declarations.iter().find_map(|decl| match decl {
        BoundDecl::Function { id, name, parameters, return_type, .. } if name == "main" => Some((*id, parameters.clone(), return_type.clone())),
        _ => None,
    });

    let (id, parameters, return_type) = match main {
        Some(found) => found,
        None => {
            interpreter.diagnostics.error(Stage::Generator, None, "no function named 'main' was found");
            return 1;
        }
    };

    let args = if parameters.is_empty() {
        Vec::new()
    } else {
        vec![Value::Array(argv.into_iter().map(|s| Value::Primitive(PrimitiveValue::String(s))).collect())]
    };

    match interpreter.call_function(id, args) {
        Control::Normal(value) | Control::Return(value) => exit_code_for(&return_type, &value, interpreter.diagnostics),
        Control::Exit(code) => code,
        Control::Break(_) | Control::Continue(_) => 0,
    }
}

fn exit_code_for(return_type: &Type, value: &Value, diagnostics: &mut Diagnostics) -> i32 {
    match return_type.as_primitive() {
        Some(Primitive::Void) => 0,
        Some(Primitive::U8) | Some(Primitive::I8) | Some(Primitive::I16) | Some(Primitive::I32) => {
            internals::as_i64(value) as i32
        }
        _ => {
            diagnostics.error(Stage::Generator, None, format!("'main' must return void, u8, i8, i16, or i32, not '{}'", return_type));
            1
        }
    }
}

impl<'a> Interpreter<'a> {
    fn register_decl(&mut self, decl: &BoundDecl) {
        match decl {
            BoundDecl::Function { id, parameters, body, .. } => {
                self.functions.insert(*id, FunctionDef { parameters: parameters.clone(), body: body.clone() });
            }
            BoundDecl::Variable { name, value, .. } => {
                let initial = match value {
                    Some(expr) => match self.eval_expr(expr) {
                        Control::Normal(v) => v,
                        _ => Value::void(),
                    },
                    None => Value::void(),
                };
                self.globals.insert(name.clone(), initial);
            }
            BoundDecl::External { .. } | BoundDecl::Struct { .. } | BoundDecl::Enum { .. } => {}
        }
    }

    fn call_function(&mut self, id: FunctionId, args: Vec<Value>) -> Control {
        let def = match self.functions.get(&id) {
            Some(def) => def,
            None => {
                self.diagnostics.error(Stage::Generator, None, "call to an unresolved function");
                return Control::Normal(Value::void());
            }
        };
        let parameters = def.parameters.clone();
        let body = def.body.clone();

        let saved = std::mem::replace(&mut self.scopes, vec![HashMap::new()]);
        for (i, param) in parameters.iter().enumerate() {
            let value = if let Some(arg) = args.get(i) {
                arg.clone()
            } else if let Some(default_expr) = &param.default_value {
                match self.eval_expr(default_expr) {
                    Control::Normal(v) => v,
                    other => {
                        self.scopes = saved;
                        return other;
                    }
                }
            } else {
                Value::void()
            };
            self.scopes.last_mut().unwrap().insert(param.name.clone(), value);
        }

        let result = self.eval_expr(&body);
        self.scopes = saved;

        match result {
            Control::Return(value) => Control::Normal(value),
            Control::Normal(value) => Control::Normal(value),
            Control::Exit(code) => Control::Exit(code),
            // Binder validation guarantees break/continue never escape a function body.
            Control::Break(_) | Control::Continue(_) => Control::Normal(Value::void()),
        }
    }

    fn get_variable(&self, name: &str) -> Value {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
            .unwrap_or_else(Value::void)
    }

    fn get_variable_mut(&mut self, name: &str) -> Option<&mut Value> {
        for scope in self.scopes.iter_mut().rev() {
            if scope.contains_key(name) {
                return scope.get_mut(name);
            }
        }
        self.globals.get_mut(name)
    }

    fn declare_local(&mut self, name: &str, value: Value) {
        self.scopes.last_mut().unwrap().insert(name.to_string(), value);
    }

    fn resolve_lvalue(&mut self, expr: &BoundExpr) -> Option<LValuePath> {
        match expr {
            BoundExpr::Variable(name, ..) => Some(LValuePath::Variable(name.clone())),
            BoundExpr::Index { base, index, .. } => {
                let base_path = self.resolve_lvalue(base)?;
                let index_value = match self.eval_expr(index) {
                    Control::Normal(v) => v,
                    _ => return None,
                };
                Some(LValuePath::Index(Box::new(base_path), internals::as_i64(&index_value).max(0) as usize))
            }
            BoundExpr::Field { base, field, .. } => {
                let base_path = self.resolve_lvalue(base)?;
                Some(LValuePath::Field(Box::new(base_path), field.clone()))
            }
            _ => None,
        }
    }

    fn navigate_mut(&mut self, path: &LValuePath) -> Option<&mut Value> {
        match path {
            LValuePath::Variable(name) => self.get_variable_mut(name),
            LValuePath::Index(base, index) => match self.navigate_mut(base)? {
                Value::Array(items) => items.get_mut(*index),
                _ => None,
            },
            LValuePath::Field(base, field) => match self.navigate_mut(base)? {
                Value::Structure(fields) => fields.iter_mut().find(|(name, _)| name == field).map(|(_, v)| v),
                _ => None,
            },
        }
    }

    fn get_lvalue(&mut self, path: &LValuePath) -> Value {
        self.navigate_mut(path).cloned().unwrap_or_else(Value::void)
    }

    fn set_lvalue(&mut self, path: &LValuePath, value: Value, span: &Span) {
        match self.navigate_mut(path) {
            Some(slot) => *slot = value,
            None => self.diagnostics.error(Stage::Generator, Some(span.clone()), "assignment target does not exist"),
        }
    }

    fn eval_args(&mut self, arguments: &[BoundExpr]) -> Result<Vec<Value>, Control> {
        let mut out = Vec::with_capacity(arguments.len());
        for argument in arguments {
            match self.eval_expr(argument) {
                Control::Normal(value) => out.push(value),
                other => return Err(other),
            }
        }
        Ok(out)
    }

    fn eval_block(&mut self, statements: &[BoundStmt], trailing: &Option<Box<BoundExpr>>) -> Control {
        self.scopes.push(HashMap::new());
        for stmt in statements {
            match self.eval_stmt(stmt) {
                Control::Normal(_) => continue,
                other => {
                    self.scopes.pop();
                    return other;
                }
            }
        }
        let result = match trailing {
            Some(expr) => self.eval_expr(expr),
            None => Control::Normal(Value::void()),
        };
        self.scopes.pop();
        result
    }

    fn eval_stmt(&mut self, stmt: &BoundStmt) -> Control {
        match stmt {
            BoundStmt::Expression(expr) => self.eval_expr(expr),
            BoundStmt::Declaration(BoundDecl::Variable { name, value, .. }) => {
                let initial = match value {
                    Some(expr) => match self.eval_expr(expr) {
                        Control::Normal(v) => v,
                        other => return other,
                    },
                    None => Value::void(),
                };
                self.declare_local(name, initial);
                Control::Normal(Value::void())
            }
            BoundStmt::Declaration(decl @ BoundDecl::Function { .. }) => {
                self.register_decl(decl);
                Control::Normal(Value::void())
            }
            BoundStmt::Declaration(_) => Control::Normal(Value::void()),
            BoundStmt::Return(value, _) => {
                let result = match value {
                    Some(expr) => match self.eval_expr(expr) {
                        Control::Normal(v) => v,
                        other => return other,
                    },
                    None => Value::void(),
                };
                Control::Return(result)
            }
            BoundStmt::Break(label, _) => Control::Break(label.clone()),
            BoundStmt::Continue(label, _) => Control::Continue(label.clone()),
        }
    }

    fn eval_expr(&mut self, expr: &BoundExpr) -> Control {
        match expr {
            BoundExpr::Literal(value, ..) => Control::Normal(Value::Primitive(value.clone())),
            BoundExpr::Variable(name, ..) => Control::Normal(self.get_variable(name)),
            BoundExpr::Binary { operator, left, right, span } => self.eval_binary(operator.kind, left, right, span),
            BoundExpr::Unary { operator, operand, span } => self.eval_unary(operator.kind, operand, span),
            BoundExpr::Assign { op, target, value, span, .. } => self.eval_assign(*op, target, value, span),
            BoundExpr::Index { base, index, span, .. } => self.eval_index(base, index, span),
            BoundExpr::Field { base, field, .. } => self.eval_field(base, field),
            BoundExpr::Call { function, arguments, .. } => match self.eval_args(arguments) {
                Ok(args) => self.call_function(*function, args),
                Err(control) => control,
            },
            BoundExpr::ExternalCall { name, arguments, span, .. } => self.eval_external_call(name, arguments, span),
            BoundExpr::ArrayLiteral { elements, .. } => match self.eval_args(elements) {
                Ok(values) => Control::Normal(Value::Array(values)),
                Err(control) => control,
            },
            BoundExpr::Range { .. } => Control::Normal(Value::void()),
            BoundExpr::As { operand, target_type, .. } => self.eval_as(operand, target_type),
            BoundExpr::Block { statements, trailing, .. } => self.eval_block(statements, trailing),
            BoundExpr::If { condition, then_branch, else_branch, .. } => self.eval_if(condition, then_branch, else_branch.as_deref()),
            BoundExpr::While { label, condition, body, finally, else_branch, .. } => {
                self.eval_while(label.as_deref(), condition, body, finally.as_deref(), else_branch.as_deref())
            }
            BoundExpr::ForLegacy { label, init, test, step, body, .. } => self.eval_for_legacy(label.as_deref(), init.as_deref(), test, step.as_deref(), body),
            BoundExpr::ForRanged { label, binding, binding_type, iterable, body, .. } => self.eval_for_ranged(label.as_deref(), binding, binding_type, iterable, body),
            BoundExpr::Match { scrutinee, arms, .. } => self.eval_match(scrutinee, arms),
            BoundExpr::EnumConstruct { variant, payload, .. } => match self.eval_expr(payload) {
                Control::Normal(payload) => Control::Normal(Value::Enumerator { variant: variant.clone(), payload: Box::new(payload) }),
                other => other,
            },
            BoundExpr::Invalid(_) => Control::Normal(Value::void()),
        }
    }

    fn eval_binary(&mut self, op: BinOpKind, left: &BoundExpr, right: &BoundExpr, span: &Span) -> Control {
        let left_value = match self.eval_expr(left) {
            Control::Normal(v) => v,
            other => return other,
        };

        // Short-circuit: the right operand is only evaluated when the
        // left operand does not already settle the result.
        match op {
            BinOpKind::LogicalAnd if !left_value.is_truthy() => return Control::Normal(Value::Primitive(PrimitiveValue::Bool(false))),
            BinOpKind::LogicalOr if left_value.is_truthy() => return Control::Normal(Value::Primitive(PrimitiveValue::Bool(true))),
            _ => {}
        }

        let right_value = match self.eval_expr(right) {
            Control::Normal(v) => v,
            other => return other,
        };

        Control::Normal(self.apply_binary(op, &left_value, &right_value, span))
    }

    fn apply_binary(&mut self, op: BinOpKind, left: &Value, right: &Value, span: &Span) -> Value {
        use BinOpKind::*;
        if op == Add {
            if let (Value::Array(a), Value::Array(b)) = (left, right) {
                let mut items = a.clone();
                items.extend(b.clone());
                return Value::Array(items);
            }
        }
        let (l, r) = match (left.as_primitive(), right.as_primitive()) {
            (Some(l), Some(r)) => (l, r),
            _ => return Value::void(),
        };
        match op {
            Add => Value::Primitive(l.add(r, self.diagnostics, span)),
            Sub => Value::Primitive(l.sub(r, self.diagnostics, span)),
            Mul => Value::Primitive(l.mul(r, self.diagnostics, span)),
            Div => Value::Primitive(l.div(r, self.diagnostics, span)),
            Mod => Value::Primitive(l.rem(r, self.diagnostics, span)),
            LogicalAnd => Value::Primitive(PrimitiveValue::Bool(l.is_truthy() && r.is_truthy())),
            LogicalOr => Value::Primitive(PrimitiveValue::Bool(l.is_truthy() || r.is_truthy())),
            Equals => Value::Primitive(PrimitiveValue::Bool(l.compare(r) == Some(std::cmp::Ordering::Equal))),
            NotEquals => Value::Primitive(PrimitiveValue::Bool(l.compare(r) != Some(std::cmp::Ordering::Equal))),
            Less => Value::Primitive(PrimitiveValue::Bool(l.compare(r) == Some(std::cmp::Ordering::Less))),
            Greater => Value::Primitive(PrimitiveValue::Bool(l.compare(r) == Some(std::cmp::Ordering::Greater))),
            LessEqual => Value::Primitive(PrimitiveValue::Bool(l.compare(r) != Some(std::cmp::Ordering::Greater))),
            GreaterEqual => Value::Primitive(PrimitiveValue::Bool(l.compare(r) != Some(std::cmp::Ordering::Less))),
            BitwiseAnd => Value::Primitive(l.bitand(r, self.diagnostics, span)),
            BitwiseOr => Value::Primitive(l.bitor(r, self.diagnostics, span)),
            BitwiseXor => Value::Primitive(l.bitxor(r, self.diagnostics, span)),
            ShiftLeft => Value::Primitive(l.shl(r, self.diagnostics, span)),
            ShiftRight => Value::Primitive(l.shr(r, self.diagnostics, span)),
        }
    }

    fn eval_unary(&mut self, op: UnOpKind, operand: &BoundExpr, span: &Span) -> Control {
        if crate::bound_tree::is_mutating_unary(op) {
            return self.eval_mutating_unary(op, operand, span);
        }
        let value = match self.eval_expr(operand) {
            Control::Normal(v) => v,
            other => return other,
        };
        let result = match op {
            UnOpKind::Plus => match &value {
                Value::Primitive(PrimitiveValue::Char(c)) => PrimitiveValue::I32(*c as i32),
                Value::Primitive(PrimitiveValue::String(s)) => PrimitiveValue::U64(s.chars().count() as u64),
                Value::Array(items) => PrimitiveValue::U64(items.len() as u64),
                Value::Primitive(p) => p.clone(),
                _ => PrimitiveValue::Invalid,
            },
            UnOpKind::Negate => value.as_primitive().map(|p| p.negate()).unwrap_or(PrimitiveValue::Invalid),
            UnOpKind::LogicalNot => PrimitiveValue::Bool(!value.is_truthy()),
            UnOpKind::BitwiseNot => value.as_primitive().map(|p| p.bitnot()).unwrap_or(PrimitiveValue::Invalid),
            UnOpKind::Stringify => PrimitiveValue::String(value.to_string()),
            UnOpKind::TypeOf => PrimitiveValue::Type(operand.ty()),
            UnOpKind::PreIncrement | UnOpKind::PreDecrement | UnOpKind::PostIncrement | UnOpKind::PostDecrement => unreachable!("handled by eval_mutating_unary"),
        };
        Control::Normal(Value::Primitive(result))
    }

    fn eval_mutating_unary(&mut self, op: UnOpKind, operand: &BoundExpr, span: &Span) -> Control {
        let path = match self.resolve_lvalue(operand) {
            Some(path) => path,
            None => {
                self.diagnostics.error(Stage::Generator, Some(span.clone()), "operand is not a mutable storage location");
                return Control::Normal(Value::void());
            }
        };
        let current = self.get_lvalue(&path);
        let current_primitive = match current.as_primitive() {
            Some(p) => p.clone(),
            None => {
                self.diagnostics.error(Stage::Generator, Some(span.clone()), "'++'/'--' require a numeric operand");
                return Control::Normal(Value::void());
            }
        };
        // `add`/`sub` convert their right operand to the left operand's
        // tag, so a bare `I64(1)` works as "one" regardless of `current`'s type.
        let one = PrimitiveValue::I64(1);
        let updated = match op {
            UnOpKind::PreIncrement | UnOpKind::PostIncrement => current_primitive.add(&one, self.diagnostics, span),
            UnOpKind::PreDecrement | UnOpKind::PostDecrement => current_primitive.sub(&one, self.diagnostics, span),
            _ => unreachable!(),
        };
        self.set_lvalue(&path, Value::Primitive(updated.clone()), span);
        let result = match op {
            UnOpKind::PreIncrement | UnOpKind::PreDecrement => updated,
            UnOpKind::PostIncrement | UnOpKind::PostDecrement => current_primitive,
            _ => unreachable!(),
        };
        Control::Normal(Value::Primitive(result))
    }

    fn eval_assign(&mut self, op: crate::ast::AssignOpKind, target: &BoundExpr, value: &BoundExpr, span: &Span) -> Control {
        use crate::ast::AssignOpKind::*;
        let path = match self.resolve_lvalue(target) {
            Some(path) => path,
            None => {
                self.diagnostics.error(Stage::Generator, Some(span.clone()), "assignment target is not a mutable storage location");
                return Control::Normal(Value::void());
            }
        };
        let rhs = match self.eval_expr(value) {
            Control::Normal(v) => v,
            other => return other,
        };
        let result = match op {
            Assign => rhs,
            AddAssign | SubAssign | MulAssign | DivAssign | ModAssign => {
                let current = self.get_lvalue(&path);
                let arithmetic_op = match op {
                    AddAssign => BinOpKind::Add,
                    SubAssign => BinOpKind::Sub,
                    MulAssign => BinOpKind::Mul,
                    DivAssign => BinOpKind::Div,
                    ModAssign => BinOpKind::Mod,
                    Assign => unreachable!(),
                };
                self.apply_binary(arithmetic_op, &current, &rhs, span)
            }
        };
        self.set_lvalue(&path, result.clone(), span);
        Control::Normal(result)
    }

    fn eval_index(&mut self, base: &BoundExpr, index: &BoundExpr, span: &Span) -> Control {
        let base_value = match self.eval_expr(base) {
            Control::Normal(v) => v,
            other => return other,
        };
        let index_value = match self.eval_expr(index) {
            Control::Normal(v) => v,
            other => return other,
        };
        match base_value {
            Value::Array(items) => {
                let i = internals::as_i64(&index_value);
                match usize::try_from(i).ok().and_then(|i| items.get(i).cloned()) {
                    Some(item) => Control::Normal(item),
                    None => {
                        self.diagnostics.error(Stage::Generator, Some(span.clone()), format!("index {} is out of bounds", i));
                        Control::Normal(Value::void())
                    }
                }
            }
            _ => {
                self.diagnostics.error(Stage::Generator, Some(span.clone()), "cannot index a non-array value");
                Control::Normal(Value::void())
            }
        }
    }

    fn eval_field(&mut self, base: &BoundExpr, field: &str) -> Control {
        let base_value = match self.eval_expr(base) {
            Control::Normal(v) => v,
            other => return other,
        };
        match base_value {
            Value::Structure(fields) => match fields.into_iter().find(|(name, _)| name == field) {
                Some((_, value)) => Control::Normal(value),
                None => Control::Normal(Value::void()),
            },
            _ => Control::Normal(Value::void()),
        }
    }

    fn eval_as(&mut self, operand: &BoundExpr, target_type: &Type) -> Control {
        let value = match self.eval_expr(operand) {
            Control::Normal(v) => v,
            other => return other,
        };
        match (value.as_primitive(), target_type.as_primitive()) {
            (Some(p), Some(target)) => Control::Normal(Value::Primitive(p.convert(target))),
            _ => Control::Normal(value),
        }
    }

    fn eval_if(&mut self, condition: &BoundExpr, then_branch: &BoundExpr, else_branch: Option<&BoundExpr>) -> Control {
        let condition = match self.eval_expr(condition) {
            Control::Normal(v) => v,
            other => return other,
        };
        if condition.is_truthy() {
            self.eval_expr(then_branch)
        } else {
            match else_branch {
                Some(branch) => self.eval_expr(branch),
                None => Control::Normal(Value::void()),
            }
        }
    }

    fn matches_loop(label: Option<&str>, own_label: Option<&str>) -> bool {
        match label {
            None => true,
            Some(target) => own_label == Some(target),
        }
    }

    /// `finally` runs iff the body was evaluated at least once; `else`
    /// runs iff it never was — mirrors the original's `evaluated` flag.
    fn eval_while(&mut self, label: Option<&str>, condition: &BoundExpr, body: &BoundExpr, finally: Option<&BoundExpr>, else_branch: Option<&BoundExpr>) -> Control {
        let mut evaluated = false;
        let mut value = Value::void();
        loop {
            let condition_value = match self.eval_expr(condition) {
                Control::Normal(v) => v,
                other => return other,
            };
            if !condition_value.is_truthy() {
                break;
            }
            evaluated = true;
            match self.eval_expr(body) {
                Control::Normal(v) => value = v,
                Control::Break(target) if Self::matches_loop(target.as_deref(), label) => break,
                Control::Continue(target) if Self::matches_loop(target.as_deref(), label) => continue,
                other => return other,
            }
        }

        if evaluated {
            if let Some(finally) = finally {
                return self.eval_expr(finally);
            }
        } else if let Some(else_branch) = else_branch {
            return self.eval_expr(else_branch);
        }
        Control::Normal(value)
    }

    fn eval_for_legacy(&mut self, label: Option<&str>, init: Option<&BoundStmt>, test: &BoundExpr, step: Option<&BoundExpr>, body: &BoundExpr) -> Control {
        self.scopes.push(HashMap::new());
        if let Some(init) = init {
            match self.eval_stmt(init) {
                Control::Normal(_) => {}
                other => {
                    self.scopes.pop();
                    return other;
                }
            }
        }
        let result = loop {
            let condition_value = match self.eval_expr(test) {
                Control::Normal(v) => v,
                other => break other,
            };
            if !condition_value.is_truthy() {
                break Control::Normal(Value::void());
            }
            match self.eval_expr(body) {
                Control::Normal(_) => {}
                Control::Break(target) if Self::matches_loop(target.as_deref(), label) => break Control::Normal(Value::void()),
                Control::Continue(target) if Self::matches_loop(target.as_deref(), label) => {}
                other => break other,
            }
            if let Some(step) = step {
                match self.eval_expr(step) {
                    Control::Normal(_) => {}
                    other => break other,
                }
            }
        };
        self.scopes.pop();
        result
    }

    fn eval_for_ranged(&mut self, label: Option<&str>, binding: &str, binding_type: &Type, iterable: &BoundExpr, body: &BoundExpr) -> Control {
        let iterable_value = match self.eval_expr(iterable) {
            Control::Normal(v) => v,
            other => return other,
        };
        let items: Vec<Value> = match iterable_value {
            Value::Array(items) => items,
            Value::Primitive(PrimitiveValue::String(s)) => s.chars().map(|c| Value::Primitive(PrimitiveValue::Char(c))).collect(),
            Value::Structure(fields) if fields.len() == 2 => self.range_members(&fields, binding_type),
            _ => Vec::new(),
        };

        self.scopes.push(HashMap::new());
        for item in items {
            self.scopes.last_mut().unwrap().insert(binding.to_string(), item);
            match self.eval_expr(body) {
                Control::Normal(_) => continue,
                Control::Break(target) if Self::matches_loop(target.as_deref(), label) => {
                    self.scopes.pop();
                    return Control::Normal(Value::void());
                }
                Control::Continue(target) if Self::matches_loop(target.as_deref(), label) => continue,
                other => {
                    self.scopes.pop();
                    return other;
                }
            }
        }
        self.scopes.pop();
        Control::Normal(Value::void())
    }

    /// Expands a bound `Range` structure's two fields (`start`, `end`)
    /// into the inclusive sequence it denotes. A descending range (the
    /// reverse-flag case) iterates from `end - 1` down to `start`.
    fn range_members(&self, fields: &[(String, Value)], element_type: &Type) -> Vec<Value> {
        let start = fields.iter().find(|(n, _)| n == "start").map(|(_, v)| internals::as_i64(v)).unwrap_or(0);
        let end = fields.iter().find(|(n, _)| n == "end").map(|(_, v)| internals::as_i64(v)).unwrap_or(0);
        let to_value = |n: i64| match element_type.as_primitive() {
            Some(Primitive::Char) => Value::Primitive(PrimitiveValue::Char(char::from_u32(n as u32).unwrap_or('\0'))),
            _ => Value::Primitive(PrimitiveValue::I32(n as i32).convert(element_type.as_primitive().unwrap_or(Primitive::I32))),
        };
        if end >= start {
            (start..end).map(to_value).collect()
        } else {
            ((end + 1)..=start).rev().map(to_value).collect()
        }
    }

    fn eval_match(&mut self, scrutinee: &BoundExpr, arms: &[BoundMatchArm]) -> Control {
        let value = match self.eval_expr(scrutinee) {
            Control::Normal(v) => v,
            other => return other,
        };
        for arm in arms {
            match &arm.pattern {
                BoundPattern::Wildcard => return self.eval_arm(arm, None),
                BoundPattern::Literal(literal) => {
                    if let Some(p) = value.as_primitive() {
                        if p.compare(literal) == Some(std::cmp::Ordering::Equal) {
                            return self.eval_arm(arm, None);
                        }
                    }
                }
                BoundPattern::EnumVariant { variant, .. } => {
                    if let Value::Enumerator { variant: actual, payload } = &value {
                        if actual == variant {
                            return self.eval_arm(arm, Some((*payload.clone(), arm.binding.clone())));
                        }
                    }
                }
            }
        }
        Control::Normal(Value::void())
    }

    fn eval_arm(&mut self, arm: &BoundMatchArm, payload: Option<(Value, Option<String>)>) -> Control {
        self.scopes.push(HashMap::new());
        if let Some((value, Some(name))) = payload {
            self.scopes.last_mut().unwrap().insert(name, value);
        }
        let result = self.eval_expr(&arm.body);
        self.scopes.pop();
        result
    }

    fn eval_external_call(&mut self, name: &str, arguments: &[BoundExpr], span: &Span) -> Control {
        match name {
            "sys_exit" => match self.eval_args(arguments) {
                Ok(args) => Control::Exit(args.get(0).map(|v| internals::as_i64(v) as i32).unwrap_or(0)),
                Err(control) => control,
            },
            "sys_read" => self.eval_sys_read(arguments, span),
            "sys_write" => match self.eval_args(arguments) {
                Ok(args) => {
                    let fd = args.get(0).map(internals::as_i64).unwrap_or(0) as i32;
                    let bytes = match args.get(1) {
                        Some(Value::Array(items)) => items.iter().map(|v| internals::as_i64(v) as u8).collect::<Vec<u8>>(),
                        Some(Value::Primitive(PrimitiveValue::String(s))) => s.as_bytes().to_vec(),
                        _ => Vec::new(),
                    };
                    Control::Normal(Value::Primitive(PrimitiveValue::I64(self.files.write_bytes(fd, &bytes))))
                }
                Err(control) => control,
            },
            _ => match self.eval_args(arguments) {
                Ok(args) => {
                    if internal_name_is_known(name) {
                        Control::Normal(internals::call(&mut self.files, name, &args))
                    } else {
                        self.diagnostics.error(Stage::Generator, Some(span.clone()), format!("unresolved external '{}'", name));
                        Control::Normal(Value::void())
                    }
                }
                Err(control) => control,
            },
        }
    }

    fn eval_sys_read(&mut self, arguments: &[BoundExpr], span: &Span) -> Control {
        if arguments.len() != 3 {
            return Control::Normal(Value::Primitive(PrimitiveValue::I64(-1)));
        }
        let fd_value = match self.eval_expr(&arguments[0]) {
            Control::Normal(v) => v,
            other => return other,
        };
        let count_value = match self.eval_expr(&arguments[2]) {
            Control::Normal(v) => v,
            other => return other,
        };
        let path = match self.resolve_lvalue(&arguments[1]) {
            Some(path) => path,
            None => {
                self.diagnostics.error(Stage::Generator, Some(span.clone()), "'sys_read' requires a mutable array argument");
                return Control::Normal(Value::Primitive(PrimitiveValue::I64(-1)));
            }
        };
        let fd = internals::as_i64(&fd_value) as i32;
        let count = internals::as_i64(&count_value).max(0) as usize;
        let (n, bytes) = self.files.read_bytes(fd, count);
        if n >= 0 {
            let array = Value::Array(bytes.into_iter().map(|b| Value::Primitive(PrimitiveValue::U8(b))).collect());
            self.set_lvalue(&path, array, span);
        }
        Control::Normal(Value::Primitive(PrimitiveValue::I64(n)))
    }
}

fn internal_name_is_known(name: &str) -> bool {
    matches!(name, "puts" | "putln" | "putc" | "readc" | "readln" | "readraw" | "system" | "sys_open" | "sys_close")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder;
    use crate::folder;
    use crate::lexer;
    use crate::parser;
    use crate::span::SourceMap;

    fn run(src: &str) -> i32 {
        let mut sources = SourceMap::new();
        let file = sources.add_file("<test>", src);
        let mut diagnostics = Diagnostics::new();
        let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
        let decls = parser::parse_program(tokens, &mut diagnostics);
        let program = binder::bind_program(decls, &mut diagnostics);
        let declarations = folder::fold_program(program.declarations, &mut diagnostics);
        evaluate_program(&declarations, &mut diagnostics, Vec::new())
    }

    #[test]
    fn arithmetic_scenario_exits_with_computed_value() {
        assert_eq!(run("fn main(): i32 { return 2 + 3 * 4; }"), 14);
    }

    #[test]
    fn array_iteration_accumulates_left_to_right() {
        assert_eq!(run("fn main(): i32 { i: mut i32 = 0; for x in [1,2,3] i += x; return i; }"), 6);
    }

    #[test]
    fn labelled_break_unwinds_to_the_named_loop() {
        let src = "fn main(): i32 { n: mut i32 = 0; ~outer while true { while true { n += 1; break outer; } n += 100; } return n; }";
        assert_eq!(run(src), 1);
    }

    #[test]
    fn division_by_zero_yields_invalid_and_reports_an_error() {
        let mut sources = SourceMap::new();
        let file = sources.add_file("<test>", "fn main(): i32 { return 1 / 0; }");
        let mut diagnostics = Diagnostics::new();
        let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
        let decls = parser::parse_program(tokens, &mut diagnostics);
        let program = binder::bind_program(decls, &mut diagnostics);
        evaluate_program(&program.declarations, &mut diagnostics, Vec::new());
        assert!(diagnostics.has_error());
    }

    #[test]
    fn short_circuit_or_skips_the_right_operand() {
        let src = "fn main(): i32 { return if true || (1 / 0 == 0) { 0 } else { 1 }; }";
        assert_eq!(run(src), 0);
    }
}
