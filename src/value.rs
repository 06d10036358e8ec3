//! The runtime value model (spec.md §3 "Value"), isomorphic to
//! `types::Type`, grounded on
//! `examples/original_source/core/include/linc/system/PrimitiveValue.hpp`.
//!
//! Binary arithmetic converts the right-hand operand to the left
//! operand's tag before operating, mirroring the original's
//! `other.convert(m_kind)` call inside every `operator op` macro
//! expansion.

use crate::diagnostics::{Diagnostics, Stage};
use crate::span::Span;
use crate::types::{Primitive, Type};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveValue {
    Void,
    Bool(bool),
    Char(char),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Type(Type),
    Invalid,
}

impl PrimitiveValue {
    pub fn tag(&self) -> Primitive {
        use PrimitiveValue::*;
        match self {
            Void => Primitive::Void,
            Bool(_) => Primitive::Bool,
            Char(_) => Primitive::Char,
            U8(_) => Primitive::U8,
            U16(_) => Primitive::U16,
            U32(_) => Primitive::U32,
            U64(_) => Primitive::U64,
            I8(_) => Primitive::I8,
            I16(_) => Primitive::I16,
            I32(_) => Primitive::I32,
            I64(_) => Primitive::I64,
            F32(_) => Primitive::F32,
            F64(_) => Primitive::F64,
            String(_) => Primitive::String,
            Type(_) => Primitive::TypeValue,
            Invalid => Primitive::Void,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        use PrimitiveValue::*;
        match self {
            Bool(b) => Some(*b as i64),
            Char(c) => Some(*c as i64),
            U8(v) => Some(*v as i64),
            U16(v) => Some(*v as i64),
            U32(v) => Some(*v as i64),
            U64(v) => Some(*v as i64),
            I8(v) => Some(*v as i64),
            I16(v) => Some(*v as i64),
            I32(v) => Some(*v as i64),
            I64(v) => Some(*v),
            F32(v) => Some(*v as i64),
            F64(v) => Some(*v as i64),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        use PrimitiveValue::*;
        match self {
            U8(v) => Some(*v as f64),
            U16(v) => Some(*v as f64),
            U32(v) => Some(*v as f64),
            U64(v) => Some(*v as f64),
            I8(v) => Some(*v as f64),
            I16(v) => Some(*v as f64),
            I32(v) => Some(*v as f64),
            I64(v) => Some(*v as f64),
            F32(v) => Some(*v as f64),
            F64(v) => Some(*v),
            Bool(b) => Some(*b as i64 as f64),
            Char(c) => Some(*c as i64 as f64),
            _ => None,
        }
    }

    /// Converts `self` to the given tag, wrapping integer overflow
    /// silently (§4 Open Question: integer overflow wraps) and
    /// truncating float-to-int toward zero, per the original's
    /// `convert<T>` template.
    pub fn convert(&self, target: Primitive) -> PrimitiveValue {
        use Primitive::*;
        match (self, target) {
            (PrimitiveValue::String(s), String) => PrimitiveValue::String(s.clone()),
            (PrimitiveValue::Type(t), TypeValue) => PrimitiveValue::Type(t.clone()),
            (_, String) => PrimitiveValue::String(self.to_string()),
            (_, Bool) => PrimitiveValue::Bool(self.as_i64().unwrap_or(0) != 0),
            (_, Char) => PrimitiveValue::Char(char::from_u32(self.as_i64().unwrap_or(0) as u32).unwrap_or('\0')),
            (_, U8) => PrimitiveValue::U8(self.as_i64().unwrap_or(0) as u8),
            (_, U16) => PrimitiveValue::U16(self.as_i64().unwrap_or(0) as u16),
            (_, U32) => PrimitiveValue::U32(self.as_i64().unwrap_or(0) as u32),
            (_, U64) => PrimitiveValue::U64(self.as_i64().unwrap_or(0) as u64),
            (_, I8) => PrimitiveValue::I8(self.as_i64().unwrap_or(0) as i8),
            (_, I16) => PrimitiveValue::I16(self.as_i64().unwrap_or(0) as i16),
            (_, I32) => PrimitiveValue::I32(self.as_i64().unwrap_or(0) as i32),
            (_, I64) => PrimitiveValue::I64(self.as_i64().unwrap_or(0)),
            (_, F32) => PrimitiveValue::F32(self.as_f64().unwrap_or(0.0) as f32),
            (_, F64) => PrimitiveValue::F64(self.as_f64().unwrap_or(0.0)),
            (_, Void) => PrimitiveValue::Void,
            _ => PrimitiveValue::Invalid,
        }
    }

    fn arithmetic(
        &self,
        other: &PrimitiveValue,
        diagnostics: &mut Diagnostics,
        span: &Span,
        integer_op: impl Fn(i64, i64) -> Option<i64>,
        float_op: impl Fn(f64, f64) -> f64,
    ) -> PrimitiveValue {
        let other = if other.tag() == self.tag() { other.clone() } else { other.convert(self.tag()) };
        match (self, &other) {
            (PrimitiveValue::F32(a), PrimitiveValue::F32(b)) => PrimitiveValue::F32(float_op(*a as f64, *b as f64) as f32),
            (PrimitiveValue::F64(a), PrimitiveValue::F64(b)) => PrimitiveValue::F64(float_op(*a, *b)),
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => match integer_op(a, b) {
                    Some(result) => self.tag_i64(result),
                    None => {
                        diagnostics.error(Stage::Generator, Some(span.clone()), "division or modulo by zero");
                        PrimitiveValue::Invalid
                    }
                },
                _ => PrimitiveValue::Invalid,
            },
        }
    }

    fn tag_i64(&self, value: i64) -> PrimitiveValue {
        use PrimitiveValue::*;
        match self.tag() {
            Primitive::Bool => Bool(value != 0),
            Primitive::Char => Char(char::from_u32(value as u32).unwrap_or('\0')),
            Primitive::U8 => U8(value as u8),
            Primitive::U16 => U16(value as u16),
            Primitive::U32 => U32(value as u32),
            Primitive::U64 => U64(value as u64),
            Primitive::I8 => I8(value as i8),
            Primitive::I16 => I16(value as i16),
            Primitive::I32 => I32(value as i32),
            Primitive::I64 => I64(value),
            _ => Invalid,
        }
    }

    pub fn add(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        if let (PrimitiveValue::String(a), _) = (self, other) {
            let other = other.convert(Primitive::String);
            if let PrimitiveValue::String(b) = other {
                return PrimitiveValue::String(format!("{}{}", a, b));
            }
        }
        self.arithmetic(other, diagnostics, span, |a, b| Some(a.wrapping_add(b)), |a, b| a + b)
    }

    pub fn sub(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(other, diagnostics, span, |a, b| Some(a.wrapping_sub(b)), |a, b| a - b)
    }

    pub fn mul(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(other, diagnostics, span, |a, b| Some(a.wrapping_mul(b)), |a, b| a * b)
    }

    pub fn div(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(
            other,
            diagnostics,
            span,
            |a, b| if b == 0 { None } else { Some(a.wrapping_div(b)) },
            |a, b| a / b,
        )
    }

    pub fn rem(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(
            other,
            diagnostics,
            span,
            |a, b| if b == 0 { None } else { Some(a.wrapping_rem(b)) },
            |a, b| a % b,
        )
    }

    pub fn bitand(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(other, diagnostics, span, |a, b| Some(a & b), |_, _| 0.0)
    }

    pub fn bitor(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(other, diagnostics, span, |a, b| Some(a | b), |_, _| 0.0)
    }

    pub fn bitxor(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(other, diagnostics, span, |a, b| Some(a ^ b), |_, _| 0.0)
    }

    pub fn shl(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(other, diagnostics, span, |a, b| Some(a.wrapping_shl(b as u32)), |_, _| 0.0)
    }

    pub fn shr(&self, other: &PrimitiveValue, diagnostics: &mut Diagnostics, span: &Span) -> PrimitiveValue {
        self.arithmetic(other, diagnostics, span, |a, b| Some(a.wrapping_shr(b as u32)), |_, _| 0.0)
    }

    pub fn bitnot(&self) -> PrimitiveValue {
        use PrimitiveValue::*;
        match self {
            U8(v) => U8(!v),
            U16(v) => U16(!v),
            U32(v) => U32(!v),
            U64(v) => U64(!v),
            I8(v) => I8(!v),
            I16(v) => I16(!v),
            I32(v) => I32(!v),
            I64(v) => I64(!v),
            other => other.clone(),
        }
    }

    pub fn negate(&self) -> PrimitiveValue {
        use PrimitiveValue::*;
        match self {
            I8(v) => I8(v.wrapping_neg()),
            I16(v) => I16(v.wrapping_neg()),
            I32(v) => I32(v.wrapping_neg()),
            I64(v) => I64(v.wrapping_neg()),
            F32(v) => F32(-v),
            F64(v) => F64(-v),
            other => other.clone(),
        }
    }

    pub fn logical_not(&self) -> PrimitiveValue {
        PrimitiveValue::Bool(!self.is_truthy())
    }

    pub fn is_truthy(&self) -> bool {
        self.as_i64().map(|v| v != 0).unwrap_or_else(|| matches!(self, PrimitiveValue::String(s) if !s.is_empty()))
    }

    pub fn compare(&self, other: &PrimitiveValue) -> Option<std::cmp::Ordering> {
        let other = if other.tag() == self.tag() { other.clone() } else { other.convert(self.tag()) };
        match (self, &other) {
            (PrimitiveValue::String(a), PrimitiveValue::String(b)) => a.partial_cmp(b),
            (PrimitiveValue::F32(a), PrimitiveValue::F32(b)) => a.partial_cmp(b),
            (PrimitiveValue::F64(a), PrimitiveValue::F64(b)) => a.partial_cmp(b),
            _ => self.as_i64().zip(other.as_i64()).and_then(|(a, b)| a.partial_cmp(&b)),
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PrimitiveValue::*;
        match self {
            Void => write!(f, "void"),
            Bool(v) => write!(f, "{}", v),
            Char(v) => write!(f, "{}", v),
            U8(v) => write!(f, "{}", v),
            U16(v) => write!(f, "{}", v),
            U32(v) => write!(f, "{}", v),
            U64(v) => write!(f, "{}", v),
            I8(v) => write!(f, "{}", v),
            I16(v) => write!(f, "{}", v),
            I32(v) => write!(f, "{}", v),
            I64(v) => write!(f, "{}", v),
            F32(v) => write!(f, "{}", v),
            F64(v) => write!(f, "{}", v),
            String(v) => write!(f, "{}", v),
            Type(t) => write!(f, "{}", t),
            Invalid => write!(f, "<invalid>"),
        }
    }
}

/// A runtime value, isomorphic to `types::Type`'s shape.
#[derive(Clone, Debug)]
pub enum Value {
    Primitive(PrimitiveValue),
    Array(Vec<Value>),
    Structure(Vec<(String, Value)>),
    Enumerator { variant: String, payload: Box<Value> },
    Function(crate::bound_tree::FunctionId),
}

impl Value {
    pub fn void() -> Self {
        Value::Primitive(PrimitiveValue::Void)
    }

    pub fn as_primitive(&self) -> Option<&PrimitiveValue> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Primitive(p) => p.is_truthy(),
            Value::Array(items) => !items.is_empty(),
            _ => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Primitive(p) => write!(f, "{}", p),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Structure(fields) => {
                write!(f, "{{ ")?;
                for (name, value) in fields {
                    write!(f, "{}: {}, ", name, value)?;
                }
                write!(f, "}}")
            }
            Value::Enumerator { variant, payload } => write!(f, "{}({})", variant, payload),
            Value::Function(id) => write!(f, "<function #{}>", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{FileId, Span};

    fn span() -> Span {
        Span::point(FileId(0), 1, 0)
    }

    #[test]
    fn right_operand_is_converted_to_left_tag() {
        let mut diags = Diagnostics::new();
        let left = PrimitiveValue::I64(10);
        let right = PrimitiveValue::I8(3);
        let sum = left.add(&right, &mut diags, &span());
        assert_eq!(sum, PrimitiveValue::I64(13));
    }

    #[test]
    fn integer_division_by_zero_reports_and_yields_invalid() {
        let mut diags = Diagnostics::new();
        let result = PrimitiveValue::I32(4).div(&PrimitiveValue::I32(0), &mut diags, &span());
        assert_eq!(result, PrimitiveValue::Invalid);
        assert!(diags.has_error());
    }

    #[test]
    fn integer_overflow_wraps_silently() {
        let mut diags = Diagnostics::new();
        let result = PrimitiveValue::I8(127).add(&PrimitiveValue::I8(1), &mut diags, &span());
        assert_eq!(result, PrimitiveValue::I8(-128));
        assert!(!diags.has_error());
    }

    #[test]
    fn string_concatenation_converts_right_operand_to_string() {
        let mut diags = Diagnostics::new();
        let result = PrimitiveValue::String("a=".into()).add(&PrimitiveValue::I32(5), &mut diags, &span());
        assert_eq!(result, PrimitiveValue::String("a=5".into()));
    }
}
