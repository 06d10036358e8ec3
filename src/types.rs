//! The structural type algebra (spec.md §3 "Type"), grounded on
//! `examples/original_source/core/include/linc/system/Types.hpp`.
//!
//! Equality is structural and ignores the top-level `mutable` flag.
//! Assignability is a separate, asymmetric relation: `is_assignable_to`
//! implements `Types::type::isAssignableTo` verbatim, and `is_compatible`
//! is the original's `isAssignableTo(other) || other.isAssignableTo(self)`.

use std::fmt;

/// The primitive scalar kinds (`Types::Kind` in the original).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    TypeValue,
    Char,
    Bool,
    Void,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Primitive::*;
        let s = match self {
            U8 => "u8",
            U16 => "u16",
            U32 => "u32",
            U64 => "u64",
            I8 => "i8",
            I16 => "i16",
            I32 => "i32",
            I64 => "i64",
            F32 => "f32",
            F64 => "f64",
            String => "string",
            TypeValue => "type",
            Char => "char",
            Bool => "bool",
            Void => "void",
        };
        write!(f, "{}", s)
    }
}

impl Primitive {
    pub fn is_integral(&self) -> bool {
        use Primitive::*;
        matches!(self, U8 | U16 | U32 | U64 | I8 | I16 | I32 | I64)
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_floating()
    }
}

/// A structure's fields, in declaration order: `(field_type, field_name)`.
pub type Structure = Vec<(Type, String)>;

/// An enumeration's members, in declaration order: `(member_name, payload_type)`.
pub type Enumeration = Vec<(String, Type)>;

#[derive(Clone, Debug)]
pub struct ArrayType {
    pub base: Box<Type>,
    pub count: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct FunctionType {
    pub returns: Box<Type>,
    pub arguments: Vec<Type>,
}

#[derive(Clone, Debug)]
pub enum TypeKind {
    Primitive(Primitive),
    Array(ArrayType),
    Structure(Structure),
    Function(FunctionType),
    Enumeration(Enumeration),
}

/// A fully-resolved type: a `TypeKind` plus the mutability flag the
/// binder attaches at the declaration site. Two types compare equal
/// regardless of this flag; `is_assignable_to` is the relation that
/// actually consults mutability at the call site (via the declaration,
/// not the type itself — mirroring the original, which stores the flag
/// only for display/bookkeeping purposes).
#[derive(Clone, Debug)]
pub struct Type {
    pub kind: TypeKind,
    pub is_mutable: bool,
}

impl Type {
    pub fn primitive(primitive: Primitive) -> Self {
        Type { kind: TypeKind::Primitive(primitive), is_mutable: false }
    }

    pub fn void() -> Self {
        Type::primitive(Primitive::Void)
    }

    pub fn array(base: Type, count: Option<usize>) -> Self {
        Type { kind: TypeKind::Array(ArrayType { base: Box::new(base), count }), is_mutable: false }
    }

    pub fn structure(fields: Structure) -> Self {
        Type { kind: TypeKind::Structure(fields), is_mutable: false }
    }

    pub fn function(returns: Type, arguments: Vec<Type>) -> Self {
        Type { kind: TypeKind::Function(FunctionType { returns: Box::new(returns), arguments }), is_mutable: false }
    }

    pub fn enumeration(members: Enumeration) -> Self {
        Type { kind: TypeKind::Enumeration(members), is_mutable: false }
    }

    pub fn as_mutable(mut self) -> Self {
        self.is_mutable = true;
        self
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_))
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    /// `Types::type::isAssignableTo`. A value of `self`'s type may be
    /// assigned where `other` is expected.
    pub fn is_assignable_to(&self, other: &Type) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => a == b,
            (TypeKind::Array(a), TypeKind::Array(b)) => {
                if a.count == Some(0) {
                    return true;
                }
                if !a.base.is_assignable_to(&b.base) {
                    return false;
                }
                match (a.count, b.count) {
                    (Some(ac), Some(bc)) => ac == bc,
                    (_, None) => true,
                    (None, Some(_)) => false,
                }
            }
            (TypeKind::Structure(a), TypeKind::Structure(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|((at, _), (bt, _))| at.is_assignable_to(bt))
            }
            (TypeKind::Function(a), TypeKind::Function(b)) => {
                a.returns == b.returns && a.arguments == b.arguments
            }
            (TypeKind::Enumeration(a), TypeKind::Enumeration(b)) => a == b,
            _ => false,
        }
    }

    /// `Types::type::isCompatible`: assignable in either direction.
    pub fn is_compatible(&self, other: &Type) -> bool {
        self.is_assignable_to(other) || other.is_assignable_to(self)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (&self.kind, &other.kind) {
            (TypeKind::Primitive(a), TypeKind::Primitive(b)) => a == b,
            (TypeKind::Array(a), TypeKind::Array(b)) => a.base == b.base && a.count == b.count,
            (TypeKind::Structure(a), TypeKind::Structure(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|((at, an), (bt, bn))| at == bt && an == bn)
            }
            (TypeKind::Function(a), TypeKind::Function(b)) => {
                a.returns == b.returns && a.arguments == b.arguments
            }
            (TypeKind::Enumeration(a), TypeKind::Enumeration(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mutable {
            write!(f, "mut ")?;
        }
        match &self.kind {
            TypeKind::Primitive(p) => write!(f, "{}", p),
            TypeKind::Array(a) => match a.count {
                Some(count) => write!(f, "[{}; {}]", a.base, count),
                None => write!(f, "[{}]", a.base),
            },
            TypeKind::Structure(fields) => {
                write!(f, "struct {{ ")?;
                for (ty, name) in fields {
                    write!(f, "{}: {}, ", name, ty)?;
                }
                write!(f, "}}")
            }
            TypeKind::Function(func) => {
                write!(f, "fn(")?;
                for (i, arg) in func.arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, "): {}", func.returns)
            }
            TypeKind::Enumeration(members) => {
                write!(f, "enum {{ ")?;
                for (name, ty) in members {
                    write!(f, "{}({}), ", name, ty)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_top_level_mutability() {
        let a = Type::primitive(Primitive::I32);
        let b = Type::primitive(Primitive::I32).as_mutable();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_count_array_is_assignable_to_anything() {
        let empty = Type::array(Type::primitive(Primitive::I32), Some(0));
        let target = Type::array(Type::primitive(Primitive::String), Some(4));
        assert!(empty.is_assignable_to(&target));
    }

    #[test]
    fn unbounded_target_array_accepts_any_count() {
        let sized = Type::array(Type::primitive(Primitive::I32), Some(4));
        let unbounded = Type::array(Type::primitive(Primitive::I32), None);
        assert!(sized.is_assignable_to(&unbounded));
        assert!(!unbounded.is_assignable_to(&sized));
    }

    #[test]
    fn structures_compare_fields_pairwise() {
        let a = Type::structure(vec![(Type::primitive(Primitive::I32), "x".into())]);
        let b = Type::structure(vec![(Type::primitive(Primitive::I32), "x".into())]);
        assert!(a.is_assignable_to(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn is_compatible_is_symmetric_closure_of_assignable() {
        let sized = Type::array(Type::primitive(Primitive::I32), Some(4));
        let unbounded = Type::array(Type::primitive(Primitive::I32), None);
        assert!(sized.is_compatible(&unbounded));
        assert!(unbounded.is_compatible(&sized));
    }
}
