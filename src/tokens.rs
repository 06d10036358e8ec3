//! The token model (spec.md §3 "Token"): kind, optional literal value, an
//! optional numeric base tag, and the span the token occupies.

use crate::span::Span;
use enumflags2::BitFlags;
use std::fmt;

/// The numeric base a numeric literal was written in. Carried so the
/// binder can re-parse the literal's digit run without re-lexing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberBase {
    Dec,
    Hex,
    Bin,
}

#[derive(BitFlags, Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OperatorCategory {
    Arithmetic = 1 << 0,
    Comparison = 1 << 1,
    Logical = 1 << 2,
    Bitwise = 1 << 3,
    Assignment = 1 << 4,
    CompoundAssignment = 1 << 5,
    Stringify = 1 << 6,
    Typeof = 1 << 7,
    IncrementDecrement = 1 << 8,
    Range = 1 << 9,
    Modifier = 1 << 10,
    Glue = 1 << 11,
    Preprocessor = 1 << 12,
    Terminator = 1 << 13,
}

pub type OperatorCategories = BitFlags<OperatorCategory>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Invalid,
    EndOfFile,

    // Keywords
    KeywordFn,
    KeywordExt,
    KeywordStruct,
    KeywordEnum,
    KeywordGeneric,
    KeywordIf,
    KeywordElse,
    KeywordWhile,
    KeywordFinally,
    KeywordFor,
    KeywordIn,
    KeywordMatch,
    KeywordReturn,
    KeywordBreak,
    KeywordContinue,
    KeywordMut,
    KeywordAs,
    KeywordTrue,
    KeywordFalse,

    // Identifier
    Identifier,

    // Brackets and punctuation
    ParenLeft,
    ParenRight,
    SquareLeft,
    SquareRight,
    BraceLeft,
    BraceRight,
    Comma,
    Colon,
    ColonEquals,
    DoubleColon,
    Dot,
    Arrow,
    Terminator,
    RangeSpecifier,       // `..`
    PreprocessorSpecifier, // `#`
    GlueSpecifier,         // `##`
    Tilde,                 // loop-label sigil `~`

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Increment,
    Decrement,

    // Comparison
    Equals,
    NotEquals,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,

    // Logical
    LogicalAnd,
    LogicalOr,
    LogicalNot,

    // Bitwise
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    BitwiseNot,
    ShiftLeft,
    ShiftRight,

    // Assignment / compound assignment
    Assign,
    AssignAdd,
    AssignSub,
    AssignMul,
    AssignDiv,
    AssignMod,

    // Stringify / typeof
    At,   // `@`
    TypeOf, // unary `:`

    // Literals
    I8Literal,
    I16Literal,
    I32Literal,
    I64Literal,
    U8Literal,
    U16Literal,
    U32Literal,
    U64Literal,
    F32Literal,
    F64Literal,
    CharacterLiteral,
    StringLiteral,
}

impl TokenKind {
    pub fn is_literal(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            I8Literal | I16Literal | I32Literal | I64Literal | U8Literal | U16Literal | U32Literal
                | U64Literal | F32Literal | F64Literal | CharacterLiteral | StringLiteral
                | KeywordTrue | KeywordFalse
        )
    }

    pub fn is_keyword(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            KeywordFn | KeywordExt | KeywordStruct | KeywordEnum | KeywordGeneric | KeywordIf
                | KeywordElse | KeywordWhile | KeywordFinally | KeywordFor | KeywordIn | KeywordMatch
                | KeywordReturn | KeywordBreak | KeywordContinue | KeywordMut | KeywordAs
                | KeywordTrue | KeywordFalse
        )
    }

    /// Which operator categories (spec.md §3: "14 operator categories")
    /// this token belongs to. Non-operator tokens return an empty set.
    pub fn operator_categories(&self) -> OperatorCategories {
        use OperatorCategory::*;
        use TokenKind::*;
        match self {
            Plus | Minus | Star | Slash | Percent => BitFlags::from_flag(Arithmetic),
            Increment | Decrement => BitFlags::from_flag(IncrementDecrement),
            Equals | NotEquals | Less | Greater | LessEqual | GreaterEqual => BitFlags::from_flag(Comparison),
            LogicalAnd | LogicalOr | LogicalNot => BitFlags::from_flag(Logical),
            BitwiseAnd | BitwiseOr | BitwiseXor | BitwiseNot | ShiftLeft | ShiftRight => BitFlags::from_flag(Bitwise),
            Assign | ColonEquals => BitFlags::from_flag(Assignment),
            AssignAdd | AssignSub | AssignMul | AssignDiv | AssignMod => BitFlags::from_flag(CompoundAssignment),
            At => BitFlags::from_flag(Stringify),
            TypeOf => BitFlags::from_flag(Typeof),
            RangeSpecifier => BitFlags::from_flag(Range),
            Dot | SquareLeft => BitFlags::from_flag(Modifier),
            GlueSpecifier => BitFlags::from_flag(Glue),
            PreprocessorSpecifier => BitFlags::from_flag(Preprocessor),
            Terminator => BitFlags::from_flag(Terminator),
            _ => OperatorCategories::empty(),
        }
    }

    pub fn is_binary_operator(&self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Plus | Minus | Star | Slash | Percent
                | Assign | AssignAdd | AssignSub | AssignMul | AssignDiv | AssignMod
                | Equals | NotEquals | Less | Greater | LessEqual | GreaterEqual
                | LogicalAnd | LogicalOr
                | BitwiseAnd | BitwiseOr | BitwiseXor | ShiftLeft | ShiftRight
        )
    }

    pub fn is_unary_operator(&self) -> bool {
        use TokenKind::*;
        matches!(self, Plus | Minus | Increment | Decrement | LogicalNot | BitwiseNot | At | TypeOf)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: Option<String>,
    pub number_base: Option<NumberBase>,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, value: None, number_base: None, span }
    }

    pub fn with_value(kind: TokenKind, value: impl Into<String>, span: Span) -> Self {
        Token { kind, value: Some(value.into()), number_base: None, span }
    }

    pub fn with_number(kind: TokenKind, value: impl Into<String>, base: NumberBase, span: Span) -> Self {
        Token { kind, value: Some(value.into()), number_base: Some(base), span }
    }

    pub fn is_valid(&self) -> bool {
        self.kind != TokenKind::Invalid
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::EndOfFile
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, "{}({:?})", self.kind, v),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// The fixed keyword table used by the lexer's word recognizer.
pub fn keyword_kind(word: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match word {
        "fn" => KeywordFn,
        "ext" => KeywordExt,
        "struct" => KeywordStruct,
        "enum" => KeywordEnum,
        "generic" => KeywordGeneric,
        "if" => KeywordIf,
        "else" => KeywordElse,
        "while" => KeywordWhile,
        "finally" => KeywordFinally,
        "for" => KeywordFor,
        "in" => KeywordIn,
        "match" => KeywordMatch,
        "return" => KeywordReturn,
        "break" => KeywordBreak,
        "continue" => KeywordContinue,
        "mut" => KeywordMut,
        "as" => KeywordAs,
        "true" => KeywordTrue,
        "false" => KeywordFalse,
        _ => return None,
    })
}

/// The fixed suffix→kind map literal suffixes are classified against at
/// lex time (spec.md §4.3). Absent suffix defaults to `i32` for integral
/// literals and `f32` for floating literals, decided by the caller.
pub fn suffix_kind(suffix: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match suffix {
        "i8" => I8Literal,
        "i16" => I16Literal,
        "i32" => I32Literal,
        "i64" => I64Literal,
        "u8" => U8Literal,
        "u16" => U16Literal,
        "u32" => U32Literal,
        "u64" => U64Literal,
        "f" | "f32" => F32Literal,
        "f64" => F64Literal,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_table_excludes_identifiers() {
        assert_eq!(keyword_kind("fn"), Some(TokenKind::KeywordFn));
        assert_eq!(keyword_kind("foo"), None);
    }

    #[test]
    fn operator_categories_are_disjoint_from_non_operators() {
        assert!(TokenKind::Plus.operator_categories().contains(OperatorCategory::Arithmetic));
        assert!(TokenKind::Identifier.operator_categories().is_empty());
    }
}
