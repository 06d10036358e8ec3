//! Byte stream → token stream (spec.md §4.3), grounded on
//! `examples/original_source/core/src/lexer/Lexer.cpp`'s recognition
//! order: whitespace, line comments, numeric literals, string literals,
//! character literals, words, brackets, then symbolic operators.

use crate::diagnostics::{Diagnostics, Stage};
use crate::span::{FileId, SourceMap, Span};
use crate::tokens::{keyword_kind, suffix_kind, NumberBase, Token, TokenKind};
use lazy_static::lazy_static;
use std::str::Chars;

lazy_static! {
    /// Symbolic-operator characters, matched with greedy longest-match
    /// in `tokenize_operator`.
    static ref SYMBOL_CHARS: &'static str = "!@#$%^&*-=+~`|<>:/.";
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    index: usize,
    line: u32,
    col: u32,
    file: FileId,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: FileId) -> Self {
        Lexer { source, chars: source.chars().collect(), index: 0, line: 1, col: 0, file }
    }

    pub fn tokenize(mut self, diagnostics: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                self.consume();
                self.line += 1;
                self.col = 0;
                continue;
            }
            if c.is_whitespace() {
                self.consume();
                continue;
            }
            if c == '#' && !self.at_directive_position() {
                self.skip_line_comment();
                continue;
            }
            if self.at_number_start() {
                tokens.push(self.tokenize_number(diagnostics));
                continue;
            }
            if c == '"' {
                tokens.push(self.tokenize_string(diagnostics));
                continue;
            }
            if c == '\'' {
                tokens.push(self.tokenize_char(diagnostics));
                continue;
            }
            if c.is_alphabetic() || c == '_' {
                tokens.push(self.tokenize_word());
                continue;
            }
            if let Some(kind) = bracket_kind(c) {
                let span = self.span_here();
                self.consume();
                tokens.push(Token::new(kind, span));
                continue;
            }
            tokens.push(self.tokenize_operator(diagnostics));
        }
        tokens.push(Token::new(TokenKind::EndOfFile, self.span_here()));
        tokens
    }

    /// `#` begins a directive (kept for the preprocessor stage to see)
    /// only at the start of a logical line; elsewhere it begins a
    /// comment. This mirrors the disambiguation spec.md §4.3 describes:
    /// the preprocessor stage runs directly over this token stream, so
    /// the lexer only needs to decide which `#` tokens survive at all.
    fn at_directive_position(&self) -> bool {
        let mut i = self.index;
        while i > 0 {
            i -= 1;
            match self.chars[i] {
                ' ' | '\t' | '\r' => continue,
                '\n' => return true,
                _ => return false,
            }
        }
        true
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.consume();
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.index + offset).copied()
    }

    fn consume(&mut self) -> char {
        let c = self.chars[self.index];
        self.index += 1;
        self.col += 1;
        c
    }

    fn span_here(&self) -> Span {
        Span::point(self.file, self.line, self.col)
    }

    fn span_from(&self, start_line: u32, start_col: u32) -> Span {
        Span::new(self.file, start_line, start_col, self.line, self.col)
    }

    fn at_number_start(&self) -> bool {
        match self.peek(0) {
            Some(c) if c.is_ascii_digit() => true,
            Some('.') => matches!(self.peek(1), Some(c) if c.is_ascii_digit()),
            _ => false,
        }
    }

    fn tokenize_number(&mut self, diagnostics: &mut Diagnostics) -> Token {
        let start_line = self.line;
        let start_col = self.col;
        let mut base = NumberBase::Dec;
        let mut digits = String::new();

        if self.peek(0) == Some('0') && matches!(self.peek(1), Some('x') | Some('X')) {
            base = NumberBase::Hex;
            self.consume();
            self.consume();
            while matches!(self.peek(0), Some(c) if c.is_ascii_hexdigit()) {
                digits.push(self.consume());
            }
        } else if self.peek(0) == Some('0') && matches!(self.peek(1), Some('b') | Some('B')) {
            base = NumberBase::Bin;
            self.consume();
            self.consume();
            while matches!(self.peek(0), Some('0') | Some('1')) {
                digits.push(self.consume());
            }
        } else {
            let mut decimal_count = 0u32;
            while let Some(c) = self.peek(0) {
                if c.is_ascii_digit() {
                    digits.push(self.consume());
                } else if c == '.' && matches!(self.peek(1), Some(d) if d.is_ascii_digit()) && decimal_count == 0 {
                    decimal_count += 1;
                    digits.push(self.consume());
                } else {
                    break;
                }
            }
        }

        let mut suffix = String::new();
        while matches!(self.peek(0), Some(c) if c.is_alphanumeric()) {
            suffix.push(self.consume());
        }

        let span = self.span_from(start_line, start_col);
        let is_float = digits.contains('.');

        if suffix.is_empty() {
            let kind = if is_float { TokenKind::F32Literal } else { TokenKind::I32Literal };
            return Token::with_number(kind, digits, base, span);
        }

        match suffix_kind(&suffix) {
            Some(kind) => Token::with_number(kind, digits, base, span),
            None => {
                diagnostics.error(
                    Stage::Lexer,
                    Some(span.clone()),
                    format!("unknown numeric literal suffix '{}'", suffix),
                );
                Token::with_value(TokenKind::Invalid, format!("{}{}", digits, suffix), span)
            }
        }
    }

    fn tokenize_string(&mut self, diagnostics: &mut Diagnostics) -> Token {
        let start_line = self.line;
        let start_col = self.col;
        self.consume(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    let span = self.span_from(start_line, start_col);
                    diagnostics.error(Stage::Lexer, Some(span.clone()), "unterminated string literal");
                    return Token::with_value(TokenKind::Invalid, value, span);
                }
                Some('\\') => {
                    self.consume();
                    let escaped = self.peek(0);
                    value.push(unescape(escaped, diagnostics, self.span_here()));
                    if escaped.is_some() {
                        self.consume();
                    }
                }
                Some('"') => {
                    self.consume();
                    return Token::with_value(TokenKind::StringLiteral, value, self.span_from(start_line, start_col));
                }
                Some(c) => {
                    value.push(c);
                    self.consume();
                }
            }
        }
    }

    fn tokenize_char(&mut self, diagnostics: &mut Diagnostics) -> Token {
        let start_line = self.line;
        let start_col = self.col;
        self.consume(); // opening quote
        let mut value = String::new();
        loop {
            match self.peek(0) {
                None | Some('\n') => {
                    let span = self.span_from(start_line, start_col);
                    diagnostics.error(Stage::Lexer, Some(span.clone()), "unterminated character literal");
                    return Token::with_value(TokenKind::Invalid, value, span);
                }
                Some('\\') => {
                    self.consume();
                    let escaped = self.peek(0);
                    value.push(unescape(escaped, diagnostics, self.span_here()));
                    if escaped.is_some() {
                        self.consume();
                    }
                }
                Some('\'') => {
                    self.consume();
                    let span = self.span_from(start_line, start_col);
                    if value.chars().count() != 1 {
                        diagnostics.error(Stage::Lexer, Some(span.clone()), "character literal must contain exactly one character");
                    }
                    return Token::with_value(TokenKind::CharacterLiteral, value, span);
                }
                Some(c) => {
                    value.push(c);
                    self.consume();
                }
            }
        }
    }

    fn tokenize_word(&mut self) -> Token {
        let start_line = self.line;
        let start_col = self.col;
        let mut word = String::new();
        while let Some(c) = self.peek(0) {
            if c.is_alphanumeric() || c == '_' {
                word.push(self.consume());
            } else {
                break;
            }
        }
        let span = self.span_from(start_line, start_col);
        match keyword_kind(&word) {
            Some(kind) => Token::new(kind, span),
            None => Token::with_value(TokenKind::Identifier, word, span),
        }
    }

    fn tokenize_operator(&mut self, diagnostics: &mut Diagnostics) -> Token {
        let start_line = self.line;
        let start_col = self.col;
        let mut symbol = String::new();
        while matches!(self.peek(0), Some(c) if SYMBOL_CHARS.contains(c)) {
            symbol.push(self.consume());
        }
        let span = self.span_from(start_line, start_col);
        if symbol.is_empty() {
            // Unrecognised byte: emit a one-character invalid token so
            // downstream stages stay aligned with the source text.
            self.consume();
            return Token::new(TokenKind::Invalid, span);
        }
        match operator_kind(&symbol) {
            Some(kind) => Token::new(kind, span),
            None => {
                diagnostics.error(Stage::Lexer, Some(span.clone()), format!("unrecognised operator '{}'", symbol));
                Token::with_value(TokenKind::Invalid, symbol, span)
            }
        }
    }
}

fn bracket_kind(c: char) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match c {
        '(' => ParenLeft,
        ')' => ParenRight,
        '[' => SquareLeft,
        ']' => SquareRight,
        '{' => BraceLeft,
        '}' => BraceRight,
        ',' => Comma,
        ';' => Terminator,
        _ => return None,
    })
}

/// Greedy longest-match table for symbolic operators, grounded on
/// `original_source/core/src/lexer/Operators.cpp`'s string-keyed lookup,
/// extended with the double-colon, arrow, range, glue, and preprocessor
/// forms spec.md §3 names but the original's flatter token set lacked.
fn operator_kind(symbol: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match symbol {
        "+" => Plus,
        "-" => Minus,
        "*" => Star,
        "/" => Slash,
        "%" => Percent,
        "++" => Increment,
        "--" => Decrement,
        "==" => Equals,
        "!=" => NotEquals,
        "<" => Less,
        ">" => Greater,
        "<=" => LessEqual,
        ">=" => GreaterEqual,
        "&&" => LogicalAnd,
        "||" => LogicalOr,
        "!" => LogicalNot,
        "&" => BitwiseAnd,
        "|" => BitwiseOr,
        "^" => BitwiseXor,
        "~" => Tilde,
        "<<" => ShiftLeft,
        ">>" => ShiftRight,
        "=" => Assign,
        "+=" => AssignAdd,
        "-=" => AssignSub,
        "*=" => AssignMul,
        "/=" => AssignDiv,
        "%=" => AssignMod,
        "@" => At,
        ":" => Colon,
        ":=" => ColonEquals,
        "::" => DoubleColon,
        "." => Dot,
        ".." => RangeSpecifier,
        "->" => Arrow,
        "#" => PreprocessorSpecifier,
        "##" => GlueSpecifier,
        _ => return None,
    })
}

fn unescape(c: Option<char>, diagnostics: &mut Diagnostics, span: Span) -> char {
    match c {
        Some('n') => '\n',
        Some('t') => '\t',
        Some('r') => '\r',
        Some('0') => '\0',
        Some('\\') => '\\',
        Some('"') => '"',
        Some('\'') => '\'',
        Some(other) => other,
        None => {
            diagnostics.error(Stage::Lexer, Some(span), "dangling escape at end of input");
            '\0'
        }
    }
}

pub fn tokenize(sources: &SourceMap, file: FileId, diagnostics: &mut Diagnostics) -> Vec<Token> {
    let text = (0..).map_while(|n| sources.line(file, n + 1)).collect::<Vec<_>>().join("\n");
    Lexer::new(&text, file).tokenize(diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (Vec<Token>, Diagnostics) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("<test>", src);
        let mut diagnostics = Diagnostics::new();
        let tokens = tokenize(&sources, file, &mut diagnostics);
        (tokens, diagnostics)
    }

    #[test]
    fn lexes_suffixed_integer_literal() {
        let (tokens, diags) = lex("42u8");
        assert!(!diags.has_error());
        assert_eq!(tokens[0].kind, TokenKind::U8Literal);
        assert_eq!(tokens[0].value.as_deref(), Some("42"));
    }

    #[test]
    fn defaults_unsuffixed_integer_to_i32() {
        let (tokens, _) = lex("7");
        assert_eq!(tokens[0].kind, TokenKind::I32Literal);
    }

    #[test]
    fn defaults_unsuffixed_float_to_f32() {
        let (tokens, _) = lex("1.5");
        assert_eq!(tokens[0].kind, TokenKind::F32Literal);
    }

    #[test]
    fn string_literal_supports_escaped_quote() {
        let (tokens, diags) = lex("\"a\\\"b\"");
        assert!(!diags.has_error());
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].value.as_deref(), Some("a\"b"));
    }

    #[test]
    fn unterminated_string_reports_error() {
        let (tokens, diags) = lex("\"abc\nreturn");
        assert!(diags.has_error());
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
    }

    #[test]
    fn keyword_table_wins_over_identifier() {
        let (tokens, _) = lex("while true");
        assert_eq!(tokens[0].kind, TokenKind::KeywordWhile);
        assert_eq!(tokens[1].kind, TokenKind::KeywordTrue);
    }

    #[test]
    fn line_comment_is_skipped() {
        let (tokens, _) = lex("1 # a comment\n2");
        assert_eq!(tokens[0].kind, TokenKind::I32Literal);
        assert_eq!(tokens[1].kind, TokenKind::I32Literal);
    }

    #[test]
    fn greedy_operator_match_prefers_longest() {
        let (tokens, _) = lex("<=");
        assert_eq!(tokens[0].kind, TokenKind::LessEqual);
    }

    #[test]
    fn unrecognised_byte_yields_single_invalid_token() {
        let (tokens, _) = lex("$$$");
        // `$` is not currently bound to an operator kind, so the whole
        // greedy run is reported once, preserving alignment.
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
    }
}
