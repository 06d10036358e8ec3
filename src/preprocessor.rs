//! Token-level macro expansion, include resolution, and include guards
//! (spec.md §4.4), grounded on
//! `examples/original_source/core/include/linc/preprocessor/Preprocessor.hpp`.

use crate::diagnostics::{Diagnostics, Stage};
use crate::lexer;
use crate::span::{FileId, SourceMap, Span};
use crate::tokens::{Token, TokenKind};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
struct Definition {
    name: String,
    body: Vec<Token>,
}

#[derive(Clone, Debug)]
struct Macro {
    name: String,
    arguments: Vec<String>,
    body: Vec<Token>,
}

/// Directories searched for `#include "path"` targets, in order:
/// includer-relative first, then each `-I` root (spec.md §6).
#[derive(Clone, Default)]
pub struct IncludeConfig {
    pub roots: Vec<PathBuf>,
}

/// Expands one token stream. A fresh `Preprocessor` is constructed per
/// recursive `#include`/macro-body expansion and inherits the caller's
/// definition/macro tables, exactly as the original's recursive
/// `Preprocessor` instantiation does.
pub struct Preprocessor<'a> {
    tokens: Vec<Token>,
    index: usize,
    file_path: PathBuf,
    include_config: &'a IncludeConfig,
    definitions: Vec<Definition>,
    macros: Vec<Macro>,
    guarded_files: &'a mut HashSet<PathBuf>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(
        tokens: Vec<Token>,
        file_path: impl AsRef<Path>,
        include_config: &'a IncludeConfig,
        guarded_files: &'a mut HashSet<PathBuf>,
    ) -> Self {
        Preprocessor {
            tokens,
            index: 0,
            file_path: file_path.as_ref().to_path_buf(),
            include_config,
            definitions: Vec::new(),
            macros: Vec::new(),
            guarded_files,
        }
    }

    fn with_inherited(
        tokens: Vec<Token>,
        file_path: PathBuf,
        include_config: &'a IncludeConfig,
        guarded_files: &'a mut HashSet<PathBuf>,
        definitions: Vec<Definition>,
        macros: Vec<Macro>,
    ) -> Self {
        Preprocessor { tokens, index: 0, file_path, include_config, definitions, macros, guarded_files }
    }

    pub fn seed_define(&mut self, name: impl Into<String>, body: Vec<Token>) {
        self.definitions.push(Definition { name: name.into(), body });
    }

    pub fn expand(mut self, sources: &mut SourceMap, diagnostics: &mut Diagnostics) -> Vec<Token> {
        let mut output = Vec::new();

        if self.leading_guard_directive() {
            let absolute = absolute_path(&self.file_path);
            self.consume();
            self.consume();
            self.guarded_files.insert(absolute);
        }

        while let Some(token) = self.peek(0).cloned() {
            if token.is_eof() {
                break;
            }
            if token.kind == TokenKind::Identifier {
                self.consume();
                if self.expand_identifier(&token, &mut output, sources, diagnostics) {
                    continue;
                }
                output.push(token);
                continue;
            }
            if token.kind != TokenKind::PreprocessorSpecifier {
                output.push(self.consume());
                continue;
            }
            self.consume();
            self.run_directive(&mut output, sources, diagnostics);
        }

        glue_pass(&mut output, diagnostics);
        output
    }

    fn leading_guard_directive(&self) -> bool {
        self.tokens.len() >= 2
            && self.tokens[0].kind == TokenKind::PreprocessorSpecifier
            && self.tokens[1].kind == TokenKind::Identifier
            && self.tokens[1].value.as_deref() == Some("guard")
    }

    fn expand_identifier(
        &mut self,
        identifier: &Token,
        output: &mut Vec<Token>,
        sources: &mut SourceMap,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let name = match &identifier.value {
            Some(name) => name.clone(),
            None => return false,
        };

        if let Some(def) = self.definitions.iter().find(|d| d.name == name).cloned() {
            output.extend(def.body);
            return true;
        }

        if let Some(m) = self.macros.iter().find(|m| m.name == name).cloned() {
            self.expand_macro_call(&m, output, sources, diagnostics);
            return true;
        }

        false
    }

    fn expand_macro_call(
        &mut self,
        macro_def: &Macro,
        output: &mut Vec<Token>,
        sources: &mut SourceMap,
        diagnostics: &mut Diagnostics,
    ) {
        self.expect(TokenKind::ParenLeft, diagnostics);

        let mut arguments: Vec<Vec<Token>> = vec![Vec::new()];
        let mut depth = 0i32;
        let mut closed = false;
        while let Some(tok) = self.peek(0).cloned() {
            if tok.is_eof() {
                break;
            }
            if tok.kind == TokenKind::ParenRight && depth == 0 {
                closed = true;
                break;
            }
            if tok.kind == TokenKind::ParenLeft {
                depth += 1;
            } else if tok.kind == TokenKind::ParenRight {
                depth -= 1;
            }
            arguments.last_mut().unwrap().push(self.consume());
            if self.peek(0).map(|t| t.kind == TokenKind::Comma).unwrap_or(false) && depth == 0 {
                self.consume();
                arguments.push(Vec::new());
            }
        }
        if !closed {
            diagnostics.error(Stage::Preprocessor, Some(self.here()), "unmatched parentheses in macro invocation");
        }
        self.expect(TokenKind::ParenRight, diagnostics);

        let body = embed_macro_arguments(macro_def, &arguments);
        let sub = Preprocessor::with_inherited(
            with_eof(body, self.here()),
            self.file_path.clone(),
            self.include_config,
            self.guarded_files,
            self.definitions.clone(),
            self.macros.clone(),
        );
        output.extend(sub.expand(sources, diagnostics));
    }

    fn run_directive(&mut self, output: &mut Vec<Token>, sources: &mut SourceMap, diagnostics: &mut Diagnostics) {
        let directive = self.expect(TokenKind::Identifier, diagnostics);
        let name = directive.value.clone().unwrap_or_default();

        match name.as_str() {
            "include" => self.run_include(output, sources, diagnostics),
            "define" => self.run_define(diagnostics),
            "macro" => self.run_macro(diagnostics),
            "guard" => {
                diagnostics.error(Stage::Preprocessor, Some(directive.span.clone()), "include guard must be at the start of the file");
            }
            _ => {
                diagnostics.error(Stage::Preprocessor, Some(directive.span.clone()), format!("invalid preprocessor directive '{}'", name));
            }
        }
    }

    fn run_include(&mut self, output: &mut Vec<Token>, sources: &mut SourceMap, diagnostics: &mut Diagnostics) {
        let literal = self.expect(TokenKind::StringLiteral, diagnostics);
        let requested = literal.value.clone().unwrap_or_default();
        let requested_path = Path::new(&requested);

        let candidate = if requested_path.is_absolute() {
            Some(requested_path.to_path_buf())
        } else {
            let relative_to_includer = self.file_path.parent().unwrap_or_else(|| Path::new(".")).join(requested_path);
            if relative_to_includer.exists() {
                Some(relative_to_includer)
            } else {
                self.include_config
                    .roots
                    .iter()
                    .map(|root| root.join(requested_path))
                    .find(|candidate| candidate.exists())
            }
        };

        let path = match candidate {
            Some(path) if path.exists() => path,
            _ => {
                diagnostics.warning(
                    Stage::Preprocessor,
                    Some(literal.span.clone()),
                    format!("include directive target path '{}' does not exist", requested),
                );
                return;
            }
        };

        if self.guarded_files.contains(&absolute_path(&path)) {
            return;
        }

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                diagnostics.warning(Stage::Preprocessor, Some(literal.span.clone()), format!("could not read '{}': {}", path.display(), err));
                return;
            }
        };

        let file_id = sources.add_file(&path, &text);
        let mut included_tokens = lexer::tokenize(sources, file_id, diagnostics);
        included_tokens.pop(); // drop trailing EOF before splicing, per spec.md §4.4

        let sub = Preprocessor::with_inherited(
            with_eof(included_tokens, literal.span.clone()),
            path,
            self.include_config,
            self.guarded_files,
            self.definitions.clone(),
            self.macros.clone(),
        );
        let mut expanded = sub.expand(sources, diagnostics);
        expanded.pop();
        output.extend(expanded);
    }

    fn run_define(&mut self, diagnostics: &mut Diagnostics) {
        let identifier = self.expect(TokenKind::Identifier, diagnostics);
        let name = identifier.value.clone().unwrap_or_default();
        let mut body = Vec::new();
        while let Some(tok) = self.peek(0).cloned() {
            if tok.kind == TokenKind::PreprocessorSpecifier {
                break;
            }
            body.push(self.consume());
        }
        self.consume(); // closing `#`
        self.definitions.push(Definition { name, body });
    }

    fn run_macro(&mut self, diagnostics: &mut Diagnostics) {
        let identifier = self.expect(TokenKind::Identifier, diagnostics);
        let name = identifier.value.clone().unwrap_or_default();
        let mut arguments = Vec::new();
        self.expect(TokenKind::ParenLeft, diagnostics);

        while self.peek(0).map(|t| t.kind == TokenKind::Identifier).unwrap_or(false) {
            let arg = self.consume();
            arguments.push(arg.value.clone().unwrap_or_default());
            let at_close = self.peek(0).map(|t| t.kind == TokenKind::ParenRight).unwrap_or(false);
            if at_close {
                self.consume();
                break;
            }
            self.expect(TokenKind::Comma, diagnostics);
        }

        let mut body = Vec::new();
        while let Some(tok) = self.peek(0).cloned() {
            if tok.kind == TokenKind::PreprocessorSpecifier {
                break;
            }
            body.push(self.consume());
        }
        self.expect(TokenKind::PreprocessorSpecifier, diagnostics);
        self.macros.push(Macro { name, arguments, body });
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.index + offset)
    }

    fn consume(&mut self) -> Token {
        let token = self.tokens.get(self.index).cloned().unwrap_or_else(|| Token::new(TokenKind::EndOfFile, self.here()));
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, diagnostics: &mut Diagnostics) -> Token {
        match self.peek(0) {
            Some(tok) if tok.kind == kind => self.consume(),
            _ => {
                let span = self.here();
                diagnostics.error(Stage::Preprocessor, Some(span.clone()), format!("expected {:?}", kind));
                Token::new(kind, span)
            }
        }
    }

    fn here(&self) -> Span {
        self.peek(0).map(|t| t.span.clone()).unwrap_or_else(|| self.tokens.last().unwrap().span.clone())
    }
}

fn with_eof(mut tokens: Vec<Token>, span: Span) -> Vec<Token> {
    tokens.push(Token::new(TokenKind::EndOfFile, span));
    tokens
}

fn embed_macro_arguments(macro_def: &Macro, arguments: &[Vec<Token>]) -> Vec<Token> {
    let mut result = Vec::with_capacity(macro_def.body.len() * 2);
    for token in &macro_def.body {
        if token.kind == TokenKind::Identifier {
            if let Some(value) = &token.value {
                if let Some(pos) = macro_def.arguments.iter().position(|a| a == value) {
                    if let Some(substituted) = arguments.get(pos) {
                        result.extend(substituted.iter().cloned());
                        continue;
                    }
                }
            }
        }
        result.push(token.clone());
    }
    result
}

/// Final pass: rewrites every `Identifier GlueSpecifier Identifier`
/// triple into one identifier whose value is the concatenation of the
/// two (spec.md §4.4).
fn glue_pass(output: &mut Vec<Token>, diagnostics: &mut Diagnostics) {
    let mut i = 0;
    while i + 2 < output.len() {
        if output[i].kind == TokenKind::Identifier && output[i + 1].kind == TokenKind::GlueSpecifier {
            if output[i + 2].kind != TokenKind::Identifier {
                diagnostics.error(Stage::Preprocessor, Some(output[i + 1].span.clone()), "cannot glue a non-identifier");
                i += 1;
                continue;
            }
            let left = output[i].value.clone().unwrap_or_default();
            let right = output[i + 2].value.clone().unwrap_or_default();
            let span = output[i].span.join(&output[i + 2].span);
            output[i] = Token::with_value(TokenKind::Identifier, format!("{}{}", left, right), span);
            output.drain(i + 1..i + 3);
            continue;
        }
        i += 1;
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostics;

    fn expand_source(src: &str) -> (Vec<Token>, Diagnostics) {
        let mut sources = SourceMap::new();
        let file = sources.add_file("<test>", src);
        let mut diagnostics = Diagnostics::new();
        let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
        let include_config = IncludeConfig::default();
        let mut guarded = HashSet::new();
        let preprocessor = Preprocessor::new(tokens, "<test>", &include_config, &mut guarded);
        let expanded = preprocessor.expand(&mut sources, &mut diagnostics);
        (expanded, diagnostics)
    }

    #[test]
    fn object_like_define_splices_body() {
        let (tokens, diags) = expand_source("#define N 42 #\nN");
        assert!(!diags.has_error());
        assert_eq!(tokens[0].kind, TokenKind::I32Literal);
        assert_eq!(tokens[0].value.as_deref(), Some("42"));
    }

    #[test]
    fn parameterised_macro_substitutes_arguments() {
        let (tokens, diags) = expand_source("#macro add(a, b) a + b #\nadd(1, 2)");
        assert!(!diags.has_error());
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert!(kinds.contains(&TokenKind::Plus));
    }

    #[test]
    fn glue_pass_concatenates_identifiers() {
        let (tokens, diags) = expand_source("foo ## bar");
        assert!(!diags.has_error());
        assert_eq!(tokens[0].kind, TokenKind::Identifier);
        assert_eq!(tokens[0].value.as_deref(), Some("foobar"));
    }

    #[test]
    fn unmatched_macro_parens_is_an_error() {
        let (_, diags) = expand_source("#macro m(a) a #\nm(1");
        assert!(diags.has_error());
    }
}
