//! CLI entry point (spec.md §6): wires the pipeline stages together and
//! maps the result to a process exit code.

use anyhow::Context;
use clap::Parser;
use linc::config::Config;
use linc::diagnostics::Diagnostics;
use linc::error::LincError;
use linc::folder;
use linc::interpreter;
use linc::lexer;
use linc::parser;
use linc::preprocessor::{IncludeConfig, Preprocessor};
use linc::span::SourceMap;
use linc::tokens::{Token, TokenKind};
use std::collections::HashSet;
use std::process::ExitCode;

const COPYRIGHT: &str = "linc  Copyright (C) 2026\n\
This program comes with ABSOLUTELY NO WARRANTY.\n\
This is free software, and you are welcome to redistribute it\n\
under the terms of the LGPL-3.0-or-later license.";

fn main() -> ExitCode {
    let config = Config::parse();
    env_logger::init();

    if config.copyright {
        println!("{}", COPYRIGHT);
        return ExitCode::SUCCESS;
    }

    match run(&config) {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("linc: {:#}", err);
            exit_code(1)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from((code & 0xff) as u8)
}

/// Drives the five-stage pipeline end to end and returns the process
/// exit code per spec.md §6 (0 success, 1 host error surfaces via
/// `Err` instead, 4 compilation failure, `main`'s value otherwise).
fn run(config: &Config) -> anyhow::Result<i32> {
    let mut sources = SourceMap::new();
    let mut diagnostics = Diagnostics::new();
    let include_config = IncludeConfig { roots: config.include_roots.clone() };

    let (file_id, argv) = if let Some(expr) = &config.eval {
        (sources.add_file("<expr>", expr), Vec::new())
    } else {
        let path = config.files.first().ok_or_else(|| LincError::NoEntryFile(Default::default()))?;
        let text = std::fs::read_to_string(path).map_err(|source| LincError::ReadSource { path: path.clone(), source })?;
        let argv = config.files.iter().skip(1).map(|p| p.display().to_string()).collect();
        (sources.add_file(path, &text), argv)
    };

    let tokens = lexer::tokenize(&sources, file_id, &mut diagnostics);
    let mut guarded_files = HashSet::new();
    let mut preprocessor = Preprocessor::new(tokens, sources.path(file_id).to_path_buf(), &include_config, &mut guarded_files);
    for define in config.parsed_defines() {
        preprocessor.seed_define(define.name, define_body(define.value, file_id));
    }
    let tokens = preprocessor.expand(&mut sources, &mut diagnostics);

    let decls = parser::parse_program(tokens, &mut diagnostics);
    let program = linc::binder::bind_program(decls, &mut diagnostics);
    let declarations = if config.optimize { folder::fold_program(program.declarations, &mut diagnostics) } else { program.declarations };

    let color = !config.no_color;

    if diagnostics.has_error() {
        eprintln!("{}", diagnostics.render_all_colored(&sources, color));
        write_diagnostics_log(config, &diagnostics)?;
        return Ok(4);
    }

    let exit = interpreter::evaluate_program(&declarations, &mut diagnostics, argv);

    if !diagnostics.reports().is_empty() {
        eprintln!("{}", diagnostics.render_all_colored(&sources, color));
    }
    write_diagnostics_log(config, &diagnostics)?;
    if diagnostics.has_error() {
        return Ok(2);
    }

    if config.eval.is_some() {
        println!("{}", exit);
    }

    Ok(exit)
}

/// Builds the token body for a `-D name=value` flag's synthetic
/// `#define`: a single string literal token when a value was given, an
/// empty body (an object-like marker define) otherwise.
fn define_body(value: Option<String>, file: linc::span::FileId) -> Vec<Token> {
    let span = linc::span::Span::point(file, 0, 0);
    match value {
        Some(value) => vec![Token::with_value(TokenKind::StringLiteral, value, span)],
        None => Vec::new(),
    }
}

fn write_diagnostics_log(config: &Config, diagnostics: &Diagnostics) -> anyhow::Result<()> {
    let path = match &config.diagnostics_log {
        Some(path) => path,
        None => return Ok(()),
    };
    let json = serde_json::to_string_pretty(diagnostics.reports()).context("serialising diagnostics")?;
    std::fs::write(path, json).with_context(|| format!("writing diagnostics log to '{}'", path.display()))?;
    Ok(())
}
