//! End-to-end pipeline scenarios (spec.md §8 "Six end-to-end scenarios"),
//! each driving the full lexer → preprocessor → parser → binder →
//! interpreter chain the way `bin/linc.rs` does.

use linc::binder;
use linc::diagnostics::Diagnostics;
use linc::folder;
use linc::interpreter;
use linc::lexer;
use linc::parser;
use linc::preprocessor::{IncludeConfig, Preprocessor};
use linc::span::SourceMap;
use std::collections::HashSet;

fn evaluate(src: &str) -> (i32, Diagnostics) {
    let mut sources = SourceMap::new();
    let file = sources.add_file("<test>", src);
    let mut diagnostics = Diagnostics::new();
    let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
    let decls = parser::parse_program(tokens, &mut diagnostics);
    let program = binder::bind_program(decls, &mut diagnostics);
    let code = interpreter::evaluate_program(&program.declarations, &mut diagnostics, Vec::new());
    (code, diagnostics)
}

#[test]
fn arithmetic_scenario() {
    let (code, diags) = evaluate("fn main(): i32 { return 2 + 3 * 4; }");
    assert!(!diags.has_error());
    assert_eq!(code, 14);
}

#[test]
fn string_and_character_concatenation_scenario() {
    // `puts` writes straight to process stdout; we only assert the
    // pipeline accepts and evaluates it cleanly with the spec'd exit code.
    let (code, diags) = evaluate(r#"fn main(): i32 { puts("ab" + 'c'); return 0; }"#);
    assert!(!diags.has_error());
    assert_eq!(code, 0);
}

#[test]
fn array_iteration_scenario() {
    let (code, diags) = evaluate("fn main(): i32 { i: mut i32 = 0; for x in [1,2,3] i += x; return i; }");
    assert!(!diags.has_error());
    assert_eq!(code, 6);
}

#[test]
fn labelled_break_scenario() {
    let (code, diags) = evaluate("fn main(): i32 { ~outer while true ~inner while true break outer; return 7; }");
    assert!(!diags.has_error());
    assert_eq!(code, 7);
}

#[test]
fn enumeration_match_scenario() {
    let src = "enum E { A(i32), B(i32) } fn main(): i32 { e := E::A(5); return match e { E::A(n) -> n, E::B(n) -> -n }; }";
    let (code, diags) = evaluate(src);
    assert!(!diags.has_error());
    assert_eq!(code, 5);
}

#[test]
fn include_guard_idempotence_scenario() {
    let dir = std::env::temp_dir().join(format!("linc-scenario-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let util_path = dir.join("util.linc");
    let main_path = dir.join("main.linc");
    std::fs::write(&util_path, "#guard\nfn util(): i32 { return 1; }\n").unwrap();
    std::fs::write(
        &main_path,
        format!(
            "#include \"{0}\"\n#include \"{0}\"\nfn main(): i32 {{ return util(); }}\n",
            util_path.display()
        ),
    )
    .unwrap();

    let mut sources = SourceMap::new();
    let mut diagnostics = Diagnostics::new();
    let text = std::fs::read_to_string(&main_path).unwrap();
    let file = sources.add_file(&main_path, &text);
    let tokens = lexer::tokenize(&sources, file, &mut diagnostics);

    let include_config = IncludeConfig::default();
    let mut guarded = HashSet::new();
    let preprocessor = Preprocessor::new(tokens, &main_path, &include_config, &mut guarded);
    let tokens = preprocessor.expand(&mut sources, &mut diagnostics);
    assert!(!diagnostics.has_error(), "{}", diagnostics.render_all(&sources));

    let decls = parser::parse_program(tokens, &mut diagnostics);
    let program = binder::bind_program(decls, &mut diagnostics);
    assert!(!diagnostics.has_error(), "{}", diagnostics.render_all(&sources));

    let code = interpreter::evaluate_program(&program.declarations, &mut diagnostics, Vec::new());
    assert!(!diagnostics.has_error());
    assert_eq!(code, 1);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn constant_folding_does_not_change_observable_behaviour() {
    let src = "fn main(): i32 { return 2 + 3 * 4; }";

    let mut sources = SourceMap::new();
    let file = sources.add_file("<unfolded>", src);
    let mut diagnostics = Diagnostics::new();
    let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
    let decls = parser::parse_program(tokens, &mut diagnostics);
    let program = binder::bind_program(decls, &mut diagnostics);
    let unfolded_code = interpreter::evaluate_program(&program.declarations, &mut diagnostics, Vec::new());

    let mut sources = SourceMap::new();
    let file = sources.add_file("<folded>", src);
    let mut diagnostics = Diagnostics::new();
    let tokens = lexer::tokenize(&sources, file, &mut diagnostics);
    let decls = parser::parse_program(tokens, &mut diagnostics);
    let program = binder::bind_program(decls, &mut diagnostics);
    let folded = folder::fold_program(program.declarations, &mut diagnostics);
    let folded_code = interpreter::evaluate_program(&folded, &mut diagnostics, Vec::new());

    assert_eq!(unfolded_code, folded_code);
}

#[test]
fn division_by_zero_is_a_compilation_boundary_case_not_a_crash() {
    let (_, diags) = evaluate("fn main(): i32 { return 1 / 0; }");
    assert!(diags.has_error());
}

#[test]
fn break_with_no_enclosing_loop_is_an_error() {
    let (_, diags) = evaluate("fn main(): i32 { break; return 0; }");
    assert!(diags.has_error());
}
