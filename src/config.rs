//! CLI configuration (spec.md §6), parsed with `clap`'s derive API the
//! way a Rust CLI teacher would, kept separate from the in-language
//! diagnostics model.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(name = "linc", about = "Front-end and tree-walking evaluator for the linc language", version)]
pub struct Config {
    /// Source files to interpret, in order; argv passed through to `main`.
    #[clap(name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Evaluate a single expression and print its result instead of running a file.
    #[clap(short = 'e', long = "eval")]
    pub eval: Option<String>,

    /// Additional include search root; may be given multiple times.
    #[clap(short = 'I', long = "include", multiple_occurrences = true)]
    pub include_roots: Vec<PathBuf>,

    /// Synthesise a `#define name=value` before lexing; may be given multiple times.
    #[clap(short = 'D', long = "define", multiple_occurrences = true)]
    pub defines: Vec<String>,

    /// Enable constant folding.
    #[clap(short = 'O', long = "optimize")]
    pub optimize: bool,

    /// Dump diagnostics as JSON to the given file in addition to stderr text.
    #[clap(short = 'L', long = "log-file")]
    pub diagnostics_log: Option<PathBuf>,

    /// Print the legal notice and exit.
    #[clap(short = 'C', long = "copyright")]
    pub copyright: bool,

    /// Disable coloured diagnostic output.
    #[clap(short = 'a', long = "no-color")]
    pub no_color: bool,
}

/// A `-D name=value` or bare `-D name` argument, split for the
/// preprocessor's initial definition table.
pub struct Define {
    pub name: String,
    pub value: Option<String>,
}

impl Config {
    pub fn parsed_defines(&self) -> Vec<Define> {
        self.defines
            .iter()
            .map(|raw| match raw.split_once('=') {
                Some((name, value)) => Define { name: name.to_string(), value: Some(value.to_string()) },
                None => Define { name: raw.clone(), value: None },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_without_equals_has_no_value() {
        let config = Config { files: vec![], eval: None, include_roots: vec![], defines: vec!["DEBUG".into()], optimize: false, diagnostics_log: None, copyright: false, no_color: false };
        let defines = config.parsed_defines();
        assert_eq!(defines[0].name, "DEBUG");
        assert!(defines[0].value.is_none());
    }

    #[test]
    fn define_with_equals_splits_name_and_value() {
        let config = Config { files: vec![], eval: None, include_roots: vec![], defines: vec!["LEVEL=3".into()], optimize: false, diagnostics_log: None, copyright: false, no_color: false };
        let defines = config.parsed_defines();
        assert_eq!(defines[0].name, "LEVEL");
        assert_eq!(defines[0].value.as_deref(), Some("3"));
    }
}
