//! The diagnostics sink (spec.md §4.1): the sole mechanism by which
//! pipeline stages signal semantic problems. Stages never return error
//! codes up the call tree; they push a `Report` and keep going so a
//! single run can surface many problems at once.

use crate::span::{SourceMap, Span};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

impl Severity {
    /// ANSI SGR code for this severity's label: cyan info, yellow
    /// warning, red error — matching the convention `-a`/`--no-color`
    /// (spec.md §6) turns off.
    fn ansi_code(&self) -> &'static str {
        match self {
            Severity::Info => "36",
            Severity::Warning => "33",
            Severity::Error => "31",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Environment,
    Lexer,
    Preprocessor,
    Parser,
    Ast,
    Abt,
    Generator,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Environment => "environment",
            Stage::Lexer => "lexer",
            Stage::Preprocessor => "preprocessor",
            Stage::Parser => "parser",
            Stage::Ast => "ast",
            Stage::Abt => "abt",
            Stage::Generator => "generator",
        };
        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Report {
    pub severity: Severity,
    pub stage: Stage,
    pub span: Option<Span>,
    pub message: String,
}

impl Report {
    pub fn error(stage: Stage, span: Option<Span>, message: impl Into<String>) -> Self {
        Report { severity: Severity::Error, stage, span, message: message.into() }
    }

    pub fn warning(stage: Stage, span: Option<Span>, message: impl Into<String>) -> Self {
        Report { severity: Severity::Warning, stage, span, message: message.into() }
    }

    pub fn info(stage: Stage, span: Option<Span>, message: impl Into<String>) -> Self {
        Report { severity: Severity::Info, stage, span, message: message.into() }
    }

    /// Renders one line in the stable text form of spec.md §6:
    /// `<TYPE> <stage>:<file>:<line>[:<col>] <message>`.
    pub fn render(&self, sources: &SourceMap) -> String {
        self.render_colored(sources, false)
    }

    /// Same as `render`, with the severity label wrapped in an ANSI SGR
    /// colour code when `color` is true (the `-a`/`--no-color` flag
    /// turns this off; plain text otherwise).
    pub fn render_colored(&self, sources: &SourceMap, color: bool) -> String {
        let severity = if color {
            format!("\x1b[{}m{}\x1b[0m", self.severity.ansi_code(), self.severity)
        } else {
            self.severity.to_string()
        };
        match &self.span {
            Some(span) => {
                let path = sources.path(span.file).display();
                if span.col_start != 0 {
                    format!(
                        "{} {}:{}:{}:{} {}",
                        severity, self.stage, path, span.line_start, span.col_start, self.message
                    )
                } else {
                    format!("{} {}:{}:{} {}", severity, self.stage, path, span.line_start, self.message)
                }
            }
            None => format!("{} {}: {}", severity, self.stage, self.message),
        }
    }
}

/// A pipeline-scoped collection of reports, in insertion order.
///
/// One instance exists per compilation run, not per process — this is
/// the redesign spec.md §9 ("Global diagnostics sink") calls for, and it
/// is what lets tests instantiate several independent compilations
/// without reports leaking between them.
#[derive(Default, Debug)]
pub struct Diagnostics {
    reports: Vec<Report>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&mut self, report: Report) {
        log::debug!("{:?} {:?}: {}", report.severity, report.stage, report.message);
        self.reports.push(report);
    }

    pub fn error(&mut self, stage: Stage, span: Option<Span>, message: impl Into<String>) {
        self.push(Report::error(stage, span, message));
    }

    pub fn warning(&mut self, stage: Stage, span: Option<Span>, message: impl Into<String>) {
        self.push(Report::warning(stage, span, message));
    }

    pub fn has_error(&self) -> bool {
        self.reports.iter().any(|r| r.severity == Severity::Error)
    }

    pub fn has_error_in(&self, stage: Stage) -> bool {
        self.reports.iter().any(|r| r.severity == Severity::Error && r.stage == stage)
    }

    pub fn has_warning(&self) -> bool {
        self.reports.iter().any(|r| r.severity == Severity::Warning)
    }

    pub fn reports(&self) -> &[Report] {
        &self.reports
    }

    /// Renders every report in insertion order using the plain-text
    /// format of spec.md §6. One call, used by both the CLI binary and
    /// tests, instead of re-deriving the format at each call site.
    pub fn render_all(&self, sources: &SourceMap) -> String {
        self.render_all_colored(sources, false)
    }

    /// Same as `render_all`, optionally colouring each line's severity
    /// label (see `Report::render_colored`); the CLI binary uses this,
    /// passing through `!config.no_color`.
    pub fn render_all_colored(&self, sources: &SourceMap, color: bool) -> String {
        self.reports
            .iter()
            .map(|r| r.render_colored(sources, color))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_error_is_scoped_to_stage() {
        let mut diags = Diagnostics::new();
        diags.warning(Stage::Lexer, None, "looks odd");
        assert!(!diags.has_error());
        diags.error(Stage::Parser, None, "missing token");
        assert!(diags.has_error());
        assert!(diags.has_error_in(Stage::Parser));
        assert!(!diags.has_error_in(Stage::Lexer));
    }

    #[test]
    fn independent_instances_do_not_share_state() {
        let mut a = Diagnostics::new();
        let b = Diagnostics::new();
        a.error(Stage::Abt, None, "x");
        assert!(!b.has_error());
    }
}
