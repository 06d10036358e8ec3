//! Source positions and the line-record map that tracks them across
//! textual inclusion (spec.md §3 "Source position", §4.2).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// A half-open region of source text, always local to one file.
///
/// Every token, AST node, and bound-tree node retains the span of its
/// leading token plus any trailing tokens it owns, so a diagnostic can
/// always recover the exact source text it concerns.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub file: FileId,
    pub line_start: u32,
    pub line_end: u32,
    pub col_start: u32,
    pub col_end: u32,
}

impl Span {
    pub fn new(file: FileId, line_start: u32, col_start: u32, line_end: u32, col_end: u32) -> Self {
        Span { file, line_start, line_end, col_start, col_end }
    }

    /// A zero-width span at a single point, used for synthetic tokens
    /// inserted by error recovery.
    pub fn point(file: FileId, line: u32, col: u32) -> Self {
        Span { file, line_start: line, line_end: line, col_start: col, col_end: col }
    }

    /// The smallest span covering both `self` and `other`. Callers are
    /// responsible for ensuring both spans share a file; joining across
    /// files collapses to `self` since a parent span must be local.
    pub fn join(&self, other: &Span) -> Span {
        if self.file != other.file {
            return self.clone();
        }
        let (line_start, col_start) = if self.line_start < other.line_start
            || (self.line_start == other.line_start && self.col_start <= other.col_start)
        {
            (self.line_start, self.col_start)
        } else {
            (other.line_start, other.col_start)
        };
        let (line_end, col_end) = if self.line_end > other.line_end
            || (self.line_end == other.line_end && self.col_end >= other.col_end)
        {
            (self.line_end, self.col_end)
        } else {
            (other.line_end, other.col_end)
        };
        Span { file: self.file, line_start, col_start, line_end, col_end }
    }
}

/// Identifies a file registered with a `SourceMap`. Cheap to copy and
/// carried on every `Span` instead of a path, so spans stay small.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub u32);

/// One physical line of source text, tagged with the file it was
/// textually included from and its line number in *that* file.
///
/// Textual inclusion concatenates line records with the includee's file
/// identity preserved: a diagnostic against an included line always
/// points at the original file, never at the includer.
#[derive(Clone, Debug)]
pub struct LineRecord {
    pub text: String,
    pub file: FileId,
    pub original_line_number: u32,
}

/// Maps absolute file paths to ordered line records. The sole authority
/// for turning a `Span` back into source text or a path for display.
#[derive(Default)]
pub struct SourceMap {
    paths: Vec<PathBuf>,
    by_path: HashMap<PathBuf, FileId>,
    lines: HashMap<FileId, Vec<LineRecord>>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Registers a file's text under its own identity. `path` need not
    /// exist on disk — in-memory sources (the `-e` flag, tests) register
    /// a synthetic path such as `<expr>`.
    pub fn add_file(&mut self, path: impl AsRef<Path>, text: &str) -> FileId {
        let path = path.as_ref().to_path_buf();
        if let Some(id) = self.by_path.get(&path) {
            return *id;
        }
        let id = FileId(self.paths.len() as u32);
        self.paths.push(path.clone());
        self.by_path.insert(path, id);
        let lines = text
            .split('\n')
            .enumerate()
            .map(|(i, text)| LineRecord {
                text: text.to_string(),
                file: id,
                original_line_number: (i + 1) as u32,
            })
            .collect();
        self.lines.insert(id, lines);
        id
    }

    pub fn path(&self, file: FileId) -> &Path {
        &self.paths[file.0 as usize]
    }

    pub fn file_id(&self, path: impl AsRef<Path>) -> Option<FileId> {
        self.by_path.get(path.as_ref()).copied()
    }

    pub fn line(&self, file: FileId, line_number: u32) -> Option<&str> {
        self.lines
            .get(&file)
            .and_then(|lines| lines.get((line_number.saturating_sub(1)) as usize))
            .map(|record| record.text.as_str())
    }

    pub fn text(&self, span: &Span) -> String {
        if span.line_start == span.line_end {
            self.line(span.file, span.line_start)
                .map(|line| {
                    let start = (span.col_start as usize).min(line.len());
                    let end = (span.col_end as usize).min(line.len()).max(start);
                    line[start..end].to_string()
                })
                .unwrap_or_default()
        } else {
            (span.line_start..=span.line_end)
                .filter_map(|line| self.line(span.file, line))
                .collect::<Vec<_>>()
                .join("\n")
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.col_start != 0 || self.col_end != 0 {
            write!(f, "{}:{}", self.line_start, self.col_start)
        } else {
            write!(f, "{}", self.line_start)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_keeps_original_file_identity() {
        let mut map = SourceMap::new();
        let util = map.add_file("util.linc", "fn util(): i32 {\n    return 1;\n}\n");
        let main = map.add_file("main.linc", "fn main(): i32 {\n    return util();\n}\n");
        assert_ne!(util, main);
        assert_eq!(map.line(util, 2), Some("    return 1;"));
        assert_eq!(map.line(main, 2), Some("    return util();"));
    }

    #[test]
    fn join_widens_to_cover_both_spans() {
        let file = FileId(0);
        let a = Span::new(file, 1, 0, 1, 3);
        let b = Span::new(file, 1, 5, 1, 8);
        let joined = a.join(&b);
        assert_eq!(joined, Span::new(file, 1, 0, 1, 8));
    }
}
