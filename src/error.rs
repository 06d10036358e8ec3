//! Host-level errors: failures in driving the compiler (bad paths, I/O),
//! distinct from the in-language `Diagnostics` sink which reports
//! problems with the program being compiled.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LincError {
    #[error("could not read '{path}': {source}")]
    ReadSource { path: PathBuf, #[source] source: std::io::Error },

    #[error("entry file '{0}' was not given")]
    NoEntryFile(PathBuf),

    #[error("compilation failed with {0} error(s)")]
    CompilationFailed(usize),

    #[error("'{0}' is not a valid include root")]
    InvalidIncludeRoot(PathBuf),
}

pub type Result<T> = std::result::Result<T, LincError>;
