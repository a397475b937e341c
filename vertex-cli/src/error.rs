//! Front-end and driver-level errors: everything that can fail before a
//! tree reaches `vertex_storn`/`vertex_asm`, plus the wrapper that lets the
//! driver report a single error type regardless of which stage failed.

use thiserror::Error;

/// A lexical or syntactic failure while reading Storn or Vtx source text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Everything the driver binaries can fail with, collected into one enum
/// so `main` has a single `Display` to print and a single exit path.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to parse {1}: {0}")]
    Parse(#[source] ParseError, &'static str),

    #[error("compilation failed: {0}")]
    Compile(#[from] vertex_storn::CompileError),

    #[error("assembly failed: {0}")]
    Assemble(#[from] vertex_asm::AsmError),

    #[error("could not read {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },

    #[error("could not write {path}: {source}")]
    Write { path: String, #[source] source: std::io::Error },

    #[error("malformed imports file: {0}")]
    Imports(#[source] serde_yaml::Error),

    #[error("could not render exports: {0}")]
    Exports(#[source] serde_yaml::Error),
}
